//! Leadership slots for co-located agents.
//!
//! Every window has at most one [`SharedSlot`]. A window with no entry in
//! the [`SlotTable`] is unclaimed; the first agent to acquire it becomes
//! leader, later agents join as followers. When the leader leaves, the
//! longest-standing follower is promoted. The last agent out destroys the
//! slot.
//!
//! The table itself is plain data. Whoever owns it must serialize access
//! (the runtime keeps it behind a mutex) so the check-then-create step of
//! [`SlotTable::acquire_or_join`] is indivisible. Nothing here coordinates
//! across processes: two processes that each own a table for the same
//! window can both elect a leader.

use std::collections::HashMap;

use crate::types::{AgentId, PeerId, WindowId};

// ─── Slot ────────────────────────────────────────────────────────────

/// Process-local coordination state for one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedSlot {
    pub window_id: WindowId,
    pub leader: AgentId,
    /// Network identity the leader is currently broadcasting under.
    pub leader_peer: Option<PeerId>,
    /// Co-located agents in join order. Always contains `leader`.
    agents: Vec<AgentId>,
}

impl SharedSlot {
    fn claim(window_id: WindowId, leader: AgentId) -> Self {
        Self {
            window_id,
            agents: vec![leader.clone()],
            leader,
            leader_peer: None,
        }
    }

    /// Number of live co-located agents.
    pub fn monitor_count(&self) -> u32 {
        u32::try_from(self.agents.len()).unwrap_or(u32::MAX)
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.agents.contains(agent)
    }

    pub fn is_leader(&self, agent: &AgentId) -> bool {
        &self.leader == agent
    }
}

// ─── Transitions ─────────────────────────────────────────────────────

/// Outcome of [`SlotTable::acquire_or_join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    pub is_leader: bool,
    pub monitor_count: u32,
}

/// Outcome of an agent leaving a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// The agent was not part of the slot (or no slot existed).
    NotMember,
    /// A follower left; the leader is unchanged.
    Remaining { leader: AgentId, monitor_count: u32 },
    /// The leader left and `leader` was promoted in its place.
    Promoted { leader: AgentId, monitor_count: u32 },
    /// The last agent left; the window is unclaimed again.
    Destroyed,
}

// ─── Table ───────────────────────────────────────────────────────────

/// Keyed store of leadership slots (window id → slot).
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: HashMap<WindowId, SharedSlot>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the window if unclaimed, otherwise join it as a follower.
    ///
    /// Re-acquiring as an agent already in the slot reports the current
    /// status without changing the count.
    pub fn acquire_or_join(&mut self, window: &WindowId, agent: &AgentId) -> Acquisition {
        match self.slots.get_mut(window) {
            None => {
                self.slots.insert(
                    window.clone(),
                    SharedSlot::claim(window.clone(), agent.clone()),
                );
                Acquisition {
                    is_leader: true,
                    monitor_count: 1,
                }
            }
            Some(slot) => {
                if !slot.contains(agent) {
                    slot.agents.push(agent.clone());
                }
                Acquisition {
                    is_leader: slot.is_leader(agent),
                    monitor_count: slot.monitor_count(),
                }
            }
        }
    }

    /// Remove `agent` from the window's slot, promoting a successor if it
    /// was the leader.
    pub fn release(&mut self, window: &WindowId, agent: &AgentId) -> Release {
        let Some(slot) = self.slots.get_mut(window) else {
            return Release::NotMember;
        };
        let Some(pos) = slot.agents.iter().position(|a| a == agent) else {
            return Release::NotMember;
        };
        slot.agents.remove(pos);

        if slot.agents.is_empty() {
            self.slots.remove(window);
            return Release::Destroyed;
        }

        if slot.is_leader(agent) {
            slot.leader = slot.agents[0].clone();
            slot.leader_peer = None;
            return Release::Promoted {
                leader: slot.leader.clone(),
                monitor_count: slot.monitor_count(),
            };
        }

        Release::Remaining {
            leader: slot.leader.clone(),
            monitor_count: slot.monitor_count(),
        }
    }

    /// Record the network identity of the current leader.
    ///
    /// Returns `false` if `agent` is not the window's leader.
    pub fn set_leader_peer(&mut self, window: &WindowId, agent: &AgentId, peer: PeerId) -> bool {
        match self.slots.get_mut(window) {
            Some(slot) if slot.is_leader(agent) => {
                slot.leader_peer = Some(peer);
                true
            }
            _ => false,
        }
    }

    /// Re-evaluate leadership after `departed` dropped off the network.
    ///
    /// Only acts when `departed` is still the slot's leader-of-record,
    /// which means the leader vanished without releasing. The stale leader
    /// is removed and the usual promotion rule applies. Any later call with
    /// the same peer is a no-op, so concurrent observers of the same drop
    /// promote at most once.
    pub fn reclaim(&mut self, window: &WindowId, departed: &PeerId) -> Release {
        let stale = match self.slots.get(window) {
            Some(slot) if slot.leader_peer.as_ref() == Some(departed) => slot.leader.clone(),
            _ => return Release::NotMember,
        };
        self.release(window, &stale)
    }

    pub fn slot(&self, window: &WindowId) -> Option<&SharedSlot> {
        self.slots.get(window)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
