//! Process-wide leadership coordinator.
//!
//! Wraps the [`SlotTable`] in an async mutex so acquire/release are
//! indivisible within the process, and delivers the resulting leadership
//! changes to agents through their mailboxes. Agents in different
//! processes each have their own coordinator and are not coordinated.
//!
//! Mailboxes are held weakly: an agent's command channel closes once its
//! handle is gone, whether or not it is still registered here.

use std::collections::HashMap;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use winfo_core::{Acquisition, AgentId, PeerId, Release, SharedSlot, SlotTable, WindowId};

/// Commands an agent's task accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentCommand {
    /// Enable auto-reconnect and join the channel.
    Start,
    /// Leave the channel and stay away.
    Stop,
    /// The agent became its window's leader.
    Promote,
    /// A co-located agent joined or left; carries the new count.
    MonitorCountChanged(u32),
}

#[derive(Debug, Default)]
struct CoordinatorState {
    slots: SlotTable,
    mailboxes: HashMap<AgentId, mpsc::WeakUnboundedSender<AgentCommand>>,
}

impl CoordinatorState {
    fn notify(&self, agent: &AgentId, command: AgentCommand) {
        let Some(mailbox) = self.mailboxes.get(agent) else {
            debug!(agent = %agent, ?command, "coordinator: no mailbox");
            return;
        };
        let delivered = mailbox.upgrade().is_some_and(|tx| tx.send(command).is_ok());
        if !delivered {
            debug!(agent = %agent, ?command, "coordinator: mailbox closed");
        }
    }

    fn dispatch(&self, window: &WindowId, release: &Release) {
        match release {
            Release::Promoted {
                leader,
                monitor_count,
            } => {
                info!(window_id = %window, leader = %leader, monitor_count, "coordinator: leadership handed over");
                self.notify(leader, AgentCommand::Promote);
            }
            Release::Remaining {
                leader,
                monitor_count,
            } => {
                self.notify(leader, AgentCommand::MonitorCountChanged(*monitor_count));
            }
            Release::Destroyed => {
                debug!(window_id = %window, "coordinator: slot destroyed");
            }
            Release::NotMember => {}
        }
    }
}

#[derive(Debug, Default)]
pub struct LeadershipCoordinator {
    state: Mutex<CoordinatorState>,
}

impl LeadershipCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn register(
        &self,
        agent: AgentId,
        mailbox: mpsc::WeakUnboundedSender<AgentCommand>,
    ) {
        self.state.lock().await.mailboxes.insert(agent, mailbox);
    }

    pub(crate) async fn unregister(&self, agent: &AgentId) {
        self.state.lock().await.mailboxes.remove(agent);
    }

    /// Claim `window` or join it as a follower. A new follower bumps the
    /// count, which the leader is told about.
    pub async fn acquire_or_join(&self, window: &WindowId, agent: &AgentId) -> Acquisition {
        let mut state = self.state.lock().await;
        let was_member = state
            .slots
            .slot(window)
            .is_some_and(|slot| slot.contains(agent));
        let acquisition = state.slots.acquire_or_join(window, agent);

        if !acquisition.is_leader && !was_member {
            if let Some(leader) = state.slots.slot(window).map(|s| s.leader.clone()) {
                state.notify(
                    &leader,
                    AgentCommand::MonitorCountChanged(acquisition.monitor_count),
                );
            }
        }
        debug!(
            window_id = %window,
            agent = %agent,
            is_leader = acquisition.is_leader,
            monitor_count = acquisition.monitor_count,
            "coordinator: acquire"
        );
        acquisition
    }

    /// Leave the slot, promoting or notifying whoever is affected.
    pub async fn release(&self, window: &WindowId, agent: &AgentId) -> Release {
        let mut state = self.state.lock().await;
        let release = state.slots.release(window, agent);
        state.dispatch(window, &release);
        release
    }

    /// `departed` left the network. If it was the window's leader of
    /// record, drop it from the slot and promote a successor.
    pub async fn reclaim(&self, window: &WindowId, departed: &PeerId) -> Release {
        let mut state = self.state.lock().await;
        let release = state.slots.reclaim(window, departed);
        if release != Release::NotMember {
            info!(window_id = %window, peer = %departed, "coordinator: reclaimed slot from departed leader");
        }
        state.dispatch(window, &release);
        release
    }

    pub async fn set_leader_peer(&self, window: &WindowId, agent: &AgentId, peer: PeerId) -> bool {
        self.state
            .lock()
            .await
            .slots
            .set_leader_peer(window, agent, peer)
    }

    pub async fn slot(&self, window: &WindowId) -> Option<SharedSlot> {
        self.state.lock().await.slots.slot(window).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w() -> WindowId {
        WindowId::new("w1")
    }

    /// Stands in for an agent's handle: keeps the channel open.
    struct Mailbox {
        _tx: mpsc::UnboundedSender<AgentCommand>,
        rx: mpsc::UnboundedReceiver<AgentCommand>,
    }

    impl Mailbox {
        fn try_recv(&mut self) -> Result<AgentCommand, mpsc::error::TryRecvError> {
            self.rx.try_recv()
        }
    }

    async fn with_mailbox(coordinator: &LeadershipCoordinator, id: &str) -> (AgentId, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = AgentId::new(id);
        coordinator.register(agent.clone(), tx.downgrade()).await;
        (agent, Mailbox { _tx: tx, rx })
    }

    #[tokio::test]
    async fn follower_join_notifies_leader() {
        let coordinator = LeadershipCoordinator::new();
        let (a, mut a_rx) = with_mailbox(&coordinator, "a").await;
        let (b, _b_rx) = with_mailbox(&coordinator, "b").await;

        assert!(coordinator.acquire_or_join(&w(), &a).await.is_leader);
        assert!(a_rx.try_recv().is_err());

        let acq = coordinator.acquire_or_join(&w(), &b).await;
        assert!(!acq.is_leader);
        assert_eq!(a_rx.try_recv().unwrap(), AgentCommand::MonitorCountChanged(2));

        // Re-acquiring changes nothing and stays quiet.
        coordinator.acquire_or_join(&w(), &b).await;
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn leader_release_promotes_successor() {
        let coordinator = LeadershipCoordinator::new();
        let (a, _a_rx) = with_mailbox(&coordinator, "a").await;
        let (b, mut b_rx) = with_mailbox(&coordinator, "b").await;
        coordinator.acquire_or_join(&w(), &a).await;
        coordinator.acquire_or_join(&w(), &b).await;

        let release = coordinator.release(&w(), &a).await;
        assert!(matches!(release, Release::Promoted { ref leader, monitor_count: 1 } if leader == &b));
        assert_eq!(b_rx.try_recv().unwrap(), AgentCommand::Promote);
    }

    #[tokio::test]
    async fn follower_release_updates_leader_count() {
        let coordinator = LeadershipCoordinator::new();
        let (a, mut a_rx) = with_mailbox(&coordinator, "a").await;
        let (b, _b_rx) = with_mailbox(&coordinator, "b").await;
        coordinator.acquire_or_join(&w(), &a).await;
        coordinator.acquire_or_join(&w(), &b).await;
        let _ = a_rx.try_recv();

        coordinator.release(&w(), &b).await;
        assert_eq!(a_rx.try_recv().unwrap(), AgentCommand::MonitorCountChanged(1));
    }

    #[tokio::test]
    async fn reclaim_promotes_once() {
        let coordinator = LeadershipCoordinator::new();
        let (a, _a_rx) = with_mailbox(&coordinator, "a").await;
        let (b, mut b_rx) = with_mailbox(&coordinator, "b").await;
        coordinator.acquire_or_join(&w(), &a).await;
        coordinator.acquire_or_join(&w(), &b).await;
        assert!(coordinator.set_leader_peer(&w(), &a, PeerId::new("p-a")).await);

        coordinator.reclaim(&w(), &PeerId::new("p-a")).await;
        coordinator.reclaim(&w(), &PeerId::new("p-a")).await;
        assert_eq!(b_rx.try_recv().unwrap(), AgentCommand::Promote);
        assert!(b_rx.try_recv().is_err());

        // The stale leader's own release is now a no-op.
        assert_eq!(coordinator.release(&w(), &a).await, Release::NotMember);
        assert_eq!(coordinator.slot(&w()).await.unwrap().leader, b);
    }

    #[tokio::test]
    async fn registration_does_not_keep_channel_open() {
        let coordinator = LeadershipCoordinator::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let a = AgentId::new("a");
        coordinator.register(a.clone(), tx.downgrade()).await;
        drop(tx);
        assert!(rx.recv().await.is_none());

        // Notifying a closed mailbox is harmless.
        let (b, _b_rx) = with_mailbox(&coordinator, "b").await;
        coordinator.acquire_or_join(&w(), &a).await;
        coordinator.acquire_or_join(&w(), &b).await;
        assert!(matches!(
            coordinator.release(&w(), &b).await,
            Release::Remaining { monitor_count: 1, .. }
        ));
    }
}
