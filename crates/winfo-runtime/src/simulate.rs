//! Scripted multi-window simulation over a [`MemoryNetwork`].
//!
//! Spawns agents on simulated windows, drives focus, moves, resizes and
//! scrolls for a while, then reports what each window sees.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;
use winfo_core::{Dimensions, Position, WindowId, WindowRecord, WindowSensor};

use crate::agent::{AgentHandle, LocalAgent};
use crate::config::AgentConfig;
use crate::coordinator::LeadershipCoordinator;
use crate::memory::MemoryNetwork;
use crate::sensor::{LocalWindow, SimulatedWindow};

#[derive(Debug, Clone)]
pub struct Simulation {
    pub windows: usize,
    pub agents_per_window: usize,
    pub duration: Duration,
}

/// One window's view of the network at the end of the run.
#[derive(Debug, Clone, Serialize)]
pub struct WindowView {
    pub index: usize,
    pub window_id: Option<WindowId>,
    pub records: Vec<WindowRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: u64,
    pub views: Vec<WindowView>,
}

struct SimWindow {
    sensor: Arc<SimulatedWindow>,
    local: Arc<LocalWindow>,
    agents: Vec<AgentHandle>,
}

pub async fn run(sim: &Simulation, config: &AgentConfig) -> SimulationReport {
    let network = MemoryNetwork::new();
    let coordinator = Arc::new(LeadershipCoordinator::new());

    let mut windows = Vec::with_capacity(sim.windows);
    for i in 0..sim.windows {
        let offset = i as f64 * 100.0;
        let sensor = Arc::new(SimulatedWindow::new(
            Position {
                x: offset,
                y: offset / 2.0,
                bx: offset,
                by: offset / 2.0,
            },
            Dimensions {
                width: 800.0,
                height: 600.0,
                bwidth: 800.0,
                bheight: 640.0,
            },
        ));
        let local = Arc::new(LocalWindow::new(sensor.clone()));
        let agents = (0..sim.agents_per_window)
            .map(|_| {
                let (transport, events) = network.transport();
                let handle = LocalAgent::spawn(
                    config.clone(),
                    local.clone(),
                    coordinator.clone(),
                    Box::new(transport),
                    events,
                );
                handle.start();
                handle
            })
            .collect();
        windows.push(SimWindow {
            sensor,
            local,
            agents,
        });
    }
    info!(
        windows = sim.windows,
        agents_per_window = sim.agents_per_window,
        "simulate: agents started"
    );

    let step = config.poll_interval();
    let steps = u64::try_from(sim.duration.as_millis() / step.as_millis().max(1))
        .unwrap_or(u64::MAX);
    for k in 0..steps {
        if let Some(active) = windows.get(k as usize % windows.len().max(1)) {
            for w in &windows {
                if !Arc::ptr_eq(&w.sensor, &active.sensor) {
                    w.sensor.blur();
                }
            }
            active.sensor.focus();
            let pos = active.sensor.read_position();
            active.sensor.move_to(pos.x + 1.0, pos.y);
            if k % 3 == 0 {
                let dims = active.sensor.read_dimensions();
                active.sensor.resize(dims.width + 10.0, dims.height);
            }
            if k % 5 == 0 {
                active.sensor.scroll_to(0.0, k as f64 * 20.0);
            }
        }
        tokio::time::sleep(step).await;
    }

    // Let the last resize settle and the broadcasts land.
    tokio::time::sleep(config.resize_settle() * 2 + step).await;

    let mut views = Vec::with_capacity(windows.len());
    for (index, w) in windows.iter().enumerate() {
        let records = match w.agents.first() {
            Some(agent) => agent.collection().windows().await,
            None => Vec::new(),
        };
        views.push(WindowView {
            index,
            window_id: w.local.id().cloned(),
            records,
        });
    }

    for w in windows {
        for agent in w.agents {
            agent.shutdown().await;
        }
    }
    info!(steps, "simulate: done");
    SimulationReport { steps, views }
}
