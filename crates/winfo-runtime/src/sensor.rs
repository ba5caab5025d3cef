//! Local environment sensor: subscription side plus a scripted window.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tokio::sync::mpsc;
use winfo_core::{Dimensions, Position, ScrollOffsets, SensorEvent, WindowId, WindowSensor};

/// A sensor that can also push change notifications.
pub trait SensorSource: WindowSensor {
    /// Receive `focus`/`blur`/`scroll`/`resize` notifications until the
    /// receiver is dropped.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SensorEvent>;
}

// ─── LocalWindow ─────────────────────────────────────────────────────

/// The window a group of co-located agents lives in.
///
/// Shared by all of them. The window id is minted once, by whichever agent
/// connects first, and then kept for the lifetime of the window so it
/// survives reconnects.
pub struct LocalWindow {
    sensor: Arc<dyn SensorSource>,
    id: OnceLock<WindowId>,
}

impl LocalWindow {
    pub fn new(sensor: Arc<dyn SensorSource>) -> Self {
        Self {
            sensor,
            id: OnceLock::new(),
        }
    }

    pub fn sensor(&self) -> &dyn SensorSource {
        self.sensor.as_ref()
    }

    pub fn id(&self) -> Option<&WindowId> {
        self.id.get()
    }

    pub fn id_or_mint(&self, mint: impl FnOnce() -> String) -> WindowId {
        self.id.get_or_init(|| WindowId::new(mint())).clone()
    }
}

impl std::fmt::Debug for LocalWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWindow").field("id", &self.id.get()).finish()
    }
}

// ─── SimulatedWindow ─────────────────────────────────────────────────

#[derive(Debug)]
struct WindowState {
    focused: bool,
    nested: bool,
    position: Position,
    dims: Dimensions,
    scroll: ScrollOffsets,
    subscribers: Vec<mpsc::UnboundedSender<SensorEvent>>,
}

/// Scripted sensor. Setters change the readings and notify subscribers
/// the way a real windowing environment would: moves are silent (they are
/// only seen by polling), everything else emits an event.
#[derive(Debug)]
pub struct SimulatedWindow {
    state: Mutex<WindowState>,
}

impl Default for SimulatedWindow {
    fn default() -> Self {
        Self::new(
            Position::default(),
            Dimensions {
                width: 800.0,
                height: 600.0,
                bwidth: 800.0,
                bheight: 640.0,
            },
        )
    }
}

impl SimulatedWindow {
    pub fn new(position: Position, dims: Dimensions) -> Self {
        Self {
            state: Mutex::new(WindowState {
                focused: false,
                nested: false,
                position,
                dims,
                scroll: ScrollOffsets::default(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Move the window. No event: position is polled.
    pub fn move_to(&self, x: f64, y: f64) {
        let mut state = self.lock();
        state.position = Position { x, y, bx: x, by: y };
    }

    pub fn resize(&self, width: f64, height: f64) {
        let mut state = self.lock();
        let chrome = state.dims.bheight - state.dims.height;
        state.dims = Dimensions {
            width,
            height,
            bwidth: width,
            bheight: height + chrome,
        };
        notify(&mut state, SensorEvent::Resize);
    }

    pub fn scroll_to(&self, scrollx: f64, scrolly: f64) {
        let mut state = self.lock();
        state.scroll = ScrollOffsets { scrollx, scrolly };
        notify(&mut state, SensorEvent::Scroll);
    }

    pub fn focus(&self) {
        let mut state = self.lock();
        if !state.focused {
            state.focused = true;
            notify(&mut state, SensorEvent::Focus);
        }
    }

    pub fn blur(&self) {
        let mut state = self.lock();
        if state.focused {
            state.focused = false;
            notify(&mut state, SensorEvent::Blur);
        }
    }

    /// Pretend to run inside a nested context.
    pub fn set_nested(&self, nested: bool) {
        self.lock().nested = nested;
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn notify(state: &mut WindowState, event: SensorEvent) {
    state.subscribers.retain(|tx| tx.send(event).is_ok());
}

impl WindowSensor for SimulatedWindow {
    fn read_focus(&self) -> bool {
        self.lock().focused
    }

    fn read_position(&self) -> Position {
        self.lock().position
    }

    fn read_dimensions(&self) -> Dimensions {
        self.lock().dims
    }

    fn read_scroll(&self) -> ScrollOffsets {
        self.lock().scroll
    }

    fn is_top_level(&self) -> bool {
        !self.lock().nested
    }
}

impl SensorSource for SimulatedWindow {
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SensorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }
}
