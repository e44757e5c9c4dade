//! Application event definitions

use crate::hid::protocol::LayerState;
use crate::tray::TrayAction;
use tokio::sync::mpsc;
use winit::event_loop::EventLoopProxy;

/// Application-wide events for inter-module communication
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The monitored keyboard was found and its session opened
    DeviceAttached { product: String },

    /// The keyboard reported a new layer state
    LayerChanged(LayerState),

    /// The keyboard is gone; layer state is unknown until it returns
    SourceLost,

    /// Tray menu action triggered
    TrayAction(TrayAction),
}

/// Wrapper around `mpsc::UnboundedSender<AppEvent>` that also wakes the winit
/// event loop via `EventLoopProxy::send_event(())` after every send.  This
/// allows running the tray loop with `ControlFlow::Wait` without losing
/// responsiveness to events from the monitor thread.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<AppEvent>,
    proxy: EventLoopProxy<()>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>, proxy: EventLoopProxy<()>) -> Self {
        Self { tx, proxy }
    }

    pub fn send(&self, event: AppEvent) -> Result<(), mpsc::error::SendError<AppEvent>> {
        let result = self.tx.send(event);
        let _ = self.proxy.send_event(());
        result
    }
}
