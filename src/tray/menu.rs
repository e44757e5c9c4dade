//! Tray menu and status management

use super::icon::LayerIcons;
use crate::core::events::{AppEvent, EventSender};
use crate::hid::protocol::{locks, LayerState};
use anyhow::{Context, Result};
use tray_icon::{
    menu::{Menu, MenuEvent, MenuId, MenuItem, PredefinedMenuItem},
    TrayIcon as TrayIconHandle, TrayIconBuilder,
};
use tracing::{debug, error, info};

/// Tray menu actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayAction {
    /// Quit application
    Quit,
}

/// Tray manager: owns the icon handle and the status menu entry
pub struct TrayManager {
    tray: TrayIconHandle,
    icons: LayerIcons,
    status_item: MenuItem,
    quit_id: MenuId,
}

impl TrayManager {
    /// Create the tray icon in its searching state
    pub fn new(event_tx: EventSender) -> Result<Self> {
        let icons = LayerIcons::new().context("Failed to build tray icons")?;

        let menu = Menu::new();

        let status_item = MenuItem::new("Searching for keyboard...", false, None);

        let quit_item = MenuItem::new("Quit", true, None);
        let quit_id = quit_item.id().clone();

        menu.append(&status_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&quit_item)?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("Layer Monitor - Searching for keyboard")
            .with_icon(icons.lost().clone())
            .build()
            .context("Failed to create tray icon")?;

        info!("Tray icon created");

        let manager = Self {
            tray,
            icons,
            status_item,
            quit_id,
        };

        manager.start_menu_handler(event_tx);

        Ok(manager)
    }

    /// Start menu event handler
    fn start_menu_handler(&self, event_tx: EventSender) {
        let quit_id = self.quit_id.clone();

        std::thread::spawn(move || {
            let receiver = MenuEvent::receiver();

            loop {
                if let Ok(event) = receiver.recv() {
                    debug!("Menu event: {:?}", event);

                    if event.id == quit_id {
                        if let Err(e) = event_tx.send(AppEvent::TrayAction(TrayAction::Quit)) {
                            error!("Failed to send tray action: {}", e);
                        }
                    }
                }
            }
        });
    }

    /// Show which keyboard the monitor attached to
    pub fn set_attached(&mut self, product: &str) {
        self.status_item.set_text(format!("Connected: {}", product));
        self.set_tooltip(&format!("Layer Monitor - {}", product));
    }

    /// Show the current layer state
    pub fn set_layer(&mut self, state: &LayerState) {
        if let Err(e) = self.tray.set_icon(Some(self.icons.for_layer(state.layer).clone())) {
            error!("Failed to set tray icon: {}", e);
        }
        self.set_tooltip(&layer_tooltip(state));
    }

    /// Show the disconnected state
    pub fn set_lost(&mut self) {
        self.status_item.set_text("Searching for keyboard...");
        if let Err(e) = self.tray.set_icon(Some(self.icons.lost().clone())) {
            error!("Failed to set tray icon: {}", e);
        }
        self.set_tooltip("Layer Monitor - Searching for keyboard");
    }

    fn set_tooltip(&mut self, tooltip: &str) {
        if let Err(e) = self.tray.set_tooltip(Some(tooltip)) {
            error!("Failed to set tray tooltip: {}", e);
        }
    }
}

/// Tooltip text for a layer state, e.g. "Layer 3 (caps, num)"
fn layer_tooltip(state: &LayerState) -> String {
    let mut active = Vec::new();
    if state.has_locks(locks::CAPS) {
        active.push("caps");
    }
    if state.has_locks(locks::NUM) {
        active.push("num");
    }
    if state.has_locks(locks::SCROLL) {
        active.push("scroll");
    }

    if active.is_empty() {
        format!("Layer {}", state.layer)
    } else {
        format!("Layer {} ({})", state.layer, active.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tooltip_without_locks() {
        assert_eq!(layer_tooltip(&LayerState::base(3)), "Layer 3");
    }

    #[test]
    fn test_tooltip_with_locks() {
        let state = LayerState {
            layer: 1,
            locks: locks::CAPS | locks::SCROLL,
        };
        assert_eq!(layer_tooltip(&state), "Layer 1 (caps, scroll)");
    }
}
