//! Tray module - the display consumer: icon, tooltip, and menu

mod icon;
mod menu;

pub use icon::LayerIcons;
pub use menu::{TrayAction, TrayManager};
