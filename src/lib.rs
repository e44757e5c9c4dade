//! Layer Monitor
//!
//! A Rust application that watches a Viable keyboard's active layer over its
//! vendor-defined raw HID interface and shows it in the system tray.
//!
//! # Features
//! - Finds the vendor interface among the device's HID interfaces by
//!   vendor/product ID and usage page
//! - Decodes the firmware's layer reports and tolerates foreign traffic on
//!   the shared interface
//! - Survives unplug/replug cycles with capped-backoff reconnection
//! - Deduplicates unchanged state so the tray only repaints on real changes
//! - Runs as a system tray application

pub mod core;
pub mod hid;
pub mod tray;

pub use crate::core::config::Config;
pub use crate::core::events::{AppEvent, EventSender};
pub use crate::core::publisher::StatePublisher;
pub use crate::hid::protocol::LayerState;
pub use crate::tray::TrayManager;
