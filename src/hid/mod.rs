//! HID module - discovery, sessions, and supervision of the keyboard's
//! vendor-defined layer interface

pub mod device;
pub mod monitor;
pub mod protocol;

pub use device::{DeviceFilter, OpenError, ReadOutcome};
pub use monitor::{spawn, MonitorHandle};
pub use protocol::{DecodeError, LayerState};
