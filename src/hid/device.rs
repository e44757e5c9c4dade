//! HID device discovery and session management

use anyhow::{Context, Result};
use hidapi::{HidApi, HidDevice};
use std::ffi::CString;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Largest input report any HID device can produce; read buffers are sized
/// to this so an over-length report is seen as such instead of truncated.
const READ_BUF_LEN: usize = 64;

/// Identity of the vendor interface to monitor, from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage_id: u16,
}

/// A connectable HID interface found during enumeration.
///
/// The platform path may go stale after a replug, so a descriptor is
/// re-derived on every reconnection attempt and never cached across one.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage_id: u16,
    path: CString,
    product: Option<String>,
}

impl DeviceDescriptor {
    /// Human-readable device name for logs and the tray tooltip
    pub fn product_name(&self) -> &str {
        self.product.as_deref().unwrap_or("keyboard")
    }

    /// Descriptor for simulated transports in tests
    #[cfg(test)]
    pub(crate) fn fake(product: &str) -> Self {
        Self {
            vendor_id: 0xFEED,
            product_id: 0x6061,
            usage_page: 0xFF61,
            usage_id: 0x62,
            path: CString::new("/dev/hidraw-test").unwrap(),
            product: Some(product.to_string()),
        }
    }
}

/// Why an open attempt on an enumerated interface failed
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("device not found")]
    NotFound,
    #[error("permission denied opening HID device: {0}")]
    AccessDenied(String),
    #[error("device busy or unavailable: {0}")]
    Busy(String),
}

/// Classify an opaque hidapi open failure into an [`OpenError`].
///
/// hidapi reports permission problems, vanished paths, and
/// claimed-elsewhere conditions with the same error type, so the message
/// text is the only discriminator. A path that enumerated but no longer
/// exists (replug race) maps to `NotFound`.
fn classify_open_failure(message: String) -> OpenError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("access denied") {
        OpenError::AccessDenied(message)
    } else if lower.contains("no such") || lower.contains("not found") {
        OpenError::NotFound
    } else {
        OpenError::Busy(message)
    }
}

/// One input report as read from the device
#[derive(Debug, Clone, Copy)]
pub struct RawReport {
    data: [u8; READ_BUF_LEN],
    len: usize,
}

impl RawReport {
    /// Build a report from a byte slice (truncating at buffer capacity)
    pub fn from_slice(bytes: &[u8]) -> Self {
        let len = bytes.len().min(READ_BUF_LEN);
        let mut data = [0u8; READ_BUF_LEN];
        data[..len].copy_from_slice(&bytes[..len]);
        Self { data, len }
    }

    /// The bytes actually read
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

/// Result of one bounded read on an open session
#[derive(Debug)]
pub enum ReadOutcome {
    /// A report arrived
    Report(RawReport),
    /// No report within the timeout; the link is still considered live
    Timeout,
    /// The link is gone; the session must be dropped
    Disconnected,
}

/// Source of devices: enumeration plus session opening.
///
/// The supervisor is written against this seam so reconnection behavior can
/// be exercised with simulated devices.
pub trait Transport {
    type Conn: Connection;

    /// First matching interface in platform enumeration order, or `None`
    /// when the device is absent (an expected state, not an error)
    fn find(&mut self) -> Option<DeviceDescriptor>;

    /// Open a session on a previously enumerated interface
    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<Self::Conn, OpenError>;
}

/// One open device connection. Dropping the value releases the OS handle.
pub trait Connection {
    /// Block for up to `timeout` waiting for the next input report
    fn read_report(&mut self, timeout: Duration) -> ReadOutcome;
}

/// hidapi-backed transport
pub struct HidTransport {
    api: HidApi,
    filter: DeviceFilter,
}

impl HidTransport {
    pub fn new(filter: DeviceFilter) -> Result<Self> {
        let api = HidApi::new().context("Failed to initialize HID API")?;

        // Don't seize the device exclusively on macOS — we only need the
        // vendor-specific interface and must not prevent the system keyboard
        // driver from receiving events on the standard keyboard interface of
        // the same composite USB device.
        #[cfg(target_os = "macos")]
        {
            api.set_open_exclusive(false);
        }

        Ok(Self { api, filter })
    }
}

impl Transport for HidTransport {
    type Conn = DeviceSession;

    fn find(&mut self) -> Option<DeviceDescriptor> {
        // Refresh so newly plugged devices show up
        if let Err(e) = self.api.refresh_devices() {
            debug!("Failed to refresh device list: {}", e);
        }

        self.api
            .device_list()
            .find(|d| {
                d.vendor_id() == self.filter.vendor_id
                    && d.product_id() == self.filter.product_id
                    && d.usage_page() == self.filter.usage_page
                    && d.usage() == self.filter.usage_id
            })
            .map(|d| DeviceDescriptor {
                vendor_id: d.vendor_id(),
                product_id: d.product_id(),
                usage_page: d.usage_page(),
                usage_id: d.usage(),
                path: d.path().to_owned(),
                product: d.product_string().map(|s| s.to_string()),
            })
    }

    fn open(&mut self, descriptor: &DeviceDescriptor) -> Result<DeviceSession, OpenError> {
        match self.api.open_path(&descriptor.path) {
            Ok(device) => Ok(DeviceSession { device }),
            Err(e) => Err(classify_open_failure(e.to_string())),
        }
    }
}

/// Open hidapi session; the `HidDevice` handle closes when this drops
pub struct DeviceSession {
    device: HidDevice,
}

impl Connection for DeviceSession {
    fn read_report(&mut self, timeout: Duration) -> ReadOutcome {
        let mut buf = [0u8; READ_BUF_LEN];
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        match self.device.read_timeout(&mut buf, timeout_ms) {
            Ok(n) if n > 0 => ReadOutcome::Report(RawReport::from_slice(&buf[..n])),
            Ok(_) => ReadOutcome::Timeout,
            Err(e) => {
                warn!("HID read error: {}", e);
                ReadOutcome::Disconnected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permission_failure() {
        let err = classify_open_failure("hidapi error: Permission denied".to_string());
        assert!(matches!(err, OpenError::AccessDenied(_)));
    }

    #[test]
    fn test_classify_busy_failure() {
        let err = classify_open_failure("hidapi error: device is claimed".to_string());
        assert!(matches!(err, OpenError::Busy(_)));
    }

    #[test]
    fn test_classify_stale_path_failure() {
        let err = classify_open_failure("No such file or directory".to_string());
        assert!(matches!(err, OpenError::NotFound));
    }

    #[test]
    fn test_raw_report_preserves_length() {
        let report = RawReport::from_slice(&[0xA5, 0x02, 0x00]);
        assert_eq!(report.bytes(), &[0xA5, 0x02, 0x00]);
    }

    #[test]
    fn test_raw_report_truncates_at_capacity() {
        let oversized = vec![0u8; 200];
        let report = RawReport::from_slice(&oversized);
        assert_eq!(report.bytes().len(), READ_BUF_LEN);
    }
}
