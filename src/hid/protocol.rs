//! Layer report protocol definitions
//!
//! Protocol based on the firmware's layer-indicator input report:
//! - Report size: 3 bytes
//! - Marker byte at position 0 (rejects traffic from other HID apps
//!   sharing the physical device)
//! - Active layer index at position 1
//! - Lock/modifier bitmask at position 2
//!
//! All field values are single bytes, so there is no byte-order concern.
//! The constants below describe the firmware's report layout and must be
//! kept in sync with it.

use thiserror::Error;

/// Layer report size in bytes
pub const REPORT_LEN: usize = 3;

/// Leading byte identifying a layer report
pub const REPORT_MARKER: u8 = 0xA5;

/// Highest layer index the firmware will ever report
pub const MAX_LAYER: u8 = 15;

const MARKER_OFFSET: usize = 0;
const LAYER_OFFSET: usize = 1;
const LOCKS_OFFSET: usize = 2;

// Report geometry is fixed at compile time; a layout that places a field
// past the end of the report is a programming error, not a runtime one.
const _: () = assert!(MARKER_OFFSET < REPORT_LEN);
const _: () = assert!(LAYER_OFFSET < REPORT_LEN);
const _: () = assert!(LOCKS_OFFSET < REPORT_LEN);

/// Bits of the lock/modifier mask
pub mod locks {
    pub const CAPS: u8 = 1 << 0;
    pub const NUM: u8 = 1 << 1;
    pub const SCROLL: u8 = 1 << 2;
}

/// Snapshot of the keyboard's layer state carried by one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerState {
    /// Active layer index (0 ..= MAX_LAYER)
    pub layer: u8,
    /// Lock/modifier bitmask (see [`locks`])
    pub locks: u8,
}

impl LayerState {
    /// State with the given layer active and no locks set
    pub fn base(layer: u8) -> Self {
        Self { layer, locks: 0 }
    }

    /// Whether all bits of `mask` are set in the lock bitmask
    pub fn has_locks(&self, mask: u8) -> bool {
        self.locks & mask == mask
    }
}

/// Reasons a byte buffer failed to decode as a layer report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("report is {actual} bytes, expected {expected}")]
    WrongLength { expected: usize, actual: usize },
    #[error("report marker 0x{found:02X} does not match 0x{expected:02X}")]
    BadMarker { expected: u8, found: u8 },
    #[error("layer index {layer} exceeds maximum {max}")]
    LayerOutOfRange { layer: u8, max: u8 },
}

/// Decode a raw input report into a [`LayerState`].
///
/// Pure and total: the same bytes always produce the same result, and no
/// byte outside the checked length is ever read.
pub fn decode(buf: &[u8]) -> Result<LayerState, DecodeError> {
    if buf.len() != REPORT_LEN {
        return Err(DecodeError::WrongLength {
            expected: REPORT_LEN,
            actual: buf.len(),
        });
    }
    if buf[MARKER_OFFSET] != REPORT_MARKER {
        return Err(DecodeError::BadMarker {
            expected: REPORT_MARKER,
            found: buf[MARKER_OFFSET],
        });
    }
    let layer = buf[LAYER_OFFSET];
    if layer > MAX_LAYER {
        return Err(DecodeError::LayerOutOfRange {
            layer,
            max: MAX_LAYER,
        });
    }
    Ok(LayerState {
        layer,
        locks: buf[LOCKS_OFFSET],
    })
}

/// Encode a [`LayerState`] as the firmware would report it.
///
/// Inverse of [`decode`] for in-range states; used by tests and simulated
/// devices.
pub fn encode(state: &LayerState) -> [u8; REPORT_LEN] {
    let mut buf = [0u8; REPORT_LEN];
    buf[MARKER_OFFSET] = REPORT_MARKER;
    buf[LAYER_OFFSET] = state.layer;
    buf[LOCKS_OFFSET] = state.locks;
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_base_layer_report() {
        let state = decode(&[0xA5, 0x03, 0x00]).unwrap();
        assert_eq!(state.layer, 3);
        assert_eq!(state.locks, 0);
    }

    #[test]
    fn test_decode_locks() {
        let state = decode(&[0xA5, 0x01, locks::CAPS | locks::NUM]).unwrap();
        assert!(state.has_locks(locks::CAPS));
        assert!(state.has_locks(locks::NUM));
        assert!(!state.has_locks(locks::SCROLL));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        for len in [0usize, 1, 2, 4, 32, 64] {
            let buf = vec![REPORT_MARKER; len];
            assert_eq!(
                decode(&buf),
                Err(DecodeError::WrongLength {
                    expected: REPORT_LEN,
                    actual: len
                })
            );
        }
    }

    #[test]
    fn test_decode_rejects_bad_marker() {
        assert_eq!(
            decode(&[0x00, 0x03, 0x00]),
            Err(DecodeError::BadMarker {
                expected: REPORT_MARKER,
                found: 0x00
            })
        );
    }

    #[test]
    fn test_decode_rejects_layer_out_of_range() {
        assert_eq!(
            decode(&[0xA5, 0x1F, 0x00]),
            Err(DecodeError::LayerOutOfRange {
                layer: 0x1F,
                max: MAX_LAYER
            })
        );
    }

    #[test]
    fn test_max_layer_is_in_range() {
        let state = decode(&[0xA5, MAX_LAYER, 0x00]).unwrap();
        assert_eq!(state.layer, MAX_LAYER);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for layer in 0..=MAX_LAYER {
            for locks in [0u8, locks::CAPS, locks::NUM | locks::SCROLL, 0xFF] {
                let state = LayerState { layer, locks };
                assert_eq!(decode(&encode(&state)), Ok(state));
            }
        }
    }
}
