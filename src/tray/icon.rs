//! Tray icon generation
//!
//! One icon per layer: the layer number painted over that layer's color,
//! matching the firmware's default per-layer palette, plus a neutral icon
//! for the disconnected state.

use anyhow::Result;
use tray_icon::Icon;

use crate::hid::protocol::MAX_LAYER;

const ICON_SIZE: u32 = 32;

/// Default per-layer colors (HSV, 0-255 hue scale as the firmware uses)
const DEFAULT_LAYER_COLORS: [(u8, u8, u8); 16] = [
    (85, 255, 255),  // Green
    (21, 255, 255),  // Orange
    (149, 255, 255), // Azure
    (0, 255, 255),   // Red
    (170, 255, 255), // Blue
    (64, 255, 255),  // Chartreuse
    (234, 255, 255), // Rose
    (32, 255, 255),  // Gold
    (191, 255, 128), // Purple
    (11, 176, 255),  // Coral
    (106, 255, 255), // Spring Green
    (128, 255, 128), // Teal
    (128, 255, 255), // Turquoise
    (43, 255, 255),  // Yellow
    (213, 255, 255), // Magenta
    (0, 0, 255),     // White
];

/// 3x5 digit glyphs, one row per byte, leftmost pixel in the high bit
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111], // 0
    [0b010, 0b110, 0b010, 0b010, 0b111], // 1
    [0b111, 0b001, 0b111, 0b100, 0b111], // 2
    [0b111, 0b001, 0b111, 0b001, 0b111], // 3
    [0b101, 0b101, 0b111, 0b001, 0b001], // 4
    [0b111, 0b100, 0b111, 0b001, 0b111], // 5
    [0b111, 0b100, 0b111, 0b101, 0b111], // 6
    [0b111, 0b001, 0b010, 0b010, 0b010], // 7
    [0b111, 0b101, 0b111, 0b101, 0b111], // 8
    [0b111, 0b101, 0b111, 0b001, 0b111], // 9
];

const GLYPH_SCALE: usize = 3;
const GLYPH_W: usize = 3 * GLYPH_SCALE;
const GLYPH_H: usize = 5 * GLYPH_SCALE;
const GLYPH_GAP: usize = GLYPH_SCALE;

/// Pre-rendered tray icons for every layer plus the disconnected state
pub struct LayerIcons {
    layers: Vec<Icon>,
    lost_dark: Icon,
    lost_light: Icon,
}

impl LayerIcons {
    /// Render the full icon set up front
    pub fn new() -> Result<Self> {
        let layers = (0..=MAX_LAYER)
            .map(|layer| {
                let (h, s, v) = DEFAULT_LAYER_COLORS[layer as usize];
                build_icon(render_layer_icon(layer, hsv_to_rgb(h, s, v)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layers,
            lost_dark: build_icon(render_lost_icon([160, 160, 160]))?,
            lost_light: build_icon(render_lost_icon([90, 90, 90]))?,
        })
    }

    /// Icon for the given layer (disconnected icon if somehow out of range)
    pub fn for_layer(&self, layer: u8) -> &Icon {
        self.layers.get(layer as usize).unwrap_or_else(|| self.lost())
    }

    /// Icon for the disconnected state, matched to the menu bar appearance
    pub fn lost(&self) -> &Icon {
        if is_dark_mode() {
            &self.lost_dark
        } else {
            &self.lost_light
        }
    }
}

fn build_icon(rgba: Vec<u8>) -> Result<Icon> {
    Icon::from_rgba(rgba, ICON_SIZE, ICON_SIZE)
        .map_err(|e| anyhow::anyhow!("Failed to create icon: {}", e))
}

/// Solid color square with the layer number painted on top
fn render_layer_icon(layer: u8, rgb: [u8; 3]) -> Vec<u8> {
    let mut rgba = fill(rgb);

    // Contrasting text color (perceived-brightness formula)
    let brightness =
        (rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114) / 1000;
    let text = if brightness > 128 {
        [0u8, 0, 0]
    } else {
        [255u8, 255, 255]
    };

    let digits: Vec<usize> = if layer < 10 {
        vec![layer as usize]
    } else {
        vec![(layer / 10) as usize, (layer % 10) as usize]
    };

    let total_w = digits.len() * GLYPH_W + (digits.len() - 1) * GLYPH_GAP;
    let x0 = (ICON_SIZE as usize - total_w) / 2;
    let y0 = (ICON_SIZE as usize - GLYPH_H) / 2;

    for (i, &digit) in digits.iter().enumerate() {
        let gx = x0 + i * (GLYPH_W + GLYPH_GAP);
        draw_glyph(&mut rgba, &DIGITS[digit], gx, y0, text);
    }

    rgba
}

/// Neutral square with a centered dash for the disconnected state
fn render_lost_icon(rgb: [u8; 3]) -> Vec<u8> {
    let mut rgba = fill(rgb);
    let dash = [0b111u8; 1];
    let x0 = (ICON_SIZE as usize - GLYPH_W) / 2;
    let y0 = (ICON_SIZE as usize - GLYPH_SCALE) / 2;
    draw_glyph(&mut rgba, &dash, x0, y0, [255, 255, 255]);
    rgba
}

fn fill(rgb: [u8; 3]) -> Vec<u8> {
    let mut rgba = Vec::with_capacity((ICON_SIZE * ICON_SIZE * 4) as usize);
    for _ in 0..ICON_SIZE * ICON_SIZE {
        rgba.extend_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
    }
    rgba
}

fn draw_glyph(rgba: &mut [u8], rows: &[u8], x0: usize, y0: usize, color: [u8; 3]) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..3 {
            if bits & (0b100 >> col) == 0 {
                continue;
            }
            for dy in 0..GLYPH_SCALE {
                for dx in 0..GLYPH_SCALE {
                    let x = x0 + col * GLYPH_SCALE + dx;
                    let y = y0 + row * GLYPH_SCALE + dy;
                    let offset = (y * ICON_SIZE as usize + x) * 4;
                    rgba[offset..offset + 3].copy_from_slice(&color);
                }
            }
        }
    }
}

/// Convert HSV (all channels 0-255) to RGB
fn hsv_to_rgb(h: u8, s: u8, v: u8) -> [u8; 3] {
    if s == 0 {
        return [v, v, v];
    }
    let h6 = h as u16 * 6;
    let region = h6 / 256;
    let remainder = (h6 % 256) as u16;

    let v16 = v as u16;
    let s16 = s as u16;
    let p = (v16 * (255 - s16) / 255) as u8;
    let q = (v16 * (255 - s16 * remainder / 255) / 255) as u8;
    let t = (v16 * (255 - s16 * (255 - remainder) / 255) / 255) as u8;

    match region {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Detect if macOS is in dark mode
#[cfg(target_os = "macos")]
fn is_dark_mode() -> bool {
    use cocoa::base::{id, nil};
    use cocoa::foundation::NSString;
    use objc::{msg_send, sel, sel_impl};

    unsafe {
        let user_defaults: id = msg_send![objc::class!(NSUserDefaults), standardUserDefaults];
        let key = NSString::alloc(nil).init_str("AppleInterfaceStyle");
        let value: id = msg_send![user_defaults, stringForKey: key];

        if value == nil {
            // No value means light mode (default)
            false
        } else {
            let utf8: *const i8 = msg_send![value, UTF8String];
            if utf8.is_null() {
                false
            } else {
                let style = std::ffi::CStr::from_ptr(utf8).to_string_lossy();
                style == "Dark"
            }
        }
    }
}

#[cfg(not(target_os = "macos"))]
fn is_dark_mode() -> bool {
    // Default to dark mode on other platforms
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0, 255, 255), [255, 0, 0]);
        assert_eq!(hsv_to_rgb(0, 0, 255), [255, 255, 255]);
        assert_eq!(hsv_to_rgb(0, 0, 0), [0, 0, 0]);
        // Hue 85 on the 0-255 wheel lands in the green region
        let [r, g, b] = hsv_to_rgb(85, 255, 255);
        assert!(g > r && g > b);
    }

    #[test]
    fn test_layer_icon_buffer_size() {
        for layer in 0..=MAX_LAYER {
            let (h, s, v) = DEFAULT_LAYER_COLORS[layer as usize];
            let rgba = render_layer_icon(layer, hsv_to_rgb(h, s, v));
            assert_eq!(rgba.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
        }
    }

    #[test]
    fn test_layer_icon_paints_digits() {
        // Red background with white "3" on top: some pixels must be white
        let rgba = render_layer_icon(3, [255, 0, 0]);
        let has_text = rgba
            .chunks(4)
            .any(|px| px[0] == 255 && px[1] == 255 && px[2] == 255);
        assert!(has_text);
    }

    #[test]
    fn test_lost_icon_buffer_size() {
        let rgba = render_lost_icon([90, 90, 90]);
        assert_eq!(rgba.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
    }
}
