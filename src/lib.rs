//! Shared primitives for the LED effect controller.
//!
//! This module provides the pieces every other module builds on:
//! - Matrix geometry (serpentine wiring, linear index mapping)
//! - The `Color` type, hue ramp and brightness scaling
//! - Permissive hex parsing for values that arrive over HTTP
//! - Signal handling and the millisecond clock used by the render loop
//!
//! It also declares the engine, showcase, storage, network and server
//! modules used by the main binary.

pub mod config;
pub mod effect;
pub mod media;
pub mod network;
pub mod pixel;
pub mod render;
pub mod server;
pub mod showcase;

#[cfg(feature = "hardware")]
use rpi_led_matrix::{LedMatrix, LedMatrixOptions, LedRuntimeOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Hard upper bound on the number of addressable pixels.
pub const MAX_PIXELS: usize = 4096;

// ── Matrix geometry ────────────────────────────────────────────────

/// Physical layout of the LED strip or matrix.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable (two u32s and a bool).
/// The geometry is fixed at startup; changing it means building a new
/// pixel buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatrixGeometry {
    pub width: u32,
    pub height: u32,
    /// Alternate rows run in opposite directions (serpentine wiring).
    pub interlaced: bool,
}

impl MatrixGeometry {
    pub fn new(width: u32, height: u32, interlaced: bool) -> Self {
        Self {
            width,
            height,
            interlaced,
        }
    }

    /// Total number of pixels on the strip.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the geometry fits in a pixel buffer.
    pub fn is_within_limit(&self) -> bool {
        self.pixel_count() > 0 && self.pixel_count() <= MAX_PIXELS
    }

    /// Number of hex digits in a full image payload (6 per pixel).
    pub fn image_hex_len(&self) -> usize {
        self.pixel_count() * 6
    }

    /// Map a (row, col) coordinate to a linear strip index.
    ///
    /// Out-of-range coordinates are clamped to the last row/column. When the
    /// matrix is interlaced, even rows (row 0 included) run right to left.
    pub fn index(&self, row: u32, col: u32) -> usize {
        let row = row.min(self.height.saturating_sub(1));
        let col = col.min(self.width.saturating_sub(1));

        let offset = if self.is_reversed_row(row) {
            self.width.saturating_sub(1) - col
        } else {
            col
        };

        row as usize * self.width as usize + offset as usize
    }

    /// Inverse of [`index`](Self::index): where a strip index sits on the panel.
    pub fn position(&self, index: usize) -> (u32, u32) {
        let width = self.width.max(1) as usize;
        let row = (index / width) as u32;
        let offset = (index % width) as u32;

        let col = if self.is_reversed_row(row) {
            self.width.saturating_sub(1).saturating_sub(offset)
        } else {
            offset
        };

        (row, col)
    }

    fn is_reversed_row(&self, row: u32) -> bool {
        self.interlaced && row % 2 == 0
    }
}

impl Default for MatrixGeometry {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            interlaced: true,
        }
    }
}

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the hardware crate.
///
/// This lets us test color logic without `rpi-led-matrix`.
/// At the hardware boundary, we convert via `Into<LedColor>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a color from a packed `0xRRGGBB` value. Upper bits are ignored.
    pub const fn from_rgb_u32(value: u32) -> Self {
        Self {
            r: ((value >> 16) & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: (value & 0xFF) as u8,
        }
    }

    /// Create a color from a hue angle (0-359) on a six-sector linear ramp:
    /// red → yellow → green → cyan → blue → magenta → red.
    ///
    /// Each degree moves the changing channel by 4.25, so a 60° sector
    /// spans the full 0-255 range.
    ///
    /// # Rust concept: match expressions
    /// Rust's `match` is exhaustive — the compiler ensures we handle all cases.
    pub fn from_hue(hue: u16) -> Self {
        let hue = hue % 360;

        match hue / 60 {
            0 => Self::new(255, ramp(hue), 0),        // Red → Yellow
            1 => Self::new(ramp(120 - hue), 255, 0),  // Yellow → Green
            2 => Self::new(0, 255, ramp(hue - 120)),  // Green → Cyan
            3 => Self::new(0, ramp(240 - hue), 255),  // Cyan → Blue
            4 => Self::new(ramp(hue - 240), 0, 255),  // Blue → Magenta
            _ => Self::new(255, 0, ramp(360 - hue)),  // Magenta → Red
        }
    }

    /// Apply global brightness scaling (0-255) to this color.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        if brightness == u8::MAX {
            return self;
        }
        let scale = |c: u8| ((c as u16 * brightness as u16) / 255) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }
}

/// Channel value `degrees` into a 60° sector.
fn ramp(degrees: u16) -> u8 {
    (f32::from(degrees) * 4.25 - 0.01).round().clamp(0.0, 255.0) as u8
}

/// Convert our Color to the hardware crate's LedColor at the boundary.
#[cfg(feature = "hardware")]
impl From<Color> for rpi_led_matrix::LedColor {
    fn from(c: Color) -> Self {
        rpi_led_matrix::LedColor {
            red: c.r,
            green: c.g,
            blue: c.b,
        }
    }
}

// ── Permissive parsing ─────────────────────────────────────────────

/// Parse a `RRGGBB` hex color, falling back to `default` on bad input.
///
/// Only the first six characters are considered and a leading `#` is
/// accepted. Short values are read as a number (`"FF"` is blue). Anything
/// that is not valid hex yields `default`: values arrive from the network
/// and the render loop must keep running whatever they contain.
pub fn parse_hex_color_or_default(text: &str, default: Color) -> Color {
    let digits = text.trim().trim_start_matches('#');
    let digits = digits.get(..6).unwrap_or(digits);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return default;
    }

    u32::from_str_radix(digits, 16)
        .map(Color::from_rgb_u32)
        .unwrap_or(default)
}

/// Parse a short hex number such as a brightness level (`"FF"` → 255).
///
/// Malformed input yields `default`.
pub fn parse_hex_level_or_default(text: &str, default: i32) -> i32 {
    let digits = text.trim();
    if digits.is_empty() || digits.len() > 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return default;
    }
    i32::from_str_radix(digits, 16).unwrap_or(default)
}

// ── Clock ──────────────────────────────────────────────────────────

/// Milliseconds elapsed since `boot`, as a wrapping 32-bit counter.
///
/// The counter rolls over after ~49 days; callers compare timestamps
/// with `wrapping_sub`.
pub fn millis_since(boot: Instant) -> u32 {
    boot.elapsed().as_millis() as u32
}

// ── Matrix initialization ──────────────────────────────────────────

/// Create a matrix configured for our hardware:
/// Pi Zero 2 W + Adafruit Bonnet, sized to the strip geometry.
///
/// # Rust concept: Result and the ? operator
/// Matrix initialization can fail (not running as root, GPIO unavailable),
/// so the caller gets a `Result` and decides what to do.
#[cfg(feature = "hardware")]
pub fn create_matrix(geometry: MatrixGeometry) -> Result<LedMatrix, Box<dyn std::error::Error>> {
    let mut options = LedMatrixOptions::new();
    options.set_rows(geometry.height);
    options.set_cols(geometry.width);
    options.set_hardware_mapping("adafruit-hat");

    options.set_pwm_bits(8)?;
    options.set_pwm_lsb_nanoseconds(130);

    let mut rt_options = LedRuntimeOptions::new();
    rt_options.set_gpio_slowdown(2); // Pi Zero 2 W requires slowdown=2

    let matrix = LedMatrix::new(Some(options), Some(rt_options))?;

    Ok(matrix)
}

/// Install a Ctrl+C handler that clears `running`.
///
/// # Rust concept: Arc and AtomicBool
/// The flag is shared between the render thread, the HTTP server's
/// shutdown future and the signal handler. `AtomicBool` needs no mutex.
pub fn setup_signal_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
}

/// Check if the main loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────
