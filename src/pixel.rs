//! Pixel buffer and the sinks that push it to hardware.
//!
//! The effect engine owns exactly one [`PixelBuffer`]. Whenever a frame is
//! ready it lends a read-only slice to an [`LedSink`], which is the only
//! place global brightness is applied.
//!
//! ## Rust concepts
//! - Traits as a seam between pure logic and hardware
//! - Slices (`&[Color]`) for borrowing without copying
//! - `#[cfg(feature = ...)]` for hardware-only code

#[cfg(feature = "hardware")]
use crate::MatrixGeometry;
use crate::{Color, MAX_PIXELS};

// ── Pixel buffer ─────────────────────────────────────────────────────

/// Flat, linearly addressed array of RGB values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: Vec<Color>,
}

impl PixelBuffer {
    /// Create an all-black buffer. The length is capped at [`MAX_PIXELS`].
    pub fn new(len: usize) -> Self {
        Self {
            pixels: vec![Color::BLACK; len.min(MAX_PIXELS)],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        self.pixels.get(index).copied()
    }

    /// Write one pixel. Indices past the end are ignored.
    pub fn set(&mut self, index: usize, color: Color) {
        if let Some(pixel) = self.pixels.get_mut(index) {
            *pixel = color;
        }
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(Color::BLACK);
    }

    pub fn as_slice(&self) -> &[Color] {
        &self.pixels
    }
}

// ── Sinks ────────────────────────────────────────────────────────────

/// Device driver: transmits a frame to the physical strip.
///
/// `brightness` is the global 0-255 level; sinks scale every pixel by it
/// on the way out so the buffer itself always holds full-intensity colors.
pub trait LedSink {
    fn show(&mut self, pixels: &[Color], brightness: u8);
}

/// Sink used when no LED hardware is attached. Counts frames and traces them.
#[derive(Debug, Default)]
pub struct HeadlessSink {
    frames: u64,
}

impl HeadlessSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl LedSink for HeadlessSink {
    fn show(&mut self, pixels: &[Color], brightness: u8) {
        self.frames += 1;
        let lit = pixels.iter().filter(|c| **c != Color::BLACK).count();
        tracing::trace!(
            "frame {}: {} of {} pixels lit, brightness {}",
            self.frames,
            lit,
            pixels.len(),
            brightness
        );
    }
}

/// Sink that drives an RGB matrix panel through `rpi-led-matrix`.
///
/// The strip is linear; each index is placed on the panel at
/// [`MatrixGeometry::position`] so serpentine wiring shows up the way it
/// would on a real WS2812 matrix.
#[cfg(feature = "hardware")]
pub struct MatrixSink {
    matrix: rpi_led_matrix::LedMatrix,
    canvas: Option<rpi_led_matrix::LedCanvas>,
    geometry: MatrixGeometry,
}

#[cfg(feature = "hardware")]
impl MatrixSink {
    /// Initialize the matrix. Must be called on the thread that will draw.
    pub fn new(geometry: MatrixGeometry) -> Result<Self, Box<dyn std::error::Error>> {
        let matrix = crate::create_matrix(geometry)?;
        let canvas = Some(matrix.offscreen_canvas());
        Ok(Self {
            matrix,
            canvas,
            geometry,
        })
    }
}

#[cfg(feature = "hardware")]
impl LedSink for MatrixSink {
    fn show(&mut self, pixels: &[Color], brightness: u8) {
        let Some(mut canvas) = self.canvas.take() else {
            return;
        };

        canvas.clear();
        for (index, color) in pixels.iter().enumerate() {
            let (row, col) = self.geometry.position(index);
            canvas.set(col as i32, row as i32, &color.apply_brightness(brightness).into());
        }

        self.canvas = Some(self.matrix.swap(canvas));
    }
}
