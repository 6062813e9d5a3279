//! Effect engine: owns the pixel buffer and computes one frame per tick.
//!
//! The engine is driven by the render loop calling [`EffectEngine::draw_frame`]
//! on every iteration. It decides on its own whether enough time has passed
//! since the previous frame (the refresh interval, derived from a travel
//! speed) and, if so, runs the frame routine of the current effect.
//!
//! Effects that only need to be drawn once (solid, pattern, image) use the
//! frame index as a "done" flag, so repeated ticks leave the buffer alone.
//!
//! ## Rust concepts
//! - `enum` dispatch with an exhaustive `match` returning function pointers
//! - Generic structs (`EffectEngine<S: LedSink>`) for testable hardware seams
//! - Wrapping arithmetic for a rolling millisecond counter

use crate::pixel::{LedSink, PixelBuffer};
use crate::{Color, MatrixGeometry, parse_hex_color_or_default};
use std::fmt;

/// Beat color when no parameter is given: a dim blue.
pub const DEFAULT_BEAT_COLOR: Color = Color::new(0, 0, 64);

/// Brightness forced by the image effect to keep current draw low.
pub const IMAGE_BRIGHTNESS: u8 = 16;

/// Brightness at power-on.
pub const DEFAULT_BRIGHTNESS: u8 = 64;

/// LED density used to turn a travel speed into a frame interval.
pub const DEFAULT_PIXELS_PER_METER: f32 = 60.0;

/// Travel speed at power-on, in meters per second.
pub const DEFAULT_TRAVEL_SPEED: f32 = 1.0;

/// Slowest accepted travel speed. Lower (or non-finite) speeds are raised to this.
pub const MIN_TRAVEL_SPEED: f32 = 0.01;

/// Highest hue angle of the rainbow sweep.
const MAX_HUE: usize = 359;

// ── Effect kinds ─────────────────────────────────────────────────────

/// The frame algorithm currently driving the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Power-on effect; draws like [`EffectKind::Beat`].
    Default,
    Beat,
    Rainbow,
    Solid,
    Pattern,
    Image,
    /// Slideshow of stored images; the showcase scheduler does the drawing.
    Showcase,
}

impl EffectKind {
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Default,
        EffectKind::Beat,
        EffectKind::Rainbow,
        EffectKind::Solid,
        EffectKind::Pattern,
        EffectKind::Image,
        EffectKind::Showcase,
    ];

    /// Normalize a name (surrounding whitespace, any casing).
    ///
    /// Unknown or empty names resolve to [`EffectKind::Default`].
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(EffectKind::Default)
    }

    /// Canonical (upper-case) name.
    pub fn as_str(self) -> &'static str {
        match self {
            EffectKind::Default => "DEFAULT",
            EffectKind::Beat => "BEAT",
            EffectKind::Rainbow => "RAINBOW",
            EffectKind::Solid => "SOLID",
            EffectKind::Pattern => "PATTERN",
            EffectKind::Image => "IMAGE",
            EffectKind::Showcase => "SHOWCASE",
        }
    }

    /// Routine table: which function computes a frame for this kind.
    ///
    /// A routine returns `true` when the buffer changed and must be shown.
    fn routine<S: LedSink>(self) -> FrameRoutine<S> {
        match self {
            EffectKind::Default | EffectKind::Beat => EffectEngine::draw_beat,
            EffectKind::Rainbow => EffectEngine::draw_rainbow,
            EffectKind::Solid => EffectEngine::draw_solid,
            EffectKind::Pattern => EffectEngine::draw_pattern,
            EffectKind::Image => EffectEngine::draw_image,
            EffectKind::Showcase => EffectEngine::draw_nothing,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type FrameRoutine<S> = fn(&mut EffectEngine<S>) -> bool;

// ── Named presets ────────────────────────────────────────────────────

const OFF: &str = "000000";

/// Candy cane: red, gap, white, gap.
pub const NORTHPOLE_PATTERN: &str = "FF0000000000000000FFFFFF000000000000";
/// Blue and white, the colors of the Québec flag.
pub const QUEBEC_PATTERN: &str = "0000FF000000000000FFFFFF000000000000";
/// Red and green.
pub const FESTIVE_PATTERN: &str = "FF000000000000000000FF00000000000000";

/// Effect names accepted by the HTTP API.
///
/// Presets are a user-facing layer on top of [`EffectKind`]: several
/// presets share a kind and only differ in their parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectPreset {
    Default,
    Solid,
    Off,
    Beat,
    Rainbow,
    NorthPole,
    Quebec,
    Festive,
    Image,
    Showcase,
}

impl EffectPreset {
    pub const ALL: [EffectPreset; 10] = [
        EffectPreset::Default,
        EffectPreset::Solid,
        EffectPreset::Off,
        EffectPreset::Beat,
        EffectPreset::Rainbow,
        EffectPreset::NorthPole,
        EffectPreset::Quebec,
        EffectPreset::Festive,
        EffectPreset::Image,
        EffectPreset::Showcase,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str().eq_ignore_ascii_case(name))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EffectPreset::Default => "default",
            EffectPreset::Solid => "solid",
            EffectPreset::Off => "off",
            EffectPreset::Beat => "beat",
            EffectPreset::Rainbow => "rainbow",
            EffectPreset::NorthPole => "northpole",
            EffectPreset::Quebec => "quebec",
            EffectPreset::Festive => "festive",
            EffectPreset::Image => "image",
            EffectPreset::Showcase => "showcase",
        }
    }

    /// The engine kind and parameter string this preset stands for.
    ///
    /// `color` is used by the single-color presets, `image` by the image
    /// preset; both are ignored elsewhere.
    pub fn selection(self, color: Option<&str>, image: Option<&str>) -> (EffectKind, String) {
        let color = color.unwrap_or_default().trim().to_string();
        match self {
            EffectPreset::Default => (EffectKind::Default, String::new()),
            EffectPreset::Solid => (EffectKind::Solid, color),
            EffectPreset::Off => (EffectKind::Solid, OFF.to_string()),
            EffectPreset::Beat => (EffectKind::Beat, color),
            EffectPreset::Rainbow => (EffectKind::Rainbow, String::new()),
            EffectPreset::NorthPole => (EffectKind::Pattern, NORTHPOLE_PATTERN.to_string()),
            EffectPreset::Quebec => (EffectKind::Pattern, QUEBEC_PATTERN.to_string()),
            EffectPreset::Festive => (EffectKind::Pattern, FESTIVE_PATTERN.to_string()),
            EffectPreset::Image => (EffectKind::Image, image.unwrap_or_default().to_string()),
            EffectPreset::Showcase => (EffectKind::Showcase, String::new()),
        }
    }
}

impl fmt::Display for EffectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Engine ───────────────────────────────────────────────────────────

/// Mutable per-effect state.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectState {
    pub kind: EffectKind,
    /// Raw parameter string, stored verbatim.
    pub parameters: String,
    /// Beat position, rainbow hue, or 0/1 "drawn" flag for one-shot effects.
    pub frame_index: usize,
    /// Direction of the beat and rainbow ping-pong.
    pub reverse: bool,
    pub brightness: u8,
    pub refresh_interval_ms: u32,
    pub last_frame_ms: u32,
}

/// Computes frames for the current effect into its pixel buffer.
pub struct EffectEngine<S: LedSink> {
    sink: S,
    geometry: MatrixGeometry,
    pixels_per_meter: f32,
    buffer: PixelBuffer,
    state: EffectState,
}

impl<S: LedSink> EffectEngine<S> {
    /// Build an engine for `geometry`, showing the default effect.
    pub fn new(geometry: MatrixGeometry, pixels_per_meter: f32, sink: S) -> Self {
        let mut engine = Self {
            sink,
            geometry,
            pixels_per_meter: if pixels_per_meter > 0.0 {
                pixels_per_meter
            } else {
                DEFAULT_PIXELS_PER_METER
            },
            buffer: PixelBuffer::new(geometry.pixel_count()),
            state: EffectState {
                kind: EffectKind::Default,
                parameters: String::new(),
                frame_index: 0,
                reverse: false,
                brightness: DEFAULT_BRIGHTNESS,
                refresh_interval_ms: 0,
                last_frame_ms: 0,
            },
        };
        engine.set_travel_speed(DEFAULT_TRAVEL_SPEED);
        engine.set_current_effect(EffectKind::Default, "");
        engine
    }

    pub fn state(&self) -> &EffectState {
        &self.state
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn geometry(&self) -> MatrixGeometry {
        self.geometry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Switch to a new effect. The animation restarts and the strip goes dark
    /// until the next frame is drawn.
    pub fn set_current_effect(&mut self, kind: EffectKind, parameters: &str) {
        self.state.kind = kind;
        self.state.parameters = parameters.to_string();
        self.state.frame_index = 0;
        self.state.reverse = false;

        self.buffer.clear();
        self.show();

        tracing::info!("Effect set to {} ({} parameter chars)", kind, parameters.len());
    }

    /// Derive the refresh interval from a travel speed in meters per second.
    ///
    /// Zero, negative and non-finite speeds are raised to [`MIN_TRAVEL_SPEED`].
    /// Returns the interval in milliseconds.
    pub fn set_travel_speed(&mut self, meters_per_second: f32) -> u32 {
        let speed = if meters_per_second.is_finite() && meters_per_second >= MIN_TRAVEL_SPEED {
            meters_per_second
        } else {
            tracing::warn!(
                "Travel speed {} m/s out of range, using {} m/s",
                meters_per_second,
                MIN_TRAVEL_SPEED
            );
            MIN_TRAVEL_SPEED
        };

        self.state.refresh_interval_ms = (1000.0 / (speed * self.pixels_per_meter)) as u32;
        tracing::debug!(
            "Travel speed set to {} m/s, refresh interval {} ms",
            speed,
            self.state.refresh_interval_ms
        );
        self.state.refresh_interval_ms
    }

    /// Travel speed matching the current refresh interval.
    pub fn travel_speed(&self) -> f32 {
        1000.0 / (self.state.refresh_interval_ms.max(1) as f32 * self.pixels_per_meter)
    }

    /// Set global brightness, clamped to 0-255, and push it out immediately.
    pub fn set_brightness(&mut self, level: i32) -> u8 {
        self.state.brightness = level.clamp(0, u8::MAX as i32) as u8;
        self.show();
        tracing::debug!("Brightness set to {}", self.state.brightness);
        self.state.brightness
    }

    /// Scheduler tick. Draws the next frame if the refresh interval has
    /// elapsed since the previous one. Never blocks.
    ///
    /// `now_ms` is a wrapping millisecond counter. Returns whether a frame
    /// routine ran.
    pub fn draw_frame(&mut self, now_ms: u32) -> bool {
        let elapsed = now_ms.wrapping_sub(self.state.last_frame_ms);
        if elapsed < self.state.refresh_interval_ms {
            return false;
        }

        let routine = self.state.kind.routine::<S>();
        if routine(self) {
            self.show();
        }

        self.state.last_frame_ms = now_ms;
        true
    }

    fn show(&mut self) {
        self.sink.show(self.buffer.as_slice(), self.state.brightness);
    }

    // ── Frame routines ───────────────────────────────────────────────

    /// One pixel sweeps 0 → N-1, then back to 0, blanking as it retreats.
    fn draw_beat(&mut self) -> bool {
        let last = match self.buffer.len() {
            0 => return false,
            n => n - 1,
        };
        let index = self.state.frame_index.min(last);

        if !self.state.reverse {
            let color = if self.state.parameters.is_empty() {
                DEFAULT_BEAT_COLOR
            } else {
                parse_hex_color_or_default(&self.state.parameters, Color::BLACK)
            };
            self.buffer.set(index, color);

            if index >= last {
                self.state.reverse = true;
                self.state.frame_index = last;
            } else {
                self.state.frame_index = index + 1;
            }
        } else {
            self.buffer.set(index, Color::BLACK);

            if index == 0 {
                self.state.reverse = false;
                self.state.frame_index = 0;
            } else {
                self.state.frame_index = index - 1;
            }
        }

        true
    }

    /// Every pixel shows the same hue; the hue sweeps 0 ↔ 359.
    fn draw_rainbow(&mut self) -> bool {
        let hue = self.state.frame_index.min(MAX_HUE);
        self.buffer.fill(Color::from_hue(hue as u16));

        if self.state.reverse {
            self.state.frame_index = hue.saturating_sub(1);
            if self.state.frame_index == 0 {
                self.state.reverse = false;
            }
        } else {
            self.state.frame_index = hue + 1;
            if self.state.frame_index >= MAX_HUE {
                self.state.reverse = true;
            }
        }

        true
    }

    fn draw_solid(&mut self) -> bool {
        if self.state.frame_index != 0 {
            return false;
        }

        let color = parse_hex_color_or_default(&self.state.parameters, Color::BLACK);
        self.buffer.fill(color);
        self.state.frame_index = 1;
        true
    }

    fn draw_pattern(&mut self) -> bool {
        if self.state.frame_index != 0 {
            return false;
        }

        let pattern = parse_segments(&self.state.parameters, self.state.parameters.len() / 6);
        if pattern.is_empty() {
            tracing::warn!("Pattern has no complete segment, leaving strip dark");
        } else {
            for index in 0..self.buffer.len() {
                self.buffer.set(index, pattern[index % pattern.len()]);
            }
        }

        self.state.frame_index = 1;
        true
    }

    /// Decode a row-major image and write it through the serpentine mapping.
    fn draw_image(&mut self) -> bool {
        if self.state.frame_index != 0 {
            return false;
        }

        let expected = self.geometry.image_hex_len();
        if self.state.parameters.len() != expected {
            tracing::warn!(
                "Image payload is {} hex chars, expected {}; missing cells stay black",
                self.state.parameters.len(),
                expected
            );
        }

        let cells = parse_segments(&self.state.parameters, self.geometry.pixel_count());
        let width = self.geometry.width as usize;
        for (cell, color) in cells.into_iter().enumerate() {
            let row = (cell / width) as u32;
            let col = (cell % width) as u32;
            self.buffer.set(self.geometry.index(row, col), color);
        }

        // Full-brightness images draw too much current.
        self.state.brightness = IMAGE_BRIGHTNESS;
        self.state.frame_index = 1;
        true
    }

    fn draw_nothing(&mut self) -> bool {
        false
    }
}

/// Split a hex string into `count` six-digit colors.
///
/// Cells past the end of the string, or that are not valid hex, are black.
fn parse_segments(parameters: &str, count: usize) -> Vec<Color> {
    (0..count)
        .map(|i| {
            parameters
                .get(i * 6..i * 6 + 6)
                .map(|hex| parse_hex_color_or_default(hex, Color::BLACK))
                .unwrap_or(Color::BLACK)
        })
        .collect()
}
