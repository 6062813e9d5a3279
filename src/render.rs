//! Render thread: owns the effect engine and runs the cooperative main loop.
//!
//! Everything that touches the pixel buffer lives in one [`Renderer`] owned
//! by a single thread. The async HTTP server talks to it by sending
//! [`RenderCommand`] values through an `mpsc` channel and reads back a
//! [`DisplayStatus`] snapshot the renderer publishes.
//!
//! Each loop iteration, in order:
//! 1. applies pending commands from the HTTP handlers,
//! 2. ticks the network link supervisor,
//! 3. ticks the showcase scheduler,
//! 4. asks the engine to draw a frame if one is due.
//!
//! ## Rust concepts
//! - `std::sync::mpsc` channels for thread communication
//! - `enum` with data variants (tagged unions)
//! - `Arc<Mutex<T>>` for shared status
//! - `ControlFlow` to tell the loop to stop

use crate::effect::{DEFAULT_BRIGHTNESS, DEFAULT_TRAVEL_SPEED, EffectEngine, EffectKind, EffectPreset};
use crate::media::ImageStore;
use crate::network::{LinkSupervisor, NetworkLink};
use crate::pixel::LedSink;
use crate::showcase::Showcase;
use crate::{is_running, millis_since};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Longest the loop waits for a command before ticking again.
const LOOP_IDLE: Duration = Duration::from_millis(1);

// ── Commands ─────────────────────────────────────────────────────────

/// Commands sent from the HTTP server to the render thread.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    /// Switch effect. `image` carries the payload for the image preset.
    SetEffect {
        preset: EffectPreset,
        color: Option<String>,
        image: Option<String>,
    },
    /// Global brightness; clamped to 0-255 by the engine.
    SetBrightness(i32),
    /// Travel speed in meters per second.
    SetTravelSpeed(f32),
    /// Blank the strip and stop the render loop.
    Restart,
}

// ── Status ───────────────────────────────────────────────────────────

/// Device details reported by `/api/info`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct DeviceInfo {
    pub hostname: String,
    pub ip: String,
    pub ssid: String,
    pub mac: String,
    /// Signal strength in dBm.
    pub rssi: i32,
    /// Firmware version.
    pub version: String,
}

/// Snapshot the render thread publishes for the HTTP handlers.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayStatus {
    /// Name of the preset last requested.
    pub effect: String,
    pub brightness: u8,
    pub showcase: bool,
    pub travel_speed: f32,
    pub info: DeviceInfo,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self {
            effect: EffectPreset::Default.as_str().to_string(),
            brightness: DEFAULT_BRIGHTNESS,
            showcase: false,
            travel_speed: DEFAULT_TRAVEL_SPEED,
            info: DeviceInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..DeviceInfo::default()
            },
        }
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock the shared status. A poisoned lock still holds a usable snapshot.
pub fn lock_status(status: &Mutex<DisplayStatus>) -> MutexGuard<'_, DisplayStatus> {
    status.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Renderer ─────────────────────────────────────────────────────────

/// All rendering state, owned by the render thread.
pub struct Renderer<S: LedSink, L: NetworkLink> {
    engine: EffectEngine<S>,
    showcase: Showcase,
    store: ImageStore,
    link: LinkSupervisor<L>,
    status: Arc<Mutex<DisplayStatus>>,
    effect: EffectPreset,
    reported_brightness: u8,
}

impl<S: LedSink, L: NetworkLink> Renderer<S, L> {
    pub fn new(
        engine: EffectEngine<S>,
        showcase: Showcase,
        store: ImageStore,
        link: LinkSupervisor<L>,
        status: Arc<Mutex<DisplayStatus>>,
    ) -> Self {
        let reported_brightness = engine.state().brightness;
        Self {
            engine,
            showcase,
            store,
            link,
            status,
            effect: EffectPreset::Default,
            reported_brightness,
        }
    }

    pub fn engine(&self) -> &EffectEngine<S> {
        &self.engine
    }

    pub fn showcase(&self) -> &Showcase {
        &self.showcase
    }

    /// Start associating the network link and publish the initial status.
    pub fn start(&mut self, now_ms: u32) {
        self.link.start(now_ms);
        self.publish();
    }

    /// Apply one command. Returns `Break` when the loop must stop.
    pub fn apply(&mut self, command: RenderCommand) -> ControlFlow<()> {
        match command {
            RenderCommand::SetEffect {
                preset,
                color,
                image,
            } => {
                if preset == EffectPreset::Showcase {
                    self.showcase.enable();
                } else {
                    self.showcase.disable();
                }

                let (kind, parameters) = preset.selection(color.as_deref(), image.as_deref());
                self.engine.set_current_effect(kind, &parameters);
                self.effect = preset;
            }
            RenderCommand::SetBrightness(level) => {
                self.engine.set_brightness(level);
            }
            RenderCommand::SetTravelSpeed(speed) => {
                self.engine.set_travel_speed(speed);
            }
            RenderCommand::Restart => {
                tracing::info!("Restart requested, blanking strip");
                self.showcase.disable();
                self.engine.set_current_effect(EffectKind::Solid, "000000");
                return ControlFlow::Break(());
            }
        }

        self.publish();
        ControlFlow::Continue(())
    }

    /// Everything after command handling in one loop iteration.
    pub fn tick(&mut self, now_ms: u32) {
        let link_changed = self.link.tick(now_ms).is_some();
        self.showcase.tick(now_ms, &self.store, &mut self.engine);
        self.engine.draw_frame(now_ms);

        // The image effect lowers brightness on its own.
        if link_changed || self.engine.state().brightness != self.reported_brightness {
            self.publish();
        }
    }

    fn publish(&mut self) {
        let link = self.link.link().info();
        self.reported_brightness = self.engine.state().brightness;

        let mut status = lock_status(&self.status);
        status.effect = self.effect.as_str().to_string();
        status.brightness = self.reported_brightness;
        status.showcase = self.showcase.is_enabled();
        status.travel_speed = self.engine.travel_speed();
        status.info.hostname = self.link.hostname().to_string();
        status.info.ip = link.ip;
        status.info.ssid = link.ssid;
        status.info.mac = link.mac;
        status.info.rssi = link.rssi;
    }
}

// ── Render loop ──────────────────────────────────────────────────────

/// Main render loop — runs on a dedicated thread, owns the renderer.
///
/// Returns when `running` is cleared (Ctrl+C), when a `Restart` command
/// arrives, or when every sender is dropped. On the way out it clears
/// `running` so the HTTP server shuts down too.
///
/// ## Pending command pattern
/// Between iterations the loop waits up to [`LOOP_IDLE`] for a command.
/// Anything received is parked in `pending_cmd` and applied at the start of
/// the next iteration, before any other queued command.
pub fn render_loop<S: LedSink, L: NetworkLink>(
    rx: Receiver<RenderCommand>,
    mut renderer: Renderer<S, L>,
    running: Arc<AtomicBool>,
) {
    let boot = Instant::now();
    let mut pending_cmd: Option<RenderCommand> = None;

    renderer.start(millis_since(boot));
    tracing::info!("Render thread started");

    'render: while is_running(&running) {
        let now = millis_since(boot);

        loop {
            let cmd = match pending_cmd.take() {
                Some(cmd) => cmd,
                None => match rx.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::info!("Render thread: channel closed, shutting down.");
                        break 'render;
                    }
                },
            };

            if renderer.apply(cmd).is_break() {
                break 'render;
            }
        }

        renderer.tick(now);

        match rx.recv_timeout(LOOP_IDLE) {
            Ok(cmd) => pending_cmd = Some(cmd),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Render thread: channel closed, shutting down.");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::info!("Render thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatrixGeometry;
    use crate::config::WifiConfig;
    use crate::network::HostLink;
    use crate::pixel::tests::RecordingSink;
    use pretty_assertions::assert_eq;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::mpsc;
    use tempfile::TempDir;

    fn renderer(tmp: &TempDir) -> (Renderer<RecordingSink, HostLink>, Arc<Mutex<DisplayStatus>>) {
        let status = Arc::new(Mutex::new(DisplayStatus::new()));
        let engine = EffectEngine::new(
            MatrixGeometry::new(2, 2, true),
            60.0,
            RecordingSink::default(),
        );
        let link = LinkSupervisor::new(
            HostLink::new(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            WifiConfig::default(),
        );
        let renderer = Renderer::new(
            engine,
            Showcase::new(100),
            ImageStore::new(tmp.path(), 0),
            link,
            status.clone(),
        );
        (renderer, status)
    }

    fn set_effect(preset: EffectPreset) -> RenderCommand {
        RenderCommand::SetEffect {
            preset,
            color: None,
            image: None,
        }
    }

    #[test]
    fn showcase_request_enables_and_others_disable() {
        let tmp = TempDir::new().unwrap();
        let (mut renderer, status) = renderer(&tmp);

        let _ = renderer.apply(set_effect(EffectPreset::Showcase));
        assert!(renderer.showcase().is_enabled());
        assert!(lock_status(&status).showcase);
        assert_eq!(lock_status(&status).effect, "showcase");

        let _ = renderer.apply(set_effect(EffectPreset::Rainbow));
        assert!(!renderer.showcase().is_enabled());
        assert_eq!(renderer.engine().state().kind, EffectKind::Rainbow);
        assert_eq!(lock_status(&status).effect, "rainbow");
    }

    #[test]
    fn preset_color_reaches_engine() {
        let tmp = TempDir::new().unwrap();
        let (mut renderer, _status) = renderer(&tmp);

        let _ = renderer.apply(RenderCommand::SetEffect {
            preset: EffectPreset::Solid,
            color: Some("123456".to_string()),
            image: None,
        });
        assert_eq!(renderer.engine().state().kind, EffectKind::Solid);
        assert_eq!(renderer.engine().state().parameters, "123456");
    }

    #[test]
    fn brightness_is_published() {
        let tmp = TempDir::new().unwrap();
        let (mut renderer, status) = renderer(&tmp);
        let _ = renderer.apply(RenderCommand::SetBrightness(400));
        assert_eq!(lock_status(&status).brightness, 255);
    }

    #[test]
    fn showcase_tick_draws_stored_image_and_reports_brightness() {
        let tmp = TempDir::new().unwrap();
        let (mut renderer, status) = renderer(&tmp);
        ImageStore::new(tmp.path(), 0)
            .write_image("square", &"00FF00".repeat(4))
            .unwrap();

        let _ = renderer.apply(set_effect(EffectPreset::Showcase));
        renderer.tick(1000);

        assert_eq!(renderer.engine().state().kind, EffectKind::Image);
        assert!(renderer
            .engine()
            .buffer()
            .as_slice()
            .iter()
            .all(|c| *c == crate::Color::new(0, 255, 0)));
        assert_eq!(lock_status(&status).brightness, crate::effect::IMAGE_BRIGHTNESS);
        assert_eq!(lock_status(&status).effect, "showcase");
    }

    #[test]
    fn start_publishes_device_info() {
        let tmp = TempDir::new().unwrap();
        let (mut renderer, status) = renderer(&tmp);
        renderer.start(0);

        let info = lock_status(&status).info.clone();
        assert_eq!(info.hostname, "led-driver");
        assert_eq!(info.ip, "127.0.0.1");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn restart_stops_loop_and_clears_running() {
        let tmp = TempDir::new().unwrap();
        let (renderer, status) = renderer(&tmp);
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();

        tx.send(set_effect(EffectPreset::Festive)).unwrap();
        tx.send(RenderCommand::Restart).unwrap();

        let loop_running = running.clone();
        std::thread::spawn(move || render_loop(rx, renderer, loop_running))
            .join()
            .unwrap();

        assert!(!is_running(&running));
        assert_eq!(lock_status(&status).effect, "festive");
    }

    #[test]
    fn dropped_sender_stops_loop() {
        let tmp = TempDir::new().unwrap();
        let (renderer, _status) = renderer(&tmp);
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel::<RenderCommand>();
        drop(tx);

        render_loop(rx, renderer, running.clone());
        assert!(!is_running(&running));
    }
}
