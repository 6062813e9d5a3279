//! LED effect controller
//!
//! Drives an addressable LED matrix or strip and serves a small HTTP API on
//! the LAN to pick effects, upload pixel-art images and edit the device
//! configuration.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the LEDs, the effect engine, the
//!   showcase scheduler and the network link supervisor
//! - **HTTP server** (tokio/axum): accepts API requests, sends commands via channel
//!
//! Both halves share a `running` flag. Ctrl+C clears it, and so does the
//! render thread when it stops after `/api/reboot`; the server then shuts
//! down gracefully and the process exits for the service manager to restart.
//!
//! ## Rust concepts
//! - `#[tokio::main]` async entry point
//! - `std::thread::spawn` for the render thread
//! - `std::sync::mpsc` channel between async and sync worlds
//! - `#[cfg(feature = ...)]` to pick the LED sink at compile time
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/led-effects-rs --data-dir /var/lib/leds --port 8080
//! ```

use clap::Parser;
use led_effects_rs::config::ConfigStore;
use led_effects_rs::effect::{DEFAULT_PIXELS_PER_METER, DEFAULT_TRAVEL_SPEED, EffectEngine, EffectPreset};
use led_effects_rs::media::ImageStore;
use led_effects_rs::network::{HostLink, LinkSupervisor};
use led_effects_rs::render::{DisplayStatus, RenderCommand, Renderer, render_loop};
use led_effects_rs::server::{self, AppState};
use led_effects_rs::showcase::{DEFAULT_DWELL_MS, Showcase};
use led_effects_rs::{MatrixGeometry, is_running, setup_signal_handler};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// LED effect controller
#[derive(Parser)]
#[command(name = "led-effects-rs")]
#[command(about = "Effect engine and HTTP API for addressable LEDs")]
#[command(version)]
struct Args {
    /// Directory holding config.json and the images/ subdirectory
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(long, default_value = "80")]
    port: u16,

    /// Number of columns
    #[arg(long, default_value = "16")]
    width: u32,

    /// Number of rows (1 for a plain strip)
    #[arg(long, default_value = "16")]
    height: u32,

    /// Serpentine wiring: every other row runs right to left
    #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
    interlaced: bool,

    /// LED density used to turn travel speed into a frame interval
    #[arg(long, default_value_t = DEFAULT_PIXELS_PER_METER)]
    pixels_per_meter: f32,

    /// Initial travel speed in meters per second
    #[arg(long, default_value_t = DEFAULT_TRAVEL_SPEED)]
    travel_speed: f32,

    /// Time each image stays up in showcase mode
    #[arg(long, default_value_t = DEFAULT_DWELL_MS)]
    showcase_dwell_ms: u32,

    /// Storage budget reported by /api/storage
    #[arg(long, default_value = "1048576")]
    storage_bytes: u64,
}

#[cfg(feature = "hardware")]
fn open_sink(
    geometry: MatrixGeometry,
) -> Result<led_effects_rs::pixel::MatrixSink, Box<dyn std::error::Error>> {
    led_effects_rs::pixel::MatrixSink::new(geometry)
}

#[cfg(not(feature = "hardware"))]
fn open_sink(
    _geometry: MatrixGeometry,
) -> Result<led_effects_rs::pixel::HeadlessSink, Box<dyn std::error::Error>> {
    tracing::warn!("Built without the 'hardware' feature, frames are only logged");
    Ok(led_effects_rs::pixel::HeadlessSink::new())
}

/// Resolves once `running` has been cleared.
async fn wait_for_stop(running: Arc<AtomicBool>) {
    while is_running(&running) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let args = Args::parse();

    let geometry = MatrixGeometry::new(args.width, args.height, args.interlaced);
    if !geometry.is_within_limit() {
        return Err(format!(
            "{}x{} is {} pixels, the limit is {}",
            args.width,
            args.height,
            geometry.pixel_count(),
            led_effects_rs::MAX_PIXELS
        )
        .into());
    }

    std::fs::create_dir_all(&args.data_dir)?;
    let data_dir = args.data_dir.canonicalize().unwrap_or_else(|_| {
        tracing::warn!("Could not canonicalize data dir, using as-is");
        args.data_dir.clone()
    });

    let config_store = ConfigStore::new(&data_dir);
    let config = config_store.load().unwrap_or_else(|e| {
        tracing::warn!("Could not load {}: {}, using defaults", config_store.path().display(), e);
        Default::default()
    });

    tracing::info!("LED effect controller v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Matrix: {}x{} ({}), {} px/m",
        geometry.width,
        geometry.height,
        if geometry.interlaced { "serpentine" } else { "progressive" },
        args.pixels_per_meter
    );
    tracing::info!("Data dir: {}", data_dir.display());

    let running = Arc::new(AtomicBool::new(true));
    setup_signal_handler(running.clone())?;

    let addr = std::net::SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Create the channel for sending commands to the render thread.
    let (tx, rx) = mpsc::channel();

    let boot_effect = EffectPreset::parse(&config.effect.default).unwrap_or_else(|| {
        tracing::warn!("Unknown boot effect {:?}, using default", config.effect.default);
        EffectPreset::Default
    });
    tx.send(RenderCommand::SetEffect {
        preset: boot_effect,
        color: None,
        image: None,
    })?;

    // Shared display status — render thread writes, HTTP handlers read.
    let status = Arc::new(Mutex::new(DisplayStatus::new()));
    let images = ImageStore::new(&data_dir, args.storage_bytes);

    // Spawn the render thread. The sink is opened on that thread because the
    // matrix handle cannot move between threads.
    let render_handle = {
        let images = images.clone();
        let status = status.clone();
        let running = running.clone();
        let link = LinkSupervisor::new(HostLink::new(args.host), config.wifi.clone());
        let (ppm, speed, dwell) = (args.pixels_per_meter, args.travel_speed, args.showcase_dwell_ms);

        std::thread::spawn(move || {
            let sink = match open_sink(geometry) {
                Ok(sink) => sink,
                Err(e) => {
                    tracing::error!("Failed to open LED output: {}", e);
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let mut engine = EffectEngine::new(geometry, ppm, sink);
            engine.set_travel_speed(speed);
            let renderer = Renderer::new(engine, Showcase::new(dwell), images, link, status);
            render_loop(rx, renderer, running);
        })
    };

    let app = server::create_router(AppState {
        command_tx: tx,
        status,
        images,
        config: config_store,
        geometry,
    });

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_stop(running.clone()))
        .await;

    running.store(false, Ordering::SeqCst);
    if render_handle.join().is_err() {
        tracing::error!("Render thread panicked");
    }
    tracing::info!("Shut down");

    served?;
    Ok(())
}
