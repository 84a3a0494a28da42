//! Animatron - Face-Tracking Animatronic Head Controller
//!
//! Main entry point for the CLI application.

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use animatron::{
    config::Config,
    head::HeadController,
    servo::{DryRunDriver, ServoDriver, UdpServoDriver},
    vision::{
        subprocess::{check_mediapipe_available, BridgeSubprocess, RestartGate},
        FrameReceiver,
    },
};

/// Animatron - Face-Tracking Animatronic Head Controller
#[derive(Parser, Debug)]
#[command(name = "animatron", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log servo angles instead of sending them to the bridge
    #[arg(long)]
    dry_run: bool,

    /// Disable the blink animator
    #[arg(long)]
    no_blink: bool,

    /// Observation UDP port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Camera device index (overrides config)
    #[arg(long)]
    camera: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", animatron::NAME, animatron::VERSION);

    // Load configuration
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    // Apply CLI overrides
    if args.dry_run {
        config.servo.dry_run = true;
    }
    if args.no_blink {
        config.blink.enabled = false;
    }
    if let Some(port) = args.port {
        config.vision.port = port;
    }
    if let Some(camera) = args.camera {
        config.vision.camera_device = camera;
    }

    // Validate configuration (ranges, gains, channel ownership)
    config.validate()?;

    info!("Camera device: {}", config.vision.camera_device);
    info!("Observation port: {}", config.vision.port);
    info!(
        "Servo bridge: {}:{} (dry_run: {})",
        config.servo.host, config.servo.port, config.servo.dry_run
    );
    info!("Blink: {}", config.blink.enabled);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config))?;

    info!("Animatron stopped");
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    // Optionally launch the detector bridge
    let mut subprocess = if config.vision.auto_launch {
        if !check_mediapipe_available() {
            warn!("mediapipe Python package not found; the bridge will likely fail to start");
        }
        let mut sp = BridgeSubprocess::new(&config.vision);
        if let Err(e) = sp.start() {
            error!("Failed to auto-launch detector bridge: {}", e);
            // Continue anyway — the user may run it externally
        }
        // Give the bridge a moment to open the camera
        tokio::time::sleep(Duration::from_secs(2)).await;
        Some(sp)
    } else {
        None
    };

    // Bind failure here is fatal; without observations there is nothing to do
    let mut receiver = FrameReceiver::new(&config.vision);
    receiver.start()?;

    let driver: Box<dyn ServoDriver> = if config.servo.dry_run {
        Box::new(DryRunDriver)
    } else {
        Box::new(UdpServoDriver::new(&config.servo.host, config.servo.port)?)
    };

    let started = Instant::now();
    let now_ms = |started: Instant| started.elapsed().as_secs_f64() * 1000.0;

    let mut head = HeadController::new(&config, driver, 0.0, StdRng::from_entropy());
    head.center_all();
    info!("head centered, tracking started");

    let mut last_tick_ms = 0.0_f64;
    let mut frame_w = config.vision.capture_width as f32;
    let mut frame_h = config.vision.capture_height as f32;
    let mut frames: u32 = 0;
    let mut fps_window_start = 0.0_f64;

    let mut poll_interval = tokio::time::interval(Duration::from_millis(5));
    poll_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut restart_gate = RestartGate::new(config.vision.restart_delay_secs);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                let now = now_ms(started);

                let frame = match receiver.poll(now) {
                    Ok(f) => f,
                    Err(e) => break Err(e.into()),
                };

                // The control loop advances once per camera frame, exactly as
                // fast as observations arrive. A frame with no detections is
                // still a tick: that is what drives the loss state machine.
                if let Some(frame) = frame {
                    frame_w = frame.frame_width as f32;
                    frame_h = frame.frame_height as f32;
                    let face = frame.primary_face(config.vision.min_confidence);

                    let dt = ((now - last_tick_ms) / 1000.0) as f32;
                    last_tick_ms = now;
                    head.tick(face, frame_w, frame_h, dt.min(0.25), now);

                    frames += 1;
                    if frames % 150 == 0 {
                        let fps = 150_000.0 / (now - fps_window_start);
                        tracing::debug!("observation rate: {:.1} fps", fps);
                        fps_window_start = now;
                    }
                }

                if let Err(e) = receiver.check_silence(now, 0.0) {
                    break Err(e.into());
                }

                // Check subprocess health; the gate holds the restart delay
                // without blocking this loop, so shutdown and the silence
                // watchdog stay live while a restart is pending.
                if let Some(ref mut sp) = subprocess {
                    if config.vision.auto_restart
                        && restart_gate.poll(sp.is_running(), Instant::now())
                    {
                        info!("restarting detector bridge");
                        if let Err(e) = sp.start() {
                            error!("Failed to restart detector bridge: {}", e);
                        }
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break Ok(());
            }
        }
    };

    // Best-effort safety: bring every joint back to rest and give the bridge
    // time to act on the final datagrams before the process exits.
    head.center_all();
    tokio::time::sleep(Duration::from_millis(250)).await;

    receiver.stop();
    if let Some(ref mut sp) = subprocess {
        sp.stop().await;
    }

    result
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
