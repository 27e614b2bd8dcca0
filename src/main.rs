use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration};

use trip_odometer::feed::{self, DemoRoute, LocationEvent};
use trip_odometer::{
    Clock, Coordinate, Engine, EngineConfig, EngineEvent, FileStore, SampleOutcome, SystemClock,
    Units,
};

#[derive(Parser, Debug)]
#[command(name = "trip_odometer")]
#[command(about = "GPS trip odometer - distance and movement mode from a location feed", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until the feed ends or Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// Feed log to play back in real time (.json, .jsonl, .gz). Reads JSON lines from stdin when omitted.
    #[arg(long, conflicts_with = "demo")]
    feed: Option<PathBuf>,

    /// Simulate a ride instead of reading a feed
    #[arg(long)]
    demo: bool,

    /// Demo ride length in meters
    #[arg(long, default_value = "5000")]
    demo_length_m: f64,

    /// Demo ride speed in km/h
    #[arg(long, default_value = "18")]
    demo_speed_kmh: f64,

    /// Engine configuration (JSON, partial allowed)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the persisted trip snapshot
    #[arg(long, default_value = "trip_odometer_state")]
    state_dir: PathBuf,

    /// Override the configured trip length (km)
    #[arg(long)]
    total_distance: Option<f64>,

    /// Display distances in miles
    #[arg(long)]
    imperial: bool,

    /// Write the status snapshot here every few seconds
    #[arg(long)]
    status_file: Option<PathBuf>,
}

const DEMO_ORIGIN: Coordinate = Coordinate {
    lat: 52.520008,
    lon: 13.404954,
};

/// Play a recorded log with its original pacing, restamped to wall-clock time
async fn replay_loop(path: PathBuf, tx: mpsc::Sender<LocationEvent>) -> Result<()> {
    let events = feed::load_event_log(&path)?;
    log::info!("Playing {} events from {}", events.len(), path.display());
    send_paced(events, tx).await;
    Ok(())
}

async fn demo_loop(route: DemoRoute, tx: mpsc::Sender<LocationEvent>) {
    log::info!(
        "Demo ride: {:.0} m at {:.0} km/h from {}",
        route.length_m(),
        route.speed_kmh,
        route.waypoints.first().copied().unwrap_or(DEMO_ORIGIN)
    );
    send_paced(route.events(0), tx).await;
}

async fn send_paced(events: Vec<LocationEvent>, tx: mpsc::Sender<LocationEvent>) {
    let first_ms = events.first().map(|e| e.timestamp_ms).unwrap_or(0);
    let start_ms = SystemClock.now_ms();

    for mut event in events {
        let offset_ms = event.timestamp_ms - first_ms;
        let wait_ms = start_ms + offset_ms - SystemClock.now_ms();
        if wait_ms > 0 {
            sleep(Duration::from_millis(wait_ms as u64)).await;
        }
        event.timestamp_ms = start_ms + offset_ms;
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

async fn stdin_loop(tx: mpsc::Sender<LocationEvent>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match feed::parse_event_line(&line) {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Skipping malformed feed line {}: {}", line_no, e),
        }
    }
    Ok(())
}

async fn run_for(duration: u64) {
    if duration == 0 {
        std::future::pending::<()>().await;
    } else {
        sleep(Duration::from_secs(duration)).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config.as_ref() {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(km) = args.total_distance {
        config.configured_total_distance_km = km;
    }

    log::info!("[{}] Trip odometer starting", ts_now());
    log::info!("  State dir: {}", args.state_dir.display());
    log::info!("  Trip length: {:.1} km", config.configured_total_distance_km);

    let store = FileStore::new(&args.state_dir)?;
    let mut engine = Engine::open(config.clone(), store, SystemClock)?;

    // Flags win over whatever the stored snapshot says
    if let Some(km) = args.total_distance {
        engine.set_total_distance(km)?;
    }
    if args.imperial {
        engine.set_units(Units::Imperial);
    }

    engine.subscribe(|event| match event {
        EngineEvent::DistanceChanged { .. } => {}
        EngineEvent::StateReset { today_only } => {
            log::info!("State reset ({})", if *today_only { "today" } else { "trip" })
        }
        other => log::debug!("Event: {:?}", other),
    });

    let (tx, mut rx) = mpsc::channel::<LocationEvent>(100);

    // Hold the handle so the feed task lives as long as the loop
    let _feed_handle = if args.demo {
        let origin = config.start_location.unwrap_or(DEMO_ORIGIN);
        let mut route = DemoRoute::straight(origin, 90.0, args.demo_length_m, args.demo_speed_kmh);
        route.jitter_m = 2.0;
        tokio::spawn(async move {
            demo_loop(route, tx).await;
        })
    } else if let Some(path) = args.feed.clone() {
        tokio::spawn(async move {
            if let Err(e) = replay_loop(path, tx).await {
                log::error!("Feed log failed: {}", e);
            }
        })
    } else {
        tokio::spawn(async move {
            if let Err(e) = stdin_loop(tx).await {
                log::error!("Reading stdin failed: {}", e);
            }
        })
    };

    let mut timers = interval(Duration::from_millis(250));
    let mut status_updates = interval(Duration::from_secs(2));
    let deadline = run_for(args.duration);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline);
    tokio::pin!(ctrl_c);

    log::info!("[{}] Waiting for location fixes...", ts_now());

    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => {
                    let outcome = engine.on_location_sample(&event);
                    if let SampleOutcome::Credited { distance_km } = outcome {
                        log::debug!("+{:.1} m", distance_km * 1000.0);
                    }
                }
                None => {
                    log::info!("[{}] Feed ended, stopping...", ts_now());
                    break;
                }
            },
            _ = timers.tick() => engine.tick(),
            _ = status_updates.tick() => {
                let status = engine.status();
                log::info!("{} | {}", status.summary(), engine.health().format_status(SystemClock.now_ms()));
                if let Some(path) = args.status_file.as_ref() {
                    status.save_or_warn(path);
                }
            }
            _ = &mut deadline => {
                log::info!("[{}] Duration reached, stopping...", ts_now());
                break;
            }
            _ = &mut ctrl_c => {
                log::info!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
        }
    }

    engine.tick();
    engine.flush();

    let status = engine.status();
    if let Some(path) = args.status_file.as_ref() {
        status.save_or_warn(path);
    }
    log::info!("[{}] Final: {}", ts_now(), status.summary());
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
