use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;
use serde_json::json;
use trip_odometer::feed::{self, LocationEvent};
use trip_odometer::{
    Engine, EngineConfig, EngineEvent, ManualClock, MemoryStore, Rejection, SampleOutcome,
};

#[derive(Parser, Debug)]
struct Args {
    /// Path to a feed log (.json array, .jsonl, optionally .gz)
    #[arg(long, conflicts_with = "log_dir")]
    log: Option<PathBuf>,

    /// Directory of feed logs to batch replay
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Engine configuration (JSON, partial allowed)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the stationary/walking boundary (km/h)
    #[arg(long)]
    stationary_max_kmh: Option<f64>,

    /// Override the walking/cycling boundary (km/h)
    #[arg(long)]
    walking_max_kmh: Option<f64>,

    /// Override the slow-down hold time (ms)
    #[arg(long)]
    mode_delay_ms: Option<i64>,

    /// Print every mode change while replaying
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn is_feed_log(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    [".json", ".jsonl", ".json.gz", ".jsonl.gz"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

fn rejection_kind(rejection: &Rejection) -> &'static str {
    match rejection {
        Rejection::InvalidCoordinate(_) => "invalid_coordinate",
        Rejection::PoorAccuracy { .. } => "poor_accuracy",
        Rejection::InvalidTimestamp { .. } => "invalid_timestamp",
        Rejection::Throttled => "throttled",
        Rejection::Drift => "drift",
        Rejection::NotMoving => "not_moving",
        Rejection::BelowNoiseFloor { .. } => "below_noise_floor",
        Rejection::GpsJump { .. } => "gps_jump",
    }
}

fn build_config(args: &Args) -> anyhow::Result<EngineConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(kmh) = args.stationary_max_kmh {
        config.thresholds.stationary_max_speed_kmh = kmh;
    }
    if let Some(kmh) = args.walking_max_kmh {
        config.thresholds.walking_max_speed_kmh = kmh;
    }
    if let Some(ms) = args.mode_delay_ms {
        config.thresholds.mode_switch_delay_ms = ms;
    }
    // Replays judge calendar days in UTC unless the config says otherwise
    if config.persistence.utc_offset_minutes.is_none() {
        config.persistence.utc_offset_minutes = Some(0);
    }
    config.validate()?;
    Ok(config)
}

fn run_once(path: &Path, config: &EngineConfig, verbose: bool) -> anyhow::Result<serde_json::Value> {
    let events: Vec<LocationEvent> = feed::load_event_log(path)?;
    let first_ms = events.first().map(|e| e.timestamp_ms).unwrap_or(0);
    let last_ms = events.last().map(|e| e.timestamp_ms).unwrap_or(first_ms);

    let clock = ManualClock::new(first_ms);
    let mut engine = Engine::new(config.clone(), MemoryStore::new(), clock.clone())?;

    let mode_changes = Arc::new(Mutex::new(Vec::new()));
    let sink = mode_changes.clone();
    engine.subscribe(move |event| {
        if let EngineEvent::ModeChanged { from, to, speed_kmh, at_ms } = event {
            if verbose {
                println!("[MODE] t={} {} -> {} at {:.1} km/h", at_ms, from, to, speed_kmh);
            }
            if let Ok(mut changes) = sink.lock() {
                changes.push(json!({ "atMs": at_ms, "from": from, "to": to, "speedKmh": speed_kmh }));
            }
        }
    });

    let mut rejections: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut credited = 0u64;
    let mut reanchors = 0u64;
    let mut peak_speed_kmh = 0.0_f64;

    for event in &events {
        clock.set(event.timestamp_ms);
        match engine.on_location_sample(event) {
            SampleOutcome::Credited { .. } => credited += 1,
            SampleOutcome::Reanchored { .. } => reanchors += 1,
            SampleOutcome::Initialized => {}
            SampleOutcome::Rejected(rejection) => {
                *rejections.entry(rejection_kind(&rejection)).or_insert(0) += 1;
            }
        }
        if let Some(latest) = engine.state().speed_history.last() {
            peak_speed_kmh = peak_speed_kmh.max(*latest);
        }
    }

    // Let any pending slow-down settle before reporting the final mode
    clock.set(last_ms + config.thresholds.mode_switch_delay_ms);
    engine.tick();

    let status = engine.status();
    let changes = mode_changes.lock().map(|c| c.clone()).unwrap_or_default();

    Ok(json!({
        "log": path.display().to_string(),
        "events": events.len(),
        "durationSec": (last_ms - first_ms) as f64 / 1000.0,
        "credited": credited,
        "reanchors": reanchors,
        "rejections": rejections,
        "traveledKm": status.traveled_distance,
        "todayKm": status.today_distance,
        "progressPercent": status.progress_percent,
        "finalMode": status.current_mode,
        "peakSpeedKmh": peak_speed_kmh,
        "modeChanges": changes,
        "startLocation": status.start_location,
    }))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let mut results = Vec::new();

    if let Some(dir) = args.log_dir.as_ref() {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_feed_log(path))
            .collect();
        paths.sort();
        for path in paths {
            match run_once(&path, &config, args.verbose) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &config, args.verbose)?);
    } else {
        anyhow::bail!("Provide --log or --log-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
