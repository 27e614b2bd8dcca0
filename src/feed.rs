//! Location feed adapters.
//!
//! Live sockets and the local demo simulator both produce [`LocationEvent`]s;
//! the engine only ever sees the normalized [`LocationSample`].
use crate::error::{Result, TrackerError};
use crate::geo_math;
use crate::types::{Coordinate, LocationSample, MPS_TO_KMH};
use flate2::read::GzDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    #[default]
    Live,
    Demo,
}

/// Location event as delivered by a transport
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationEvent {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Meters per second
    #[serde(default)]
    pub speed: Option<f64>,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub source: FeedSource,
}

impl From<&LocationEvent> for LocationSample {
    fn from(event: &LocationEvent) -> Self {
        LocationSample {
            coordinate: Coordinate::new(event.latitude, event.longitude),
            reported_speed_mps: event.speed,
            accuracy_m: event.accuracy,
            timestamp_ms: event.timestamp_ms,
        }
    }
}

impl From<LocationEvent> for LocationSample {
    fn from(event: LocationEvent) -> Self {
        LocationSample::from(&event)
    }
}

/// Parse one JSON-lines record. Blank lines and `#` comments yield `None`.
pub fn parse_event_line(line: &str) -> Result<Option<LocationEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Read events from JSON lines, or from a single JSON array when the input starts with `[`.
/// Malformed lines are logged and skipped so one bad record never stops a replay.
pub fn read_events<R: Read>(reader: R) -> Result<Vec<LocationEvent>> {
    let mut reader = BufReader::new(reader);
    let starts_with_array = {
        let buf = reader.fill_buf()?;
        buf.iter()
            .find(|b| !b.is_ascii_whitespace())
            .map(|b| *b == b'[')
            .unwrap_or(false)
    };

    if starts_with_array {
        return Ok(serde_json::from_reader(reader)?);
    }

    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        match parse_event_line(&line) {
            Ok(Some(event)) => events.push(event),
            Ok(None) => {}
            Err(e) => log::warn!("Skipping malformed feed line {}: {}", index + 1, e),
        }
    }
    Ok(events)
}

/// Load a recorded feed log, transparently decompressing `.gz` files
pub fn load_event_log(path: &Path) -> Result<Vec<LocationEvent>> {
    let file = File::open(path)?;
    let events = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        read_events(GzDecoder::new(file))?
    } else {
        read_events(file)?
    };
    if events.is_empty() {
        return Err(TrackerError::InvalidConfig(format!(
            "feed log {} contains no events",
            path.display()
        )));
    }
    Ok(events)
}

/// Deterministic route simulator for the demo source
#[derive(Debug, Clone)]
pub struct DemoRoute {
    pub waypoints: Vec<Coordinate>,
    pub speed_kmh: f64,
    pub interval_ms: i64,
    /// Standard-ish spread of simulated GPS noise in meters
    pub jitter_m: f64,
    pub accuracy_m: f64,
    pub seed: u64,
}

impl DemoRoute {
    /// A straight ride of `length_m` heading `bearing_deg` from `origin`
    pub fn straight(origin: Coordinate, bearing_deg: f64, length_m: f64, speed_kmh: f64) -> Self {
        DemoRoute {
            waypoints: vec![origin, geo_math::destination(&origin, bearing_deg, length_m)],
            speed_kmh,
            interval_ms: 2_000,
            jitter_m: 0.0,
            accuracy_m: 5.0,
            seed: 42,
        }
    }

    pub fn length_m(&self) -> f64 {
        self.waypoints
            .windows(2)
            .map(|pair| geo_math::distance_m(&pair[0], &pair[1]))
            .sum()
    }

    /// Events along the route starting at `start_ms`, ending on the last waypoint
    pub fn events(&self, start_ms: i64) -> Vec<LocationEvent> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut events = Vec::new();
        if self.waypoints.is_empty() {
            return events;
        }

        let speed_mps = self.speed_kmh / MPS_TO_KMH;
        let step_m = (speed_mps * self.interval_ms as f64 / 1000.0).max(0.0);
        let mut timestamp_ms = start_ms;
        let mut push = |position: Coordinate, timestamp_ms: i64, rng: &mut StdRng| {
            let position = if self.jitter_m > 0.0 {
                let bearing = rng.gen_range(0.0..360.0);
                let offset = rng.gen_range(0.0..self.jitter_m);
                geo_math::destination(&position, bearing, offset)
            } else {
                position
            };
            events.push(LocationEvent {
                latitude: position.lat,
                longitude: position.lon,
                accuracy: Some(self.accuracy_m),
                speed: Some(speed_mps),
                timestamp_ms,
                source: FeedSource::Demo,
            });
        };

        push(self.waypoints[0], timestamp_ms, &mut rng);
        if step_m <= 0.0 {
            return events;
        }

        for pair in self.waypoints.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let leg_m = geo_math::distance_m(&from, &to);
            let bearing = geo_math::bearing_deg(&from, &to);
            let mut travelled = step_m;
            while travelled < leg_m - 1e-3 {
                timestamp_ms += self.interval_ms;
                push(geo_math::destination(&from, bearing, travelled), timestamp_ms, &mut rng);
                travelled += step_m;
            }
            timestamp_ms += self.interval_ms;
            push(to, timestamp_ms, &mut rng);
        }
        events
    }
}
