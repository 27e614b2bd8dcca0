//! GPS trip odometer.
//!
//! Turns a noisy stream of location fixes into a trip distance counter and a
//! stationary / walking / cycling mode signal, rejecting drift and impossible
//! jumps, with debounced persistence and a daily reset of today's distance.

pub mod accumulator;
pub mod clock;
pub mod config;
pub mod drift;
pub mod engine;
pub mod error;
pub mod feed;
pub mod geo_math;
pub mod health_monitor;
pub mod live_status;
pub mod mode;
pub mod outcome;
pub mod persistence;
pub mod smoothing;
pub mod speed;
pub mod types;
pub mod validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{Engine, EngineEvent, EngineState};
pub use error::{Result, TrackerError};
pub use feed::{FeedSource, LocationEvent};
pub use live_status::StatusSnapshot;
pub use outcome::{Rejection, SampleOutcome};
pub use persistence::{FileStore, MemoryStore, PersistedSnapshot, SnapshotStore};
pub use types::{Coordinate, LocationSample, MovementMode, Units};
