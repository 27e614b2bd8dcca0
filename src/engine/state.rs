use crate::mode::PendingTransition;
use crate::types::{Coordinate, MovementMode, Units};

/// Read-only view of the engine's mutable state
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub last_position: Option<Coordinate>,
    pub last_update_time_ms: Option<i64>,
    pub stationary_center: Option<Coordinate>,
    pub speed_history: Vec<f64>,
    pub current_mode: MovementMode,
    pub last_mode_change_ms: i64,
    pub pending_transition: Option<PendingTransition>,
    pub total_distance_km: f64,
    pub today_distance_km: f64,
    pub start_location: Option<Coordinate>,
    pub units: Units,
    pub configured_total_distance_km: f64,
    pub last_active_ms: i64,
}

/// Change notifications for subscribers that re-render on demand
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ModeChanged {
        from: MovementMode,
        to: MovementMode,
        speed_kmh: f64,
        at_ms: i64,
    },
    DistanceChanged {
        total_km: f64,
        today_km: f64,
        delta_km: f64,
    },
    /// Trip length or unit preference changed
    TripSettingsChanged {
        total_distance_km: f64,
        units: Units,
    },
    StartLocationSet(Coordinate),
    StateReset {
        today_only: bool,
    },
    SnapshotImported,
}

pub type Listener = Box<dyn FnMut(&EngineEvent) + Send>;
