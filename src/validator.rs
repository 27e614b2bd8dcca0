use crate::types::Coordinate;
use std::fmt;

/// Why a coordinate was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateIssue {
    NonFinite,
    LatitudeOutOfRange,
    LongitudeOutOfRange,
    /// Exactly (0, 0): the usual value of an uninitialised fix
    SuspiciousOrigin,
}

impl fmt::Display for CoordinateIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CoordinateIssue::NonFinite => "non-finite value",
            CoordinateIssue::LatitudeOutOfRange => "latitude outside [-90, 90]",
            CoordinateIssue::LongitudeOutOfRange => "longitude outside [-180, 180]",
            CoordinateIssue::SuspiciousOrigin => "suspicious (0, 0) origin",
        };
        f.write_str(text)
    }
}

/// Check a fix for use in the pipeline
pub fn check(coord: &Coordinate) -> Result<(), CoordinateIssue> {
    if !coord.lat.is_finite() || !coord.lon.is_finite() {
        return Err(CoordinateIssue::NonFinite);
    }
    if !(-90.0..=90.0).contains(&coord.lat) {
        return Err(CoordinateIssue::LatitudeOutOfRange);
    }
    if !(-180.0..=180.0).contains(&coord.lon) {
        return Err(CoordinateIssue::LongitudeOutOfRange);
    }
    Ok(())
}

/// Check a fix for use as an auto-detected trip start
pub fn check_start(coord: &Coordinate) -> Result<(), CoordinateIssue> {
    check(coord)?;
    if coord.is_origin() {
        return Err(CoordinateIssue::SuspiciousOrigin);
    }
    Ok(())
}

pub fn validate(coord: &Coordinate) -> bool {
    check(coord).is_ok()
}

pub fn validate_start(coord: &Coordinate) -> bool {
    check_start(coord).is_ok()
}
