use serde::{Deserialize, Serialize};

pub const METERS_PER_KM: f64 = 1000.0;
pub const MS_PER_HOUR: f64 = 3_600_000.0;
pub const MPS_TO_KMH: f64 = 3.6;
pub const KM_PER_MILE: f64 = 1.609344;

/// Display unit preference. Distances are always stored in kilometers;
/// this is only applied at the presentation boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn from_imperial_flag(use_imperial: bool) -> Self {
        if use_imperial {
            Units::Imperial
        } else {
            Units::Metric
        }
    }

    pub fn is_imperial(&self) -> bool {
        *self == Units::Imperial
    }

    /// Convert a kilometer value into this unit system
    pub fn convert_km(&self, km: f64) -> f64 {
        match self {
            Units::Metric => km,
            Units::Imperial => km / KM_PER_MILE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Units::Metric => "km",
            Units::Imperial => "mi",
        }
    }

    pub fn format_distance(&self, km: f64) -> String {
        format!("{:.1} {}", self.convert_km(km), self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imperial_conversion() {
        let miles = Units::Imperial.convert_km(KM_PER_MILE * 10.0);
        assert!((miles - 10.0).abs() < 1e-9);
        assert_eq!(Units::Metric.convert_km(5.0), 5.0);
    }

    #[test]
    fn test_format() {
        assert_eq!(Units::Metric.format_distance(12.34), "12.3 km");
        assert_eq!(Units::from_imperial_flag(true).label(), "mi");
    }
}
