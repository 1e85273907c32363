//! Run configuration: calibration, tracker tuning and detection filtering.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::integration::DetectionFilter;
use crate::tracker::TrackerConfig;

/// Operator-supplied calibration, fixed for the duration of a run.
///
/// `distance_meters` is the real-world distance covered by 100 pixel units
/// of on-screen displacement. It has to be measured against a known
/// reference in the scene (lane width, road markings); nothing here derives it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub distance_meters: f64,
    pub frame_rate: f64,
    pub speed_limit_kmh: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            distance_meters: 10.0,
            frame_rate: 30.0,
            speed_limit_kmh: 60.0,
        }
    }
}

impl Calibration {
    pub fn new(distance_meters: f64, frame_rate: f64, speed_limit_kmh: f64) -> Self {
        Self {
            distance_meters,
            frame_rate,
            speed_limit_kmh,
        }
    }

    #[inline]
    pub fn meters_per_pixel(&self) -> f64 {
        self.distance_meters / 100.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.distance_meters) {
            return Err(ConfigError::invalid("calibration.distance_meters", "must be > 0"));
        }
        if !positive(self.frame_rate) {
            return Err(ConfigError::invalid("calibration.frame_rate", "must be > 0"));
        }
        if !positive(self.speed_limit_kmh) {
            return Err(ConfigError::invalid("calibration.speed_limit_kmh", "must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub calibration: Calibration,
    pub tracker: TrackerConfig,
    /// Instantaneous speed samples averaged into the reported speed
    pub smoothing_window: usize,
    pub filter: DetectionFilter,
    /// Capacity of the annotated-frame channel; frames are dropped when full
    pub frame_queue: usize,
    /// Capacity of the speed-event channel; new events are dropped when full
    pub event_queue: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calibration: Calibration::default(),
            tracker: TrackerConfig::default(),
            smoothing_window: 3,
            filter: DetectionFilter::default(),
            frame_queue: 1,
            event_queue: 1024,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;
        self.tracker.validate()?;
        if self.smoothing_window < 1 {
            return Err(ConfigError::invalid("smoothing_window", "must be >= 1"));
        }
        if self.frame_queue < 1 {
            return Err(ConfigError::invalid("frame_queue", "must be >= 1"));
        }
        if self.event_queue < 1 {
            return Err(ConfigError::invalid("event_queue", "must be >= 1"));
        }
        self.filter.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::AssociationMethod;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "
calibration:
  distance_meters: 12.5
tracker:
  association: optimal
smoothing_window: 5
";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.calibration.distance_meters, 12.5);
        assert_eq!(config.calibration.frame_rate, 30.0);
        assert_eq!(config.tracker.association, AssociationMethod::Optimal);
        assert_eq!(config.tracker.max_age, 30);
        assert_eq!(config.smoothing_window, 5);
    }

    #[test]
    fn test_rejects_zero_window() {
        let err = PipelineConfig::from_yaml("smoothing_window: 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "smoothing_window",
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_zero_event_queue() {
        let err = PipelineConfig::from_yaml("event_queue: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "event_queue", .. }));
    }

    #[test]
    fn test_rejects_negative_frame_rate() {
        let calibration = Calibration::new(10.0, -1.0, 60.0);
        assert!(calibration.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load("/nonexistent/speedtrack.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_meters_per_pixel() {
        assert_eq!(Calibration::default().meters_per_pixel(), 0.1);
    }
}
