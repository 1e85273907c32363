use serde::{Deserialize, Serialize};

/// Outcome of comparing a smoothed speed against the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedClass {
    Normal,
    Speeding,
    /// No speed yet (fewer than two position samples)
    Undefined,
}

impl SpeedClass {
    #[inline]
    pub fn is_speeding(self) -> bool {
        self == Self::Speeding
    }
}

/// Classify a speed estimate in km/h. Only speeds strictly above the limit
/// count as speeding; an undefined speed is never treated as normal.
pub fn classify(speed_kmh: Option<f64>, speed_limit_kmh: f64) -> SpeedClass {
    match speed_kmh {
        None => SpeedClass::Undefined,
        Some(speed) if speed > speed_limit_kmh => SpeedClass::Speeding,
        Some(_) => SpeedClass::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify(None, 60.0), SpeedClass::Undefined);
        assert_eq!(classify(Some(0.0), 60.0), SpeedClass::Normal);
        assert_eq!(classify(Some(60.0), 60.0), SpeedClass::Normal);
        assert_eq!(classify(Some(60.1), 60.0), SpeedClass::Speeding);
    }
}
