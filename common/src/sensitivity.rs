use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Sensitivity of the location update stream.
///
/// The sensitivity sets the minimum coordinate delta in decimal degrees
/// below which a newly reported position is treated as unchanged and is
/// not emitted again. `High` reacts to movements of roughly a city block,
/// `Low` only to movements of about a degree.
///
/// The string form is lowercase, so the level can be parsed directly from
/// CLI arguments or configuration values.
///
/// # Example
///
/// ```rust
/// use std::str::FromStr;
/// use common::sensitivity::LocationSensitivity;
///
/// let level = LocationSensitivity::from_str("medium").unwrap();
/// assert_eq!(level, LocationSensitivity::Medium);
/// assert_eq!(level.diff_threshold(), 0.1);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LocationSensitivity {
    /// Emits on movements of at least 0.001 degrees on both axes.
    High,
    /// Emits on movements of at least 0.1 degrees on both axes.
    Medium,
    /// Emits on movements of at least 1.0 degrees on both axes.
    Low,
}

impl LocationSensitivity {
    /// Returns the minimum per-axis coordinate delta in decimal degrees for
    /// this sensitivity level.
    pub fn diff_threshold(&self) -> f64 {
        match self {
            LocationSensitivity::High => 0.001,
            LocationSensitivity::Medium => 0.1,
            LocationSensitivity::Low => 1.0,
        }
    }
}
