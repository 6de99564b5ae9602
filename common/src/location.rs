use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single geographical fix reported by a location backend.
///
/// The `Location` struct stores a point on Earth in decimal degrees.
/// Latitude values range from -90.0 to 90.0, and longitude values range
/// from -180.0 to 180.0. The remaining attributes are passed through from
/// the reporting backend when it provides them; the update filtering only
/// ever looks at latitude and longitude.
///
/// # Example
///
/// ```rust
/// use common::location::Location;
///
/// let fix = Location::new(52.5200, 13.4050).with_accuracy(4.5);
///
/// assert_eq!(fix.latitude(), 52.5200);
/// assert_eq!(fix.accuracy(), Some(4.5));
/// assert_eq!(fix.altitude(), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    altitude: Option<f64>,
    timestamp: Option<DateTime<Utc>>,
}

impl Location {
    /// Creates a new [`Location`] with the given latitude and longitude.
    ///
    /// All passthrough attributes start out unset and can be attached with
    /// the `with_*` builders.
    ///
    /// # Arguments
    ///
    /// * `latitude` - The latitude in decimal degrees, positive for north.
    /// * `longitude` - The longitude in decimal degrees, positive for east.
    pub fn new(latitude: f64, longitude: f64) -> Location {
        Location {
            latitude,
            longitude,
            accuracy: None,
            altitude: None,
            timestamp: None,
        }
    }

    /// Attaches the estimated horizontal accuracy in meters.
    pub fn with_accuracy(mut self, accuracy: f64) -> Location {
        self.accuracy = Some(accuracy);
        self
    }

    /// Attaches the altitude above the WGS84 ellipsoid in meters.
    pub fn with_altitude(mut self, altitude: f64) -> Location {
        self.altitude = Some(altitude);
        self
    }

    /// Attaches the UTC time at which the fix was taken.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Location {
        self.timestamp = Some(timestamp);
        self
    }

    /// Deserializes a [`Location`] from its JSON representation.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Returns the latitude in decimal degrees.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Returns the longitude in decimal degrees.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Returns the estimated horizontal accuracy in meters, if reported.
    pub fn accuracy(&self) -> Option<f64> {
        self.accuracy
    }

    /// Returns the altitude in meters, if reported.
    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// Returns the UTC time of the fix, if reported.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}
