use crate::location::Location;

/// Builds a [`Location`] from bare coordinates.
///
/// Shorthand for tests that only care about latitude and longitude.
pub fn location(latitude: f64, longitude: f64) -> Location {
    Location::new(latitude, longitude)
}

/// Builds a list of [`Location`] values from `(latitude, longitude)` pairs.
///
/// Useful to describe a route for the simulated platform in a single line.
pub fn route(points: &[(f64, f64)]) -> Vec<Location> {
    points
        .iter()
        .map(|(latitude, longitude)| Location::new(*latitude, *longitude))
        .collect()
}
