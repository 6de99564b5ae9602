// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Location access for devices that may or may not ship a fused location
//! service.
//!
//! The [`LocationSource`] decides once which backend serves a device and
//! then hands out last known locations and shared, filtered location
//! update streams.

pub mod gpsd;
pub mod platform;
pub mod sim;
pub mod test_helper;

mod provider;
mod stream;

#[cfg(test)]
mod tests;

pub use stream::{LocationStream, LocationUpdates};

use crate::platform::LocationPlatform;
use crate::provider::{FusedProvider, LocationProvider, ManagerProvider};
use common::location::Location;
use common::sensitivity::LocationSensitivity;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Entry point for querying device locations.
///
/// Selects between the fused location backend and the plain location
/// manager of the [`LocationPlatform`]. The selection happens lazily on
/// first use and is kept for the lifetime of the source, even when the
/// fused service availability changes afterwards.
pub struct LocationSource {
    platform: Arc<dyn LocationPlatform>,
    provider: OnceLock<Arc<dyn LocationProvider>>,
}

impl LocationSource {
    /// Creates a new `LocationSource` on top of the given platform.
    ///
    /// No backend is probed yet; that happens on the first location
    /// request.
    pub fn new(platform: Arc<dyn LocationPlatform>) -> Self {
        LocationSource {
            platform,
            provider: OnceLock::new(),
        }
    }

    /// Returns the most recent location the selected backend has cached.
    ///
    /// The call never waits for a fresh fix.
    ///
    /// # Returns
    /// The cached location, or `None` when the backend has no fix yet.
    pub fn last_known_location(&self) -> Option<Location> {
        self.provider().last_known_location()
    }

    /// Requests a shared stream of location updates.
    ///
    /// All subscribers of the returned [`LocationUpdates`] share a single
    /// upstream subscription. Consecutive fixes that moved less than the
    /// sensitivity threshold on at least one axis are dropped.
    ///
    /// # Arguments
    /// * `sensitivity`: Minimum per-axis movement between two reported
    ///   locations.
    pub fn request_location_updates(&self, sensitivity: LocationSensitivity) -> LocationUpdates {
        LocationUpdates::new(
            Arc::clone(&self.platform),
            Arc::clone(self.provider()),
            sensitivity,
        )
    }

    fn provider(&self) -> &Arc<dyn LocationProvider> {
        self.provider
            .get_or_init(|| select_provider(&self.platform))
    }
}

fn select_provider(platform: &Arc<dyn LocationPlatform>) -> Arc<dyn LocationProvider> {
    if platform.fused_service_available()
        && let Some(client) = platform.fused_client()
    {
        debug!("Fused location service is available, using the fused backend");
        return Arc::new(FusedProvider::new(client));
    }
    debug!("Fused location service is unavailable, using the location manager backend");
    Arc::new(ManagerProvider::new(platform.location_manager()))
}
