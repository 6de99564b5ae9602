use crate::platform::{
    FusedLocationClient, LocationManager, SubProvider, UpdateRegistration, UpdateRequest,
};
use common::location::Location;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tracing::debug;

/// Unified interface over the two location backends.
///
/// Exactly one variant is selected per source instance; both expose the
/// same two operations so everything downstream of the selection is
/// backend-agnostic.
pub(crate) trait LocationProvider: Send + Sync {
    /// Returns the backend's last known location without blocking.
    fn last_known_location(&self) -> Option<Location>;

    /// Opens the backend's update subscription feeding `updates`.
    fn subscribe(&self, updates: Sender<Location>) -> UpdateRegistration;
}

/// Provider variant backed by the high-level fused client.
pub(crate) struct FusedProvider {
    client: Arc<dyn FusedLocationClient>,
}

impl FusedProvider {
    pub fn new(client: Arc<dyn FusedLocationClient>) -> Self {
        FusedProvider { client }
    }
}

impl LocationProvider for FusedProvider {
    fn last_known_location(&self) -> Option<Location> {
        self.client.last_location()
    }

    fn subscribe(&self, updates: Sender<Location>) -> UpdateRegistration {
        let request = UpdateRequest::high_accuracy();
        debug!("Opening fused update subscription with request {request:?}");
        self.client.request_updates(request, updates)
    }
}

/// Provider variant backed by the manager and its raw sub-providers.
pub(crate) struct ManagerProvider {
    manager: Arc<dyn LocationManager>,
}

impl ManagerProvider {
    /// Minimum time between listener callbacks requested from the manager.
    const UPDATE_INTERVAL_MS: u64 = 5000;

    pub fn new(manager: Arc<dyn LocationManager>) -> Self {
        ManagerProvider { manager }
    }
}

impl LocationProvider for ManagerProvider {
    fn last_known_location(&self) -> Option<Location> {
        self.manager.last_known_location(SubProvider::Gps)
    }

    /// Registers a listener on every enabled sub-provider.
    ///
    /// GPS and network may be active at the same time and feed the same
    /// channel. The grouped registration releases every listener when the
    /// subscription is torn down.
    fn subscribe(&self, updates: Sender<Location>) -> UpdateRegistration {
        let mut registrations = Vec::new();
        for provider in [SubProvider::Gps, SubProvider::Network] {
            if self.manager.is_provider_enabled(provider) {
                registrations.push(self.manager.request_updates(
                    provider,
                    Duration::from_millis(ManagerProvider::UPDATE_INTERVAL_MS),
                    0.0,
                    updates.clone(),
                ));
            } else {
                debug!("Sub-provider {provider:?} is disabled, no listener registered");
            }
        }
        if registrations.is_empty() {
            debug!("No sub-provider enabled, the update stream stays idle");
        }
        UpdateRegistration::group(registrations)
    }
}
