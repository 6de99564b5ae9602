use common::location::Location;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

/// Ambient platform capabilities required by a [`LocationSource`].
///
/// The trait bundles everything the source reads from its environment: the
/// combined permission state, the availability of the high-level fused
/// service and handles to the two location backends. Injecting it as a
/// trait keeps the selection and filtering policy independent of any global
/// platform state and lets tests substitute every probe.
///
/// [`LocationSource`]: crate::LocationSource
pub trait LocationPlatform: Send + Sync {
    /// Returns whether fine and coarse location permission are both
    /// currently granted.
    fn has_location_permission(&self) -> bool;

    /// Returns whether the high-level fused location service is reported
    /// available.
    ///
    /// Consulted once per [`LocationSource`] instance when the provider is
    /// selected; a later change of the reported state does not revise the
    /// selection.
    ///
    /// [`LocationSource`]: crate::LocationSource
    fn fused_service_available(&self) -> bool;

    /// Returns a handle to the fused client, or `None` when the platform
    /// cannot hand one out even though the service was probed.
    fn fused_client(&self) -> Option<Arc<dyn FusedLocationClient>>;

    /// Returns a handle to the manager-based backend.
    ///
    /// The manager always exists; a platform without a low-level location
    /// stack returns a manager with no enabled sub-provider.
    fn location_manager(&self) -> Arc<dyn LocationManager>;
}

/// High-level fused location backend.
///
/// Implementations blend whatever position sources the platform offers and
/// deliver ready-made fixes.
pub trait FusedLocationClient: Send + Sync {
    /// Returns the cached last-known fix.
    ///
    /// Must not block: when the asynchronous fetch behind the cache has not
    /// resolved yet, the call returns `None` instead of waiting.
    fn last_location(&self) -> Option<Location>;

    /// Registers `updates` for continuous fixes according to `request`.
    ///
    /// Every reported fix is pushed into the channel until the returned
    /// registration is released.
    fn request_updates(
        &self,
        request: UpdateRequest,
        updates: Sender<Location>,
    ) -> UpdateRegistration;
}

/// Low-level manager backend exposing the raw sub-providers directly.
pub trait LocationManager: Send + Sync {
    /// Returns whether the given sub-provider is currently enabled.
    fn is_provider_enabled(&self, provider: SubProvider) -> bool;

    /// Returns the last location known to the given sub-provider.
    fn last_known_location(&self, provider: SubProvider) -> Option<Location>;

    /// Registers `updates` as a listener on the given sub-provider.
    ///
    /// `min_interval` and `min_distance_m` are forwarded to the platform as
    /// the minimum time and distance between listener callbacks. The
    /// listener stays registered until the returned registration is
    /// released.
    fn request_updates(
        &self,
        provider: SubProvider,
        min_interval: Duration,
        min_distance_m: f32,
        updates: Sender<Location>,
    ) -> UpdateRegistration;
}

/// The raw position sources a [`LocationManager`] can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubProvider {
    /// Satellite based positioning.
    Gps,
    /// Positioning derived from network infrastructure.
    Network,
}

/// Requested trade-off between fix quality and power consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    HighAccuracy,
    BalancedPower,
    LowPower,
}

/// Parameters of a continuous update request issued to a fused client.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpdateRequest {
    priority: Priority,
    interval: Duration,
    wait_for_accurate_fix: bool,
}

impl UpdateRequest {
    /// Interval of the high accuracy request used for update streams.
    const HIGH_ACCURACY_INTERVAL_MS: u64 = 10;

    /// Creates an update request with the given parameters.
    pub fn new(priority: Priority, interval: Duration, wait_for_accurate_fix: bool) -> Self {
        UpdateRequest {
            priority,
            interval,
            wait_for_accurate_fix,
        }
    }

    /// The request issued for update streams: high accuracy fixes at a
    /// short periodic interval, waiting for an accurate fix before the
    /// first delivery.
    pub fn high_accuracy() -> Self {
        UpdateRequest::new(
            Priority::HighAccuracy,
            Duration::from_millis(UpdateRequest::HIGH_ACCURACY_INTERVAL_MS),
            true,
        )
    }

    /// Returns the requested priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns the requested delivery interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns whether the backend shall hold back fixes until an accurate
    /// one is available.
    pub fn wait_for_accurate_fix(&self) -> bool {
        self.wait_for_accurate_fix
    }
}

/// Handle to an active update registration.
///
/// Releasing the handle deregisters the underlying callback from the
/// backend. The release runs on every exit path: dropping the handle is
/// enough, so an aborted forwarding task cleans up its registration as
/// well.
pub struct UpdateRegistration {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl UpdateRegistration {
    /// Creates a registration whose release invokes `cancel` exactly once.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        UpdateRegistration {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Bundles several registrations into one handle releasing all of them.
    ///
    /// An empty group is a valid registration that releases nothing.
    pub fn group(parts: Vec<UpdateRegistration>) -> Self {
        UpdateRegistration::new(move || drop(parts))
    }
}

impl Drop for UpdateRegistration {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
