//! Scripted platform for driving a [`LocationSource`] in tests.
//!
//! Every probe result is settable, every backend interaction is recorded
//! and fixes are pushed by hand, so tests control the complete platform
//! behavior without timers or sockets.
//!
//! [`LocationSource`]: crate::LocationSource

use crate::platform::{
    FusedLocationClient, LocationManager, LocationPlatform, SubProvider, UpdateRegistration,
    UpdateRequest,
};
use common::location::Location;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{Sender, error::TrySendError};

fn deliver(sinks: &Arc<Mutex<Vec<(u64, Sender<Location>)>>>, fix: Location) {
    sinks
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .retain(|(_, sink)| !matches!(sink.try_send(fix), Err(TrySendError::Closed(_))));
}

/// Fused client whose fixes are pushed by the test.
///
/// The client records every issued update request and counts how many
/// registrations were handed out and how many were released again.
pub struct ScriptedFusedClient {
    last: Mutex<Option<Location>>,
    sinks: Arc<Mutex<Vec<(u64, Sender<Location>)>>>,
    next_sink_id: AtomicU64,
    requests: Mutex<Vec<UpdateRequest>>,
    total: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedFusedClient {
    fn new() -> Self {
        ScriptedFusedClient {
            last: Mutex::new(None),
            sinks: Arc::new(Mutex::new(Vec::new())),
            next_sink_id: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Seeds the cached last-known fix without notifying any sink.
    pub fn set_last(&self, fix: Option<Location>) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = fix;
    }

    /// Reports `fix` like a platform callback: the cache is updated and
    /// every registered sink receives the fix.
    pub fn push_fix(&self, fix: Location) {
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(fix);
        deliver(&self.sinks, fix);
    }

    /// Returns every update request issued so far, in order.
    pub fn issued_requests(&self) -> Vec<UpdateRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Returns how many registrations were handed out in total.
    pub fn total_registrations(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Returns how many registrations were released again.
    pub fn cancelled_registrations(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns how many registrations are currently alive.
    pub fn active_registrations(&self) -> usize {
        self.total_registrations() - self.cancelled_registrations()
    }
}

impl FusedLocationClient for ScriptedFusedClient {
    fn last_location(&self) -> Option<Location> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_updates(
        &self,
        request: UpdateRequest,
        updates: Sender<Location>,
    ) -> UpdateRegistration {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.total.fetch_add(1, Ordering::SeqCst);
        let id = self.next_sink_id.fetch_add(1, Ordering::SeqCst);
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, updates));
        let sinks = Arc::clone(&self.sinks);
        let cancelled = Arc::clone(&self.cancelled);
        UpdateRegistration::new(move || {
            sinks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(sink_id, _)| *sink_id != id);
            cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }
}

struct ScriptedSubProvider {
    enabled: AtomicBool,
    last: Mutex<Option<Location>>,
    sinks: Arc<Mutex<Vec<(u64, Sender<Location>)>>>,
}

impl ScriptedSubProvider {
    fn new() -> Self {
        ScriptedSubProvider {
            enabled: AtomicBool::new(true),
            last: Mutex::new(None),
            sinks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Manager backend whose fixes are pushed by the test.
///
/// Both sub-providers start out enabled. Listener registrations are
/// recorded with their forwarded parameters and counted the same way the
/// scripted fused client counts them.
pub struct ScriptedManager {
    gps: ScriptedSubProvider,
    network: ScriptedSubProvider,
    next_sink_id: AtomicU64,
    registrations: Mutex<Vec<(SubProvider, Duration, f32)>>,
    total: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedManager {
    fn new() -> Self {
        ScriptedManager {
            gps: ScriptedSubProvider::new(),
            network: ScriptedSubProvider::new(),
            next_sink_id: AtomicU64::new(0),
            registrations: Mutex::new(Vec::new()),
            total: AtomicUsize::new(0),
            cancelled: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn sub_provider(&self, provider: SubProvider) -> &ScriptedSubProvider {
        match provider {
            SubProvider::Gps => &self.gps,
            SubProvider::Network => &self.network,
        }
    }

    /// Enables or disables one sub-provider.
    pub fn set_provider_enabled(&self, provider: SubProvider, enabled: bool) {
        self.sub_provider(provider)
            .enabled
            .store(enabled, Ordering::SeqCst);
    }

    /// Seeds the last-known fix of one sub-provider.
    pub fn set_last_known(&self, provider: SubProvider, fix: Option<Location>) {
        *self
            .sub_provider(provider)
            .last
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = fix;
    }

    /// Reports `fix` on one sub-provider like a platform listener callback.
    pub fn push_fix(&self, provider: SubProvider, fix: Location) {
        let sub_provider = self.sub_provider(provider);
        *sub_provider.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(fix);
        deliver(&sub_provider.sinks, fix);
    }

    /// Returns every listener registration issued so far with its
    /// forwarded interval and distance parameters.
    pub fn issued_registrations(&self) -> Vec<(SubProvider, Duration, f32)> {
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns how many listener registrations were handed out in total.
    pub fn total_registrations(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Returns how many listener registrations were released again.
    pub fn cancelled_registrations(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns how many listener registrations are currently alive.
    pub fn active_registrations(&self) -> usize {
        self.total_registrations() - self.cancelled_registrations()
    }
}

impl LocationManager for ScriptedManager {
    fn is_provider_enabled(&self, provider: SubProvider) -> bool {
        self.sub_provider(provider).enabled.load(Ordering::SeqCst)
    }

    fn last_known_location(&self, provider: SubProvider) -> Option<Location> {
        *self
            .sub_provider(provider)
            .last
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn request_updates(
        &self,
        provider: SubProvider,
        min_interval: Duration,
        min_distance_m: f32,
        updates: Sender<Location>,
    ) -> UpdateRegistration {
        self.registrations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((provider, min_interval, min_distance_m));
        self.total.fetch_add(1, Ordering::SeqCst);
        let id = self.next_sink_id.fetch_add(1, Ordering::SeqCst);
        let sinks = Arc::clone(&self.sub_provider(provider).sinks);
        sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, updates));
        let cancelled = Arc::clone(&self.cancelled);
        UpdateRegistration::new(move || {
            sinks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(sink_id, _)| *sink_id != id);
            cancelled.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Platform with scripted probe results.
///
/// Defaults to the friendly state: permission granted, fused service
/// available with a client on hand and both sub-providers enabled. Every
/// probe can be flipped per test and the fused availability probes are
/// counted.
pub struct ScriptedPlatform {
    permission_granted: AtomicBool,
    fused_available: AtomicBool,
    withhold_fused_client: AtomicBool,
    availability_checks: AtomicUsize,
    fused: Arc<ScriptedFusedClient>,
    manager: Arc<ScriptedManager>,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        ScriptedPlatform {
            permission_granted: AtomicBool::new(true),
            fused_available: AtomicBool::new(true),
            withhold_fused_client: AtomicBool::new(false),
            availability_checks: AtomicUsize::new(0),
            fused: Arc::new(ScriptedFusedClient::new()),
            manager: Arc::new(ScriptedManager::new()),
        }
    }

    /// Grants or revokes the location permission.
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    /// Reports the fused service as available or unavailable.
    pub fn set_fused_available(&self, available: bool) {
        self.fused_available.store(available, Ordering::SeqCst);
    }

    /// Makes `fused_client` return `None` even while the service reports
    /// as available.
    pub fn withhold_fused_client(&self) {
        self.withhold_fused_client.store(true, Ordering::SeqCst);
    }

    /// Returns how often the fused service availability was probed.
    pub fn availability_checks(&self) -> usize {
        self.availability_checks.load(Ordering::SeqCst)
    }

    /// Returns the scripted fused client for driving fixes and inspecting
    /// registrations.
    pub fn fused(&self) -> &Arc<ScriptedFusedClient> {
        &self.fused
    }

    /// Returns the scripted manager for driving fixes and inspecting
    /// listener registrations.
    pub fn manager(&self) -> &Arc<ScriptedManager> {
        &self.manager
    }
}

impl Default for ScriptedPlatform {
    fn default() -> Self {
        ScriptedPlatform::new()
    }
}

impl LocationPlatform for ScriptedPlatform {
    fn has_location_permission(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    fn fused_service_available(&self) -> bool {
        self.availability_checks.fetch_add(1, Ordering::SeqCst);
        self.fused_available.load(Ordering::SeqCst)
    }

    fn fused_client(&self) -> Option<Arc<dyn FusedLocationClient>> {
        if self.withhold_fused_client.load(Ordering::SeqCst) {
            return None;
        }
        Some(Arc::clone(&self.fused) as Arc<dyn FusedLocationClient>)
    }

    fn location_manager(&self) -> Arc<dyn LocationManager> {
        Arc::clone(&self.manager) as Arc<dyn LocationManager>
    }
}

/// Waits asynchronously until `condition` reports true.
///
/// The total waiting time is divided into small polling steps so the
/// helper stays responsive. Panics when the condition is still false
/// after `duration`.
pub async fn wait_until(mut condition: impl FnMut() -> bool, duration: Duration) {
    let steps = duration.as_millis() / 10;
    let step_duration = duration / 10;
    for _ in 0..steps {
        if condition() {
            return;
        }
        tokio::time::sleep(step_duration).await;
    }
    panic!("Condition not met within {duration:?}");
}
