//! Simulated platform that replays a fixed route.
//!
//! The [`SimulatedPlatform`] drives both backends from one playback task
//! and exposes switches for everything a real device would decide on its
//! own: the permission state, the fused service availability and the
//! enabled sub-providers. It backs the demo binary and the integration
//! tests.

use crate::platform::{
    FusedLocationClient, LocationManager, LocationPlatform, SubProvider, UpdateRegistration,
    UpdateRequest,
};
use chrono::Utc;
use common::location::Location;
use std::{
    io::{self, Error, ErrorKind},
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc::{Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;

/// A registered consumer of simulated fixes.
struct RegisteredSink {
    id: u64,
    sender: Sender<Location>,
}

#[derive(Clone, Copy, Debug)]
enum SinkGroup {
    Fused,
    Gps,
    Network,
}

#[derive(Default)]
struct SinkRegistry {
    fused: Vec<RegisteredSink>,
    gps: Vec<RegisteredSink>,
    network: Vec<RegisteredSink>,
}

impl SinkRegistry {
    fn group_mut(&mut self, group: SinkGroup) -> &mut Vec<RegisteredSink> {
        match group {
            SinkGroup::Fused => &mut self.fused,
            SinkGroup::Gps => &mut self.gps,
            SinkGroup::Network => &mut self.network,
        }
    }

    fn groups_mut(&mut self) -> [&mut Vec<RegisteredSink>; 3] {
        [&mut self.fused, &mut self.gps, &mut self.network]
    }
}

/// State shared between the playback task and the backend handles.
struct SimulationState {
    last_fix: Mutex<Option<Location>>,
    sinks: Mutex<SinkRegistry>,
    next_sink_id: AtomicU64,
}

impl SimulationState {
    fn fan_out(&self, fix: Location) {
        let mut sinks = self.sinks.lock().unwrap_or_else(|e| e.into_inner());
        for group in sinks.groups_mut() {
            group.retain(|sink| match sink.sender.try_send(fix) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            });
        }
    }

    fn register(
        self: &Arc<Self>,
        group: SinkGroup,
        updates: Sender<Location>,
    ) -> UpdateRegistration {
        let id = self.next_sink_id.fetch_add(1, Ordering::SeqCst);
        debug!("Registering simulated update sink {id} in group {group:?}");
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .group_mut(group)
            .push(RegisteredSink {
                id,
                sender: updates,
            });
        let state = Arc::clone(self);
        UpdateRegistration::new(move || {
            state
                .sinks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .group_mut(group)
                .retain(|sink| sink.id != id);
            debug!("Simulated update sink {id} released");
        })
    }
}

struct SimulationRuntime {
    route: Vec<Location>,
    next_point: usize,
    state: Arc<SimulationState>,
}

impl SimulationRuntime {
    fn handle_tick(&mut self) {
        let fix = self.route[self.next_point].with_timestamp(Utc::now());
        self.next_point = (self.next_point + 1) % self.route.len();
        *self.state.last_fix.lock().unwrap_or_else(|e| e.into_inner()) = Some(fix);
        self.state.fan_out(fix);
    }
}

async fn playback_task(mut runtime: SimulationRuntime, tick: Duration) {
    let mut timer = tokio::time::interval(tick);
    loop {
        timer.tick().await;
        runtime.handle_tick();
    }
}

/// Fused client fed by the simulated playback.
pub struct SimulatedFusedClient {
    state: Arc<SimulationState>,
}

impl FusedLocationClient for SimulatedFusedClient {
    fn last_location(&self) -> Option<Location> {
        *self.state.last_fix.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_updates(
        &self,
        request: UpdateRequest,
        updates: Sender<Location>,
    ) -> UpdateRegistration {
        debug!("Simulated fused backend serves request {request:?}");
        self.state.register(SinkGroup::Fused, updates)
    }
}

/// Manager backend fed by the simulated playback.
///
/// Both sub-providers replay the same route; they only differ in their
/// enabled state.
pub struct SimulatedManager {
    state: Arc<SimulationState>,
    gps_enabled: AtomicBool,
    network_enabled: AtomicBool,
}

impl SimulatedManager {
    fn enabled_flag(&self, provider: SubProvider) -> &AtomicBool {
        match provider {
            SubProvider::Gps => &self.gps_enabled,
            SubProvider::Network => &self.network_enabled,
        }
    }
}

impl LocationManager for SimulatedManager {
    fn is_provider_enabled(&self, provider: SubProvider) -> bool {
        self.enabled_flag(provider).load(Ordering::SeqCst)
    }

    fn last_known_location(&self, _provider: SubProvider) -> Option<Location> {
        *self.state.last_fix.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_updates(
        &self,
        provider: SubProvider,
        _min_interval: Duration,
        _min_distance_m: f32,
        updates: Sender<Location>,
    ) -> UpdateRegistration {
        let group = match provider {
            SubProvider::Gps => SinkGroup::Gps,
            SubProvider::Network => SinkGroup::Network,
        };
        self.state.register(group, updates)
    }
}

/// Platform that replays a fixed route of locations.
///
/// The playback steps through the route cyclically, one point per tick,
/// stamping every fix with the current time. All platform probes default
/// to the friendly state: permission granted, fused service available,
/// both sub-providers enabled.
pub struct SimulatedPlatform {
    permission_granted: AtomicBool,
    fused_available: AtomicBool,
    fused_client: Arc<SimulatedFusedClient>,
    manager: Arc<SimulatedManager>,
    playback: JoinHandle<()>,
}

impl SimulatedPlatform {
    /// Creates the platform and starts replaying `route`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `route`: The points to replay, in order. Replay wraps around at
    ///   the end.
    /// * `tick`: The time between two replayed points.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::InvalidData`] when `route` is empty.
    pub fn new(route: &[Location], tick: Duration) -> Result<Self, Error> {
        if route.is_empty() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "route parameter is empty",
            ));
        }
        let state = Arc::new(SimulationState {
            last_fix: Mutex::new(None),
            sinks: Mutex::new(SinkRegistry::default()),
            next_sink_id: AtomicU64::new(0),
        });
        let runtime = SimulationRuntime {
            route: route.to_vec(),
            next_point: 0,
            state: Arc::clone(&state),
        };
        let playback = tokio::spawn(async move { playback_task(runtime, tick).await });
        Ok(SimulatedPlatform {
            permission_granted: AtomicBool::new(true),
            fused_available: AtomicBool::new(true),
            fused_client: Arc::new(SimulatedFusedClient {
                state: Arc::clone(&state),
            }),
            manager: Arc::new(SimulatedManager {
                state,
                gps_enabled: AtomicBool::new(true),
                network_enabled: AtomicBool::new(true),
            }),
            playback,
        })
    }

    /// Grants or revokes the location permission.
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
    }

    /// Reports the fused service as available or unavailable.
    pub fn set_fused_available(&self, available: bool) {
        self.fused_available.store(available, Ordering::SeqCst);
    }

    /// Enables or disables one of the manager sub-providers.
    pub fn set_provider_enabled(&self, provider: SubProvider, enabled: bool) {
        self.manager
            .enabled_flag(provider)
            .store(enabled, Ordering::SeqCst);
    }
}

impl Drop for SimulatedPlatform {
    fn drop(&mut self) {
        self.playback.abort();
    }
}

impl LocationPlatform for SimulatedPlatform {
    fn has_location_permission(&self) -> bool {
        self.permission_granted.load(Ordering::SeqCst)
    }

    fn fused_service_available(&self) -> bool {
        self.fused_available.load(Ordering::SeqCst)
    }

    fn fused_client(&self) -> Option<Arc<dyn FusedLocationClient>> {
        Some(Arc::clone(&self.fused_client) as Arc<dyn FusedLocationClient>)
    }

    fn location_manager(&self) -> Arc<dyn LocationManager> {
        Arc::clone(&self.manager) as Arc<dyn LocationManager>
    }
}
