//! GPSD backed implementation of the platform traits.
//!
//! On hosts with a running GPSD daemon the [`GpsdPlatform`] exposes the
//! daemon as the fused location backend. The host has no low-level
//! location stack, so the manager backend reports every sub-provider as
//! disabled.

use crate::platform::{
    FusedLocationClient, LocationManager, LocationPlatform, SubProvider, UpdateRegistration,
    UpdateRequest,
};
use chrono::{DateTime, Utc};
use common::location::Location;
use futures::StreamExt;
use gpsd_proto::{self, Mode, Tpv};
use std::{
    io::{self, Error, ErrorKind},
    net::SocketAddr,
    str::FromStr,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::mpsc::{Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, warn};

/// A registered consumer of GPSD fixes.
struct RegisteredSink {
    id: u64,
    sender: Sender<Location>,
}

/// State shared between the reader task and the client handle.
struct GpsdReaderRuntime {
    last_fix: Arc<Mutex<Option<Location>>>,
    sinks: Arc<Mutex<Vec<RegisteredSink>>>,
    connected: Arc<AtomicBool>,
}

impl GpsdReaderRuntime {
    fn process_tpv_msg(&self, tpv: &Tpv) {
        let Some(fix) = tpv_to_location(tpv) else {
            return;
        };
        *self.last_fix.lock().unwrap_or_else(|e| e.into_inner()) = Some(fix);
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|sink| match sink.sender.try_send(fix) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    debug!("Update sink {} is full, fix dropped", sink.id);
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }
}

fn tpv_to_location(tpv: &Tpv) -> Option<Location> {
    if let Mode::NoFix = tpv.mode {
        return None;
    }
    let lat = tpv.lat?;
    let lon = tpv.lon?;
    let mut fix = Location::new(lat, lon);
    if let Some(alt) = tpv.alt {
        fix = fix.with_altitude(f64::from(alt));
    }
    let accuracy = match (tpv.epx, tpv.epy) {
        (Some(epx), Some(epy)) => Some(epx.max(epy)),
        (Some(epx), None) => Some(epx),
        (None, Some(epy)) => Some(epy),
        (None, None) => None,
    };
    if let Some(accuracy) = accuracy {
        fix = fix.with_accuracy(f64::from(accuracy));
    }
    if let Some(ref time) = tpv.time
        && let Ok(timestamp) = DateTime::<Utc>::from_str(time)
    {
        fix = fix.with_timestamp(timestamp);
    }
    Some(fix)
}

async fn gpsd_reader(mut stream: TcpStream, runtime: GpsdReaderRuntime) {
    if let Err(e) = stream
        .write_all(gpsd_proto::ENABLE_WATCH_CMD.as_bytes())
        .await
    {
        error!("Failed to enable the GPSD watch mode. Error: {e}");
        runtime.connected.store(false, Ordering::SeqCst);
        return;
    }
    let mut framed = Framed::new(stream, LinesCodec::new());
    while let Some(result) = framed.next().await {
        match result {
            Ok(ref line) => {
                if let Ok(tpv) = serde_json::from_str::<Tpv>(line) {
                    runtime.process_tpv_msg(&tpv);
                }
            }
            Err(e) => {
                error!("GPSD receive error {e:?}");
            }
        }
    }
    runtime.connected.store(false, Ordering::SeqCst);
    debug!("GPSD connection closed");
}

/// Fused location client fed by a GPSD daemon.
///
/// A background task keeps reading TPV reports from the daemon, caches the
/// most recent usable fix and fans every fix out to the registered update
/// sinks. Reports without a fix are ignored.
pub struct GpsdFusedClient {
    last_fix: Arc<Mutex<Option<Location>>>,
    sinks: Arc<Mutex<Vec<RegisteredSink>>>,
    next_sink_id: AtomicU64,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl GpsdFusedClient {
    /// Connects to the GPSD daemon at `address` and starts watching it.
    ///
    /// # Arguments
    /// * `address`: The socket address of the daemon, e.g. `127.0.0.1:2947`.
    ///
    /// # Errors
    /// Fails with [`ErrorKind::InvalidInput`] for an unparsable address and
    /// with the underlying error when the TCP connection cannot be
    /// established.
    pub async fn connect(address: &str) -> Result<Self, Error> {
        let address: SocketAddr = match address.parse() {
            Ok(addr) => addr,
            Err(e) => return Err(io::Error::new(ErrorKind::InvalidInput, e)),
        };
        let socket = TcpStream::connect(address).await?;
        let last_fix = Arc::new(Mutex::new(None));
        let sinks = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let runtime = GpsdReaderRuntime {
            last_fix: Arc::clone(&last_fix),
            sinks: Arc::clone(&sinks),
            connected: Arc::clone(&connected),
        };
        let reader = tokio::spawn(async move { gpsd_reader(socket, runtime).await });
        Ok(GpsdFusedClient {
            last_fix,
            sinks,
            next_sink_id: AtomicU64::new(0),
            connected,
            reader,
        })
    }

    /// Returns whether the daemon connection is still alive.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for GpsdFusedClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl FusedLocationClient for GpsdFusedClient {
    fn last_location(&self) -> Option<Location> {
        *self.last_fix.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn request_updates(
        &self,
        request: UpdateRequest,
        updates: Sender<Location>,
    ) -> UpdateRegistration {
        // GPSD streams at its own pace, the request only shows up in the logs.
        let id = self.next_sink_id.fetch_add(1, Ordering::SeqCst);
        debug!("Registering GPSD update sink {id} for request {request:?}");
        self.sinks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RegisteredSink {
                id,
                sender: updates,
            });
        let sinks = Arc::clone(&self.sinks);
        UpdateRegistration::new(move || {
            sinks
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|sink| sink.id != id);
            debug!("GPSD update sink {id} released");
        })
    }
}

/// Platform whose fused backend is a GPSD daemon.
///
/// Location permission is always granted on such hosts. When the daemon is
/// unreachable the platform stays usable and reports the fused service as
/// unavailable, which sends the [`LocationSource`] down the manager path.
///
/// [`LocationSource`]: crate::LocationSource
pub struct GpsdPlatform {
    client: Option<Arc<GpsdFusedClient>>,
}

impl GpsdPlatform {
    /// Connects to the GPSD daemon at `address`.
    ///
    /// A failed connection is logged and leaves the platform without a
    /// fused backend instead of failing the startup.
    pub async fn connect(address: &str) -> Self {
        match GpsdFusedClient::connect(address).await {
            Ok(client) => GpsdPlatform {
                client: Some(Arc::new(client)),
            },
            Err(e) => {
                warn!("GPSD at {address} is unreachable, fused backend disabled. Error: {e}");
                GpsdPlatform { client: None }
            }
        }
    }
}

impl LocationPlatform for GpsdPlatform {
    fn has_location_permission(&self) -> bool {
        true
    }

    fn fused_service_available(&self) -> bool {
        self.client
            .as_ref()
            .is_some_and(|client| client.is_connected())
    }

    fn fused_client(&self) -> Option<Arc<dyn FusedLocationClient>> {
        self.client
            .clone()
            .map(|client| client as Arc<dyn FusedLocationClient>)
    }

    fn location_manager(&self) -> Arc<dyn LocationManager> {
        Arc::new(DisabledLocationManager)
    }
}

/// Manager stand-in for hosts without a low-level location stack.
///
/// Every sub-provider reports as disabled, so listeners are accepted but
/// never registered anywhere.
pub struct DisabledLocationManager;

impl LocationManager for DisabledLocationManager {
    fn is_provider_enabled(&self, _provider: SubProvider) -> bool {
        false
    }

    fn last_known_location(&self, _provider: SubProvider) -> Option<Location> {
        None
    }

    fn request_updates(
        &self,
        provider: SubProvider,
        _min_interval: Duration,
        _min_distance_m: f32,
        _updates: Sender<Location>,
    ) -> UpdateRegistration {
        debug!("No location stack available, listener for {provider:?} is ignored");
        UpdateRegistration::group(Vec::new())
    }
}
