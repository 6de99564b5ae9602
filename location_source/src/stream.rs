use crate::platform::LocationPlatform;
use crate::provider::LocationProvider;
use common::location::Location;
use common::sensitivity::LocationSensitivity;
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// Time in milliseconds the shared upstream subscription stays alive after
/// the last subscriber left, to absorb quick resubscription.
const GRACE_PERIOD_MS: u64 = 100;

/// Capacity of the multicast stage between the forwarding task and the
/// subscribers. Slow subscribers lose the oldest updates first.
const UPDATE_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the raw channel between a provider registration and the
/// forwarding task.
const RAW_SINK_CAPACITY: usize = 16;

/// Returns whether `next` is treated as unchanged relative to `previous`.
///
/// A fix only counts as moved when both axes moved by at least
/// `threshold`; a delta on a single axis is not enough and keeps the fix
/// suppressed.
pub(crate) fn is_unchanged(previous: &Location, next: &Location, threshold: f64) -> bool {
    let lat_diff = (previous.latitude() - next.latitude()).abs();
    let lon_diff = (previous.longitude() - next.longitude()).abs();
    lat_diff < threshold || lon_diff < threshold
}

/// Bookkeeping of the shared upstream subscription.
struct RuntimeState {
    /// Number of live subscriber streams, including already completed ones
    /// that were not dropped yet.
    subscribers: usize,
    /// Bumped on every subscription; lets a pending grace timer detect that
    /// the world changed while it slept.
    epoch: u64,
    /// The forwarding task while the upstream subscription is open.
    upstream: Option<JoinHandle<()>>,
    /// The pending teardown timer while no subscriber is attached.
    grace: Option<JoinHandle<()>>,
}

/// Shared runtime behind one `request_location_updates` call.
///
/// Owns the multicast stage, the latest-value replay cache and the
/// lifecycle of the single upstream provider subscription that all
/// subscribers share.
pub(crate) struct SharedUpdateStream {
    platform: Arc<dyn LocationPlatform>,
    provider: Arc<dyn LocationProvider>,
    sensitivity: LocationSensitivity,
    updates: broadcast::Sender<Location>,
    latest: Arc<Mutex<Option<Location>>>,
    state: Mutex<RuntimeState>,
}

impl Drop for SharedUpdateStream {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(upstream) = state.upstream.take() {
            upstream.abort();
        }
        if let Some(grace) = state.grace.take() {
            grace.abort();
        }
    }
}

/// Multi-subscriber handle to one filtered location update stream.
///
/// Every [`subscribe`](LocationUpdates::subscribe) call attaches a new
/// subscriber to the same underlying provider subscription. The handle is
/// cheap to clone; clones refer to the same shared stream.
#[derive(Clone)]
pub struct LocationUpdates {
    shared: Arc<SharedUpdateStream>,
}

impl LocationUpdates {
    pub(crate) fn new(
        platform: Arc<dyn LocationPlatform>,
        provider: Arc<dyn LocationProvider>,
        sensitivity: LocationSensitivity,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        LocationUpdates {
            shared: Arc::new(SharedUpdateStream {
                platform,
                provider,
                sensitivity,
                updates,
                latest: Arc::new(Mutex::new(None)),
                state: Mutex::new(RuntimeState {
                    subscribers: 0,
                    epoch: 0,
                    upstream: None,
                    grace: None,
                }),
            }),
        }
    }

    /// Attaches a new subscriber to the shared stream.
    ///
    /// The first subscriber (and the first one after a teardown) starts the
    /// upstream subscription; at that point the location permission is
    /// checked. Without permission the returned stream yields a single
    /// `None` and completes. With permission the stream replays the most
    /// recent known value, then yields every upstream fix that moved far
    /// enough on both axes, and never completes on its own.
    pub fn subscribe(&self) -> LocationStream {
        let shared = &self.shared;
        let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers += 1;
        state.epoch += 1;
        if let Some(grace) = state.grace.take() {
            grace.abort();
        }
        let guard = SubscriberGuard {
            shared: Arc::clone(shared),
        };
        let upstream_running = state
            .upstream
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if !upstream_running && !shared.platform.has_location_permission() {
            debug!("Location permission not granted, subscriber receives a single empty value");
            return LocationStream::denied(guard);
        }
        let events = BroadcastStream::new(shared.updates.subscribe());
        if !upstream_running {
            state.upstream = Some(spawn_forwarder(
                Arc::clone(&shared.provider),
                shared.updates.clone(),
                Arc::clone(&shared.latest),
            ));
        }
        let replay = *shared.latest.lock().unwrap_or_else(|e| e.into_inner());
        drop(state);
        LocationStream::live(events, replay, shared.sensitivity.diff_threshold(), guard)
    }
}

/// Spawns the task draining the provider registration into the multicast
/// stage.
///
/// The registration handle lives inside the task, so aborting the task on
/// teardown releases the platform callback as well.
fn spawn_forwarder(
    provider: Arc<dyn LocationProvider>,
    updates: broadcast::Sender<Location>,
    latest: Arc<Mutex<Option<Location>>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (sink, mut fixes) = mpsc::channel(RAW_SINK_CAPACITY);
        let _registration = provider.subscribe(sink);
        while let Some(fix) = fixes.recv().await {
            *latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(fix);
            let _ = updates.send(fix);
        }
        debug!("Provider update channel closed, forwarding ends");
    })
}

/// Keeps the subscriber count of the shared stream accurate.
///
/// Dropping the last guard arms the grace timer that eventually tears the
/// upstream subscription down.
struct SubscriberGuard {
    shared: Arc<SharedUpdateStream>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        state.subscribers -= 1;
        if state.subscribers > 0 || state.upstream.is_none() {
            return;
        }
        let armed_epoch = state.epoch;
        let shared = Arc::downgrade(&self.shared);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                state.grace = Some(runtime.spawn(async move {
                    tokio::time::sleep(Duration::from_millis(GRACE_PERIOD_MS)).await;
                    let Some(shared) = shared.upgrade() else {
                        return;
                    };
                    let mut state = shared.state.lock().unwrap_or_else(|e| e.into_inner());
                    if state.epoch != armed_epoch {
                        return;
                    }
                    if state.subscribers == 0
                        && let Some(upstream) = state.upstream.take()
                    {
                        upstream.abort();
                        debug!("Grace period elapsed without subscribers, upstream released");
                    }
                    state.grace = None;
                }));
            }
            Err(_) => {
                // No runtime to run the grace timer on, release right away.
                if let Some(upstream) = state.upstream.take() {
                    upstream.abort();
                }
            }
        }
    }
}

enum SubscriberFeed {
    /// Permission was missing when the subscriber attached.
    Denied,
    /// Attached to the multicast stage.
    Live {
        events: BroadcastStream<Location>,
        replay: Option<Location>,
        last_emitted: Option<Location>,
        threshold: f64,
    },
}

/// One subscriber of a [`LocationUpdates`] stream.
///
/// Yields `Some(location)` for every sufficiently-different fix. The only
/// `None` item is the single permission-denied emission, after which the
/// stream completes.
pub struct LocationStream {
    feed: SubscriberFeed,
    done: bool,
    _subscription: SubscriberGuard,
}

impl LocationStream {
    fn denied(subscription: SubscriberGuard) -> Self {
        LocationStream {
            feed: SubscriberFeed::Denied,
            done: false,
            _subscription: subscription,
        }
    }

    fn live(
        events: BroadcastStream<Location>,
        replay: Option<Location>,
        threshold: f64,
        subscription: SubscriberGuard,
    ) -> Self {
        LocationStream {
            feed: SubscriberFeed::Live {
                events,
                replay,
                last_emitted: None,
                threshold,
            },
            done: false,
            _subscription: subscription,
        }
    }
}

impl Stream for LocationStream {
    type Item = Option<Location>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match &mut this.feed {
            SubscriberFeed::Denied => {
                this.done = true;
                Poll::Ready(Some(None))
            }
            SubscriberFeed::Live {
                events,
                replay,
                last_emitted,
                threshold,
            } => {
                if let Some(fix) = replay.take() {
                    *last_emitted = Some(fix);
                    return Poll::Ready(Some(Some(fix)));
                }
                loop {
                    match Pin::new(&mut *events).poll_next(cx) {
                        Poll::Ready(Some(Ok(fix))) => {
                            if let Some(previous) = last_emitted
                                && is_unchanged(previous, &fix, *threshold)
                            {
                                continue;
                            }
                            *last_emitted = Some(fix);
                            return Poll::Ready(Some(Some(fix)));
                        }
                        Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                            warn!("Subscriber lagged behind, {count} updates were dropped");
                            continue;
                        }
                        Poll::Ready(None) => {
                            this.done = true;
                            return Poll::Ready(None);
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}
