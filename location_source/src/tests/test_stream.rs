// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{TIMEOUT_MS, scripted_source};
use crate::platform::SubProvider;
use crate::stream::is_unchanged;
use crate::test_helper::wait_until;
use common::sensitivity::LocationSensitivity;
use common::test_helper::location;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::timeout;

#[test_log::test(tokio::test)]
async fn emit_first_update() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut stream = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.026649, 11.282535));

    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(52.026649, 11.282535))));
}

#[test_log::test(tokio::test)]
async fn suppress_update_below_threshold() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut stream = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let first = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(first, Some(Some(location(52.0, 11.0))));

    platform.fused().push_fix(location(52.0005, 11.0005));
    platform.fused().push_fix(location(52.1, 11.1));

    let second = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(second, Some(Some(location(52.1, 11.1))));
}

#[test_log::test(tokio::test)]
async fn suppress_update_when_only_one_axis_moves() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::Low);
    let mut stream = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let first = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(first, Some(Some(location(52.0, 11.0))));

    // The longitude moved far enough but the latitude did not.
    platform.fused().push_fix(location(52.5, 13.0));
    platform.fused().push_fix(location(54.0, 13.0));

    let second = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(second, Some(Some(location(54.0, 13.0))));
}

#[test_log::test(tokio::test)]
async fn emit_update_when_both_axes_move() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::Medium);
    let mut stream = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let first = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(first, Some(Some(location(52.0, 11.0))));

    platform.fused().push_fix(location(53.0, 12.0));
    let second = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(second, Some(Some(location(53.0, 12.0))));
}

#[test]
fn treat_fix_as_unchanged_per_axis() {
    let previous = location(52.0, 11.0);
    assert!(is_unchanged(&previous, &location(52.0, 11.0), 0.001));
    assert!(is_unchanged(&previous, &location(52.0005, 11.0005), 0.001));
    assert!(is_unchanged(&previous, &location(52.0005, 13.0), 0.001));
    assert!(is_unchanged(&previous, &location(54.0, 11.0005), 0.001));
    assert!(!is_unchanged(&previous, &location(52.002, 11.002), 0.001));
}

#[test_log::test(tokio::test)]
async fn yield_single_empty_update_without_permission() {
    let (platform, source) = scripted_source();
    platform.set_permission_granted(false);

    for sensitivity in [
        LocationSensitivity::High,
        LocationSensitivity::Medium,
        LocationSensitivity::Low,
    ] {
        let updates = source.request_location_updates(sensitivity);
        let mut stream = updates.subscribe();
        let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
            .await
            .expect("Failed to receive the empty update in required time");
        assert_eq!(update, Some(None));
        let end = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
            .await
            .expect("Stream did not complete in required time");
        assert_eq!(end, None);
    }
    assert_eq!(platform.fused().total_registrations(), 0);
}

#[test_log::test(tokio::test)]
async fn share_one_upstream_subscription() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut first = updates.subscribe();
    let mut second = updates.clone().subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));

    for stream in [&mut first, &mut second] {
        let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next())
            .await
            .expect("Failed to receive location update in required time");
        assert_eq!(update, Some(Some(location(52.0, 11.0))));
    }
    assert_eq!(platform.fused().total_registrations(), 1);
}

#[test_log::test(tokio::test)]
async fn replay_latest_update_to_new_subscriber() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut first = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), first.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(52.0, 11.0))));

    let mut second = updates.subscribe();
    let replayed = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Failed to receive the replayed update in required time");
    assert_eq!(replayed, Some(Some(location(52.0, 11.0))));
    assert_eq!(platform.fused().total_registrations(), 1);
}

#[test_log::test(tokio::test)]
async fn release_upstream_after_grace_period() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let stream = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    drop(stream);

    wait_until(
        || platform.fused().cancelled_registrations() == 1,
        Duration::from_millis(500),
    )
    .await;
    assert_eq!(platform.fused().active_registrations(), 0);
}

#[test_log::test(tokio::test)]
async fn keep_upstream_during_quick_resubscription() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let first = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    drop(first);
    tokio::time::sleep(Duration::from_millis(30)).await;
    let mut second = updates.subscribe();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(platform.fused().total_registrations(), 1);
    assert_eq!(platform.fused().cancelled_registrations(), 0);

    platform.fused().push_fix(location(52.0, 11.0));
    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(52.0, 11.0))));
}

#[test_log::test(tokio::test)]
async fn restart_upstream_for_new_subscriber_after_release() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut first = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), first.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(52.0, 11.0))));

    drop(first);
    wait_until(
        || platform.fused().cancelled_registrations() == 1,
        Duration::from_millis(500),
    )
    .await;

    let mut second = updates.subscribe();
    let replayed = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Failed to receive the replayed update in required time");
    assert_eq!(replayed, Some(Some(location(52.0, 11.0))));

    wait_until(
        || platform.fused().total_registrations() == 2,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;
    platform.fused().push_fix(location(54.0, 13.0));
    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(54.0, 13.0))));
}

#[test_log::test(tokio::test)]
async fn recheck_permission_when_restarting_upstream() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut first = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), first.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(52.0, 11.0))));

    drop(first);
    wait_until(
        || platform.fused().cancelled_registrations() == 1,
        Duration::from_millis(500),
    )
    .await;

    platform.set_permission_granted(false);
    let mut second = updates.subscribe();
    let denied = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Failed to receive the empty update in required time");
    assert_eq!(denied, Some(None));
    let end = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Stream did not complete in required time");
    assert_eq!(end, None);
    assert_eq!(platform.fused().total_registrations(), 1);
}

#[test_log::test(tokio::test)]
async fn track_suppression_state_per_subscriber() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut first = updates.subscribe();
    wait_until(
        || platform.fused().active_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    platform.fused().push_fix(location(52.0, 11.0));
    let update = timeout(Duration::from_millis(TIMEOUT_MS.into()), first.next())
        .await
        .expect("Failed to receive location update in required time");
    assert_eq!(update, Some(Some(location(52.0, 11.0))));

    platform.fused().push_fix(location(52.0004, 11.0004));
    // Give the forwarder time to refresh the replay cache.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = updates.subscribe();
    let replayed = timeout(Duration::from_millis(TIMEOUT_MS.into()), second.next())
        .await
        .expect("Failed to receive the replayed update in required time");
    assert_eq!(replayed, Some(Some(location(52.0004, 11.0004))));

    let nothing = timeout(Duration::from_millis(50), first.next()).await;
    assert!(nothing.is_err());
}

#[test_log::test(tokio::test)]
async fn keep_stream_open_without_enabled_sub_providers() {
    let (platform, source) = scripted_source();
    platform.set_fused_available(false);
    platform
        .manager()
        .set_provider_enabled(SubProvider::Gps, false);
    platform
        .manager()
        .set_provider_enabled(SubProvider::Network, false);

    let updates = source.request_location_updates(LocationSensitivity::High);
    let mut stream = updates.subscribe();
    let pending = timeout(Duration::from_millis(TIMEOUT_MS.into()), stream.next()).await;
    assert!(pending.is_err());
    assert_eq!(platform.manager().total_registrations(), 0);
}
