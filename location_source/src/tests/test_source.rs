// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{TIMEOUT_MS, scripted_source};
use crate::platform::{Priority, SubProvider};
use crate::test_helper::wait_until;
use common::sensitivity::LocationSensitivity;
use common::test_helper::location;
use std::time::Duration;

#[test]
fn use_fused_backend_when_service_is_available() {
    let (platform, source) = scripted_source();
    platform.fused().set_last(Some(location(52.026649, 11.282535)));

    assert_eq!(
        source.last_known_location(),
        Some(location(52.026649, 11.282535))
    );
    assert_eq!(platform.availability_checks(), 1);
}

#[test]
fn report_no_location_before_first_fix() {
    let (_, source) = scripted_source();
    assert_eq!(source.last_known_location(), None);
}

#[test]
fn fall_back_to_manager_backend_without_fused_service() {
    let (platform, source) = scripted_source();
    platform.set_fused_available(false);
    platform
        .manager()
        .set_last_known(SubProvider::Gps, Some(location(52.0, 11.0)));

    assert_eq!(source.last_known_location(), Some(location(52.0, 11.0)));
}

#[test]
fn fall_back_to_manager_backend_without_fused_client() {
    let (platform, source) = scripted_source();
    platform.withhold_fused_client();
    platform
        .manager()
        .set_last_known(SubProvider::Gps, Some(location(52.0, 11.0)));

    assert_eq!(source.last_known_location(), Some(location(52.0, 11.0)));
}

#[test]
fn read_last_known_location_from_gps_sub_provider() {
    let (platform, source) = scripted_source();
    platform.set_fused_available(false);
    platform
        .manager()
        .set_last_known(SubProvider::Network, Some(location(48.0, 9.0)));

    assert_eq!(source.last_known_location(), None);

    platform
        .manager()
        .set_last_known(SubProvider::Gps, Some(location(52.0, 11.0)));
    assert_eq!(source.last_known_location(), Some(location(52.0, 11.0)));
}

#[test]
fn select_backend_lazily_on_first_request() {
    let (platform, source) = scripted_source();
    assert_eq!(platform.availability_checks(), 0);

    let _ = source.last_known_location();
    assert_eq!(platform.availability_checks(), 1);
}

#[test]
fn keep_selected_backend_after_availability_change() {
    let (platform, source) = scripted_source();
    platform.fused().set_last(Some(location(52.0, 11.0)));
    assert_eq!(source.last_known_location(), Some(location(52.0, 11.0)));

    platform.set_fused_available(false);
    platform.fused().set_last(Some(location(54.0, 13.0)));
    assert_eq!(source.last_known_location(), Some(location(54.0, 13.0)));
    assert_eq!(platform.availability_checks(), 1);
}

#[test_log::test(tokio::test)]
async fn request_high_accuracy_updates_from_fused_backend() {
    let (platform, source) = scripted_source();
    let updates = source.request_location_updates(LocationSensitivity::High);
    let _stream = updates.subscribe();
    wait_until(
        || platform.fused().total_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    let requests = platform.fused().issued_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].priority(), Priority::HighAccuracy);
    assert_eq!(requests[0].interval(), Duration::from_millis(10));
    assert!(requests[0].wait_for_accurate_fix());
}

#[test_log::test(tokio::test)]
async fn register_manager_listeners_for_enabled_sub_providers() {
    let (platform, source) = scripted_source();
    platform.set_fused_available(false);

    let updates = source.request_location_updates(LocationSensitivity::High);
    let _stream = updates.subscribe();
    wait_until(
        || platform.manager().total_registrations() == 2,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    let issued = platform.manager().issued_registrations();
    let expected_interval = Duration::from_millis(5000);
    assert!(issued.contains(&(SubProvider::Gps, expected_interval, 0.0)));
    assert!(issued.contains(&(SubProvider::Network, expected_interval, 0.0)));
}

#[test_log::test(tokio::test)]
async fn skip_disabled_sub_provider_when_registering() {
    let (platform, source) = scripted_source();
    platform.set_fused_available(false);
    platform
        .manager()
        .set_provider_enabled(SubProvider::Network, false);

    let updates = source.request_location_updates(LocationSensitivity::High);
    let _stream = updates.subscribe();
    wait_until(
        || platform.manager().total_registrations() == 1,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    let issued = platform.manager().issued_registrations();
    assert_eq!(
        issued,
        vec![(SubProvider::Gps, Duration::from_millis(5000), 0.0)]
    );
}

#[test_log::test(tokio::test)]
async fn deregister_manager_listeners_after_grace_period() {
    let (platform, source) = scripted_source();
    platform.set_fused_available(false);

    let updates = source.request_location_updates(LocationSensitivity::High);
    let stream = updates.subscribe();
    wait_until(
        || platform.manager().active_registrations() == 2,
        Duration::from_millis(TIMEOUT_MS.into()),
    )
    .await;

    drop(stream);

    wait_until(
        || platform.manager().cancelled_registrations() == 2,
        Duration::from_millis(500),
    )
    .await;
    assert_eq!(platform.manager().active_registrations(), 0);
}
