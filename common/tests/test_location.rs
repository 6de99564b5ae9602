// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

use chrono::{DateTime, Utc};
use common::location::Location;
use std::str::FromStr;

fn get_location_as_json<'a>() -> &'a str {
    r#"
    {
        "latitude": 52.025833,
        "longitude": 11.279166,
        "accuracy": 3.5,
        "altitude": null,
        "timestamp": "2005-06-08T10:34:48.283Z"
    }
    "#
}

fn get_location() -> Location {
    Location::new(52.025833, 11.279166)
        .with_accuracy(3.5)
        .with_timestamp(DateTime::<Utc>::from_str("2005-06-08T10:34:48.283Z").unwrap())
}

#[test]
pub fn deserialize_location_from_json() {
    let location = Location::from_json(get_location_as_json())
        .unwrap_or_else(|e| panic!("Failed to deserialize the raw json. Reason: {e}"));
    assert_eq!(location, get_location());
}

#[test]
pub fn passthrough_attributes_start_unset() {
    let location = Location::new(52.025833, 11.279166);
    assert_eq!(location.latitude(), 52.025833);
    assert_eq!(location.longitude(), 11.279166);
    assert_eq!(location.accuracy(), None);
    assert_eq!(location.altitude(), None);
    assert_eq!(location.timestamp(), None);
}

#[test]
pub fn builders_attach_passthrough_attributes() {
    let location = Location::new(0.0, 0.0).with_altitude(104.2).with_accuracy(8.0);
    assert_eq!(location.altitude(), Some(104.2));
    assert_eq!(location.accuracy(), Some(8.0));
}
