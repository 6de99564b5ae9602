// SPDX-FileCopyrightText: 2025 All contributors
//
// SPDX-License-Identifier: GPL-2.0-or-later

//! Common module for the location services
//!
//! Provides the value types that are shared between the location source and
//! its consumers.

pub mod location;
pub mod sensitivity;
pub mod test_helper;
