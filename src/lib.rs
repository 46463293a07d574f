// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Toodle-Backup: scheduled Toodledo exports delivered to cloud storage
//!
//! This crate provides the background pipeline that, once a day per user,
//! refreshes the user's Toodledo credentials, exports their data into a
//! single XML backup and uploads it to their linked Dropbox account.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;
