// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! fixture-cache library: a freshness-bounded cache in front of a
//! script-rendered fixtures site.
//!
//! This library crate exposes the core modules for the binary and for
//! integration testing.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod renderer;
pub mod resilience;
pub mod rest;
pub mod service;
pub mod singleflight;
pub mod store;
