//! # jacktrack-server
//!
//! HTTP server library for JackTrack.
//!
//! This library provides the API handlers and state management; the binary
//! wires them to a platform BLE stack and a listener.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod state;
