//! # jacktrack-core
//!
//! Core logic for JackTrack, a companion for golf rounds played with
//! Bluetooth-tagged balls.
//!
//! This crate provides:
//! - The BLE session: permissions, adapter start-up, fixed-window discovery
//!   and a single tracked connection with its service table
//! - Round history with aggregate statistics
//! - User settings
//! - Backup export/import over a flat JSON document store
//! - Configuration management
//!
//! ## Architecture
//!
//! - [`bluetooth`] - [`BleSession`] and its four parts
//! - [`platform`] - the [`BlePlatform`] boundary the session drives
//! - [`rounds`] - round history
//! - [`settings`] - user settings
//! - [`backup`] - export, import and wipe of all stored data
//! - [`storage`] - persistent key-value document store
//! - [`config`] - application configuration loading, saving, and validation
//! - [`error`] - unified error types for the crate
//! - [`types`] - shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod backup;
pub mod bluetooth;
#[cfg(feature = "bluetooth")]
pub mod bluez;
pub mod config;
pub mod error;
#[cfg(any(test, feature = "mock-bluetooth"))]
pub mod mock;
pub mod platform;
pub mod rounds;
pub mod settings;
pub mod storage;
pub mod types;

// Re-export primary types for convenience
pub use backup::Backup;
pub use bluetooth::{
    AdapterState, BleSession, Connection, ConnectError, Granted, SessionError, SessionResult,
};
#[cfg(feature = "bluetooth")]
pub use bluez::BluerPlatform;
pub use config::{
    is_valid_mac_address, BleConfig, Config, ConfigError, ConfigResult, ServerConfig,
    StorageConfig,
};
pub use error::{JackTrackError, Result};
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use mock::{MockPlatform, PlatformCall};
pub use platform::{BlePlatform, Clock, PlatformError, PlatformResult, TokioClock};
pub use rounds::{
    HoleScore, RoundDraft, RoundError, RoundFilter, RoundHistory, RoundRecord, RoundResult,
    RoundStats, RoundStatus,
};
pub use settings::{Settings, SettingsPatch, SettingsStore};
pub use storage::{
    default_data_dir, BlobStore, FileBlobStore, MemoryBlobStore, StoreError, StoreResult,
};
pub use types::{
    CharacteristicInfo, ConnectionState, Permission, PeripheralRecord, ServiceInfo, ServiceTable,
    StartOptions,
};
