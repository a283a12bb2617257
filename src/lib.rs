//! Display output HAL for DRM/KMS based Android devices
//!
//! This library keeps per-display output configuration (resolution, color
//! format and depth, overscan, BCSH, HDR mode, gamma LUT) consistent across
//! three places: the system property store, the live connector graph, and
//! the raw `baseparameter` partition that survives reboots.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           Settings UI / display manager (any thread)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              queries, mutators, hotplug, save_config
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  HwOutputDevice (one lock)                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐ │
//! │  │  Topology   │  │    Save     │  │  Timeline / events  │ │
//! │  │  resolver   │  │ read-merge- │  │                     │ │
//! │  │  reconciler │  │    write    │  │                     │ │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//!        │                     │                      │
//!  DisplayResources      BackingStore           PropertyStore
//!  (DRM connectors)   (baseparameter blob)   (getprop/setprop)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use hw_output::{AndroidProperties, DisplayType, HwOutputConfig, HwOutputDevice};
//!
//! let device = HwOutputDevice::new(resources, AndroidProperties, HwOutputConfig::default());
//! device.initialize();
//! device.set_brightness(DisplayType::Primary, 60)?;
//! device.save_config();
//! ```

pub mod baseparameter;
pub mod config;
pub mod device;
pub mod error;
pub mod mode;
pub mod properties;
pub mod resources;
pub mod save;
pub mod timeline;
pub mod topology;

pub use baseparameter::{BackingStore, BaseParameter, DisplayInfo, GammaLut, ScreenInfo};
pub use config::HwOutputConfig;
pub use device::{HwOutputDevice, OverscanDirection};
pub use error::Error;
pub use mode::{DisplayModeEntry, DrmMode, ModeSpec};
pub use properties::{AndroidProperties, DisplayType, MemoryProperties, PropertyStore};
pub use resources::{
    ConnectionState, Connector, ConnectorId, ConnectorType, DisplayResources, PossibleDisplays,
};
pub use timeline::{Attribute, ConfigChanged};

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;
