//! System property store adapter
//!
//! Properties are plain string key/value pairs. Per-display values live under
//! `persist.vendor.<attr>.<main|aux>`, session-only values under `vendor.<attr>`.

use crate::resources::PossibleDisplays;
use crate::{Error, Result};
use std::collections::HashMap;
use std::process::Command;
use std::sync::{Arc, Mutex};

/// Monotonic "configuration changed" counter read by the composer
pub const TIMELINE_KEY: &str = "vendor.display.timeline";
/// Pins the primary display to a connector name, e.g. `HDMI-A`
pub const PRIMARY_PIN_KEY: &str = "vendor.hwc.device.primary";
/// Session-only 3D output mode
pub const THREE_D_MODE_KEY: &str = "vendor.3d_resolution.main";

/// Attribute names used in per-display keys
pub mod attr {
    pub const RESOLUTION: &str = "resolution";
    pub const COLOR: &str = "color";
    pub const OVERSCAN: &str = "overscan";
    pub const BRIGHTNESS: &str = "brightness";
    pub const CONTRAST: &str = "contrast";
    pub const SATURATION: &str = "saturation";
    pub const HUE: &str = "hue";
    pub const HDR_MODE: &str = "hdr_mode";
    pub const HDCP1X: &str = "hdcp1x";
    pub const RESOLUTION_WHITE: &str = "resolution_white";
}

/// Logical display a connector is assigned to
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisplayType {
    Primary = 0,
    External = 1,
}

impl DisplayType {
    /// Property namespace suffix
    pub fn suffix(self) -> &'static str {
        match self {
            DisplayType::Primary => "main",
            DisplayType::External => "aux",
        }
    }

    /// Capability bit a connector needs to drive this display
    pub fn capability(self) -> PossibleDisplays {
        match self {
            DisplayType::Primary => PossibleDisplays::PRIMARY,
            DisplayType::External => PossibleDisplays::EXTERNAL,
        }
    }
}

/// `persist.vendor.<attr>.<main|aux>`
pub fn persist_key(attr: &str, display: DisplayType) -> String {
    format!("persist.vendor.{}.{}", attr, display.suffix())
}

/// C `atoi`: leading whitespace, optional sign, digits; anything else is 0
pub fn atoi(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: i64 = 0;
    for b in digits.bytes().take_while(|b| b.is_ascii_digit()) {
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }
    if negative {
        -value
    } else {
        value
    }
}

/// Parse `overscan <left>,<top>,<right>,<bottom>`
pub fn parse_overscan(value: &str) -> Option<[i64; 4]> {
    let rest = value.trim().strip_prefix("overscan")?.trim_start();
    let mut out = [0i64; 4];
    let mut fields = rest.split(',');
    for slot in out.iter_mut() {
        *slot = fields.next()?.trim().parse().ok()?;
    }
    if fields.next().is_some() {
        return None;
    }
    Some(out)
}

pub fn format_overscan(values: [i64; 4]) -> String {
    format!("overscan {},{},{},{}", values[0], values[1], values[2], values[3])
}

/// External string key/value store
pub trait PropertyStore: Send {
    /// Current value, `None` when unset
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Value if set and non-empty
    fn get_nonempty(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty())
    }

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get_nonempty(key).unwrap_or_else(|| default.to_string())
    }

    /// Integer value with `atoi` semantics, `default` when unset
    fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get_nonempty(key) {
            Some(v) => atoi(&v),
            None => default,
        }
    }
}

/// In-process property store
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryProperties {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        self
    }
}

impl PropertyStore for MemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Android system properties through `getprop` / `setprop`
#[derive(Debug, Clone, Copy, Default)]
pub struct AndroidProperties;

impl PropertyStore for AndroidProperties {
    fn get(&self, key: &str) -> Option<String> {
        let output = Command::new("getprop").arg(key).output().ok()?;
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let status = Command::new("setprop")
            .args([key, value])
            .status()
            .map_err(|e| Error::Property {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if !status.success() {
            return Err(Error::Property {
                key: key.to_string(),
                reason: format!("setprop exited with {}", status),
            });
        }
        Ok(())
    }
}
