//! Static configuration for the output HAL
//!
//! The defaults match the Rockchip/Amlogic board layouts this HAL ships on.
//! A JSON file can override them for bring-up on a new board.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Candidate baseparameter partitions, probed in order
pub const DEFAULT_BACKING_PATHS: &[&str] = &[
    "/dev/block/platform/1021c000.dwmmc/by-name/baseparameter",
    "/dev/block/platform/30020000.dwmmc/by-name/baseparameter",
    "/dev/block/platform/fe330000.sdhci/by-name/baseparameter",
    "/dev/block/platform/ff520000.dwmmc/by-name/baseparameter",
    "/dev/block/platform/ff0f0000.dwmmc/by-name/baseparameter",
    "/dev/block/rknand_baseparameter",
];

pub const DEFAULT_BRIGHTNESS: u32 = 50;
pub const DEFAULT_CONTRAST: u32 = 50;
pub const DEFAULT_SATURATION: u32 = 50;
pub const DEFAULT_HUE: u32 = 50;
pub const DEFAULT_OVERSCAN: u16 = 100;

/// Brightness, contrast, saturation and hue defaults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BcshDefaults {
    pub brightness: u32,
    pub contrast: u32,
    pub saturation: u32,
    pub hue: u32,
}

impl Default for BcshDefaults {
    fn default() -> Self {
        Self {
            brightness: DEFAULT_BRIGHTNESS,
            contrast: DEFAULT_CONTRAST,
            saturation: DEFAULT_SATURATION,
            hue: DEFAULT_HUE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwOutputConfig {
    #[serde(default = "default_backing_paths")]
    pub backing_paths: Vec<PathBuf>,

    #[serde(default)]
    pub default_bcsh: BcshDefaults,

    #[serde(default = "default_overscan")]
    pub default_overscan: u16,
}

fn default_backing_paths() -> Vec<PathBuf> {
    DEFAULT_BACKING_PATHS.iter().map(PathBuf::from).collect()
}

fn default_overscan() -> u16 {
    DEFAULT_OVERSCAN
}

impl Default for HwOutputConfig {
    fn default() -> Self {
        Self {
            backing_paths: default_backing_paths(),
            default_bcsh: BcshDefaults::default(),
            default_overscan: DEFAULT_OVERSCAN,
        }
    }
}

impl HwOutputConfig {
    /// Config whose only backing store candidate is `path`
    pub fn with_backing_path(path: impl Into<PathBuf>) -> Self {
        Self {
            backing_paths: vec![path.into()],
            ..Self::default()
        }
    }

    /// Load a config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        if config.backing_paths.is_empty() {
            return Err(Error::Config(format!("{}: backing_paths is empty", path.display())));
        }
        tracing::info!("Loaded output config from {:?}", path);
        Ok(config)
    }

    /// Load a config, falling back to the built-in defaults
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default output config: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "backing_paths": ["/tmp/bp.img"] }}"#).unwrap();

        let config = HwOutputConfig::load(file.path()).unwrap();
        assert_eq!(config.backing_paths, vec![PathBuf::from("/tmp/bp.img")]);
        assert_eq!(config.default_bcsh, BcshDefaults::default());
        assert_eq!(config.default_overscan, 100);
    }

    #[test]
    fn test_empty_probe_list_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "backing_paths": [] }}"#).unwrap();

        assert!(HwOutputConfig::load(file.path()).is_err());
        let config = HwOutputConfig::load_or_default(file.path());
        assert_eq!(config.backing_paths.len(), DEFAULT_BACKING_PATHS.len());
    }
}
