//! Display timings and the textual mode format
//!
//! Modes travel through the property store as
//!
//! ```text
//! <w>x<h>@<refresh>-<hsync_start>-<hsync_end>-<htotal>-
//!     <vsync_start>-<vsync_end>-<vtotal>-<flags hex>
//! ```
//!
//! on one line, with the refresh rate printed to two decimals. `Auto` means
//! no override.

use crate::resources::ConnectorId;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// DRM mode flag bits
pub mod mode_flags {
    pub const INTERLACE: u32 = 1 << 4;
    pub const YUV420: u32 = 1 << 23;
    pub const YUV420_ONLY: u32 = 1 << 24;
}

/// Mode string meaning "no override, let the driver pick"
pub const AUTO: &str = "Auto";
/// Zeroed mode string written by old framework builds
const ZERO_SENTINEL: &str = "0x0p0-0";

/// Refresh rate in Hz derived from the pixel clock (kHz) and totals
pub fn refresh_rate(clock: u32, htotal: u32, vtotal: u32, flags: u32) -> f64 {
    let pixels = htotal as f64 * vtotal as f64;
    if pixels == 0.0 {
        return 0.0;
    }
    let clock = if flags & mode_flags::INTERLACE != 0 {
        clock as f64 * 2.0
    } else {
        clock as f64
    };
    clock / pixels * 1000.0
}

/// A display timing reported by a connector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrmMode {
    pub clock: u32,
    pub hdisplay: u32,
    pub hsync_start: u32,
    pub hsync_end: u32,
    pub htotal: u32,
    pub hskew: u32,
    pub vdisplay: u32,
    pub vsync_start: u32,
    pub vsync_end: u32,
    pub vtotal: u32,
    pub vscan: u32,
    pub flags: u32,
    pub mode_type: u32,
    pub name: String,
}

impl DrmMode {
    pub fn refresh(&self) -> f64 {
        refresh_rate(self.clock, self.htotal, self.vtotal, self.flags)
    }

    pub fn is_interlaced(&self) -> bool {
        self.flags & mode_flags::INTERLACE != 0
    }

    pub fn is_yuv(&self) -> bool {
        self.flags & (mode_flags::YUV420 | mode_flags::YUV420_ONLY) != 0
    }

    /// The mode in property-string form
    pub fn to_spec(&self) -> ModeSpec {
        ModeSpec {
            hdisplay: self.hdisplay,
            vdisplay: self.vdisplay,
            refresh: self.refresh(),
            hsync_start: self.hsync_start,
            hsync_end: self.hsync_end,
            htotal: self.htotal,
            vsync_start: self.vsync_start,
            vsync_end: self.vsync_end,
            vtotal: self.vtotal,
            flags: self.flags,
        }
    }
}

/// A mode parsed from its property-string form
///
/// The pixel clock is not part of the string; it is recovered by matching
/// against the connector's mode list or derived from the refresh rate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModeSpec {
    pub hdisplay: u32,
    pub vdisplay: u32,
    pub refresh: f64,
    pub hsync_start: u32,
    pub hsync_end: u32,
    pub htotal: u32,
    pub vsync_start: u32,
    pub vsync_end: u32,
    pub vtotal: u32,
    pub flags: u32,
}

impl ModeSpec {
    /// Interpret a resolution property value
    ///
    /// `None` for `Auto`, the zeroed sentinel, a zero-sized mode, or a value
    /// that does not parse.
    pub fn from_override(value: &str) -> Option<Self> {
        if value.starts_with(AUTO) || value.starts_with(ZERO_SENTINEL) {
            return None;
        }
        match value.parse::<Self>() {
            Ok(spec) if spec.hdisplay != 0 && spec.vdisplay != 0 => Some(spec),
            Ok(_) => None,
            Err(e) => {
                warn!("Ignoring resolution override: {}", e);
                None
            }
        }
    }

    pub fn is_interlaced(&self) -> bool {
        self.flags & mode_flags::INTERLACE != 0
    }

    /// Refresh rate as printed in the mode string
    pub fn refresh_text(&self) -> String {
        format!("{:.2}", self.refresh)
    }

    /// True if `mode` has the same geometry and the same two-decimal refresh
    pub fn matches(&self, mode: &DrmMode) -> bool {
        mode.hdisplay == self.hdisplay
            && mode.vdisplay == self.vdisplay
            && mode.hsync_start == self.hsync_start
            && mode.hsync_end == self.hsync_end
            && mode.htotal == self.htotal
            && mode.vsync_start == self.vsync_start
            && mode.vsync_end == self.vsync_end
            && mode.vtotal == self.vtotal
            && format!("{:.2}", mode.refresh()) == self.refresh_text()
    }

    /// Index of the first matching mode in `modes`
    pub fn find_in(&self, modes: &[DrmMode]) -> Option<usize> {
        modes.iter().position(|m| self.matches(m))
    }

    /// Pixel clock in kHz computed from totals and refresh
    pub fn derived_clock(&self) -> u32 {
        let mut refresh = self.refresh;
        if self.is_interlaced() {
            refresh /= 2.0;
        }
        (self.htotal as f64 * self.vtotal as f64 * refresh / 1000.0) as u32
    }
}

impl fmt::Display for ModeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@{:.2}-{}-{}-{}-{}-{}-{}-{:x}",
            self.hdisplay,
            self.vdisplay,
            self.refresh,
            self.hsync_start,
            self.hsync_end,
            self.htotal,
            self.vsync_start,
            self.vsync_end,
            self.vtotal,
            self.flags
        )
    }
}

impl FromStr for ModeSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidMode(s.to_string());
        let int = |v: &str| v.parse::<u32>().map_err(|_| invalid());

        let (width, rest) = s.split_once('x').ok_or_else(invalid)?;
        let (height, rest) = rest.split_once('@').ok_or_else(invalid)?;
        let fields: Vec<&str> = rest.split('-').collect();
        if fields.len() != 8 {
            return Err(invalid());
        }

        let refresh: f64 = fields[0].parse().map_err(|_| invalid())?;
        if !refresh.is_finite() || refresh < 0.0 {
            return Err(invalid());
        }

        Ok(Self {
            hdisplay: int(width)?,
            vdisplay: int(height)?,
            refresh,
            hsync_start: int(fields[1])?,
            hsync_end: int(fields[2])?,
            htotal: int(fields[3])?,
            vsync_start: int(fields[4])?,
            vsync_end: int(fields[5])?,
            vtotal: int(fields[6])?,
            flags: u32::from_str_radix(fields[7], 16).map_err(|_| invalid())?,
        })
    }
}

/// One entry of the supported-mode list handed to the settings UI
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayModeEntry {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: f32,
    pub clock: u32,
    pub flags: u32,
    pub interlace: bool,
    pub yuv: bool,
    pub connector_id: ConnectorId,
    pub mode_type: u32,
    pub idx: usize,
    pub hsync_start: u32,
    pub hsync_end: u32,
    pub htotal: u32,
    pub hskew: u32,
    pub vsync_start: u32,
    pub vsync_end: u32,
    pub vtotal: u32,
    pub vscan: u32,
}

impl DisplayModeEntry {
    pub fn new(mode: &DrmMode, connector_id: ConnectorId, idx: usize) -> Self {
        Self {
            width: mode.hdisplay,
            height: mode.vdisplay,
            refresh_rate: mode.refresh() as f32,
            clock: mode.clock,
            flags: mode.flags,
            interlace: mode.is_interlaced(),
            yuv: mode.is_yuv(),
            connector_id,
            mode_type: mode.mode_type,
            idx,
            hsync_start: mode.hsync_start,
            hsync_end: mode.hsync_end,
            htotal: mode.htotal,
            hskew: mode.hskew,
            vsync_start: mode.vsync_start,
            vsync_end: mode.vsync_end,
            vtotal: mode.vtotal,
            vscan: mode.vscan,
        }
    }
}

#[cfg(test)]
pub(crate) fn cea_1080p60() -> DrmMode {
    DrmMode {
        clock: 148500,
        hdisplay: 1920,
        hsync_start: 2008,
        hsync_end: 2052,
        htotal: 2200,
        vdisplay: 1080,
        vsync_start: 1084,
        vsync_end: 1089,
        vtotal: 1125,
        flags: 0x5,
        name: "1920x1080".to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_mode_string() {
        let spec: ModeSpec = "1920x1080@60.00-2008-2052-2200-1084-1089-1125-5".parse().unwrap();
        assert_eq!(spec.hdisplay, 1920);
        assert_eq!(spec.vdisplay, 1080);
        assert_eq!(spec.htotal, 2200);
        assert_eq!(spec.vtotal, 1125);
        assert_eq!(spec.flags, 5);
        assert_eq!(spec.refresh_text(), "60.00");
    }

    #[test]
    fn test_override_sentinels() {
        assert!(ModeSpec::from_override("Auto").is_none());
        assert!(ModeSpec::from_override("0x0p0-0").is_none());
        assert!(ModeSpec::from_override("0x0@0.00-0-0-0-0-0-0-0").is_none());
        assert!(ModeSpec::from_override("garbage").is_none());
        assert!(ModeSpec::from_override("1280x720@60.00-1390-1430-1650-725-730-750-5").is_some());
    }

    #[test]
    fn test_live_mode_matches_its_own_string() {
        let mode = cea_1080p60();
        let text = mode.to_spec().to_string();
        assert_eq!(text, "1920x1080@60.00-2008-2052-2200-1084-1089-1125-5");

        let spec = ModeSpec::from_override(&text).unwrap();
        assert!(spec.matches(&mode));
        assert_eq!(spec.find_in(&[DrmMode::default(), mode]), Some(1));
    }

    #[test]
    fn test_refresh_mismatch_is_not_a_match() {
        let mode = cea_1080p60();
        let mut spec = mode.to_spec();
        spec.refresh = 59.94;
        assert!(!spec.matches(&mode));
    }

    #[test]
    fn test_derived_clock() {
        let spec: ModeSpec = "1920x1080@60.00-2008-2052-2200-1084-1089-1125-5".parse().unwrap();
        assert_eq!(spec.derived_clock(), 148500);

        let interlaced: ModeSpec = "1920x1080@60.00-2008-2052-2200-542-547-562-15".parse().unwrap();
        assert_eq!(interlaced.derived_clock(), 2200 * 562 * 30 / 1000);
    }

    #[test]
    fn test_interlaced_refresh_doubles_field_rate() {
        let mut mode = cea_1080p60();
        mode.vtotal = 1125;
        mode.flags = mode_flags::INTERLACE;
        mode.clock = 74250;
        assert_eq!(format!("{:.2}", mode.refresh()), "60.00");
        assert!(DisplayModeEntry::new(&mode, 7, 0).interlace);
    }

    #[test]
    fn test_yuv_flags() {
        let mut mode = cea_1080p60();
        mode.flags = mode_flags::YUV420;
        let entry = DisplayModeEntry::new(&mode, 7, 3);
        assert!(entry.yuv);
        assert!(!entry.interlace);
        assert_eq!(entry.connector_id, 7);
        assert_eq!(entry.idx, 3);
    }

    proptest! {
        #[test]
        fn mode_string_round_trips(
            w in 1u32..8192, h in 1u32..8192,
            centi_hz in 0u32..24000,
            hs in 0u32..10000, he in 0u32..10000, ht in 0u32..10000,
            vs in 0u32..10000, ve in 0u32..10000, vt in 0u32..10000,
            flags in any::<u32>(),
        ) {
            let text = format!(
                "{}x{}@{}.{:02}-{}-{}-{}-{}-{}-{}-{:x}",
                w, h, centi_hz / 100, centi_hz % 100, hs, he, ht, vs, ve, vt, flags
            );
            let spec: ModeSpec = text.parse().unwrap();
            prop_assert_eq!(spec.to_string(), text);
        }
    }
}
