//! Committing live settings to the baseparameter partition
//!
//! Saving is a read-merge-write cycle: the current record is read first so
//! slots belonging to connector types not present right now survive, the
//! connected connectors' property values are merged in, and only then are
//! both sub-records written back.

use crate::baseparameter::{
    sync_all_filesystems, BackingStore, BaseParameter, Bcsh, ColorDepth, DisplayInfo, Feature,
    GammaLut, OutputFormat, Overscan, Resolution,
};
use crate::config::HwOutputConfig;
use crate::mode::ModeSpec;
use crate::properties::{attr, parse_overscan, persist_key, DisplayType, PropertyStore};
use crate::resources::{Connector, ConnectorType};
use crate::Result;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Gamma tables set since the last save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedLut {
    pub main: Option<GammaLut>,
    pub aux: Option<GammaLut>,
}

impl StagedLut {
    pub fn stage(&mut self, display: DisplayType, lut: GammaLut) {
        match display {
            DisplayType::Primary => self.main = Some(lut),
            DisplayType::External => self.aux = Some(lut),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_none() && self.aux.is_none()
    }
}

/// Requested resolution for one display
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolutionChoice {
    /// `None` when the property says `Auto` or holds no usable mode
    pub spec: Option<ModeSpec>,
    /// Exact pixel clock of the connector mode matching `spec`
    pub matched_clock: Option<u32>,
}

impl ResolutionChoice {
    /// Read the resolution property and look it up in the connector's modes
    pub fn resolve(
        props: &dyn PropertyStore,
        dpy: DisplayType,
        connector: Option<&Connector>,
    ) -> Self {
        let value = props.get_or(&persist_key(attr::RESOLUTION, dpy), "Auto");
        let spec = ModeSpec::from_override(&value);
        let matched_clock = match (spec, connector) {
            (Some(spec), Some(conn)) => spec.find_in(&conn.modes).map(|idx| {
                debug!("found {} mode idx {} for {}", dpy.suffix(), idx, value);
                conn.modes[idx].clock
            }),
            _ => None,
        };
        Self { spec, matched_clock }
    }

    fn resolution(&self) -> Option<Resolution> {
        let spec = self.spec?;
        Some(Resolution {
            clock: self.matched_clock.unwrap_or_else(|| spec.derived_clock()),
            hdisplay: spec.hdisplay,
            hsync_start: spec.hsync_start,
            hsync_end: spec.hsync_end,
            htotal: spec.htotal,
            vdisplay: spec.vdisplay,
            vsync_start: spec.vsync_start,
            vsync_end: spec.vsync_end,
            vtotal: spec.vtotal,
            flags: spec.flags,
        })
    }
}

/// Color-mode property value to format, depth and whether the format is automatic
///
/// An automatic format always carries automatic depth.
pub fn parse_color_mode(value: &str) -> (OutputFormat, ColorDepth, bool) {
    if value.is_empty() || value.starts_with("Auto") {
        return (OutputFormat::YCbCrHighSubsampling, ColorDepth::Automatic, true);
    }

    let (format, auto) = if value.contains("RGB") {
        (OutputFormat::Rgb, false)
    } else if value.contains("YCBCR444") {
        (OutputFormat::YCbCr444, false)
    } else if value.contains("YCBCR422") {
        (OutputFormat::YCbCr422, false)
    } else if value.contains("YCBCR420") {
        (OutputFormat::YCbCr420, false)
    } else {
        (OutputFormat::YCbCrHighSubsampling, true)
    };

    let depth = if auto {
        ColorDepth::Automatic
    } else if value.contains("8bit") {
        ColorDepth::Depth24
    } else if value.contains("10bit") {
        ColorDepth::Depth30
    } else {
        ColorDepth::Automatic
    };

    (format, depth, auto)
}

/// A BCSH component: positive property values (capped at 100) win, else `default`
pub fn bcsh_component(props: &dyn PropertyStore, key: &str, default: u32) -> u32 {
    let value = props.get_int(key, 0);
    if value > 0 {
        value.min(100) as u32
    } else {
        default
    }
}

/// Inputs of one merge pass
pub struct SaveContext<'a> {
    pub connectors: &'a [Connector],
    pub props: &'a dyn PropertyStore,
    pub config: &'a HwOutputConfig,
    pub main_resolution: ResolutionChoice,
    pub aux_resolution: ResolutionChoice,
}

impl SaveContext<'_> {
    fn resolution(&self, display: DisplayType) -> &ResolutionChoice {
        match display {
            DisplayType::Primary => &self.main_resolution,
            DisplayType::External => &self.aux_resolution,
        }
    }

    fn flag(&self, attribute: &str, display: DisplayType) -> bool {
        self.props.get_int(&persist_key(attribute, display), 0) > 0
    }

    /// Update the slot for `connector_type` and the display-wide fields
    fn fill(&self, info: &mut DisplayInfo, dpy: DisplayType, connector_type: ConnectorType) {
        let slot_idx = info.find_slot(connector_type);
        let slot = &mut info.screen_list[slot_idx];
        slot.connector_type = connector_type;
        slot.feature = Feature::empty();

        match self.resolution(dpy).resolution() {
            Some(resolution) => {
                debug!(
                    "{}: slot {} {}x{} clock={} (was {}x{})",
                    dpy.suffix(),
                    slot_idx,
                    resolution.hdisplay,
                    resolution.vdisplay,
                    resolution.clock,
                    slot.resolution.hdisplay,
                    slot.resolution.vdisplay
                );
                slot.resolution = resolution;
            }
            None => {
                slot.feature |= Feature::RESOLUTION_AUTO;
                slot.resolution = Resolution::default();
            }
        }

        let color = self.props.get_or(&persist_key(attr::COLOR, dpy), "Auto");
        let (format, depthc, color_auto) = parse_color_mode(&color);
        slot.format = format;
        slot.depthc = depthc;
        if color_auto {
            slot.feature |= Feature::COLOR_AUTO;
        }
        debug!("{}: color={} -> {:?}/{:?}", dpy.suffix(), color, format, depthc);

        if self.flag(attr::HDCP1X, dpy) {
            slot.feature |= Feature::HDCP1X_EN;
        }
        if self.flag(attr::RESOLUTION_WHITE, dpy) {
            slot.feature |= Feature::RESOLUTION_WHITE_EN;
        }

        let default_scan = self.config.default_overscan as i64;
        let overscan_key = persist_key(attr::OVERSCAN, dpy);
        let scan = match self.props.get_nonempty(&overscan_key) {
            Some(value) => parse_overscan(&value).unwrap_or_else(|| {
                warn!("Malformed {}={:?}, using defaults", overscan_key, value);
                [default_scan; 4]
            }),
            None => [default_scan; 4],
        };
        let clamp = |v: i64| v.clamp(0, 100) as u16;
        info.scan = Overscan {
            left: clamp(scan[0]),
            top: clamp(scan[1]),
            right: clamp(scan[2]),
            bottom: clamp(scan[3]),
        };

        let defaults = self.config.default_bcsh;
        let component = |attribute: &str, default: u32| {
            bcsh_component(self.props, &persist_key(attribute, dpy), default)
        };
        info.bcsh = Bcsh {
            brightness: component(attr::BRIGHTNESS, defaults.brightness),
            contrast: component(attr::CONTRAST, defaults.contrast),
            saturation: component(attr::SATURATION, defaults.saturation),
            hue: component(attr::HUE, defaults.hue),
        };
    }
}

/// Merge live settings into `record`
///
/// Consumes any staged gamma tables.
pub fn merge(record: &mut BaseParameter, ctx: &SaveContext<'_>, staged: &mut StagedLut) {
    let mut main_hdmi = false;
    let mut aux_hdmi = false;
    let connected_hdmi = ctx
        .connectors
        .iter()
        .filter(|c| c.is_connected() && c.connector_type == ConnectorType::HDMIA);
    for conn in connected_hdmi {
        if conn.can_drive(DisplayType::Primary) {
            main_hdmi = true;
        } else if conn.can_drive(DisplayType::External) {
            aux_hdmi = true;
        }
    }
    debug!(main_hdmi, aux_hdmi, "merging baseparameter");

    for conn in ctx.connectors.iter().filter(|c| c.is_connected()) {
        let display = if conn.can_drive(DisplayType::Primary) {
            if main_hdmi && conn.connector_type == ConnectorType::TV {
                continue;
            }
            DisplayType::Primary
        } else if conn.can_drive(DisplayType::External) && conn.encoder_id.is_some() {
            if aux_hdmi && conn.connector_type == ConnectorType::TV {
                continue;
            }
            DisplayType::External
        } else {
            continue;
        };
        ctx.fill(record.display_mut(display), display, conn.connector_type);
    }

    if let Some(lut) = staged.main.take() {
        record.main.mlutdata.store(&lut);
    }
    if let Some(lut) = staged.aux.take() {
        record.aux.mlutdata.store(&lut);
    }
}

/// Read the partition, merge, write it back
///
/// Nothing is written unless the full record was read first.
pub fn save(
    backing_paths: &[PathBuf],
    ctx: &SaveContext<'_>,
    staged: &mut StagedLut,
) -> Result<()> {
    let store = BackingStore::locate(backing_paths).inspect_err(|_| sync_all_filesystems())?;
    let mut record = store.read().inspect_err(|_| sync_all_filesystems())?;
    merge(&mut record, ctx, staged);
    store.write(&record)?;
    info!("Saved display configuration to {}", store.path().display());
    Ok(())
}
