//! The output device handle
//!
//! [`HwOutputDevice`] is what the settings service talks to. It owns the
//! display-resource collaborator and the property store, tracks which
//! connectors serve the primary and extend displays, and stages gamma
//! tables until the next save. Every call takes the same lock, so a hot-plug
//! pass from the display thread never interleaves with a save or a query.

use crate::baseparameter::{
    BackingStore, BaseParameter, Bcsh, ColorDepth, GammaLut, OutputFormat, Overscan,
};
use crate::config::HwOutputConfig;
use crate::mode::{DisplayModeEntry, AUTO};
use crate::properties::{
    atoi, attr, format_overscan, parse_overscan, persist_key, DisplayType, PropertyStore,
    PRIMARY_PIN_KEY, THREE_D_MODE_KEY,
};
use crate::resources::{ConnectionState, Connector, ConnectorType, DisplayResources};
use crate::save::{self, ResolutionChoice, SaveContext, StagedLut};
use crate::timeline::{Attribute, ConfigChanged, Timeline};
use crate::topology::{reconcile, resolve_topology, StateChange, Topology, TopologyCommand};
use crate::{Error, Result};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Edge adjusted by [`HwOutputDevice::set_screen_scale`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverscanDirection {
    Left,
    Top,
    Right,
    Bottom,
}

struct Inner<R, P> {
    resources: R,
    props: P,
    config: HwOutputConfig,
    topology: Topology,
    staged: StagedLut,
    timeline: Timeline,
}

/// Display output device
pub struct HwOutputDevice<R, P> {
    inner: Mutex<Inner<R, P>>,
}

impl<R: DisplayResources, P: PropertyStore> HwOutputDevice<R, P> {
    pub fn new(resources: R, props: P, config: HwOutputConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                resources,
                props,
                config,
                topology: Topology::default(),
                staged: StagedLut::default(),
                timeline: Timeline::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R, P>> {
        // State stays consistent across a panicking caller; keep serving
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Receive a [`ConfigChanged`] for every accepted setting change
    pub fn subscribe(&self) -> Receiver<ConfigChanged> {
        self.lock().timeline.subscribe()
    }

    /// Resolve the initial topology
    ///
    /// Returns false if no primary display could be found even after falling
    /// back to every primary-capable connector.
    pub fn initialize(&self) -> bool {
        let mut inner = self.lock();
        if let Err(e) = inner.hotplug_update() {
            warn!("Initial hot-plug pass failed: {}", e);
        }
        if inner.topology.primary.is_none() {
            inner.assign_fallback();
        }
        info!(
            primary = ?inner.topology.primary,
            extend = ?inner.topology.extend,
            "hw_output initialized"
        );
        inner.topology.primary.is_some()
    }

    /// Re-probe every connector and re-assign displays
    ///
    /// Returns false when no primary display is left; the previous assignment
    /// is kept in that case.
    pub fn hotplug_update(&self) -> bool {
        match self.lock().hotplug_update() {
            Ok(()) => true,
            Err(e) => {
                warn!("Hot-plug update failed: {}", e);
                false
            }
        }
    }

    /// Connectors serving each display
    pub fn topology(&self) -> Topology {
        self.lock().topology
    }

    /// Commit the current settings to the baseparameter partition
    pub fn save_config(&self) -> bool {
        match self.lock().save_config() {
            Ok(()) => true,
            Err(e) => {
                warn!("Not saving display configuration: {}", e);
                false
            }
        }
    }

    /// Mode string for `display`, or `Auto`
    pub fn get_cur_mode(&self, display: DisplayType) -> String {
        self.lock().cur_mode(display)
    }

    /// Color mode string for `display`, or `Auto`
    pub fn get_cur_color_mode(&self, display: DisplayType) -> String {
        self.lock().cur_color_mode(display)
    }

    /// Brightness, contrast, saturation and hue, each within 0..=100
    pub fn get_bcsh(&self, display: DisplayType) -> Bcsh {
        self.lock().bcsh(display)
    }

    pub fn get_overscan(&self, display: DisplayType) -> Overscan {
        self.lock().overscan(display)
    }

    /// Connector type serving `display`, [`ConnectorType::UNKNOWN`] if none
    pub fn get_builtin(&self, display: DisplayType) -> ConnectorType {
        self.lock()
            .assigned(display)
            .map_or(ConnectorType::UNKNOWN, |c| c.connector_type)
    }

    pub fn get_connector_state(&self, display: DisplayType) -> Option<ConnectionState> {
        self.lock().assigned(display).map(|c| c.state)
    }

    pub fn get_num_connectors(&self) -> usize {
        self.lock().resources.connectors().len()
    }

    /// Modes supported by the connector serving `display`
    pub fn get_display_modes(&self, display: DisplayType) -> Vec<DisplayModeEntry> {
        let Some(conn) = self.lock().live(display) else {
            return Vec::new();
        };
        conn.modes
            .iter()
            .enumerate()
            .map(|(idx, mode)| DisplayModeEntry::new(mode, conn.id, idx))
            .collect()
    }

    /// `(color_capacity, depth_capacity)` of the connector serving `display`
    pub fn get_color_configs(&self, dpy: DisplayType) -> Option<(u64, u64)> {
        self.lock().live(dpy).map(|c| {
            let configs = (c.color_capacity.unwrap_or(0), c.depth_capacity.unwrap_or(0));
            debug!("color configs for {}: {:?}", dpy.suffix(), configs);
            configs
        })
    }

    pub fn set_mode(&self, dpy: DisplayType, mode: &str) -> Result<bool> {
        debug!("set_mode {} display {:?}", mode, dpy);
        self.lock().set_text(
            &persist_key(attr::RESOLUTION, dpy),
            mode,
            "",
            dpy,
            Attribute::Resolution,
        )
    }

    /// Session-only 3D mode of the primary display
    pub fn set_3d_mode(&self, mode: &str) -> Result<bool> {
        self.lock()
            .set_text(THREE_D_MODE_KEY, mode, "null", DisplayType::Primary, Attribute::Mode3d)
    }

    pub fn set_brightness(&self, display: DisplayType, value: i64) -> Result<bool> {
        self.lock().set_numeric(attr::BRIGHTNESS, display, value, Attribute::Brightness)
    }

    pub fn set_contrast(&self, display: DisplayType, value: i64) -> Result<bool> {
        self.lock().set_numeric(attr::CONTRAST, display, value, Attribute::Contrast)
    }

    pub fn set_saturation(&self, display: DisplayType, value: i64) -> Result<bool> {
        self.lock().set_numeric(attr::SATURATION, display, value, Attribute::Saturation)
    }

    pub fn set_hue(&self, display: DisplayType, value: i64) -> Result<bool> {
        self.lock().set_numeric(attr::HUE, display, value, Attribute::Hue)
    }

    pub fn set_hdr_mode(&self, display: DisplayType, value: i64) -> Result<bool> {
        self.lock().set_numeric(attr::HDR_MODE, display, value, Attribute::HdrMode)
    }

    pub fn set_color_mode(&self, dpy: DisplayType, mode: &str) -> Result<bool> {
        debug!("set_color_mode {} display {:?}", mode, dpy);
        self.lock().set_text(
            &persist_key(attr::COLOR, dpy),
            mode,
            "",
            dpy,
            Attribute::ColorMode,
        )
    }

    /// Change one edge of the overscan
    pub fn set_screen_scale(
        &self,
        display: DisplayType,
        direction: OverscanDirection,
        value: i64,
    ) -> Result<bool> {
        self.lock().set_screen_scale(display, direction, value)
    }

    /// Load a gamma table into the display's CRTC and stage it for saving
    pub fn set_gamma(&self, display: DisplayType, lut: GammaLut) -> Result<()> {
        self.lock().set_gamma(display, lut)
    }
}

impl<R: DisplayResources, P: PropertyStore> Inner<R, P> {
    /// Fresh snapshot of the connector assigned to `display`
    fn assigned(&self, display: DisplayType) -> Option<Connector> {
        let id = self.topology.get(display)?;
        self.resources.connector(id)
    }

    /// Like [`Self::assigned`], but only while it is still connected
    fn live(&self, display: DisplayType) -> Option<Connector> {
        self.assigned(display).filter(Connector::is_connected)
    }

    fn read_record(&self) -> Option<BaseParameter> {
        let record =
            BackingStore::locate(&self.config.backing_paths).and_then(|store| store.read());
        match record {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("baseparameter unavailable: {}", e);
                None
            }
        }
    }

    fn hotplug_update(&mut self) -> Result<()> {
        let mut changes = Vec::new();
        for conn in self.resources.connectors() {
            self.resources.update_modes(conn.id);
            let Some(state) = self.resources.connector(conn.id).map(|c| c.state) else {
                continue;
            };
            debug!(
                id = conn.id,
                old = ?conn.state,
                new = ?state,
                ty = %conn.connector_type,
                "probed connector"
            );
            if state != conn.state {
                changes.push(StateChange {
                    id: conn.id,
                    old: conn.state,
                    new: state,
                });
            }
        }

        self.resources.display_changed();

        let old_primary = self.resources.connector_for_display(DisplayType::Primary);
        let old_extend = self.resources.connector_for_display(DisplayType::External);
        let reconciliation =
            reconcile(&self.resources.connectors(), &changes, old_primary, old_extend)?;

        for command in &reconciliation.commands {
            match *command {
                TopologyCommand::SetPrimary(id) => self.resources.set_primary_display(id),
                TopologyCommand::SetExtend(id) => self.resources.set_extend_display(id),
                TopologyCommand::DisplayChanged => self.resources.display_changed(),
                TopologyCommand::UpdateDisplayRoute => self.resources.update_display_route(),
                TopologyCommand::ClearDisplay => self.resources.clear_display(),
            }
        }

        self.refresh_topology();
        Ok(())
    }

    fn refresh_topology(&mut self) {
        let connectors = self.resources.connectors();
        let pin = self.props.get_or(PRIMARY_PIN_KEY, "null");
        let resources = &self.resources;
        let topology = resolve_topology(&connectors, &pin, |d| resources.connector_for_display(d));

        if topology.shared_crtc {
            if let Some(id) = topology.primary {
                self.resources.set_display_index(id, DisplayType::Primary);
            }
            if let Some(id) = topology.extend {
                self.resources.set_display_index(id, DisplayType::External);
            }
        }
        debug!(
            primary = ?topology.primary,
            extend = ?topology.extend,
            shared_crtc = topology.shared_crtc,
            "topology"
        );
        self.topology = topology;
    }

    /// Offer every primary-capable connector as primary and every connected
    /// external-capable one as extend; the last of each wins
    fn assign_fallback(&mut self) {
        for conn in self.resources.connectors() {
            if conn.can_drive(DisplayType::Primary) {
                self.resources.set_primary_display(conn.id);
                self.topology.primary = Some(conn.id);
            }
            if conn.can_drive(DisplayType::External) && conn.is_connected() {
                self.resources.set_extend_display(Some(conn.id));
                self.topology.extend = Some(conn.id);
            }
        }
    }

    fn save_config(&mut self) -> Result<()> {
        let connectors = self.resources.connectors();
        let main = self.live(DisplayType::Primary);
        let aux = self.live(DisplayType::External);

        let ctx = SaveContext {
            connectors: &connectors,
            props: &self.props,
            config: &self.config,
            main_resolution: ResolutionChoice::resolve(
                &self.props,
                DisplayType::Primary,
                main.as_ref(),
            ),
            aux_resolution: ResolutionChoice::resolve(
                &self.props,
                DisplayType::External,
                aux.as_ref(),
            ),
        };
        save::save(&self.config.backing_paths, &ctx, &mut self.staged)
    }

    fn cur_mode(&self, display: DisplayType) -> String {
        if let Some(mode) = self.props.get_nonempty(&persist_key(attr::RESOLUTION, display)) {
            return mode;
        }
        let (Some(conn), Some(record)) = (self.live(display), self.read_record()) else {
            return AUTO.to_string();
        };

        let slot = record.display(display).saved_slot(conn.connector_type);
        // saved_slot falls back to slot 0, which may belong to another type
        if slot.connector_type != conn.connector_type || !slot.resolution.is_set() {
            return AUTO.to_string();
        }
        match conn.crtc_id.and_then(|crtc| self.resources.active_mode(crtc)) {
            Some(mode) => mode.to_spec().to_string(),
            None => slot.resolution.to_spec().to_string(),
        }
    }

    fn cur_color_mode(&self, display: DisplayType) -> String {
        if let Some(mode) = self.props.get_nonempty(&persist_key(attr::COLOR, display)) {
            return mode;
        }
        let (Some(conn), Some(record)) = (self.live(display), self.read_record()) else {
            return AUTO.to_string();
        };

        let slot = record.display(display).saved_slot(conn.connector_type);
        let auto = slot.depthc == ColorDepth::Automatic
            && slot.format == OutputFormat::YCbCrHighSubsampling;
        // Slot 0 of another type means nothing was saved for this connector
        if slot.connector_type != conn.connector_type || auto {
            return AUTO.to_string();
        }
        format!(
            "{}-{}",
            slot.format.token().unwrap_or(AUTO),
            slot.depthc.token().unwrap_or(AUTO)
        )
    }

    fn bcsh(&self, dpy: DisplayType) -> Bcsh {
        let defaults = self.config.default_bcsh;
        let saved = self.read_record().map(|r| r.display(dpy).bcsh);
        let component = |attribute: &str, saved: Option<u32>, default: u32| -> u32 {
            let value = match self.props.get_nonempty(&persist_key(attribute, dpy)) {
                Some(v) => atoi(&v),
                None => saved.unwrap_or(default) as i64,
            };
            value.clamp(0, 100) as u32
        };

        let bcsh = Bcsh {
            brightness: component(
                attr::BRIGHTNESS,
                saved.map(|b| b.brightness),
                defaults.brightness,
            ),
            contrast: component(attr::CONTRAST, saved.map(|b| b.contrast), defaults.contrast),
            saturation: component(
                attr::SATURATION,
                saved.map(|b| b.saturation),
                defaults.saturation,
            ),
            hue: component(attr::HUE, saved.map(|b| b.hue), defaults.hue),
        };
        debug!("bcsh {}: {:?}", dpy.suffix(), bcsh);
        bcsh
    }

    fn overscan(&self, display: DisplayType) -> Overscan {
        let key = persist_key(attr::OVERSCAN, display);
        if let Some(value) = self.props.get_nonempty(&key) {
            match parse_overscan(&value) {
                Some([left, top, right, bottom]) => {
                    let clamp = |v: i64| v.clamp(0, 100) as u16;
                    return Overscan {
                        left: clamp(left),
                        top: clamp(top),
                        right: clamp(right),
                        bottom: clamp(bottom),
                    };
                }
                None => warn!("Malformed {}={:?}", key, value),
            }
        }

        match self.read_record().map(|r| r.display(display).scan) {
            Some(scan) if !scan.is_zero() => scan,
            _ => Overscan::uniform(self.config.default_overscan),
        }
    }

    fn bump(&mut self, display: DisplayType, attribute: Attribute) -> Result<()> {
        self.timeline.bump(&self.props, display, attribute)?;
        Ok(())
    }

    /// Write `value` to `key` unless it already holds it
    fn set_text(
        &mut self,
        key: &str,
        value: &str,
        default: &str,
        display: DisplayType,
        attribute: Attribute,
    ) -> Result<bool> {
        if self.props.get_or(key, default) == value {
            return Ok(false);
        }
        self.props.set(key, value)?;
        self.bump(display, attribute)?;
        Ok(true)
    }

    /// Numeric setting; the stored value is compared as an integer, unset counts as 50
    fn set_numeric(
        &mut self,
        attribute_key: &str,
        display: DisplayType,
        value: i64,
        attribute: Attribute,
    ) -> Result<bool> {
        let key = persist_key(attribute_key, display);
        if self.props.get_int(&key, 50) == value {
            return Ok(false);
        }
        self.props.set(&key, &value.to_string())?;
        self.bump(display, attribute)?;
        Ok(true)
    }

    fn set_screen_scale(
        &mut self,
        display: DisplayType,
        direction: OverscanDirection,
        value: i64,
    ) -> Result<bool> {
        let key = persist_key(attr::OVERSCAN, display);
        let default_scan = self.config.default_overscan as i64;
        let current = self
            .props
            .get_or(&key, &format_overscan([default_scan; 4]));
        let mut scan = parse_overscan(&current).unwrap_or([default_scan; 4]);

        let edge = match direction {
            OverscanDirection::Left => 0,
            OverscanDirection::Top => 1,
            OverscanDirection::Right => 2,
            OverscanDirection::Bottom => 3,
        };
        scan[edge] = value;

        let updated = format_overscan(scan);
        if updated == current {
            return Ok(false);
        }
        self.props.set(&key, &updated)?;
        self.bump(display, Attribute::Overscan)?;
        Ok(true)
    }

    fn set_gamma(&mut self, display: DisplayType, lut: GammaLut) -> Result<()> {
        let crtc = self.live(display).and_then(|c| c.crtc_id).ok_or_else(|| {
            Error::Gamma(format!("no active CRTC for {} display", display.suffix()))
        })?;
        self.resources.set_gamma(crtc, &lut)?;
        debug!(crtc, size = lut.len(), "gamma applied");
        self.staged.stage(display, lut);
        self.bump(display, Attribute::Gamma)
    }
}
