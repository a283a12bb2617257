//! Connector model and the DRM resource collaborator
//!
//! The connector/CRTC graph belongs to the DRM layer. This crate only sees
//! [`Connector`] snapshots and refers to connectors by [`ConnectorId`]; every
//! id it holds is looked up again before use.

use crate::baseparameter::GammaLut;
use crate::mode::DrmMode;
use crate::properties::DisplayType;
use crate::Result;
use bitflags::bitflags;
use std::fmt;

/// DRM object id of a connector
pub type ConnectorId = u32;

/// DRM connector type (`DRM_MODE_CONNECTOR_*`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ConnectorType(pub u32);

impl ConnectorType {
    pub const UNKNOWN: Self = Self(0);
    pub const VGA: Self = Self(1);
    pub const DVII: Self = Self(2);
    pub const DVID: Self = Self(3);
    pub const DVIA: Self = Self(4);
    pub const COMPOSITE: Self = Self(5);
    pub const SVIDEO: Self = Self(6);
    pub const LVDS: Self = Self(7);
    pub const COMPONENT: Self = Self(8);
    pub const NINE_PIN_DIN: Self = Self(9);
    pub const DISPLAY_PORT: Self = Self(10);
    pub const HDMIA: Self = Self(11);
    pub const HDMIB: Self = Self(12);
    pub const TV: Self = Self(13);
    pub const EDP: Self = Self(14);
    pub const VIRTUAL: Self = Self(15);
    pub const DSI: Self = Self(16);
    pub const DPI: Self = Self(17);

    /// Kernel name of the connector type
    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "VGA",
            2 => "DVI-I",
            3 => "DVI-D",
            4 => "DVI-A",
            5 => "Composite",
            6 => "SVIDEO",
            7 => "LVDS",
            8 => "Component",
            9 => "DIN",
            10 => "DP",
            11 => "HDMI-A",
            12 => "HDMI-B",
            13 => "TV",
            14 => "eDP",
            15 => "Virtual",
            16 => "DSI",
            17 => "DPI",
            _ => "Unknown",
        }
    }

    /// On-chip HDMI transmitter
    pub fn is_builtin_hdmi(self) -> bool {
        self == Self::HDMIA || self == Self::HDMIB
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `drmModeConnection`
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected = 1,
    Disconnected = 2,
    Unknown = 3,
}

bitflags! {
    /// Logical displays a connector may drive
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct PossibleDisplays: u32 {
        const PRIMARY = 1 << 0;
        const EXTERNAL = 1 << 1;
    }
}

/// Snapshot of one DRM connector
#[derive(Debug, Clone, PartialEq)]
pub struct Connector {
    pub id: ConnectorId,
    pub connector_type: ConnectorType,
    pub state: ConnectionState,
    pub possible_displays: PossibleDisplays,
    pub encoder_id: Option<u32>,
    pub crtc_id: Option<u32>,
    pub modes: Vec<DrmMode>,
    /// `hdmi_output_mode_capacity` property, if the connector exposes it
    pub color_capacity: Option<u64>,
    /// `hdmi_output_depth_capacity` property, if the connector exposes it
    pub depth_capacity: Option<u64>,
}

impl Connector {
    pub fn new(id: ConnectorId, connector_type: ConnectorType) -> Self {
        Self {
            id,
            connector_type,
            state: ConnectionState::Disconnected,
            possible_displays: PossibleDisplays::empty(),
            encoder_id: None,
            crtc_id: None,
            modes: Vec::new(),
            color_capacity: None,
            depth_capacity: None,
        }
    }

    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = state;
        self
    }

    pub fn with_possible_displays(mut self, possible: PossibleDisplays) -> Self {
        self.possible_displays = possible;
        self
    }

    /// Route through `encoder_id` to `crtc_id`
    pub fn with_route(mut self, encoder_id: u32, crtc_id: u32) -> Self {
        self.encoder_id = Some(encoder_id);
        self.crtc_id = Some(crtc_id);
        self
    }

    pub fn with_modes(mut self, modes: Vec<DrmMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn can_drive(&self, display: DisplayType) -> bool {
        self.possible_displays.contains(display.capability())
    }
}

/// The DRM resource graph, owned by the display layer
///
/// Implementations wrap libdrm's resources object. All calls are blocking.
pub trait DisplayResources: Send {
    /// Snapshot of every enumerated connector, in enumeration order
    fn connectors(&self) -> Vec<Connector>;

    fn connector(&self, id: ConnectorId) -> Option<Connector> {
        self.connectors().into_iter().find(|c| c.id == id)
    }

    /// Re-probe a connector's state and mode list
    fn update_modes(&mut self, id: ConnectorId);

    /// Recompute the global display-changed status
    fn display_changed(&mut self);

    /// Connector currently assigned to `display`, by the DRM layer's own bookkeeping
    fn connector_for_display(&self, display: DisplayType) -> Option<ConnectorId>;

    fn set_primary_display(&mut self, id: ConnectorId);

    fn set_extend_display(&mut self, id: Option<ConnectorId>);

    /// Tag a connector with the display index it serves
    fn set_display_index(&mut self, id: ConnectorId, display: DisplayType);

    fn update_display_route(&mut self);

    fn clear_display(&mut self);

    /// Mode currently programmed on a CRTC (its `MODE_ID` blob)
    fn active_mode(&self, crtc_id: u32) -> Option<DrmMode>;

    /// Load a gamma LUT into a CRTC
    fn set_gamma(&mut self, crtc_id: u32, lut: &GammaLut) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashMap;

    /// Scriptable resource graph for tests
    #[derive(Debug, Default)]
    pub struct FakeResources {
        pub connectors: Vec<Connector>,
        /// State each connector reports on its next `update_modes`
        pub pending: HashMap<ConnectorId, ConnectionState>,
        pub primary: Option<ConnectorId>,
        pub extend: Option<ConnectorId>,
        pub display_index: HashMap<ConnectorId, DisplayType>,
        pub active: HashMap<u32, DrmMode>,
        pub gamma: Vec<(u32, GammaLut)>,
        pub calls: Vec<&'static str>,
    }

    impl FakeResources {
        pub fn new(connectors: Vec<Connector>) -> Self {
            Self {
                connectors,
                ..Default::default()
            }
        }

        pub fn plug(&mut self, id: ConnectorId, state: ConnectionState) {
            self.pending.insert(id, state);
        }
    }

    impl DisplayResources for FakeResources {
        fn connectors(&self) -> Vec<Connector> {
            self.connectors.clone()
        }

        fn update_modes(&mut self, id: ConnectorId) {
            if let Some(state) = self.pending.remove(&id) {
                if let Some(conn) = self.connectors.iter_mut().find(|c| c.id == id) {
                    conn.state = state;
                }
            }
        }

        fn display_changed(&mut self) {
            self.calls.push("display_changed");
        }

        fn connector_for_display(&self, display: DisplayType) -> Option<ConnectorId> {
            match display {
                DisplayType::Primary => self.primary,
                DisplayType::External => self.extend,
            }
        }

        fn set_primary_display(&mut self, id: ConnectorId) {
            self.calls.push("set_primary");
            self.primary = Some(id);
        }

        fn set_extend_display(&mut self, id: Option<ConnectorId>) {
            self.calls.push("set_extend");
            self.extend = id;
        }

        fn set_display_index(&mut self, id: ConnectorId, display: DisplayType) {
            self.display_index.insert(id, display);
        }

        fn update_display_route(&mut self) {
            self.calls.push("update_route");
        }

        fn clear_display(&mut self) {
            self.calls.push("clear_display");
        }

        fn active_mode(&self, crtc_id: u32) -> Option<DrmMode> {
            self.active.get(&crtc_id).cloned()
        }

        fn set_gamma(&mut self, crtc_id: u32, lut: &GammaLut) -> Result<()> {
            self.gamma.push((crtc_id, lut.clone()));
            Ok(())
        }
    }
}
