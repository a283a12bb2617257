//! Primary/extend connector resolution
//!
//! Two decisions live here, both free of I/O:
//! - [`resolve_topology`] picks the connectors this HAL reports as primary and
//!   extend, including the shared-CRTC board quirk.
//! - [`reconcile`] turns a hot-plug diff into the commands the DRM layer must
//!   run to re-assign its displays.

use crate::properties::DisplayType;
use crate::resources::{ConnectionState, Connector, ConnectorId};
use crate::{Error, Result};
use tracing::{debug, error, info};

/// Connectors currently serving each display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Topology {
    pub primary: Option<ConnectorId>,
    pub extend: Option<ConnectorId>,
    /// Resolved by the two-connector shared-CRTC rule
    pub shared_crtc: bool,
}

impl Topology {
    pub fn get(&self, display: DisplayType) -> Option<ConnectorId> {
        match display {
            DisplayType::Primary => self.primary,
            DisplayType::External => self.extend,
        }
    }
}

/// Both connectors of a two-connector board scan out of one CRTC and one of
/// them is the on-chip HDMI, and the primary is not pinned to HDMI-A
fn is_shared_crtc_board(connectors: &[Connector], primary_pin: &str) -> bool {
    let [first, second] = connectors else {
        return false;
    };
    let same_crtc = matches!((first.crtc_id, second.crtc_id), (Some(a), Some(b)) if a == b);
    let has_hdmi = connectors.iter().any(|c| c.connector_type.is_builtin_hdmi());
    debug!(
        crtc1 = ?first.crtc_id,
        crtc2 = ?second.crtc_id,
        has_hdmi,
        primary_pin,
        "checking shared-CRTC topology"
    );
    same_crtc && has_hdmi && !primary_pin.contains("HDMI-A")
}

/// Decide which connectors serve the primary and extend displays
///
/// On a shared-CRTC board the HDMI connector is the extend display and the
/// other one the primary. Everywhere else the DRM layer's own assignment
/// (`assigned`) is used.
pub fn resolve_topology<F>(connectors: &[Connector], primary_pin: &str, assigned: F) -> Topology
where
    F: Fn(DisplayType) -> Option<ConnectorId>,
{
    if !is_shared_crtc_board(connectors, primary_pin) {
        return Topology {
            primary: assigned(DisplayType::Primary),
            extend: assigned(DisplayType::External),
            shared_crtc: false,
        };
    }

    let mut topology = Topology {
        shared_crtc: true,
        ..Topology::default()
    };
    for conn in connectors.iter().filter(|c| c.is_connected()) {
        if conn.connector_type.is_builtin_hdmi() {
            topology.extend = Some(conn.id);
        } else {
            topology.primary = Some(conn.id);
        }
    }
    topology
}

/// A connector whose state changed during a hot-plug probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub id: ConnectorId,
    pub old: ConnectionState,
    pub new: ConnectionState,
}

/// Operations on the DRM layer produced by [`reconcile`], in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyCommand {
    SetPrimary(ConnectorId),
    SetExtend(Option<ConnectorId>),
    DisplayChanged,
    UpdateDisplayRoute,
    ClearDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub primary: ConnectorId,
    pub extend: Option<ConnectorId>,
    pub commands: Vec<TopologyCommand>,
}

/// Role candidates from newly connected connectors
///
/// External-capable connectors are offered as extend, otherwise primary-capable
/// ones as primary. The last candidate of each role wins.
fn plug_candidates(
    connectors: &[Connector],
    changes: &[StateChange],
) -> (Option<ConnectorId>, Option<ConnectorId>) {
    let mut primary = None;
    let mut extend = None;
    for change in changes {
        info!(
            "{} event for connector {}",
            if change.new == ConnectionState::Connected { "Plug" } else { "Unplug" },
            change.id
        );
        if change.new != ConnectionState::Connected {
            continue;
        }
        let Some(conn) = find(connectors, change.id) else {
            continue;
        };
        if conn.can_drive(DisplayType::External) {
            extend = Some(conn.id);
        } else if conn.can_drive(DisplayType::Primary) {
            primary = Some(conn.id);
        }
    }
    (primary, extend)
}

fn find(connectors: &[Connector], id: ConnectorId) -> Option<&Connector> {
    connectors.iter().find(|c| c.id == id)
}

fn still_connected(connectors: &[Connector], id: Option<ConnectorId>) -> Option<ConnectorId> {
    id.filter(|&id| find(connectors, id).is_some_and(Connector::is_connected))
}

/// Re-assign displays after a hot-plug probe
///
/// `connectors` is the post-probe snapshot, `old_primary`/`old_extend` the DRM
/// layer's assignment before this pass. Fails when no connected
/// primary-capable connector exists; the caller then keeps its assignment.
pub fn reconcile(
    connectors: &[Connector],
    changes: &[StateChange],
    old_primary: Option<ConnectorId>,
    old_extend: Option<ConnectorId>,
) -> Result<Reconciliation> {
    let (plugged_primary, plugged_extend) = plug_candidates(connectors, changes);
    let mut commands = Vec::new();

    let primary = still_connected(connectors, plugged_primary.or(old_primary)).or_else(|| {
        connectors
            .iter()
            .find(|c| c.can_drive(DisplayType::Primary) && c.is_connected())
            .map(|c| c.id)
    });
    let Some(primary) = primary else {
        error!("Failed to find primary display");
        return Err(Error::ConnectorResolutionFailed);
    };
    if Some(primary) != old_primary {
        commands.push(TopologyCommand::SetPrimary(primary));
    }

    let extend = still_connected(connectors, plugged_extend.or(old_extend))
        .filter(|&id| id != primary)
        .or_else(|| {
            connectors
                .iter()
                .find(|c| c.can_drive(DisplayType::External) && c.id != primary && c.is_connected())
                .map(|c| c.id)
        });

    commands.extend([
        TopologyCommand::SetExtend(extend),
        TopologyCommand::DisplayChanged,
        TopologyCommand::UpdateDisplayRoute,
        TopologyCommand::ClearDisplay,
    ]);

    Ok(Reconciliation {
        primary,
        extend,
        commands,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{ConnectorType, PossibleDisplays};
    use crate::resources::ConnectionState::{Connected, Disconnected};

    fn conn(
        id: ConnectorId,
        ty: ConnectorType,
        state: ConnectionState,
        possible: PossibleDisplays,
    ) -> Connector {
        Connector::new(id, ty).with_state(state).with_possible_displays(possible)
    }

    fn change(id: ConnectorId, old: ConnectionState, new: ConnectionState) -> StateChange {
        StateChange { id, old, new }
    }

    fn shared_crtc_pair() -> Vec<Connector> {
        vec![
            conn(1, ConnectorType::HDMIA, Connected, PossibleDisplays::all()).with_route(5, 40),
            conn(2, ConnectorType::TV, Connected, PossibleDisplays::all()).with_route(6, 40),
        ]
    }

    fn none(_: DisplayType) -> Option<ConnectorId> {
        None
    }

    #[test]
    fn test_shared_crtc_puts_hdmi_on_extend() {
        let topology = resolve_topology(&shared_crtc_pair(), "null", none);
        assert_eq!(topology.primary, Some(2));
        assert_eq!(topology.extend, Some(1));
        assert!(topology.shared_crtc);

        // Same inputs, same answer
        assert_eq!(resolve_topology(&shared_crtc_pair(), "null", none), topology);
    }

    #[test]
    fn test_hdmi_pin_disables_shared_crtc_rule() {
        let assigned = |d: DisplayType| match d {
            DisplayType::Primary => Some(1),
            DisplayType::External => Some(2),
        };
        let topology = resolve_topology(&shared_crtc_pair(), "HDMI-A-1", assigned);
        assert_eq!(topology, Topology { primary: Some(1), extend: Some(2), shared_crtc: false });
    }

    #[test]
    fn test_separate_crtcs_use_drm_assignment() {
        let mut connectors = shared_crtc_pair();
        connectors[1].crtc_id = Some(41);
        let topology =
            resolve_topology(&connectors, "null", |d| (d == DisplayType::Primary).then_some(1));
        assert_eq!(topology.primary, Some(1));
        assert_eq!(topology.extend, None);
    }

    #[test]
    fn test_shared_crtc_skips_disconnected() {
        let mut connectors = shared_crtc_pair();
        connectors[0].state = ConnectionState::Disconnected;
        let topology = resolve_topology(&connectors, "null", none);
        assert_eq!(topology.primary, Some(2));
        assert_eq!(topology.extend, None);
    }

    #[test]
    fn test_new_primary_when_old_displays_unplugged() {
        let connectors = vec![
            conn(1, ConnectorType::HDMIA, Disconnected, PossibleDisplays::PRIMARY),
            conn(2, ConnectorType::DISPLAY_PORT, Disconnected, PossibleDisplays::EXTERNAL),
            conn(3, ConnectorType::DSI, Connected, PossibleDisplays::PRIMARY),
        ];
        let changes = [
            change(1, Connected, Disconnected),
            change(2, Connected, Disconnected),
            change(3, Disconnected, Connected),
        ];

        let result = reconcile(&connectors, &changes, Some(1), Some(2)).unwrap();
        assert_eq!(result.primary, 3);
        assert_eq!(result.extend, None);
        assert_eq!(
            result.commands,
            vec![
                TopologyCommand::SetPrimary(3),
                TopologyCommand::SetExtend(None),
                TopologyCommand::DisplayChanged,
                TopologyCommand::UpdateDisplayRoute,
                TopologyCommand::ClearDisplay,
            ]
        );
    }

    #[test]
    fn test_plugged_external_becomes_extend() {
        let connectors = vec![
            conn(1, ConnectorType::DSI, Connected, PossibleDisplays::PRIMARY),
            conn(2, ConnectorType::HDMIA, Connected, PossibleDisplays::EXTERNAL),
        ];
        let changes = [change(2, Disconnected, Connected)];

        let result = reconcile(&connectors, &changes, Some(1), None).unwrap();
        assert_eq!(result.primary, 1);
        assert_eq!(result.extend, Some(2));
        assert!(!result.commands.contains(&TopologyCommand::SetPrimary(1)));
    }

    #[test]
    fn test_extend_never_shares_primary() {
        let connectors = vec![conn(1, ConnectorType::HDMIA, Connected, PossibleDisplays::all())];
        let result = reconcile(&connectors, &[], None, None).unwrap();
        assert_eq!(result.primary, 1);
        assert_eq!(result.extend, None);

        // A stale extend that now serves as primary is dropped too
        let result = reconcile(&connectors, &[], None, Some(1)).unwrap();
        assert_eq!(result.primary, 1);
        assert_eq!(result.extend, None);
    }

    #[test]
    fn test_plugged_connector_is_not_both_displays() {
        let connectors = vec![conn(1, ConnectorType::HDMIA, Connected, PossibleDisplays::all())];
        let changes = [change(1, Disconnected, Connected)];

        let result = reconcile(&connectors, &changes, None, None).unwrap();
        assert_eq!(result.primary, 1);
        assert_eq!(result.extend, None);
        assert!(result.commands.contains(&TopologyCommand::SetPrimary(1)));
        assert!(result.commands.contains(&TopologyCommand::SetExtend(None)));
    }

    #[test]
    fn test_no_primary_is_an_error() {
        let connectors = vec![
            conn(1, ConnectorType::HDMIA, Disconnected, PossibleDisplays::PRIMARY),
            conn(2, ConnectorType::DISPLAY_PORT, Connected, PossibleDisplays::EXTERNAL),
        ];
        assert!(matches!(
            reconcile(&connectors, &[], Some(1), Some(2)),
            Err(Error::ConnectorResolutionFailed)
        ));
    }
}
