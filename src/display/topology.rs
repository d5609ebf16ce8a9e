// src/display/topology.rs
//! Discovers which connector to drive, at which mode, from which controller.
//!
//! Resolution runs once at startup:
//! 1. take the first connector reporting "connected",
//! 2. pick its preferred mode, or failing that the largest one,
//! 3. find a controller, preferring the one already bound through the
//!    connector's current encoder and otherwise scanning each reachable
//!    encoder's `possible_crtcs` mask.

use crate::display::error::{DisplayError, Result};
use crate::display::kms::KmsDevice;
use crate::display::types::{
    ConnectionState, ConnectorId, ConnectorInfo, CrtcId, EncoderInfo, ModeInfo, Resources,
};
use log::{debug, error, info, warn};

/// The resolved output path. The selected mode lives inside the connector, so
/// it cannot outlive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    connector: ConnectorInfo,
    mode_index: usize,
    crtc: CrtcId,
}

impl Topology {
    pub fn resolve<D: KmsDevice + ?Sized>(device: &D) -> Result<Self> {
        let resources = device.resources().map_err(|e| {
            error!("Querying mode-setting resources failed: {}", e);
            DisplayError::ResourceQueryFailed(e)
        })?;
        debug!(
            "Resources: {} connectors, {} encoders, {} controllers",
            resources.connectors.len(),
            resources.encoders.len(),
            resources.crtcs.len()
        );

        let connector = find_connected_connector(device, &resources)?;

        let mode_index = select_mode(&connector.modes).ok_or_else(|| {
            error!("Connector {} advertises no modes", connector.id);
            DisplayError::NoMode(connector.id)
        })?;

        let crtc = find_crtc_for_connector(device, &resources, &connector).ok_or_else(|| {
            error!("No controller found for connector {}", connector.id);
            DisplayError::NoController(connector.id)
        })?;

        let topology = Self {
            connector,
            mode_index,
            crtc,
        };
        info!(
            "Resolved output: connector {} mode {} controller {}",
            topology.connector_id(),
            topology.mode(),
            topology.crtc()
        );
        Ok(topology)
    }

    pub fn connector(&self) -> &ConnectorInfo {
        &self.connector
    }

    pub fn connector_id(&self) -> ConnectorId {
        self.connector.id
    }

    pub fn mode(&self) -> &ModeInfo {
        &self.connector.modes[self.mode_index]
    }

    pub fn crtc(&self) -> CrtcId {
        self.crtc
    }

    pub fn width(&self) -> u32 {
        self.mode().width as u32
    }

    pub fn height(&self) -> u32 {
        self.mode().height as u32
    }
}

/// Returns the first connected connector, in resource-list order. Connectors
/// that cannot be queried are skipped.
fn find_connected_connector<D: KmsDevice + ?Sized>(
    device: &D,
    resources: &Resources,
) -> Result<ConnectorInfo> {
    for &id in &resources.connectors {
        match device.connector(id) {
            Ok(connector) if connector.state == ConnectionState::Connected => {
                debug!(
                    "Connector {} is connected with {} modes",
                    id,
                    connector.modes.len()
                );
                return Ok(connector);
            }
            Ok(connector) => debug!("Connector {} is {:?}", id, connector.state),
            Err(e) => warn!("Querying connector {} failed: {}", id, e),
        }
    }
    error!("No connector found");
    Err(DisplayError::NoConnector)
}

/// The first mode flagged preferred; otherwise the mode with the largest
/// area, ties going to the earliest.
pub fn select_mode(modes: &[ModeInfo]) -> Option<usize> {
    if let Some(preferred) = modes.iter().position(|m| m.preferred) {
        return Some(preferred);
    }
    let mut best: Option<usize> = None;
    for (i, mode) in modes.iter().enumerate() {
        match best {
            Some(b) if mode.area() <= modes[b].area() => {}
            _ => best = Some(i),
        }
    }
    best
}

/// The first controller in resource order whose bit is set in the encoder's
/// `possible_crtcs` mask.
pub fn find_crtc_for_encoder(resources: &Resources, encoder: &EncoderInfo) -> Option<CrtcId> {
    resources
        .crtcs
        .iter()
        .enumerate()
        .take(32)
        .find(|(i, _)| encoder.possible_crtcs & (1u32 << *i) != 0)
        .map(|(_, &crtc)| crtc)
}

pub fn find_crtc_for_connector<D: KmsDevice + ?Sized>(
    device: &D,
    resources: &Resources,
    connector: &ConnectorInfo,
) -> Option<CrtcId> {
    if let Some(crtc) = bound_crtc(device, resources, connector) {
        debug!(
            "Connector {} is already driven by controller {}",
            connector.id, crtc
        );
        return Some(crtc);
    }

    for &encoder_id in &connector.encoders {
        let encoder = match device.encoder(encoder_id) {
            Ok(encoder) => encoder,
            Err(e) => {
                warn!("Querying encoder {} failed: {}", encoder_id, e);
                continue;
            }
        };
        if let Some(crtc) = find_crtc_for_encoder(resources, &encoder) {
            debug!(
                "Encoder {} can drive controller {} (mask {:#x})",
                encoder_id, crtc, encoder.possible_crtcs
            );
            return Some(crtc);
        }
    }
    None
}

/// The controller named by the connector's current encoder, if that encoder
/// is in the resource list and has one.
fn bound_crtc<D: KmsDevice + ?Sized>(
    device: &D,
    resources: &Resources,
    connector: &ConnectorInfo,
) -> Option<CrtcId> {
    let current = connector.current_encoder?;
    if !resources.encoders.contains(&current) {
        return None;
    }
    match device.encoder(current) {
        Ok(encoder) => encoder.crtc,
        Err(e) => {
            warn!("Querying bound encoder {} failed: {}", current, e);
            None
        }
    }
}
