//! Node identity and device matching.
//!
//! Several ephemeral instances can share one hostname prefix, so a device is
//! only ever attributed to this instance by its stable node ID or by the
//! overlay addresses assigned at join time. Hostnames are never consulted.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::credentials::Device;

/// Self-identifiers assigned to this node after a successful join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub node_id: String,
    pub addresses: Vec<IpAddr>,
}

impl NetworkIdentity {
    pub fn new(node_id: impl Into<String>, addresses: Vec<IpAddr>) -> Self {
        Self {
            node_id: node_id.into(),
            addresses,
        }
    }
}

/// How a device was attributed to this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceMatch {
    NodeId,
    Address,
}

fn matches_node_id(identity: &NetworkIdentity, device: &Device) -> bool {
    !identity.node_id.is_empty() && device.node_id == identity.node_id
}

fn shares_address(own: &HashSet<IpAddr>, device: &Device) -> bool {
    device
        .addresses
        .iter()
        .filter_map(|addr| parse_address(addr))
        .any(|addr| own.contains(&addr))
}

// The API reports plain addresses; tolerate a CIDR suffix all the same.
fn parse_address(raw: &str) -> Option<IpAddr> {
    raw.split('/').next()?.parse().ok()
}

/// Whether `device` is the one this instance registered.
pub fn is_own_device(identity: &NetworkIdentity, device: &Device) -> bool {
    let own: HashSet<IpAddr> = identity.addresses.iter().copied().collect();
    matches_node_id(identity, device) || shares_address(&own, device)
}

/// Pick this instance's device out of a device listing.
///
/// A node ID match anywhere in the list wins over an address match, so a
/// recycled address on another device cannot shadow the real one.
pub fn find_own_device<'a>(
    identity: &NetworkIdentity,
    devices: &'a [Device],
) -> Option<(&'a Device, DeviceMatch)> {
    if let Some(device) = devices.iter().find(|d| matches_node_id(identity, d)) {
        return Some((device, DeviceMatch::NodeId));
    }

    let own: HashSet<IpAddr> = identity.addresses.iter().copied().collect();
    devices
        .iter()
        .find(|d| shares_address(&own, d))
        .map(|d| (d, DeviceMatch::Address))
}
