// FabCheck: Fabric Topology and Routing Verifier written in Rust
// Copyright (C) 2023-2024 The fabcheck developers
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module defining the Expected-Design model: the administrator-authored
//! description of the intended fabric, used as the reconciliation baseline.
//!
//! Every attribute of a descriptor is optional; `None` is a wildcard that
//! matches anything. The design-document parser (out of scope here) fills
//! these lists through the plain constructors below.

use serde::{Deserialize, Serialize};

use crate::fabric::Fabric;
use crate::types::{Guid, LinkRate, Mtu, NodeKind, PortNum};

/// The complete expected design of a fabric: the reconciliation baseline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedTopology {
    /// Devices that should exist.
    pub nodes: Vec<ExpectedNode>,
    /// Cables that should exist.
    pub links: Vec<ExpectedLink>,
    /// Subnet managers that should exist.
    pub sms: Vec<ExpectedSm>,
}

impl ExpectedTopology {
    /// An empty design.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if and only if the design describes nothing at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty() && self.sms.is_empty()
    }

    /// Build an expected design that exactly mirrors a discovered fabric:
    /// every node, link and subnet manager with all attributes concrete.
    /// Reconciling a fabric against its own mirror yields only consistent
    /// classifications, which makes this the canonical template for writing
    /// a design document from a known-good deployment.
    pub fn from_fabric(fabric: &Fabric) -> Self {
        let mut expected = Self::new();
        for node in fabric.nodes() {
            expected.nodes.push(ExpectedNode {
                guid: Some(node.guid()),
                description: Some(node.description().to_string()),
                kind: Some(node.kind()),
            });
        }
        for (a, b) in fabric.links() {
            let rate = fabric.get_port(a).map(|p| p.rate());
            let mtu_a = fabric.get_port(a).map(|p| p.mtu());
            let mtu_b = fabric.get_port(b).map(|p| p.mtu());
            expected.links.push(ExpectedLink {
                sides: [
                    PortSelector::mirror(fabric, a),
                    PortSelector::mirror(fabric, b),
                ],
                rate,
                mtu: mtu_a.min(mtu_b),
            });
        }
        for (port, _) in fabric.sms() {
            let node = fabric.get_node(port.0);
            expected.sms.push(ExpectedSm {
                guid: node.map(|n| n.guid()),
                description: node.map(|n| n.description().to_string()),
                port: Some(port.1),
                kind: node.map(|n| n.kind()),
            });
        }
        expected
    }
}

/// An expected device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedNode {
    /// Expected GUID, if pinned.
    pub guid: Option<Guid>,
    /// Expected description, if pinned.
    pub description: Option<String>,
    /// Expected device kind, if pinned.
    pub kind: Option<NodeKind>,
}

/// An expected cable between two port selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedLink {
    /// The two ends of the cable.
    pub sides: [PortSelector; 2],
    /// Expected link rate, if pinned.
    pub rate: Option<LinkRate>,
    /// Expected MTU (the minimum of both port MTUs), if pinned.
    pub mtu: Option<Mtu>,
}

/// An expected subnet manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSm {
    /// GUID of the node hosting the SM, if pinned.
    pub guid: Option<Guid>,
    /// Description of the node hosting the SM, if pinned.
    pub description: Option<String>,
    /// Port the SM runs on, if pinned.
    pub port: Option<PortNum>,
    /// Kind of the node hosting the SM, if pinned.
    pub kind: Option<NodeKind>,
}

/// Selects one port of the fabric by any subset of node GUID, node
/// description, port number and node kind. An empty selector matches
/// nothing on its own but can be completed from the other side of a link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSelector {
    /// GUID of the owning node.
    pub node_guid: Option<Guid>,
    /// Description of the owning node.
    pub node_desc: Option<String>,
    /// The port number.
    pub port: Option<PortNum>,
    /// Kind of the owning node.
    pub kind: Option<NodeKind>,
}

impl PortSelector {
    /// A selector pinning node GUID and port number.
    pub fn guid_port(guid: Guid, port: PortNum) -> Self {
        Self {
            node_guid: Some(guid),
            port: Some(port),
            ..Default::default()
        }
    }

    /// A selector pinning node description and port number.
    pub fn desc_port(desc: impl Into<String>, port: PortNum) -> Self {
        Self {
            node_desc: Some(desc.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    /// A selector that names a specific port without ambiguity: a node
    /// (by GUID or description) together with a port number. Incomplete
    /// selectors are resolved fuzzily through the neighbor of the other
    /// side, so that moved cables are still associated with their link.
    pub fn is_complete(&self) -> bool {
        (self.node_guid.is_some() || self.node_desc.is_some()) && self.port.is_some()
    }

    /// A fully concrete selector for a discovered port.
    pub fn mirror(fabric: &Fabric, port: crate::types::PortId) -> Self {
        let node = fabric.get_node(port.0);
        Self {
            node_guid: node.map(|n| n.guid()),
            node_desc: node.map(|n| n.description().to_string()),
            port: Some(port.1),
            kind: node.map(|n| n.kind()),
        }
    }
}
