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

//! # Top-level Topology Graph module
//!
//! The [`Fabric`] owns every discovered entity of one analysis run: nodes,
//! ports, the neighbor relation, forwarding tables and subnet-manager
//! records. It is built once from the results of a fabric query, stays
//! immutable while the checkers run, and is torn down in bulk by dropping it.

use std::collections::{BTreeMap, HashMap, VecDeque};

use itertools::Itertools;
use log::*;
use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::node::{Node, Port};
use crate::types::{FabricError, Guid, IndexType, Lid, NodeId, NodeKind, PortId, PortNum};

/// Physical topology graph: one graph node per device, one edge per cable,
/// with the two port numbers as the edge weight.
pub(crate) type LinkGraph = StableUnGraph<(), (PortNum, PortNum), IndexType>;

/// # Fabric
///
/// The complete discovered state of one subnet: all devices with their ports
/// and forwarding tables, the physical links between them, and the set of
/// subnet managers seen. There is no process-wide fabric; every operation
/// takes an explicit `&Fabric`.
///
/// ```rust
/// use fabcheck::prelude::*;
///
/// fn main() -> Result<(), FabricError> {
///     let mut fabric = Fabric::new();
///     let sw = fabric.add_node(Guid(0xa0), NodeKind::Switch, "edge01")?;
///     let host = fabric.add_node(Guid(0xb0), NodeKind::Endpoint, "node001 hfi1_0")?;
///     fabric.add_port(sw, Port::new(0.into(), Some(PortAddress::new(Lid(0x10))), LinkRate::R100g, Mtu::M8192))?;
///     fabric.add_port(sw, Port::new(1.into(), None, LinkRate::R100g, Mtu::M8192))?;
///     fabric.add_port(host, Port::new(1.into(), Some(PortAddress::new(Lid(0x11))), LinkRate::R100g, Mtu::M8192))?;
///     fabric.add_link((sw, 1.into()), (host, 1.into()))?;
///     assert_eq!(fabric.neighbor((sw, 1.into())), Some((host, 1.into())));
///     Ok(())
/// }
/// ```
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fabric {
    pub(crate) graph: LinkGraph,
    pub(crate) nodes: HashMap<NodeId, Node>,
    /// Symmetric neighbor relation; both directions are always present.
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) neighbors: HashMap<PortId, PortId>,
    pub(crate) by_guid: HashMap<Guid, NodeId>,
    /// Every LID covered by a port address (LMC range expanded) maps to the
    /// owning port.
    pub(crate) by_lid: HashMap<Lid, PortId>,
    /// Subnet managers, keyed by the port they run on.
    #[serde_as(as = "Vec<(_, _)>")]
    pub(crate) sms: BTreeMap<PortId, SmRecord>,
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

impl Fabric {
    /// Generate an empty Fabric.
    pub fn new() -> Self {
        Self {
            graph: LinkGraph::default(),
            nodes: HashMap::new(),
            neighbors: HashMap::new(),
            by_guid: HashMap::new(),
            by_lid: HashMap::new(),
            sms: BTreeMap::new(),
        }
    }

    /// Add a discovered device. Returns its id, used to reference the node
    /// in all later calls.
    pub fn add_node(
        &mut self,
        guid: Guid,
        kind: NodeKind,
        description: impl Into<String>,
    ) -> Result<NodeId, FabricError> {
        if self.by_guid.contains_key(&guid) {
            return Err(FabricError::DuplicateGuid(guid));
        }
        let id = self.graph.add_node(());
        let node = Node::new(id, guid, kind, description.into());
        trace!("add node {} {} as {:?}", node.guid, node.description, id);
        self.nodes.insert(id, node);
        self.by_guid.insert(guid, id);
        Ok(id)
    }

    /// Add a discovered port to a device. If the port carries an address,
    /// its entire LMC range is registered in the LID lookup.
    pub fn add_port(&mut self, node: NodeId, port: Port) -> Result<PortId, FabricError> {
        let num = port.num();
        match self.nodes.get(&node) {
            None => return Err(FabricError::DeviceNotFound(node)),
            Some(n) if n.get_port(num).is_some() => {
                return Err(FabricError::DuplicatePort(node, num))
            }
            Some(_) => {}
        }
        if let Some(addr) = port.address() {
            // check the whole range before touching the map
            for lid in addr.lid.0..=addr.last_lid().0 {
                if let Some(&owner) = self.by_lid.get(&Lid(lid)) {
                    return Err(FabricError::DuplicateLid(Lid(lid), owner));
                }
            }
            for lid in addr.lid.0..=addr.last_lid().0 {
                self.by_lid.insert(Lid(lid), (node, num));
            }
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.ports.insert(num, port);
        }
        Ok((node, num))
    }

    /// Record a physical link between two ports. The neighbor relation is
    /// inserted in both directions, so it is symmetric by construction.
    pub fn add_link(&mut self, a: PortId, b: PortId) -> Result<(), FabricError> {
        if a == b {
            return Err(FabricError::LinkToSelf(a));
        }
        self.get_port(a).ok_or(FabricError::PortNotFound(a.0, a.1))?;
        self.get_port(b).ok_or(FabricError::PortNotFound(b.0, b.1))?;
        if self.neighbors.contains_key(&a) {
            return Err(FabricError::PortAlreadyLinked(a));
        }
        if self.neighbors.contains_key(&b) {
            return Err(FabricError::PortAlreadyLinked(b));
        }
        debug!("link {:?} <-> {:?}", a, b);
        self.neighbors.insert(a, b);
        self.neighbors.insert(b, a);
        self.graph.add_edge(a.0, b.0, (a.1, b.1));
        Ok(())
    }

    /// Attach forwarding tables to a switch.
    pub fn set_forwarding_tables(
        &mut self,
        node: NodeId,
        tables: crate::forwarding::ForwardingTables,
    ) -> Result<(), FabricError> {
        let n = self
            .nodes
            .get_mut(&node)
            .ok_or(FabricError::DeviceNotFound(node))?;
        if !n.is_switch() {
            return Err(FabricError::NotASwitch(node));
        }
        n.tables = Some(tables);
        Ok(())
    }

    /// Record a subnet manager discovered at the given port.
    pub fn add_sm(&mut self, port: PortId, sm: SmRecord) -> Result<(), FabricError> {
        self.get_port(port)
            .ok_or(FabricError::PortNotFound(port.0, port.1))?;
        self.sms.insert(port, sm);
        Ok(())
    }

    /// Get a node by id.
    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a port by id.
    pub fn get_port(&self, id: PortId) -> Option<&Port> {
        self.nodes.get(&id.0).and_then(|n| n.get_port(id.1))
    }

    /// Find a node by its GUID.
    pub fn find_guid(&self, guid: Guid) -> Option<NodeId> {
        self.by_guid.get(&guid).copied()
    }

    /// Find the first node carrying the given description.
    pub fn find_description(&self, description: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.description() == description)
            .map(|n| n.id())
            .sorted()
            .next()
    }

    /// Find the port owning the given LID (LMC ranges included).
    pub fn find_lid(&self, lid: Lid) -> Option<PortId> {
        self.by_lid.get(&lid).copied()
    }

    /// The port at the other end of the physical link, if the port is cabled.
    pub fn neighbor(&self, port: PortId) -> Option<PortId> {
        self.neighbors.get(&port).copied()
    }

    /// The number of devices in the fabric.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The number of physical links in the fabric.
    pub fn num_links(&self) -> usize {
        self.neighbors.len() / 2
    }

    /// Iterate over all nodes, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values().sorted_by_key(|n| n.id())
    }

    /// Iterate over all switches, in id order.
    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.is_switch())
    }

    /// Iterate over all non-switch devices, in id order.
    pub fn endpoints(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| !n.is_switch())
    }

    /// Iterate over all physical links, each reported once with its lower
    /// port id first.
    pub fn links(&self) -> impl Iterator<Item = (PortId, PortId)> + '_ {
        self.neighbors
            .iter()
            .filter(|(p, q)| p < q)
            .map(|(&p, &q)| (p, q))
            .sorted()
    }

    /// Iterate over all discovered subnet managers.
    pub fn sms(&self) -> impl Iterator<Item = (PortId, &SmRecord)> {
        self.sms.iter().map(|(&p, sm)| (p, sm))
    }

    /// Iterate over all addressed ports (endpoint ports and switch port 0).
    pub fn addressed_ports(&self) -> impl Iterator<Item = PortId> + '_ {
        self.nodes().flat_map(|n| {
            n.ports()
                .filter(|p| p.address().is_some())
                .map(move |p| (n.id(), p.num()))
        })
    }

    /// Verify the structural invariants of the graph: the neighbor relation
    /// must be symmetric, and every LID lookup entry must name an existing
    /// port whose address covers the LID. All defects are collected; an empty
    /// result means the graph is well formed.
    ///
    /// A graph built exclusively through [`Fabric::add_link`] cannot violate
    /// these; a graph restored from an untrusted snapshot can.
    pub fn check_consistency(&self) -> Vec<FabricError> {
        let mut defects = Vec::new();
        for (&p, &q) in self.neighbors.iter().sorted() {
            if self.get_port(p).is_none() {
                defects.push(FabricError::PortNotFound(p.0, p.1));
            }
            if self.neighbors.get(&q) != Some(&p) {
                defects.push(FabricError::AsymmetricLink(p, q));
            }
        }
        for (&lid, &port) in self.by_lid.iter().sorted() {
            match self.get_port(port) {
                None => defects.push(FabricError::StaleLidEntry(lid, port)),
                Some(p) if !p.address().map(|a| a.covers(lid)).unwrap_or(false) => {
                    defects.push(FabricError::StaleLidEntry(lid, port))
                }
                Some(_) => {}
            }
        }
        if !defects.is_empty() {
            warn!("fabric failed consistency check with {} defects", defects.len());
        }
        defects
    }

    /// Classify every switch into a tier by its distance from the endpoints:
    /// switches with at least one endpoint neighbor are tier 1, their
    /// switch-only neighbors tier 2, and so on. Switches unreachable from any
    /// endpoint are absent from the result.
    pub fn switch_tiers(&self) -> HashMap<NodeId, u32> {
        let mut tiers: HashMap<NodeId, u32> = HashMap::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        for node in self.switches() {
            let leaf = self
                .graph
                .neighbors(node.id())
                .any(|n| self.nodes.get(&n).map(|n| !n.is_switch()).unwrap_or(false));
            if leaf {
                tiers.insert(node.id(), 1);
                queue.push_back(node.id());
            }
        }
        while let Some(id) = queue.pop_front() {
            let tier = tiers[&id];
            for next in self.graph.neighbors(id) {
                let is_switch = self
                    .nodes
                    .get(&next)
                    .map(|n| n.is_switch())
                    .unwrap_or(false);
                if is_switch && !tiers.contains_key(&next) {
                    tiers.insert(next, tier + 1);
                    queue.push_back(next);
                }
            }
        }
        tiers
    }
}

/// A subnet-manager instance discovered at a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmRecord {
    /// Election priority of this instance.
    pub priority: u8,
    /// Operational state of this instance.
    pub state: SmState,
}

/// Operational state of a subnet manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SmState {
    /// Configured but not running.
    Inactive,
    /// Sweeping the subnet.
    Discovering,
    /// Hot standby behind the master.
    Standby,
    /// The elected master.
    Master,
}

impl std::fmt::Display for SmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inactive => f.write_str("Inactive"),
            Self::Discovering => f.write_str("Discovering"),
            Self::Standby => f.write_str("Standby"),
            Self::Master => f.write_str("Master"),
        }
    }
}
