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

//! Module defining the discovered device entities: [`Node`] and [`Port`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::forwarding::ForwardingTables;
use crate::types::{Guid, Lid, LinkRate, Mtu, NodeId, NodeKind, PortNum};

/// A discovered device: an endpoint, a switch, or a router.
///
/// Nodes are owned by the [`crate::fabric::Fabric`] and created once per
/// discovered device. A node does not store references to its neighbors; the
/// neighbor relation is a lookup owned by the fabric, keyed by
/// [`crate::types::PortId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) guid: Guid,
    pub(crate) kind: NodeKind,
    pub(crate) description: String,
    pub(crate) ports: BTreeMap<PortNum, Port>,
    pub(crate) tables: Option<ForwardingTables>,
}

impl Node {
    pub(crate) fn new(id: NodeId, guid: Guid, kind: NodeKind, description: String) -> Self {
        Self {
            id,
            guid,
            kind,
            description,
            ports: BTreeMap::new(),
            tables: None,
        }
    }

    /// The graph index of this node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The globally unique identifier of this device.
    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// The kind of this device.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns `true` if and only if this device is a switch.
    pub fn is_switch(&self) -> bool {
        self.kind.is_switch()
    }

    /// The human-readable description of this device.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Get a port of this node by number.
    pub fn get_port(&self, num: PortNum) -> Option<&Port> {
        self.ports.get(&num)
    }

    /// Iterate over all ports of this node, in port-number order.
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// The number of ports on this node.
    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    /// The forwarding tables of this switch, or `None` for non-switches and
    /// for switches whose tables were never supplied.
    pub fn tables(&self) -> Option<&ForwardingTables> {
        self.tables.as_ref()
    }

    /// The base LID of this device: the address of port 0 for a switch, or
    /// the address of the only port for a single-ported device.
    pub fn base_lid(&self) -> Option<Lid> {
        if self.is_switch() {
            self.get_port(PortNum(0))
                .and_then(|p| p.address)
                .map(|a| a.lid)
        } else if self.ports.len() == 1 {
            self.ports.values().next().and_then(|p| p.address).map(|a| a.lid)
        } else {
            None
        }
    }
}

/// A single port of a [`Node`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub(crate) num: PortNum,
    pub(crate) address: Option<PortAddress>,
    pub(crate) rate: LinkRate,
    pub(crate) mtu: Mtu,
}

impl Port {
    /// Create a new port. Endpoint ports and switch port 0 carry an address;
    /// switch fabric ports do not.
    pub fn new(num: PortNum, address: Option<PortAddress>, rate: LinkRate, mtu: Mtu) -> Self {
        Self {
            num,
            address,
            rate,
            mtu,
        }
    }

    /// The port number.
    pub fn num(&self) -> PortNum {
        self.num
    }

    /// The address of this port, if it carries one.
    pub fn address(&self) -> Option<PortAddress> {
        self.address
    }

    /// The link rate of this port.
    pub fn rate(&self) -> LinkRate {
        self.rate
    }

    /// The MTU of this port.
    pub fn mtu(&self) -> Mtu {
        self.mtu
    }
}

/// A fabric-local address: a base LID plus the LMC mask width describing the
/// contiguous range `[lid, lid | ((1 << lmc) - 1)]` assigned to the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortAddress {
    /// The base LID.
    pub lid: Lid,
    /// The LID mask control: the port owns `2^lmc` consecutive LIDs.
    pub lmc: u8,
}

impl PortAddress {
    /// Create a new address with an LMC of zero (a single LID).
    pub fn new(lid: Lid) -> Self {
        Self { lid, lmc: 0 }
    }

    /// Create a new address covering `2^lmc` consecutive LIDs.
    pub fn with_lmc(lid: Lid, lmc: u8) -> Self {
        Self { lid, lmc }
    }

    /// The last LID of the range covered by this address.
    pub fn last_lid(&self) -> Lid {
        Lid(self.lid.0 | ((1u32 << self.lmc) - 1))
    }

    /// Returns `true` if and only if `lid` falls within the range covered by
    /// this address.
    pub fn covers(&self, lid: Lid) -> bool {
        self.lid <= lid && lid <= self.last_lid()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_range() {
        let a = PortAddress::with_lmc(Lid(0x10), 2);
        assert!(a.covers(Lid(0x10)));
        assert!(a.covers(Lid(0x13)));
        assert!(!a.covers(Lid(0x14)));
        assert!(!a.covers(Lid(0xf)));
        let b = PortAddress::new(Lid(0x20));
        assert!(b.covers(Lid(0x20)));
        assert!(!b.covers(Lid(0x21)));
    }
}
