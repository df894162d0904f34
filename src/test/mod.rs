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

mod test_fabric;
mod test_routes;

use crate::fabric::{Fabric, SmRecord, SmState};
use crate::forwarding::ForwardingTables;
use crate::node::{Port, PortAddress};
use crate::types::{Guid, Lid, LinkRate, Mtu, NodeId, NodeKind, PortNum};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Look up a node by description, panicking on unknown names.
fn node(fabric: &Fabric, description: &str) -> NodeId {
    fabric
        .find_description(description)
        .unwrap_or_else(|| panic!("no node named {description}"))
}

/// Add a switch with port 0 (addressed) and the given fabric ports.
fn switch(fabric: &mut Fabric, guid: u64, desc: &str, lid: u32, ports: &[u8]) -> NodeId {
    let id = fabric.add_node(Guid(guid), NodeKind::Switch, desc).unwrap();
    fabric
        .add_port(
            id,
            Port::new(
                PortNum(0),
                Some(PortAddress::new(Lid(lid))),
                LinkRate::R100g,
                Mtu::M8192,
            ),
        )
        .unwrap();
    for &p in ports {
        fabric
            .add_port(id, Port::new(PortNum(p), None, LinkRate::R100g, Mtu::M8192))
            .unwrap();
    }
    id
}

/// Add a single-ported endpoint with the given address on port 1.
fn host_lmc(fabric: &mut Fabric, guid: u64, desc: &str, lid: u32, lmc: u8) -> NodeId {
    let id = fabric
        .add_node(Guid(guid), NodeKind::Endpoint, desc)
        .unwrap();
    fabric
        .add_port(
            id,
            Port::new(
                PortNum(1),
                Some(PortAddress::with_lmc(Lid(lid), lmc)),
                LinkRate::R100g,
                Mtu::M8192,
            ),
        )
        .unwrap();
    id
}

fn host(fabric: &mut Fabric, guid: u64, desc: &str, lid: u32) -> NodeId {
    host_lmc(fabric, guid, desc, lid, 0)
}

/// A small hand-wired fabric: two edge switches, one host behind each, a
/// trunk between the switches, and a master SM on the first switch. All
/// forwarding tables are programmed and consistent.
///
/// ```text
///   n001 -- edge01 ==== edge02 -- n002
///  (lid 1) (lid 0x40) (lid 0x41) (lid 2)
/// ```
fn mini_fabric() -> Fabric {
    let mut fabric = Fabric::new();
    let e1 = switch(&mut fabric, 0xa1, "edge01", 0x40, &[1, 2]);
    let e2 = switch(&mut fabric, 0xa2, "edge02", 0x41, &[1, 2]);
    let h1 = host(&mut fabric, 0xc1, "n001 hfi1_0", 0x1);
    let h2 = host(&mut fabric, 0xc2, "n002 hfi1_0", 0x2);
    fabric.add_link((h1, PortNum(1)), (e1, PortNum(1))).unwrap();
    fabric.add_link((h2, PortNum(1)), (e2, PortNum(1))).unwrap();
    fabric.add_link((e1, PortNum(2)), (e2, PortNum(2))).unwrap();

    let mut t1 = ForwardingTables::default();
    t1.set_egress(Lid(0x40), PortNum(0));
    t1.set_egress(Lid(0x41), PortNum(2));
    t1.set_egress(Lid(0x1), PortNum(1));
    t1.set_egress(Lid(0x2), PortNum(2));
    fabric.set_forwarding_tables(e1, t1).unwrap();

    let mut t2 = ForwardingTables::default();
    t2.set_egress(Lid(0x41), PortNum(0));
    t2.set_egress(Lid(0x40), PortNum(2));
    t2.set_egress(Lid(0x2), PortNum(1));
    t2.set_egress(Lid(0x1), PortNum(2));
    fabric.set_forwarding_tables(e2, t2).unwrap();

    fabric
        .add_sm(
            (e1, PortNum(0)),
            SmRecord {
                priority: 1,
                state: SmState::Master,
            },
        )
        .unwrap();
    fabric
}
