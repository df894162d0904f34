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

use maplit::hashmap;
use pretty_assertions::assert_eq;

use super::*;
use crate::types::FabricError;

#[test]
fn duplicate_guid_is_rejected() {
    let mut fabric = Fabric::new();
    fabric
        .add_node(Guid(0xa1), NodeKind::Switch, "edge01")
        .unwrap();
    assert_eq!(
        fabric.add_node(Guid(0xa1), NodeKind::Switch, "edge99"),
        Err(FabricError::DuplicateGuid(Guid(0xa1)))
    );
}

#[test]
fn duplicate_port_is_rejected() {
    let mut fabric = Fabric::new();
    let sw = switch(&mut fabric, 0xa1, "edge01", 0x40, &[1]);
    assert_eq!(
        fabric.add_port(sw, Port::new(PortNum(1), None, LinkRate::R100g, Mtu::M8192)),
        Err(FabricError::DuplicatePort(sw, PortNum(1)))
    );
}

#[test]
fn lid_lookup_covers_lmc_range() {
    let mut fabric = Fabric::new();
    let h = host_lmc(&mut fabric, 0xc1, "n001 hfi1_0", 0x10, 2);
    assert_eq!(fabric.find_lid(Lid(0x10)), Some((h, PortNum(1))));
    assert_eq!(fabric.find_lid(Lid(0x13)), Some((h, PortNum(1))));
    assert_eq!(fabric.find_lid(Lid(0x14)), None);
    assert_eq!(fabric.find_lid(Lid(0xf)), None);
}

#[test]
fn overlapping_lid_range_is_rejected() {
    let mut fabric = Fabric::new();
    let h = host_lmc(&mut fabric, 0xc1, "n001 hfi1_0", 0x10, 2);
    let other = fabric
        .add_node(Guid(0xc2), NodeKind::Endpoint, "n002 hfi1_0")
        .unwrap();
    assert_eq!(
        fabric.add_port(
            other,
            Port::new(
                PortNum(1),
                Some(PortAddress::new(Lid(0x12))),
                LinkRate::R100g,
                Mtu::M8192,
            ),
        ),
        Err(FabricError::DuplicateLid(Lid(0x12), (h, PortNum(1))))
    );
}

#[test]
fn link_errors() {
    let mut fabric = Fabric::new();
    let e1 = switch(&mut fabric, 0xa1, "edge01", 0x40, &[1, 2]);
    let e2 = switch(&mut fabric, 0xa2, "edge02", 0x41, &[1]);
    assert_eq!(
        fabric.add_link((e1, PortNum(1)), (e1, PortNum(1))),
        Err(FabricError::LinkToSelf((e1, PortNum(1))))
    );
    assert_eq!(
        fabric.add_link((e1, PortNum(7)), (e2, PortNum(1))),
        Err(FabricError::PortNotFound(e1, PortNum(7)))
    );
    fabric.add_link((e1, PortNum(1)), (e2, PortNum(1))).unwrap();
    assert_eq!(
        fabric.add_link((e1, PortNum(1)), (e2, PortNum(1))),
        Err(FabricError::PortAlreadyLinked((e1, PortNum(1))))
    );
}

#[test]
fn neighbor_relation_is_symmetric() {
    let fabric = mini_fabric();
    let e1 = node(&fabric, "edge01");
    let e2 = node(&fabric, "edge02");
    assert_eq!(fabric.neighbor((e1, PortNum(2))), Some((e2, PortNum(2))));
    assert_eq!(fabric.neighbor((e2, PortNum(2))), Some((e1, PortNum(2))));
    assert_eq!(fabric.neighbor((e1, PortNum(0))), None);
    assert_eq!(fabric.num_links(), 3);
    assert_eq!(fabric.check_consistency(), vec![]);
}

#[test]
fn tables_only_on_switches() {
    let mut fabric = Fabric::new();
    let h = host(&mut fabric, 0xc1, "n001 hfi1_0", 0x1);
    assert_eq!(
        fabric.set_forwarding_tables(h, ForwardingTables::default()),
        Err(FabricError::NotASwitch(h))
    );
}

#[test]
fn lookups() {
    let fabric = mini_fabric();
    let e1 = node(&fabric, "edge01");
    assert_eq!(fabric.find_guid(Guid(0xa1)), Some(e1));
    assert_eq!(fabric.find_guid(Guid(0xdead)), None);
    assert_eq!(fabric.find_description("edge01"), Some(e1));
    assert_eq!(fabric.find_description("edge99"), None);
    assert_eq!(fabric.num_nodes(), 4);
    assert_eq!(fabric.switches().count(), 2);
    assert_eq!(fabric.endpoints().count(), 2);
    assert_eq!(fabric.addressed_ports().count(), 4);
    assert_eq!(fabric.sms().count(), 1);
}

#[test]
fn switch_tiers_from_endpoints() {
    // n001 -- edge01 ==== core01 ==== edge02 -- n002
    let mut fabric = Fabric::new();
    let e1 = switch(&mut fabric, 0xa1, "edge01", 0x40, &[1, 2]);
    let core = switch(&mut fabric, 0xa3, "core01", 0x42, &[1, 2]);
    let e2 = switch(&mut fabric, 0xa2, "edge02", 0x41, &[1, 2]);
    let h1 = host(&mut fabric, 0xc1, "n001 hfi1_0", 0x1);
    let h2 = host(&mut fabric, 0xc2, "n002 hfi1_0", 0x2);
    fabric.add_link((h1, PortNum(1)), (e1, PortNum(1))).unwrap();
    fabric.add_link((h2, PortNum(1)), (e2, PortNum(1))).unwrap();
    fabric.add_link((e1, PortNum(2)), (core, PortNum(1))).unwrap();
    fabric.add_link((core, PortNum(2)), (e2, PortNum(2))).unwrap();

    assert_eq!(
        fabric.switch_tiers(),
        hashmap! { e1 => 1, e2 => 1, core => 2 }
    );
}

#[test]
fn consistency_catches_restored_corruption() {
    init_logger();
    let fabric = mini_fabric();
    // corrupt a snapshot: drop one direction of the trunk link
    let mut broken: Fabric = serde_json::from_str(&serde_json::to_string(&fabric).unwrap()).unwrap();
    let e1 = node(&broken, "edge01");
    let e2 = node(&broken, "edge02");
    broken.neighbors.remove(&(e1, PortNum(2)));
    let defects = broken.check_consistency();
    assert_eq!(
        defects,
        vec![FabricError::AsymmetricLink((e2, PortNum(2)), (e1, PortNum(2)))]
    );
}
