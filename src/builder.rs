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

//! Module for generating standard fabrics programmatically, with correct
//! shortest-path forwarding tables. The fabric-query collaborator delivers
//! real topologies; these constructors deliver known-good (and easily
//! broken) ones for tests and experiments.

use crate::fabric::Fabric;
use crate::forwarding::{ForwardingTables, PortMask};
use crate::node::{Port, PortAddress};
use crate::types::{FabricError, Guid, GroupId, Lid, LinkRate, Mtu, NodeId, NodeKind, PortNum};

/// Base LID of the first switch in built fabrics.
pub const SWITCH_LID_BASE: u32 = 0x400;
/// Base LID of the first spine switch in two-tier fabrics.
pub const SPINE_LID_BASE: u32 = 0x500;

/// Trait for generating standard test fabrics quickly.
///
/// ```
/// use fabcheck::prelude::*;
/// use fabcheck::builder::FabricBuilder;
///
/// # fn main() -> Result<(), FabricError> {
/// // two spines, three leaves, four hosts per leaf
/// let fabric = Fabric::build_two_tier(2, 3, 4)?;
/// assert_eq!(fabric.switches().count(), 5);
/// assert_eq!(fabric.endpoints().count(), 12);
/// # Ok(())
/// # }
/// ```
pub trait FabricBuilder: Sized {
    /// Build a chain of `num_switches` switches, each with
    /// `hosts_per_switch` endpoints, with deterministic single-path routing
    /// and no adaptive-routing groups.
    fn build_chain(num_switches: usize, hosts_per_switch: usize) -> Result<Self, FabricError>;

    /// Build a two-tier fabric: every leaf connects to every spine, hosts
    /// hang off the leaves. Routes towards remote hosts and remote leaves
    /// are adaptively routed over all uplinks (every spine gives the same
    /// hop count); routes towards spines are pinned to the direct uplink.
    fn build_two_tier(
        spines: usize,
        leaves: usize,
        hosts_per_leaf: usize,
    ) -> Result<Self, FabricError>;
}

fn host_port(rate: LinkRate, lid: Lid) -> Port {
    Port::new(PortNum(1), Some(PortAddress::new(lid)), rate, Mtu::M8192)
}

fn switch_port(num: u8, address: Option<Lid>) -> Port {
    Port::new(
        PortNum(num),
        address.map(PortAddress::new),
        LinkRate::R100g,
        Mtu::M8192,
    )
}

impl FabricBuilder for Fabric {
    fn build_chain(num_switches: usize, hosts_per_switch: usize) -> Result<Self, FabricError> {
        let mut fabric = Fabric::new();
        let hosts = hosts_per_switch;
        let left = PortNum((hosts + 1) as u8);
        let right = PortNum((hosts + 2) as u8);

        let host_lid = |s: usize, h: usize| Lid((1 + s * hosts + h) as u32);
        let switch_lid = |s: usize| Lid(SWITCH_LID_BASE + s as u32);

        let mut switches: Vec<NodeId> = Vec::with_capacity(num_switches);
        for s in 0..num_switches {
            let sw = fabric.add_node(
                Guid(0xa000_0000_0000_0000 + s as u64),
                NodeKind::Switch,
                format!("chain{s:02}"),
            )?;
            fabric.add_port(sw, switch_port(0, Some(switch_lid(s))))?;
            for h in 0..hosts {
                fabric.add_port(sw, switch_port((1 + h) as u8, None))?;
            }
            if s > 0 {
                fabric.add_port(sw, switch_port(left.0, None))?;
            }
            if s + 1 < num_switches {
                fabric.add_port(sw, switch_port(right.0, None))?;
            }
            switches.push(sw);
        }
        for s in 1..num_switches {
            fabric.add_link((switches[s - 1], right), (switches[s], left))?;
        }
        for s in 0..num_switches {
            for h in 0..hosts {
                let host = fabric.add_node(
                    Guid(0xc000_0000_0000_0000 + (s * 256 + h) as u64),
                    NodeKind::Endpoint,
                    format!("host{s:02}-{h:02} hfi1_0"),
                )?;
                fabric.add_port(host, host_port(LinkRate::R100g, host_lid(s, h)))?;
                fabric.add_link((host, PortNum(1)), (switches[s], PortNum((1 + h) as u8)))?;
            }
        }

        for s in 0..num_switches {
            let mut tables = ForwardingTables::default();
            for m in 0..num_switches {
                let towards = match m.cmp(&s) {
                    std::cmp::Ordering::Less => left,
                    std::cmp::Ordering::Equal => PortNum(0),
                    std::cmp::Ordering::Greater => right,
                };
                tables.set_egress(switch_lid(m), towards);
                for h in 0..hosts {
                    let port = if m == s {
                        PortNum((1 + h) as u8)
                    } else {
                        towards
                    };
                    tables.set_egress(host_lid(m, h), port);
                }
            }
            fabric.set_forwarding_tables(switches[s], tables)?;
        }
        Ok(fabric)
    }

    fn build_two_tier(
        spines: usize,
        leaves: usize,
        hosts_per_leaf: usize,
    ) -> Result<Self, FabricError> {
        let mut fabric = Fabric::new();
        let hosts = hosts_per_leaf;

        let host_lid = |l: usize, h: usize| Lid((1 + l * hosts + h) as u32);
        let leaf_lid = |l: usize| Lid(SWITCH_LID_BASE + l as u32);
        let spine_lid = |s: usize| Lid(SPINE_LID_BASE + s as u32);
        // leaf port towards spine s
        let uplink = |s: usize| PortNum((hosts + 1 + s) as u8);
        // spine port towards leaf l
        let downlink = |l: usize| PortNum((1 + l) as u8);

        let mut spine_ids: Vec<NodeId> = Vec::with_capacity(spines);
        for s in 0..spines {
            let sp = fabric.add_node(
                Guid(0xa000_0000_0000_0000 + s as u64),
                NodeKind::Switch,
                format!("spine{s:02}"),
            )?;
            fabric.add_port(sp, switch_port(0, Some(spine_lid(s))))?;
            for l in 0..leaves {
                fabric.add_port(sp, switch_port(downlink(l).0, None))?;
            }
            spine_ids.push(sp);
        }
        let mut leaf_ids: Vec<NodeId> = Vec::with_capacity(leaves);
        for l in 0..leaves {
            let lf = fabric.add_node(
                Guid(0xb000_0000_0000_0000 + l as u64),
                NodeKind::Switch,
                format!("leaf{l:02}"),
            )?;
            fabric.add_port(lf, switch_port(0, Some(leaf_lid(l))))?;
            for h in 0..hosts {
                fabric.add_port(lf, switch_port((1 + h) as u8, None))?;
            }
            for s in 0..spines {
                fabric.add_port(lf, switch_port(uplink(s).0, None))?;
            }
            leaf_ids.push(lf);
            for s in 0..spines {
                fabric.add_link((lf, uplink(s)), (spine_ids[s], downlink(l)))?;
            }
        }
        for l in 0..leaves {
            for h in 0..hosts {
                let host = fabric.add_node(
                    Guid(0xc000_0000_0000_0000 + (l * 256 + h) as u64),
                    NodeKind::Endpoint,
                    format!("host{l:02}-{h:02} hfi1_0"),
                )?;
                fabric.add_port(host, host_port(LinkRate::R100g, host_lid(l, h)))?;
                fabric.add_link((host, PortNum(1)), (leaf_ids[l], PortNum((1 + h) as u8)))?;
            }
        }

        // all uplinks of a leaf are equivalent for any destination behind
        // the spine layer
        let all_uplinks: PortMask = (0..spines).map(uplink).collect();

        for l in 0..leaves {
            let mut tables = ForwardingTables::default();
            tables.set_members(GroupId(0), all_uplinks);
            tables.set_egress(leaf_lid(l), PortNum(0));
            for s in 0..spines {
                // spine destinations are pinned: only the direct uplink
                // terminates there
                tables.set_egress(spine_lid(s), uplink(s));
            }
            for m in 0..leaves {
                if m == l {
                    for h in 0..hosts {
                        tables.set_egress(host_lid(m, h), PortNum((1 + h) as u8));
                    }
                } else {
                    tables.set_egress(leaf_lid(m), uplink(m % spines));
                    tables.set_group(leaf_lid(m), GroupId(0));
                    for h in 0..hosts {
                        tables.set_egress(host_lid(m, h), uplink((m + h) % spines));
                        tables.set_group(host_lid(m, h), GroupId(0));
                    }
                }
            }
            fabric.set_forwarding_tables(leaf_ids[l], tables)?;
        }
        for s in 0..spines {
            let mut tables = ForwardingTables::default();
            tables.set_egress(spine_lid(s), PortNum(0));
            for s2 in 0..spines {
                if s2 != s {
                    // spine to spine goes down through the first leaf, which
                    // owns a direct uplink to every spine
                    tables.set_egress(spine_lid(s2), downlink(0));
                }
            }
            for m in 0..leaves {
                tables.set_egress(leaf_lid(m), downlink(m));
                for h in 0..hosts {
                    tables.set_egress(host_lid(m, h), downlink(m));
                }
            }
            fabric.set_forwarding_tables(spine_ids[s], tables)?;
        }
        Ok(fabric)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn two_tier_shape() {
        let fabric = Fabric::build_two_tier(2, 3, 2).unwrap();
        assert_eq!(fabric.num_nodes(), 2 + 3 + 6);
        // 6 uplinks + 6 host links
        assert_eq!(fabric.num_links(), 12);
        assert!(fabric.check_consistency().is_empty());
        let tiers = fabric.switch_tiers();
        for l in 0..3 {
            let leaf = fabric.find_description(&format!("leaf{l:02}")).unwrap();
            assert_eq!(tiers[&leaf], 1);
        }
        for s in 0..2 {
            let spine = fabric.find_description(&format!("spine{s:02}")).unwrap();
            assert_eq!(tiers[&spine], 2);
        }
    }

    #[test]
    fn chain_shape() {
        let fabric = Fabric::build_chain(3, 2).unwrap();
        assert_eq!(fabric.num_nodes(), 3 + 6);
        assert_eq!(fabric.num_links(), 2 + 6);
        assert!(fabric.check_consistency().is_empty());
    }
}
