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

//! Module defining the per-switch forwarding state: the linear table, the
//! adaptive-routing group table, and the group membership masks.
//!
//! The wire format encodes "no route" and "no group" as 0xFF. That sentinel
//! is converted to an explicit `None` exactly once, in
//! [`ForwardingTables::from_raw`]; none of the checking logic ever compares
//! against the raw constant.

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, Lid, PortNum};

/// Raw wire sentinel for "no route" / "no group" table entries.
const RAW_SENTINEL: u8 = 0xff;

/// The forwarding state of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForwardingTables {
    /// destination LID -> default egress port
    linear: Vec<Option<PortNum>>,
    /// destination LID -> adaptive-routing group
    groups: Vec<Option<GroupId>>,
    /// group id -> member ports
    members: Vec<PortMask>,
}

impl ForwardingTables {
    /// Create empty tables sized for `num_lids` destinations and
    /// `num_groups` port groups. All entries start out unprogrammed.
    pub fn new(num_lids: usize, num_groups: usize) -> Self {
        Self {
            linear: vec![None; num_lids],
            groups: vec![None; num_lids],
            members: vec![PortMask::default(); num_groups],
        }
    }

    /// Convert the raw wire images of the three tables. Entries equal to the
    /// 0xFF sentinel become `None`. The group table may be shorter than the
    /// linear table (the wire format caps it); missing entries are treated as
    /// not adaptively routed.
    pub fn from_raw(linear: &[u8], groups: &[u8], members: &[u64]) -> Self {
        let mut tables = Self::new(linear.len(), members.len());
        for (lid, &raw) in linear.iter().enumerate() {
            if raw != RAW_SENTINEL {
                tables.linear[lid] = Some(PortNum(raw));
            }
        }
        for (lid, &raw) in groups.iter().enumerate().take(linear.len()) {
            if raw != RAW_SENTINEL {
                tables.groups[lid] = Some(GroupId(raw as u16));
            }
        }
        for (gid, &mask) in members.iter().enumerate() {
            tables.members[gid] = PortMask(mask);
        }
        tables
    }

    /// The number of destination LIDs the linear table covers.
    pub fn num_lids(&self) -> usize {
        self.linear.len()
    }

    /// The default egress port for a destination, or `None` if the
    /// destination is not programmed.
    pub fn egress(&self, lid: Lid) -> Option<PortNum> {
        self.linear.get(lid.0 as usize).copied().flatten()
    }

    /// The adaptive-routing group for a destination, or `None` if the
    /// destination is not adaptively routed.
    pub fn group(&self, lid: Lid) -> Option<GroupId> {
        self.groups.get(lid.0 as usize).copied().flatten()
    }

    /// The member ports of a group. Out-of-range groups are empty.
    pub fn group_members(&self, group: GroupId) -> PortMask {
        self.members
            .get(group.0 as usize)
            .copied()
            .unwrap_or_default()
    }

    /// Program the default egress port for a destination.
    pub fn set_egress(&mut self, lid: Lid, port: PortNum) {
        self.grow(lid);
        self.linear[lid.0 as usize] = Some(port);
    }

    /// Program the adaptive-routing group for a destination.
    pub fn set_group(&mut self, lid: Lid, group: GroupId) {
        self.grow(lid);
        self.groups[lid.0 as usize] = Some(group);
    }

    /// Program the member ports of a group.
    pub fn set_members(&mut self, group: GroupId, members: PortMask) {
        let gid = group.0 as usize;
        if gid >= self.members.len() {
            self.members.resize(gid + 1, PortMask::default());
        }
        self.members[gid] = members;
    }

    fn grow(&mut self, lid: Lid) {
        let needed = lid.0 as usize + 1;
        if needed > self.linear.len() {
            self.linear.resize(needed, None);
            self.groups.resize(needed, None);
        }
    }

    /// Iterate over all programmed destinations of the linear table.
    pub fn destinations(&self) -> impl Iterator<Item = (Lid, PortNum)> + '_ {
        self.linear
            .iter()
            .enumerate()
            .filter_map(|(lid, e)| e.map(|p| (Lid(lid as u32), p)))
    }

    /// Iterate over all destinations carrying an adaptive-routing group.
    pub fn group_destinations(&self) -> impl Iterator<Item = (Lid, GroupId)> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(lid, e)| e.map(|g| (Lid(lid as u32), g)))
    }

    /// Iterate over all groups together with their membership masks.
    pub fn groups_with_members(&self) -> impl Iterator<Item = (GroupId, PortMask)> + '_ {
        self.members
            .iter()
            .enumerate()
            .map(|(gid, &mask)| (GroupId(gid as u16), mask))
    }
}

/// A set of ports of one switch, stored as a bitmask. Ports 0 through 63 can
/// be represented, which covers the radix of every supported switch ASIC.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PortMask(pub u64);

impl PortMask {
    /// The empty set.
    pub fn new() -> Self {
        Self(0)
    }

    /// Add a port to the set.
    pub fn insert(&mut self, port: PortNum) {
        debug_assert!(port.0 < 64);
        self.0 |= 1u64 << port.0;
    }

    /// Returns `true` if and only if `port` is a member.
    pub fn contains(&self, port: PortNum) -> bool {
        port.0 < 64 && self.0 & (1u64 << port.0) != 0
    }

    /// Returns `true` if and only if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// The number of member ports.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterate over the member ports in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = PortNum> {
        let mask = self.0;
        (0u8..64).filter_map(move |p| (mask & (1u64 << p) != 0).then_some(PortNum(p)))
    }
}

impl FromIterator<PortNum> for PortMask {
    fn from_iter<I: IntoIterator<Item = PortNum>>(iter: I) -> Self {
        let mut mask = Self::new();
        for p in iter {
            mask.insert(p);
        }
        mask
    }
}

impl std::fmt::Display for PortMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for p in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{p}")?;
            first = false;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sentinel_conversion() {
        let tables = ForwardingTables::from_raw(
            &[0x00, 0x03, 0xff, 0x05],
            &[0xff, 0x01, 0x02, 0xff],
            &[0b0000, 0b1010, 0b0110],
        );
        assert_eq!(tables.egress(Lid(0)), Some(PortNum(0)));
        assert_eq!(tables.egress(Lid(1)), Some(PortNum(3)));
        assert_eq!(tables.egress(Lid(2)), None);
        assert_eq!(tables.egress(Lid(3)), Some(PortNum(5)));
        assert_eq!(tables.group(Lid(0)), None);
        assert_eq!(tables.group(Lid(1)), Some(GroupId(1)));
        assert_eq!(tables.group(Lid(2)), Some(GroupId(2)));
        assert_eq!(tables.group(Lid(3)), None);
        assert_eq!(
            tables.group_members(GroupId(1)).iter().collect::<Vec<_>>(),
            vec![PortNum(1), PortNum(3)]
        );
        // out of range lookups are unprogrammed, not a panic
        assert_eq!(tables.egress(Lid(100)), None);
        assert!(tables.group_members(GroupId(9)).is_empty());
    }

    #[test]
    fn destinations_skip_unprogrammed() {
        let tables = ForwardingTables::from_raw(&[0x01, 0xff, 0x02], &[0xff, 0xff, 0xff], &[]);
        let dests: Vec<_> = tables.destinations().collect();
        assert_eq!(
            dests,
            vec![(Lid(0), PortNum(1)), (Lid(2), PortNum(2))]
        );
    }

    #[test]
    fn port_mask() {
        let mask: PortMask = [PortNum(3), PortNum(5), PortNum(63)].into_iter().collect();
        assert_eq!(mask.len(), 3);
        assert!(mask.contains(PortNum(5)));
        assert!(!mask.contains(PortNum(4)));
        assert_eq!(mask.to_string(), "{3, 5, 63}");
    }
}
