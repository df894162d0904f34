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

//! # Route Consistency Checker
//!
//! Walks the forwarding tables of every switch and verifies that each
//! programmed destination is reachable, terminates at a port that actually
//! owns the destination LID, and that every adaptive-routing alternate takes
//! exactly as many hops as the default path.
//!
//! The per-destination walk is a recursion over switches, bounded by a hop
//! ceiling (the defense against cyclic or stale tables) and memoized per
//! `(switch, destination)`. The memo map stores the remaining hop count from
//! a switch to the destination, so a cached value is valid for any caller at
//! any accumulated depth, whether it is probing the default path or an
//! alternate. The map is owned by a single [`RouteChecker::check_switch`]
//! invocation; two switch checks share no state, which keeps them
//! independently runnable.
//!
//! Every defect found is collected as a [`RouteViolation`] value; nothing in
//! here aborts a scan. The one caller-visible error is a switch without any
//! forwarding tables, which aborts that switch's check alone.

use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::*;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::fabric::Fabric;
use crate::types::{
    FabricError, GroupId, Lid, NodeId, PortId, PortNum, DEFAULT_MAX_HOPS,
};

/// Verifies the forwarding state of switches. Construct one per analysis
/// run; the checker itself holds only the hop ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteChecker {
    max_hops: u32,
}

impl Default for RouteChecker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HOPS)
    }
}

impl RouteChecker {
    /// Create a checker with an explicit hop ceiling.
    pub fn new(max_hops: u32) -> Self {
        Self { max_hops }
    }

    /// Check one switch: every destination with a programmed linear-table
    /// entry is walked, then the group table is screened for orphaned
    /// entries and duplicated membership masks.
    ///
    /// The only error is a switch carrying no forwarding tables at all;
    /// everything else is collected in the report.
    pub fn check_switch(
        &self,
        fabric: &Fabric,
        switch: NodeId,
    ) -> Result<SwitchRouteReport, FabricError> {
        let node = fabric
            .get_node(switch)
            .ok_or(FabricError::DeviceNotFound(switch))?;
        if !node.is_switch() {
            return Err(FabricError::NotASwitch(switch));
        }
        let tables = node
            .tables()
            .ok_or(FabricError::NoForwardingTables(switch))?;

        let origin_lid = node.base_lid();
        let mut report = SwitchRouteReport {
            switch,
            destinations_checked: 0,
            violations: Vec::new(),
        };
        let mut memo: HashMap<(NodeId, Lid), u32> = HashMap::new();

        for (dlid, _) in tables.destinations() {
            report.destinations_checked += 1;
            if let Err(kind) = self.path_length(fabric, &mut memo, switch, dlid, 0, false) {
                report.violations.push(RouteViolation {
                    switch,
                    origin_lid,
                    dlid: Some(dlid),
                    kind,
                });
            }
        }

        // a group entry without a linear route can never be selected
        for (dlid, group) in tables.group_destinations() {
            if tables.egress(dlid).is_none() {
                report.violations.push(RouteViolation {
                    switch,
                    origin_lid,
                    dlid: Some(dlid),
                    kind: RouteViolationKind::OrphanGroupEntry { group },
                });
            }
        }

        // two groups with identical membership make the adaptive-routing
        // configuration ambiguous; sort the masks and compare neighbors
        for ((mask_a, first), (mask_b, second)) in tables
            .groups_with_members()
            .filter(|(_, mask)| !mask.is_empty())
            .map(|(gid, mask)| (mask, gid))
            .sorted()
            .tuple_windows()
        {
            if mask_a == mask_b {
                report.violations.push(RouteViolation {
                    switch,
                    origin_lid,
                    dlid: None,
                    kind: RouteViolationKind::DuplicateGroup { first, second },
                });
            }
        }

        trace!(
            "checked switch {:?}: {} destinations, {} violations",
            switch,
            report.destinations_checked,
            report.violations.len()
        );
        Ok(report)
    }

    /// Check every switch of the fabric. Setup errors (switches without
    /// tables) abort only the affected switch and are collected alongside
    /// the per-switch reports.
    pub fn check_fabric(&self, fabric: &Fabric) -> FabricRouteReport {
        let mut result = FabricRouteReport::default();
        for sw in fabric.switches() {
            match self.check_switch(fabric, sw.id()) {
                Ok(report) => result.reports.push(report),
                Err(e) => {
                    warn!("skipping switch {:?}: {}", sw.id(), e);
                    result.setup_errors.push(e);
                }
            }
        }
        result
    }

    /// The length of the route from `switch` to `dlid`, verifying it along
    /// the way.
    ///
    /// `hops` is the number of links already traversed to reach `switch`;
    /// the returned length includes them. With `restrict_to_default` the
    /// walk follows only linear-table choices; otherwise every member of the
    /// destination's port group is probed and must agree with the default
    /// length. The first disagreement or termination failure ends the walk
    /// for this destination.
    fn path_length(
        &self,
        fabric: &Fabric,
        memo: &mut HashMap<(NodeId, Lid), u32>,
        switch: NodeId,
        dlid: Lid,
        hops: u32,
        restrict_to_default: bool,
    ) -> Result<u32, RouteViolationKind> {
        if let Some(&remaining) = memo.get(&(switch, dlid)) {
            return Ok(hops + remaining);
        }

        let node = match fabric.get_node(switch) {
            Some(n) => n,
            None => return Err(RouteViolationKind::Unreachable { at: switch }),
        };

        // a switch never forwards traffic addressed to itself
        if node.base_lid() == Some(dlid) {
            return Ok(hops);
        }

        if hops > self.max_hops {
            return Err(RouteViolationKind::HopsExceeded { at: switch, hops });
        }

        // an interior switch without tables dead-ends the route
        let tables = match node.tables() {
            Some(t) => t,
            None => return Err(RouteViolationKind::Unreachable { at: switch }),
        };
        let egress = tables
            .egress(dlid)
            .ok_or(RouteViolationKind::Unreachable { at: switch })?;
        let group = tables.group(dlid);

        let baseline = self.probe_port(fabric, memo, switch, egress, dlid, hops, group, true)?;

        if let Some(gid) = group {
            if !restrict_to_default {
                for port in tables.group_members(gid).iter() {
                    if port == egress {
                        continue;
                    }
                    let alternate =
                        self.probe_port(fabric, memo, switch, port, dlid, hops, group, false)?;
                    if alternate != baseline {
                        return Err(RouteViolationKind::InconsistentHopCount {
                            at: switch,
                            group: gid,
                            port,
                            default: baseline,
                            alternate,
                        });
                    }
                }
            }
        }

        memo.insert((switch, dlid), baseline - hops);
        Ok(baseline)
    }

    /// Follow one egress port of `switch` towards `dlid`: terminate at an
    /// endpoint (verifying its address range and the terminal-leaf group
    /// rule) or recurse into the next switch.
    #[allow(clippy::too_many_arguments)]
    fn probe_port(
        &self,
        fabric: &Fabric,
        memo: &mut HashMap<(NodeId, Lid), u32>,
        switch: NodeId,
        egress: PortNum,
        dlid: Lid,
        hops: u32,
        group: Option<GroupId>,
        restrict_to_default: bool,
    ) -> Result<u32, RouteViolationKind> {
        let Some((peer, peer_port)) = fabric.neighbor((switch, egress)) else {
            // programmed towards an uncabled port: nothing lives there
            return Err(RouteViolationKind::Unreachable { at: switch });
        };
        let Some(peer_node) = fabric.get_node(peer) else {
            return Err(RouteViolationKind::Unreachable { at: switch });
        };

        if peer_node.is_switch() {
            return self.path_length(fabric, memo, peer, dlid, hops + 1, restrict_to_default);
        }

        // arrived at a terminal device: the destination must fall within the
        // address range of the very port we landed on
        let covers = fabric
            .get_port((peer, peer_port))
            .and_then(|p| p.address())
            .map(|a| a.covers(dlid))
            .unwrap_or(false);
        if !covers {
            return Err(RouteViolationKind::BadTermination {
                at: switch,
                egress,
                endpoint: peer,
            });
        }
        // a destination that terminates one hop away must not be in a group
        if let Some(gid) = group {
            return Err(RouteViolationKind::BadMembership {
                at: switch,
                egress,
                group: gid,
            });
        }
        Ok(hops + 1)
    }
}

/// The result of checking one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchRouteReport {
    /// The switch that was checked.
    pub switch: NodeId,
    /// How many programmed destinations were walked.
    pub destinations_checked: usize,
    /// Every defect found. Empty means the switch's state is consistent.
    pub violations: Vec<RouteViolation>,
}

/// The result of checking every switch of a fabric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricRouteReport {
    /// One report per switch that could be checked.
    pub reports: Vec<SwitchRouteReport>,
    /// Switches that could not be checked at all (no forwarding tables).
    pub setup_errors: Vec<FabricError>,
}

impl FabricRouteReport {
    /// Total destinations walked across all switches.
    pub fn destinations_checked(&self) -> usize {
        self.reports.iter().map(|r| r.destinations_checked).sum()
    }

    /// Iterate over every violation of every switch.
    pub fn violations(&self) -> impl Iterator<Item = &RouteViolation> {
        self.reports.iter().flat_map(|r| r.violations.iter())
    }

    /// Returns `true` if and only if no violations and no setup errors were
    /// found.
    pub fn is_clean(&self) -> bool {
        self.setup_errors.is_empty() && self.violations().next().is_none()
    }
}

/// One defect in the forwarding state of a switch, with enough context for a
/// renderer to report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteViolation {
    /// The switch whose check found the defect.
    pub switch: NodeId,
    /// The base LID of that switch, if it has one.
    pub origin_lid: Option<Lid>,
    /// The destination being walked. `None` only for defects that are not
    /// tied to a destination (duplicated groups).
    pub dlid: Option<Lid>,
    /// What went wrong.
    pub kind: RouteViolationKind,
}

/// The route-checking defect taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteViolationKind {
    /// The destination is not programmed at the given switch (or the
    /// programmed port leads nowhere).
    Unreachable {
        /// The switch where the walk dead-ended.
        at: NodeId,
    },
    /// The walk exceeded the hop ceiling: a forwarding cycle or stale
    /// tables.
    HopsExceeded {
        /// The switch at which the ceiling was hit.
        at: NodeId,
        /// The accumulated hop count at that point.
        hops: u32,
    },
    /// The route ends at a device whose address range does not include the
    /// destination.
    BadTermination {
        /// The last switch of the walk.
        at: NodeId,
        /// Its egress port.
        egress: PortNum,
        /// The device the route wrongly ends at.
        endpoint: NodeId,
    },
    /// A destination terminating at the next hop carries an adaptive-routing
    /// group; a terminal leaf must never be load-balanced.
    BadMembership {
        /// The switch carrying the offending group entry.
        at: NodeId,
        /// The egress port that reaches the terminal device.
        egress: PortNum,
        /// The offending group.
        group: GroupId,
    },
    /// An adaptive-routing alternate disagrees with the default path length.
    InconsistentHopCount {
        /// The switch whose group is inconsistent.
        at: NodeId,
        /// The group the destination maps to.
        group: GroupId,
        /// The alternate member port that disagrees.
        port: PortNum,
        /// Length via the default egress port.
        default: u32,
        /// Length via the alternate port.
        alternate: u32,
    },
    /// Two distinct groups with identical membership masks.
    DuplicateGroup {
        /// The lower-numbered group.
        first: GroupId,
        /// The higher-numbered group.
        second: GroupId,
    },
    /// A destination present in the group table but absent from the linear
    /// table.
    OrphanGroupEntry {
        /// The group the stale entry names.
        group: GroupId,
    },
}

/// One device traversal of a walked route. Switches record both the entry
/// and the exit port; the source endpoint records only an exit, the
/// destination only an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceHop {
    /// The traversed device.
    pub node: NodeId,
    /// The port the route enters through.
    pub entry: Option<PortNum>,
    /// The port the route leaves through.
    pub exit: Option<PortNum>,
}

/// Why a route walk failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteError {
    /// No port owns the source LID.
    SourceNotFound(Lid),
    /// A switch has no route programmed for the destination.
    NoRoute(NodeId),
    /// The walk revisited a switch.
    Loop(NodeId),
    /// The walk exceeded the hop ceiling.
    TooLong,
    /// The walk ended at a port that does not own the destination LID.
    WrongDestination(PortId),
}

/// Walk the programmed route from a source LID to a destination LID and
/// return the hop-by-hop trace.
pub fn walk_route(
    fabric: &Fabric,
    slid: Lid,
    dlid: Lid,
    max_hops: u32,
) -> Result<Vec<TraceHop>, RouteError> {
    let source = fabric.find_lid(slid).ok_or(RouteError::SourceNotFound(slid))?;
    let mut trace = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();

    // start on a device: an endpoint exits through its only cabled port, a
    // switch (addressed on port 0) starts routing right away
    let mut current: NodeId = source.0;
    let mut entry: Option<PortNum> = None;
    if let Some(node) = fabric.get_node(source.0) {
        if !node.is_switch() {
            trace.push(TraceHop {
                node: source.0,
                entry: None,
                exit: Some(source.1),
            });
            let Some((next, next_port)) = fabric.neighbor(source) else {
                return Err(RouteError::NoRoute(source.0));
            };
            current = next;
            entry = Some(next_port);
        }
    }

    loop {
        let node = fabric
            .get_node(current)
            .ok_or(RouteError::NoRoute(current))?;
        if !node.is_switch() {
            // arrived at a terminal device
            let covers = entry
                .and_then(|p| fabric.get_port((current, p)))
                .and_then(|p| p.address())
                .map(|a| a.covers(dlid))
                .unwrap_or(false);
            if !covers {
                return Err(RouteError::WrongDestination((
                    current,
                    entry.unwrap_or(PortNum(0)),
                )));
            }
            trace.push(TraceHop {
                node: current,
                entry,
                exit: None,
            });
            return Ok(trace);
        }
        if node.base_lid() == Some(dlid) {
            // the destination is the switch itself
            trace.push(TraceHop {
                node: current,
                entry,
                exit: Some(PortNum(0)),
            });
            return Ok(trace);
        }
        if trace.len() as u32 > max_hops {
            return Err(RouteError::TooLong);
        }
        if !visited.insert(current) {
            return Err(RouteError::Loop(current));
        }
        let egress = node
            .tables()
            .and_then(|t| t.egress(dlid))
            .ok_or(RouteError::NoRoute(current))?;
        trace.push(TraceHop {
            node: current,
            entry,
            exit: Some(egress),
        });
        let Some((next, next_port)) = fabric.neighbor((current, egress)) else {
            return Err(RouteError::NoRoute(current));
        };
        current = next;
        entry = Some(next_port);
    }
}

/// Per-port traffic spread of the programmed routes.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTabulation {
    /// Routes walked end to end.
    pub routes_walked: usize,
    /// Routes that could not be walked.
    pub broken_routes: usize,
    /// How many routes exit through each switch port.
    #[serde_as(as = "Vec<(_, _)>")]
    pub port_usage: HashMap<PortId, u32>,
}

/// Walk the route between every pair of addressed ports (loopback excluded)
/// and count how many routes exit through each switch port. An uneven
/// spread points at poorly balanced linear tables.
pub fn tabulate_routes(fabric: &Fabric, max_hops: u32) -> RouteTabulation {
    let mut tab = RouteTabulation::default();
    let ports: Vec<PortId> = fabric.addressed_ports().collect();
    for &src in &ports {
        for &dst in &ports {
            if src.0 == dst.0 {
                continue;
            }
            let (Some(slid), Some(dlid)) = (
                fabric.get_port(src).and_then(|p| p.address()).map(|a| a.lid),
                fabric.get_port(dst).and_then(|p| p.address()).map(|a| a.lid),
            ) else {
                continue;
            };
            match walk_route(fabric, slid, dlid, max_hops) {
                Ok(trace) => {
                    tab.routes_walked += 1;
                    for hop in trace {
                        let is_switch = fabric
                            .get_node(hop.node)
                            .map(|n| n.is_switch())
                            .unwrap_or(false);
                        if let (true, Some(exit)) = (is_switch, hop.exit) {
                            *tab.port_usage.entry((hop.node, exit)).or_default() += 1;
                        }
                    }
                }
                Err(_) => tab.broken_routes += 1,
            }
        }
    }
    debug!(
        "tabulated {} routes ({} broken)",
        tab.routes_walked, tab.broken_routes
    );
    tab
}
