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

use pretty_assertions::assert_eq;

use super::*;
use crate::builder::FabricBuilder;
use crate::forwarding::PortMask;
use crate::routes::{tabulate_routes, walk_route, RouteChecker, RouteError, RouteViolationKind};
use crate::types::{FabricError, GroupId, DEFAULT_MAX_HOPS};

#[test]
fn two_tier_is_clean() {
    init_logger();
    let fabric = Fabric::build_two_tier(3, 4, 4).unwrap();
    let report = RouteChecker::default().check_fabric(&fabric);
    assert_eq!(report.setup_errors, vec![]);
    assert_eq!(report.reports.len(), 7);
    assert!(report.is_clean());
    for switch_report in &report.reports {
        // every switch routes to every addressed port
        assert_eq!(switch_report.destinations_checked, 3 + 4 + 16);
    }
}

#[test]
fn chain_is_clean() {
    let fabric = Fabric::build_chain(4, 2).unwrap();
    let report = RouteChecker::default().check_fabric(&fabric);
    assert!(report.is_clean());
    assert_eq!(report.destinations_checked(), 4 * (4 + 8));
}

#[test]
fn mini_fabric_is_clean() {
    let fabric = mini_fabric();
    let report = RouteChecker::default().check_fabric(&fabric);
    assert!(report.is_clean());
    assert_eq!(report.destinations_checked(), 8);
}

/// The adaptive alternate takes a longer path than the default:
///
/// ```text
///          p3 ---- B ---- n010 (lid 10)
///   A ----<        |
///          p5 ---- C
/// ```
///
/// `A` routes lid 10 via port 3 (2 hops), but group 7 = {3, 5} also allows
/// port 5 through `C`, which needs 3 hops.
fn inconsistent_fabric() -> Fabric {
    let mut fabric = Fabric::new();
    let a = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[3, 5]);
    let b = switch(&mut fabric, 0xb0, "sw-b", 0x41, &[1, 2, 3]);
    let c = switch(&mut fabric, 0xc0, "sw-c", 0x42, &[2, 3]);
    let x = host(&mut fabric, 0xd0, "n010 hfi1_0", 10);
    fabric.add_link((a, PortNum(3)), (b, PortNum(2))).unwrap();
    fabric.add_link((a, PortNum(5)), (c, PortNum(2))).unwrap();
    fabric.add_link((c, PortNum(3)), (b, PortNum(3))).unwrap();
    fabric.add_link((b, PortNum(1)), (x, PortNum(1))).unwrap();

    let mut ta = ForwardingTables::default();
    ta.set_egress(Lid(10), PortNum(3));
    ta.set_group(Lid(10), GroupId(7));
    ta.set_members(GroupId(7), [PortNum(3), PortNum(5)].into_iter().collect());
    fabric.set_forwarding_tables(a, ta).unwrap();

    let mut tb = ForwardingTables::default();
    tb.set_egress(Lid(10), PortNum(1));
    fabric.set_forwarding_tables(b, tb).unwrap();

    let mut tc = ForwardingTables::default();
    tc.set_egress(Lid(10), PortNum(3));
    fabric.set_forwarding_tables(c, tc).unwrap();
    fabric
}

#[test]
fn inconsistent_hop_count() {
    init_logger();
    let fabric = inconsistent_fabric();
    let a = node(&fabric, "sw-a");
    let report = RouteChecker::default().check_fabric(&fabric);

    let violations: Vec<_> = report.violations().collect();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].switch, a);
    assert_eq!(violations[0].dlid, Some(Lid(10)));
    assert_eq!(
        violations[0].kind,
        RouteViolationKind::InconsistentHopCount {
            at: a,
            group: GroupId(7),
            port: PortNum(5),
            default: 2,
            alternate: 3,
        }
    );
    // B and C alone are consistent
    assert_eq!(report.destinations_checked(), 3);
}

#[test]
fn orphan_group_entry() {
    let mut fabric = Fabric::new();
    let s = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1]);
    let mut tables = ForwardingTables::default();
    // lid 20 has a group but no linear route
    tables.set_group(Lid(20), GroupId(5));
    tables.set_members(GroupId(5), [PortNum(1)].into_iter().collect());
    fabric.set_forwarding_tables(s, tables).unwrap();

    let report = RouteChecker::default().check_switch(&fabric, s).unwrap();
    assert_eq!(report.destinations_checked, 0);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].dlid, Some(Lid(20)));
    assert_eq!(
        report.violations[0].kind,
        RouteViolationKind::OrphanGroupEntry { group: GroupId(5) }
    );
}

#[test]
fn bad_termination_outside_lmc_range() {
    let mut fabric = Fabric::new();
    let s = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1]);
    // the endpoint owns lids 0x50..=0x53
    let h = host_lmc(&mut fabric, 0xd0, "n001 hfi1_0", 0x50, 2);
    fabric.add_link((s, PortNum(1)), (h, PortNum(1))).unwrap();

    let mut tables = ForwardingTables::default();
    tables.set_egress(Lid(0x53), PortNum(1)); // inside the range
    tables.set_egress(Lid(0x54), PortNum(1)); // outside
    fabric.set_forwarding_tables(s, tables).unwrap();

    let report = RouteChecker::default().check_switch(&fabric, s).unwrap();
    assert_eq!(report.destinations_checked, 2);
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].dlid, Some(Lid(0x54)));
    assert_eq!(
        report.violations[0].kind,
        RouteViolationKind::BadTermination {
            at: s,
            egress: PortNum(1),
            endpoint: h,
        }
    );
}

#[test]
fn bad_membership_on_terminal_destination() {
    let mut fabric = Fabric::new();
    let s = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1, 2]);
    let h = host(&mut fabric, 0xd0, "n001 hfi1_0", 0x50);
    fabric.add_link((s, PortNum(1)), (h, PortNum(1))).unwrap();

    let mut tables = ForwardingTables::default();
    tables.set_egress(Lid(0x50), PortNum(1));
    // a destination one hop away must not be load-balanced
    tables.set_group(Lid(0x50), GroupId(0));
    tables.set_members(GroupId(0), [PortNum(1), PortNum(2)].into_iter().collect());
    fabric.set_forwarding_tables(s, tables).unwrap();

    let report = RouteChecker::default().check_switch(&fabric, s).unwrap();
    assert_eq!(report.violations.len(), 1);
    assert_eq!(
        report.violations[0].kind,
        RouteViolationKind::BadMembership {
            at: s,
            egress: PortNum(1),
            group: GroupId(0),
        }
    );
}

#[test]
fn unreachable_downstream_and_uncabled() {
    let mut fabric = Fabric::new();
    let a = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1, 9]);
    let b = switch(&mut fabric, 0xb0, "sw-b", 0x41, &[2]);
    fabric.add_link((a, PortNum(1)), (b, PortNum(2))).unwrap();

    let mut ta = ForwardingTables::default();
    ta.set_egress(Lid(0x60), PortNum(1)); // b has no entry for 0x60
    ta.set_egress(Lid(0x61), PortNum(9)); // port 9 is not cabled
    fabric.set_forwarding_tables(a, ta).unwrap();
    fabric
        .set_forwarding_tables(b, ForwardingTables::default())
        .unwrap();

    let report = RouteChecker::default().check_switch(&fabric, a).unwrap();
    assert_eq!(report.violations.len(), 2);
    assert_eq!(
        report.violations[0],
        crate::routes::RouteViolation {
            switch: a,
            origin_lid: Some(Lid(0x40)),
            dlid: Some(Lid(0x60)),
            kind: RouteViolationKind::Unreachable { at: b },
        }
    );
    assert_eq!(
        report.violations[1].kind,
        RouteViolationKind::Unreachable { at: a }
    );
}

#[test]
fn hops_exceeded_on_forwarding_cycle() {
    let mut fabric = Fabric::new();
    let a = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1]);
    let b = switch(&mut fabric, 0xb0, "sw-b", 0x41, &[1]);
    fabric.add_link((a, PortNum(1)), (b, PortNum(1))).unwrap();

    // lid 99 ping-pongs between the two switches forever
    let mut ta = ForwardingTables::default();
    ta.set_egress(Lid(99), PortNum(1));
    fabric.set_forwarding_tables(a, ta).unwrap();
    let mut tb = ForwardingTables::default();
    tb.set_egress(Lid(99), PortNum(1));
    fabric.set_forwarding_tables(b, tb).unwrap();

    let report = RouteChecker::new(8).check_switch(&fabric, a).unwrap();
    assert_eq!(report.violations.len(), 1);
    assert!(matches!(
        report.violations[0].kind,
        RouteViolationKind::HopsExceeded { hops: 9, .. }
    ));
}

#[test]
fn self_route_succeeds_regardless_of_table_contents() {
    let mut fabric = Fabric::new();
    let s = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1]);
    let mut tables = ForwardingTables::default();
    // garbage entry for the switch's own lid
    tables.set_egress(Lid(0x40), PortNum(42));
    fabric.set_forwarding_tables(s, tables).unwrap();

    let report = RouteChecker::default().check_switch(&fabric, s).unwrap();
    assert_eq!(report.destinations_checked, 1);
    assert_eq!(report.violations, vec![]);
}

#[test]
fn duplicate_group_masks() {
    let mut fabric = Fabric::new();
    let s = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1, 2, 3]);
    let mut tables = ForwardingTables::default();
    tables.set_members(GroupId(1), [PortNum(2), PortNum(3)].into_iter().collect());
    tables.set_members(GroupId(2), [PortNum(2)].into_iter().collect());
    tables.set_members(GroupId(4), [PortNum(2), PortNum(3)].into_iter().collect());
    // empty groups are vacuous and never reported
    tables.set_members(GroupId(3), PortMask::new());
    tables.set_members(GroupId(5), PortMask::new());
    fabric.set_forwarding_tables(s, tables).unwrap();

    let report = RouteChecker::default().check_switch(&fabric, s).unwrap();
    assert_eq!(report.violations.len(), 1);
    assert_eq!(report.violations[0].dlid, None);
    assert_eq!(
        report.violations[0].kind,
        RouteViolationKind::DuplicateGroup {
            first: GroupId(1),
            second: GroupId(4),
        }
    );
}

#[test]
fn switch_without_tables_is_a_setup_error() {
    let mut fabric = mini_fabric();
    let bare = switch(&mut fabric, 0xa3, "edge03", 0x42, &[1]);

    let checker = RouteChecker::default();
    assert_eq!(
        checker.check_switch(&fabric, bare),
        Err(FabricError::NoForwardingTables(bare))
    );
    // the rest of the fabric is still checked
    let report = checker.check_fabric(&fabric);
    assert_eq!(
        report.setup_errors,
        vec![FabricError::NoForwardingTables(bare)]
    );
    assert_eq!(report.reports.len(), 2);
    assert!(report.violations().next().is_none());
}

#[test]
fn check_switch_rejects_endpoints() {
    let fabric = mini_fabric();
    let h = node(&fabric, "n001 hfi1_0");
    assert_eq!(
        RouteChecker::default().check_switch(&fabric, h),
        Err(FabricError::NotASwitch(h))
    );
}

/// A group inconsistency on an interior switch is invisible to an upstream
/// check (the default chain does not probe interior alternates) but is
/// caught by the interior switch's own run. The memo cache is private to one
/// `check_switch` call, so the two runs cannot contaminate each other.
///
/// ```text
///   A --p1-- B --p1------- D ---- n007 (lid 7)
///   |        \--p2-- E --/ |
///   \--p2-- C -------p1---/
/// ```
#[test]
fn interior_groups_are_checked_from_their_own_origin() {
    init_logger();
    let mut fabric = Fabric::new();
    let a = switch(&mut fabric, 0xa0, "sw-a", 0x40, &[1, 2]);
    let b = switch(&mut fabric, 0xb0, "sw-b", 0x41, &[1, 2, 3]);
    let c = switch(&mut fabric, 0xc0, "sw-c", 0x42, &[1, 2]);
    let d = switch(&mut fabric, 0xd0, "sw-d", 0x43, &[1, 2, 3, 4]);
    let e = switch(&mut fabric, 0xe0, "sw-e", 0x44, &[1, 2]);
    let x = host(&mut fabric, 0xf0, "n007 hfi1_0", 7);
    fabric.add_link((a, PortNum(1)), (b, PortNum(3))).unwrap();
    fabric.add_link((a, PortNum(2)), (c, PortNum(2))).unwrap();
    fabric.add_link((b, PortNum(1)), (d, PortNum(2))).unwrap();
    fabric.add_link((b, PortNum(2)), (e, PortNum(2))).unwrap();
    fabric.add_link((c, PortNum(1)), (d, PortNum(3))).unwrap();
    fabric.add_link((e, PortNum(1)), (d, PortNum(4))).unwrap();
    fabric.add_link((d, PortNum(1)), (x, PortNum(1))).unwrap();

    // A load-balances over B and C, which agree (3 hops each).
    let mut ta = ForwardingTables::default();
    ta.set_egress(Lid(7), PortNum(1));
    ta.set_group(Lid(7), GroupId(0));
    ta.set_members(GroupId(0), [PortNum(1), PortNum(2)].into_iter().collect());
    fabric.set_forwarding_tables(a, ta).unwrap();
    // B load-balances over D (direct) and E (one extra hop): inconsistent.
    let mut tb = ForwardingTables::default();
    tb.set_egress(Lid(7), PortNum(1));
    tb.set_group(Lid(7), GroupId(0));
    tb.set_members(GroupId(0), [PortNum(1), PortNum(2)].into_iter().collect());
    fabric.set_forwarding_tables(b, tb).unwrap();
    for (sw, port) in [(c, 1), (d, 1), (e, 1)] {
        let mut t = ForwardingTables::default();
        t.set_egress(Lid(7), PortNum(port));
        fabric.set_forwarding_tables(sw, t).unwrap();
    }

    let checker = RouteChecker::default();
    let report = checker.check_fabric(&fabric);

    // A's own check walks B with restrict-to-default and stays clean
    let report_a = report.reports.iter().find(|r| r.switch == a).unwrap();
    assert_eq!(report_a.violations, vec![]);

    // B's check probes its own alternates and finds the disagreement
    let report_b = report.reports.iter().find(|r| r.switch == b).unwrap();
    assert_eq!(report_b.violations.len(), 1);
    assert_eq!(
        report_b.violations[0].kind,
        RouteViolationKind::InconsistentHopCount {
            at: b,
            group: GroupId(0),
            port: PortNum(2),
            default: 2,
            alternate: 3,
        }
    );

    // private memo caches: a second run reproduces the result exactly
    let again = checker.check_fabric(&fabric);
    assert_eq!(report, again);
}

#[test]
fn walk_route_across_two_tier() {
    let fabric = Fabric::build_two_tier(2, 2, 2).unwrap();
    // host(0,0) has lid 1, host(1,0) has lid 3
    let trace = walk_route(&fabric, Lid(1), Lid(3), DEFAULT_MAX_HOPS).unwrap();
    assert_eq!(trace.len(), 5);
    assert_eq!(trace[0].entry, None);
    assert_eq!(trace[0].exit, Some(PortNum(1)));
    assert_eq!(trace[4].entry, Some(PortNum(1)));
    assert_eq!(trace[4].exit, None);
    // hosts at the ends, switches in the middle
    assert!(trace[1..4]
        .iter()
        .all(|hop| fabric.get_node(hop.node).unwrap().is_switch()));

    // routes may end at a switch's own lid
    let leaf1 = node(&fabric, "leaf01");
    let trace = walk_route(
        &fabric,
        Lid(1),
        Lid(crate::builder::SWITCH_LID_BASE + 1),
        DEFAULT_MAX_HOPS,
    )
    .unwrap();
    assert_eq!(trace.last().unwrap().node, leaf1);
    assert_eq!(trace.last().unwrap().exit, Some(PortNum(0)));

    // an unprogrammed destination dead-ends
    assert_eq!(
        walk_route(&fabric, Lid(1), Lid(0x999), DEFAULT_MAX_HOPS),
        Err(RouteError::NoRoute(node(&fabric, "leaf00")))
    );
}

#[test]
fn tabulate_routes_two_tier() {
    let fabric = Fabric::build_two_tier(2, 2, 2).unwrap();
    let tab = tabulate_routes(&fabric, DEFAULT_MAX_HOPS);
    // 8 addressed ports on 8 distinct devices, all pairs walkable
    assert_eq!(tab.routes_walked, 8 * 7);
    assert_eq!(tab.broken_routes, 0);
    assert!(!tab.port_usage.is_empty());
    // every host-facing leaf port carries the 7 routes towards its host
    let leaf0 = node(&fabric, "leaf00");
    assert_eq!(tab.port_usage[&(leaf0, PortNum(1))], 7);
}
