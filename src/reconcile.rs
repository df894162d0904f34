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

//! # Entity Reconciler
//!
//! Matches the entities of a discovered [`Fabric`] against an
//! [`ExpectedTopology`] and classifies every entity on both sides.
//!
//! Reconciliation runs in two phases. The resolution phase associates each
//! expected descriptor with at most one discovered entity, preferring exact
//! matches (GUID before description, port-level before node-level) and
//! completing half-specified links through the discovered neighbor, so that
//! a moved cable is still associated with the link it was meant to be. The
//! sweep phase then walks the discovered side and the expected side
//! independently and emits one [`Classification`] per entity. The two sweeps
//! keep separate counts on purpose: a single pair can be flagged from both
//! directions for different reasons (a duplicate on one side, an attribute
//! mismatch on the other).
//!
//! Nothing here mutates the fabric or the design; the only state written is
//! the match state on the returned [`Reconciliation`].

use std::collections::HashMap;

use log::*;
use serde::{Deserialize, Serialize};

use crate::expected::{ExpectedLink, ExpectedNode, ExpectedSm, ExpectedTopology, PortSelector};
use crate::fabric::Fabric;
use crate::node::Node;
use crate::types::{NodeId, PortId};

/// The verdict for one entity, discovered or expected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// The entity this verdict is about.
    pub subject: Subject,
    /// The verdict itself.
    pub outcome: Outcome,
}

/// Identifies the entity a [`Classification`] refers to. Discovered entities
/// are named by their fabric ids, expected entities by their index in the
/// corresponding [`ExpectedTopology`] list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subject {
    /// A discovered device.
    Node(NodeId),
    /// A discovered link, named by its two ports.
    Link(PortId, PortId),
    /// A discovered subnet manager, named by the port it runs on.
    Sm(PortId),
    /// An expected device.
    ExpectedNode(usize),
    /// An expected link.
    ExpectedLink(usize),
    /// An expected subnet manager.
    ExpectedSm(usize),
}

/// The verdict for a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// A counterpart exists and every pinned attribute matches.
    Consistent,
    /// A counterpart exists, but at least one pinned attribute differs.
    AttributeMismatch(Vec<FieldDiff>),
    /// The discovered entity has no counterpart in the expected design.
    Unexpected,
    /// The expected entity has no counterpart in the fabric.
    Missing,
    /// Two entities resolved to the same counterpart: a duplicate entry in
    /// the design, or a duplicated / miscabled physical device.
    Duplicate,
    /// Exactly one side of an expected link resolved; the resolved port's
    /// actual neighbor is not what the design asked for.
    Miswired {
        /// The port that did resolve.
        resolved: PortId,
        /// The neighbor actually found at that port, if it is cabled at all.
        found: Option<PortId>,
    },
}

/// One differing attribute of an [`Outcome::AttributeMismatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// Which attribute differs.
    pub field: Field,
    /// The value the design pinned.
    pub expected: String,
    /// The value found in the fabric.
    pub actual: String,
}

/// The attributes an expected descriptor can pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    /// Device GUID.
    NodeGuid,
    /// Device description.
    NodeDesc,
    /// Device kind.
    NodeKind,
    /// Port number.
    PortNum,
    /// Link rate.
    LinkRate,
    /// Link MTU (minimum of both ports).
    LinkMtu,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeGuid => f.write_str("NodeGuid"),
            Self::NodeDesc => f.write_str("NodeDesc"),
            Self::NodeKind => f.write_str("NodeType"),
            Self::PortNum => f.write_str("PortNum"),
            Self::LinkRate => f.write_str("Rate"),
            Self::LinkMtu => f.write_str("MTU"),
        }
    }
}

/// Checked/flagged counters of one entity category. The discovered-side and
/// expected-side sweeps are counted separately and never merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepCounts {
    /// Discovered entities examined.
    pub fabric_checked: usize,
    /// Discovered entities with a non-consistent verdict.
    pub fabric_flagged: usize,
    /// Expected entities examined.
    pub expected_checked: usize,
    /// Expected entities with a non-consistent verdict.
    pub expected_flagged: usize,
}

/// The result of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reconciliation {
    /// One verdict per entity, discovered entities first (nodes, links,
    /// SMs), then the expected side in design order.
    pub classifications: Vec<Classification>,
    /// Counters of the node sweeps.
    pub nodes: SweepCounts,
    /// Counters of the link sweeps.
    pub links: SweepCounts,
    /// Counters of the subnet-manager sweeps.
    pub sms: SweepCounts,
    /// `true` if no expected design was supplied and nothing was checked.
    pub skipped: bool,
    #[serde(skip)]
    resolution: Resolution,
}

impl Reconciliation {
    /// The result of a run without an expected design: nothing checked,
    /// nothing flagged, not an error.
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }

    /// Returns `true` if and only if every classification is consistent.
    pub fn is_clean(&self) -> bool {
        self.classifications
            .iter()
            .all(|c| c.outcome == Outcome::Consistent)
    }

    /// Iterate over all non-consistent classifications.
    pub fn flagged(&self) -> impl Iterator<Item = &Classification> {
        self.classifications
            .iter()
            .filter(|c| c.outcome != Outcome::Consistent)
    }

    /// The expected-node index a discovered node resolved to.
    pub fn expected_for_node(&self, node: NodeId) -> Option<usize> {
        self.resolution.expected_of_node.get(&node).copied()
    }

    /// The discovered node an expected node resolved to.
    pub fn node_for_expected(&self, index: usize) -> Option<NodeId> {
        self.resolution.node_of_expected.get(index).copied().flatten()
    }

    /// The expected-link index that claimed a discovered port.
    pub fn expected_for_port(&self, port: PortId) -> Option<usize> {
        self.resolution.expected_of_port.get(&port).copied()
    }

    /// The discovered ports an expected link resolved to (either side may be
    /// unresolved).
    pub fn ports_for_expected_link(&self, index: usize) -> (Option<PortId>, Option<PortId>) {
        self.resolution
            .links
            .get(index)
            .map(|rl| (rl.port1, rl.port2))
            .unwrap_or((None, None))
    }

    /// The SM port an expected subnet manager resolved to.
    pub fn sm_for_expected(&self, index: usize) -> Option<PortId> {
        self.resolution.sm_of_expected.get(index).copied().flatten()
    }
}

/// Match the discovered fabric against the expected design and classify
/// every entity on both sides. With no design supplied, the result reports
/// zero entities checked and is marked skipped.
pub fn reconcile(fabric: &Fabric, expected: Option<&ExpectedTopology>) -> Reconciliation {
    let Some(expected) = expected else {
        info!("no expected design supplied, reconciliation skipped");
        return Reconciliation::skipped();
    };

    debug!(
        "reconciling {} nodes / {} links / {} SMs against {} / {} / {} expected",
        fabric.num_nodes(),
        fabric.num_links(),
        fabric.sms().count(),
        expected.nodes.len(),
        expected.links.len(),
        expected.sms.len(),
    );

    let resolution = Resolution::resolve(fabric, expected);
    let mut result = Reconciliation {
        resolution,
        ..Default::default()
    };

    sweep_nodes(fabric, expected, &mut result);
    sweep_links(fabric, expected, &mut result);
    sweep_sms(fabric, expected, &mut result);

    debug!(
        "reconciliation done: {} verdicts, {} flagged",
        result.classifications.len(),
        result.flagged().count()
    );
    result
}

/// How precisely one port selector resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchLevel {
    None = 0,
    Node = 1,
    Port = 2,
}

/// Rank of an expected-link match, combined from the two per-side levels.
/// Used to decide which of two competing expected links matched an actual
/// link better: port/port beats port/node beats node/node, and so on.
const LINK_MATCH_RANK: [[u8; 3]; 3] = [
    [0, 1, 2], //
    [1, 3, 4],
    [2, 4, 5],
];

#[derive(Debug, Clone, Copy, Default)]
struct ResolvedLink {
    port1: Option<PortId>,
    port2: Option<PortId>,
    rank: u8,
}

/// The match state of one run: relation lookups between discovered ids and
/// expected indices. Written once during resolution, read-only afterwards.
#[derive(Debug, Clone, Default)]
struct Resolution {
    node_of_expected: Vec<Option<NodeId>>,
    expected_of_node: HashMap<NodeId, usize>,
    links: Vec<ResolvedLink>,
    expected_of_port: HashMap<PortId, usize>,
    sm_of_expected: Vec<Option<PortId>>,
    expected_of_sm: HashMap<PortId, usize>,
    /// How many expected entities resolved to each discovered entity. A
    /// count above one flags *all* of them as duplicates, not just the
    /// losers of the claim.
    node_claims: HashMap<NodeId, u32>,
    port_claims: HashMap<PortId, u32>,
    sm_claims: HashMap<PortId, u32>,
}

impl Resolution {
    fn resolve(fabric: &Fabric, expected: &ExpectedTopology) -> Self {
        let mut r = Self::default();
        r.resolve_nodes(fabric, expected);
        r.resolve_links(fabric, expected);
        r.resolve_sms(fabric, expected);
        r
    }

    fn resolve_nodes(&mut self, fabric: &Fabric, expected: &ExpectedTopology) {
        for (i, enode) in expected.nodes.iter().enumerate() {
            let mut found = enode.guid.and_then(|g| fabric.find_guid(g));
            if found.is_none() {
                if let Some(desc) = &enode.description {
                    found = fabric.find_description(desc);
                }
            }
            self.node_of_expected.push(found);
            if let Some(id) = found {
                // the first expected node claims the device; later claims
                // stay dangling and surface in the duplicate sweep
                self.expected_of_node.entry(id).or_insert(i);
                *self.node_claims.entry(id).or_default() += 1;
            }
        }
    }

    fn resolve_links(&mut self, fabric: &Fabric, expected: &ExpectedTopology) {
        for (i, elink) in expected.links.iter().enumerate() {
            let (n1, mut p1, l1) = resolve_selector(fabric, &elink.sides[0]);
            let (n2, mut p2, l2) = resolve_selector(fabric, &elink.sides[1]);
            let rank = LINK_MATCH_RANK[l1 as usize][l2 as usize];

            if p1.is_none() && p2.is_none() {
                // neither side resolved; reported as missing in the sweep
                self.links.push(ResolvedLink::default());
                continue;
            }

            // if only one side is pinned down, any neighbor of the resolved
            // side is acceptable; attributes are still verified in the sweep
            if let Some(a) = p1 {
                if p2.is_none() && !elink.sides[1].is_complete() {
                    p2 = fabric.neighbor(a);
                }
            } else if let Some(b) = p2 {
                if !elink.sides[0].is_complete() {
                    p1 = fabric.neighbor(b);
                }
            }
            // one side resolved to a port, the other only to a node: accept
            // the neighbor if it sits on that node, so changed links resolve
            if let (Some(a), None, Some(other)) = (p1, p2, n2) {
                match fabric.neighbor(a) {
                    Some(nb) if nb.0 == other => p2 = Some(nb),
                    _ => {}
                }
            }
            if let (None, Some(b), Some(other)) = (p1, p2, n1) {
                match fabric.neighbor(b) {
                    Some(nb) if nb.0 == other => p1 = Some(nb),
                    _ => {}
                }
            }

            // contend with an expected link that already claimed these ports:
            // the better-ranked match wins, equal ranks are left for the
            // duplicate sweep
            if let (Some(a), Some(b)) = (p1, p2) {
                if let (Some(&ia), Some(&ib)) = (
                    self.expected_of_port.get(&a),
                    self.expected_of_port.get(&b),
                ) {
                    if ia == ib {
                        let prev_rank = self.links[ia].rank;
                        if prev_rank > rank {
                            // keep the previous association; this entry will
                            // be reported as missing
                            self.links.push(ResolvedLink::default());
                            continue;
                        } else if prev_rank < rank {
                            trace!("expected link {i} outranks {ia} for {a:?} -- {b:?}");
                            self.expected_of_port.remove(&a);
                            self.expected_of_port.remove(&b);
                            for p in [self.links[ia].port1, self.links[ia].port2]
                                .into_iter()
                                .flatten()
                            {
                                if let Some(c) = self.port_claims.get_mut(&p) {
                                    *c = c.saturating_sub(1);
                                }
                            }
                            self.links[ia] = ResolvedLink::default();
                        }
                    }
                }
            }

            // claim the discovered link when both resolved ports really are
            // the two ends of one cable and nothing claimed them before
            if let (Some(a), Some(b)) = (p1, p2) {
                if fabric.neighbor(a) == Some(b)
                    && !self.expected_of_port.contains_key(&a)
                    && !self.expected_of_port.contains_key(&b)
                {
                    self.expected_of_port.insert(a, i);
                    self.expected_of_port.insert(b, i);
                }
            }
            for p in [p1, p2].into_iter().flatten() {
                *self.port_claims.entry(p).or_default() += 1;
            }
            self.links.push(ResolvedLink {
                port1: p1,
                port2: p2,
                rank,
            });
        }
    }

    fn resolve_sms(&mut self, fabric: &Fabric, expected: &ExpectedTopology) {
        for (i, esm) in expected.sms.iter().enumerate() {
            let mut node = esm.guid.and_then(|g| fabric.find_guid(g));
            if node.is_none() {
                if let Some(desc) = &esm.description {
                    node = fabric.find_description(desc);
                }
            }
            let mut port = None;
            if let Some(id) = node {
                if let Some(num) = esm.port {
                    if fabric.get_port((id, num)).is_some() {
                        port = Some((id, num));
                    }
                }
                if port.is_none() {
                    if let Some(n) = fabric.get_node(id) {
                        // a switch runs its SM on port 0; a single-ported
                        // device leaves no choice either
                        if n.is_switch() && n.get_port(0.into()).is_some() {
                            port = Some((id, 0.into()));
                        } else if n.num_ports() == 1 {
                            port = n.ports().next().map(|p| (id, p.num()));
                        }
                    }
                }
            }
            let found = port.filter(|p| fabric.sms().any(|(sp, _)| sp == *p));
            self.sm_of_expected.push(found);
            if let Some(p) = found {
                self.expected_of_sm.entry(p).or_insert(i);
                *self.sm_claims.entry(p).or_default() += 1;
            }
        }
    }
}

/// Resolve a port selector as far as possible: GUID before description for
/// the node, then the pinned port number, then the only port of a
/// single-ported node (a fuzzy fallback that does not raise the match
/// level).
fn resolve_selector(
    fabric: &Fabric,
    sel: &PortSelector,
) -> (Option<NodeId>, Option<PortId>, MatchLevel) {
    let mut node = sel.node_guid.and_then(|g| fabric.find_guid(g));
    if node.is_none() {
        if let Some(desc) = &sel.node_desc {
            node = fabric.find_description(desc);
        }
    }
    let Some(id) = node else {
        return (None, None, MatchLevel::None);
    };
    let mut level = MatchLevel::Node;
    let mut port = None;
    if let Some(num) = sel.port {
        if fabric.get_port((id, num)).is_some() {
            port = Some((id, num));
            level = MatchLevel::Port;
        }
    }
    if port.is_none() {
        if let Some(n) = fabric.get_node(id) {
            if n.num_ports() == 1 {
                port = n.ports().next().map(|p| (id, p.num()));
            }
        }
    }
    (Some(id), port, level)
}

fn sweep_nodes(fabric: &Fabric, expected: &ExpectedTopology, result: &mut Reconciliation) {
    for node in fabric.nodes() {
        result.nodes.fabric_checked += 1;
        let outcome = match result.resolution.expected_of_node.get(&node.id()) {
            Some(&i) => verdict(diff_node(node, &expected.nodes[i])),
            None => Outcome::Unexpected,
        };
        result.nodes.fabric_flagged += flag(&outcome);
        result.classifications.push(Classification {
            subject: Subject::Node(node.id()),
            outcome,
        });
    }
    for i in 0..expected.nodes.len() {
        result.nodes.expected_checked += 1;
        let outcome = match result.resolution.node_of_expected[i] {
            None => Outcome::Missing,
            // every contender for the same device is a duplicate, the first
            // claimer included
            Some(id) if result.resolution.node_claims.get(&id) > Some(&1) => Outcome::Duplicate,
            Some(_) => Outcome::Consistent,
        };
        result.nodes.expected_flagged += flag(&outcome);
        result.classifications.push(Classification {
            subject: Subject::ExpectedNode(i),
            outcome,
        });
    }
}

fn sweep_links(fabric: &Fabric, expected: &ExpectedTopology, result: &mut Reconciliation) {
    for (a, b) in fabric.links() {
        result.links.fabric_checked += 1;
        let claimed = (
            result.resolution.expected_of_port.get(&a).copied(),
            result.resolution.expected_of_port.get(&b).copied(),
        );
        let outcome = match claimed {
            (Some(i), Some(j)) if i == j => {
                let elink = &expected.links[i];
                let rl = &result.resolution.links[i];
                let (sel_a, sel_b) = if rl.port1 == Some(a) {
                    (&elink.sides[0], &elink.sides[1])
                } else {
                    (&elink.sides[1], &elink.sides[0])
                };
                let mut diffs = diff_selector(fabric, a, sel_a);
                diffs.extend(diff_selector(fabric, b, sel_b));
                diffs.extend(diff_link_attrs(fabric, a, b, elink));
                verdict(diffs)
            }
            (None, None) => Outcome::Unexpected,
            _ => {
                // a claim always covers both sides of the cable
                debug_assert!(false, "link {a:?} -- {b:?} claimed on one side only");
                Outcome::Unexpected
            }
        };
        result.links.fabric_flagged += flag(&outcome);
        result.classifications.push(Classification {
            subject: Subject::Link(a, b),
            outcome,
        });
    }
    for i in 0..expected.links.len() {
        result.links.expected_checked += 1;
        let rl = result.resolution.links[i];
        let outcome = match (rl.port1, rl.port2) {
            (None, None) => Outcome::Missing,
            (Some(a), Some(b)) => {
                // contested ports flag every contender; unclaimed-but-fully-
                // resolved means the two ports exist but are not cabled to
                // each other, which is a duplicate port in the design or a
                // miscabled device
                if result.resolution.port_claims.get(&a) > Some(&1)
                    || result.resolution.port_claims.get(&b) > Some(&1)
                    || result.resolution.expected_of_port.get(&a) != Some(&i)
                    || result.resolution.expected_of_port.get(&b) != Some(&i)
                {
                    Outcome::Duplicate
                } else {
                    Outcome::Consistent
                }
            }
            (Some(p), None) | (None, Some(p)) => Outcome::Miswired {
                resolved: p,
                found: fabric.neighbor(p),
            },
        };
        result.links.expected_flagged += flag(&outcome);
        result.classifications.push(Classification {
            subject: Subject::ExpectedLink(i),
            outcome,
        });
    }
}

fn sweep_sms(fabric: &Fabric, expected: &ExpectedTopology, result: &mut Reconciliation) {
    let sm_ports: Vec<PortId> = fabric.sms().map(|(p, _)| p).collect();
    for port in sm_ports {
        result.sms.fabric_checked += 1;
        let outcome = match result.resolution.expected_of_sm.get(&port) {
            Some(&i) => verdict(diff_sm(fabric, port, &expected.sms[i])),
            None => Outcome::Unexpected,
        };
        result.sms.fabric_flagged += flag(&outcome);
        result.classifications.push(Classification {
            subject: Subject::Sm(port),
            outcome,
        });
    }
    for i in 0..expected.sms.len() {
        result.sms.expected_checked += 1;
        let outcome = match result.resolution.sm_of_expected[i] {
            None => Outcome::Missing,
            Some(p) if result.resolution.sm_claims.get(&p) > Some(&1) => Outcome::Duplicate,
            Some(_) => Outcome::Consistent,
        };
        result.sms.expected_flagged += flag(&outcome);
        result.classifications.push(Classification {
            subject: Subject::ExpectedSm(i),
            outcome,
        });
    }
}

fn verdict(diffs: Vec<FieldDiff>) -> Outcome {
    if diffs.is_empty() {
        Outcome::Consistent
    } else {
        Outcome::AttributeMismatch(diffs)
    }
}

fn flag(outcome: &Outcome) -> usize {
    if *outcome == Outcome::Consistent {
        0
    } else {
        trace!("flagged: {outcome:?}");
        1
    }
}

/// Record a diff if the expected value is pinned and differs.
fn check<T, U>(diffs: &mut Vec<FieldDiff>, field: Field, expected: &Option<T>, actual: &U)
where
    T: PartialEq<U> + std::fmt::Display,
    U: std::fmt::Display,
{
    if let Some(e) = expected {
        if e != actual {
            diffs.push(FieldDiff {
                field,
                expected: e.to_string(),
                actual: actual.to_string(),
            });
        }
    }
}

fn diff_node(node: &Node, enode: &ExpectedNode) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    check(&mut diffs, Field::NodeGuid, &enode.guid, &node.guid());
    check(
        &mut diffs,
        Field::NodeDesc,
        &enode.description,
        &node.description().to_string(),
    );
    check(&mut diffs, Field::NodeKind, &enode.kind, &node.kind());
    diffs
}

fn diff_selector(fabric: &Fabric, port: PortId, sel: &PortSelector) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    let Some(node) = fabric.get_node(port.0) else {
        return diffs;
    };
    check(&mut diffs, Field::NodeGuid, &sel.node_guid, &node.guid());
    check(
        &mut diffs,
        Field::NodeDesc,
        &sel.node_desc,
        &node.description().to_string(),
    );
    check(&mut diffs, Field::PortNum, &sel.port, &port.1);
    check(&mut diffs, Field::NodeKind, &sel.kind, &node.kind());
    diffs
}

fn diff_link_attrs(
    fabric: &Fabric,
    a: PortId,
    b: PortId,
    elink: &ExpectedLink,
) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    if let Some(pa) = fabric.get_port(a) {
        check(&mut diffs, Field::LinkRate, &elink.rate, &pa.rate());
        if let Some(pb) = fabric.get_port(b) {
            // the effective MTU of a link is the lesser of its two ports
            check(
                &mut diffs,
                Field::LinkMtu,
                &elink.mtu,
                &pa.mtu().min(pb.mtu()),
            );
        }
    }
    diffs
}

fn diff_sm(fabric: &Fabric, port: PortId, esm: &ExpectedSm) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    let Some(node) = fabric.get_node(port.0) else {
        return diffs;
    };
    check(&mut diffs, Field::NodeGuid, &esm.guid, &node.guid());
    check(
        &mut diffs,
        Field::NodeDesc,
        &esm.description,
        &node.description().to_string(),
    );
    check(&mut diffs, Field::PortNum, &esm.port, &port.1);
    check(&mut diffs, Field::NodeKind, &esm.kind, &node.kind());
    diffs
}
