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

//! Module that introduces a formatter to display all types containing node
//! or port ids with the device descriptions substituted in.

use itertools::Itertools;

use crate::fabric::Fabric;
use crate::reconcile::{Classification, Outcome, Subject};
use crate::routes::{RouteViolation, RouteViolationKind, SwitchRouteReport};
use crate::types::{NodeId, PortId};

/// Trait to format a type that contains node or port ids.
pub trait FabricFormatter<'a, 'n> {
    /// Type that is returned, which implements `std::fmt::Display`.
    type Formatter;

    /// Return a struct that can be formatted and displayed. Unknown ids are
    /// rendered as `?`.
    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter;
}

impl<'a, 'n> FabricFormatter<'a, 'n> for NodeId {
    type Formatter = &'n str;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        fabric.get_node(*self).map(|n| n.description()).unwrap_or("?")
    }
}

impl<'a, 'n> FabricFormatter<'a, 'n> for PortId {
    type Formatter = String;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        format!("{}[{}]", self.0.fmt(fabric), self.1)
    }
}

impl<'a, 'n> FabricFormatter<'a, 'n> for Subject {
    type Formatter = String;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        match self {
            Subject::Node(id) => format!("node {}", id.fmt(fabric)),
            Subject::Link(a, b) => format!("link {} -- {}", a.fmt(fabric), b.fmt(fabric)),
            Subject::Sm(p) => format!("SM at {}", p.fmt(fabric)),
            Subject::ExpectedNode(i) => format!("expected node #{i}"),
            Subject::ExpectedLink(i) => format!("expected link #{i}"),
            Subject::ExpectedSm(i) => format!("expected SM #{i}"),
        }
    }
}

impl<'a, 'n> FabricFormatter<'a, 'n> for Classification {
    type Formatter = String;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        let subject = self.subject.fmt(fabric);
        match &self.outcome {
            Outcome::Consistent => format!("{subject}: consistent"),
            Outcome::AttributeMismatch(diffs) => format!(
                "{subject}: {}",
                diffs
                    .iter()
                    .map(|d| format!(
                        "{} mismatch: expected: {} found: {}",
                        d.field, d.expected, d.actual
                    ))
                    .join(", ")
            ),
            Outcome::Unexpected => format!("{subject}: unexpected"),
            Outcome::Missing => format!("{subject}: missing"),
            Outcome::Duplicate => format!("{subject}: duplicate"),
            Outcome::Miswired { resolved, found } => match found {
                Some(p) => format!(
                    "{subject}: miswired, {} is connected to {}",
                    resolved.fmt(fabric),
                    p.fmt(fabric)
                ),
                None => format!(
                    "{subject}: miswired, {} is not connected",
                    resolved.fmt(fabric)
                ),
            },
        }
    }
}

impl<'a, 'n> FabricFormatter<'a, 'n> for RouteViolationKind {
    type Formatter = String;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        match self {
            RouteViolationKind::Unreachable { at } => {
                format!("unreachable, dead end at {}", at.fmt(fabric))
            }
            RouteViolationKind::HopsExceeded { at, hops } => {
                format!("exceeded {} hops at {}", hops, at.fmt(fabric))
            }
            RouteViolationKind::BadTermination { at, egress, endpoint } => format!(
                "terminates at {} (via {}[{}]) which does not own the destination",
                endpoint.fmt(fabric),
                at.fmt(fabric),
                egress
            ),
            RouteViolationKind::BadMembership { at, egress, group } => format!(
                "terminal destination carries group {} at {}[{}]",
                group,
                at.fmt(fabric),
                egress
            ),
            RouteViolationKind::InconsistentHopCount {
                at,
                group,
                port,
                default,
                alternate,
            } => format!(
                "group {} at {} disagrees: {} hops via default, {} via port {}",
                group,
                at.fmt(fabric),
                default,
                alternate,
                port
            ),
            RouteViolationKind::DuplicateGroup { first, second } => {
                format!("groups {first} and {second} have identical members")
            }
            RouteViolationKind::OrphanGroupEntry { group } => {
                format!("group {group} entry without a linear route")
            }
        }
    }
}

impl<'a, 'n> FabricFormatter<'a, 'n> for RouteViolation {
    type Formatter = String;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        match self.dlid {
            Some(dlid) => format!(
                "{} -> {}: {}",
                self.switch.fmt(fabric),
                dlid,
                self.kind.fmt(fabric)
            ),
            None => format!("{}: {}", self.switch.fmt(fabric), self.kind.fmt(fabric)),
        }
    }
}

impl<'a, 'n> FabricFormatter<'a, 'n> for SwitchRouteReport {
    type Formatter = String;

    fn fmt(&'a self, fabric: &'n Fabric) -> Self::Formatter {
        format!(
            "{}: {} destinations checked, {} violations{}{}",
            self.switch.fmt(fabric),
            self.destinations_checked,
            self.violations.len(),
            if self.violations.is_empty() { "" } else { "\n    " },
            self.violations.iter().map(|v| v.fmt(fabric)).join("\n    ")
        )
    }
}
