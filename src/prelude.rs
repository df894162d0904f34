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

//! Convenience re-export of common members.

pub use crate::expected::{ExpectedLink, ExpectedNode, ExpectedSm, ExpectedTopology, PortSelector};
pub use crate::fabric::{Fabric, SmRecord, SmState};
pub use crate::formatter::FabricFormatter;
pub use crate::forwarding::{ForwardingTables, PortMask};
pub use crate::node::{Node, Port, PortAddress};
pub use crate::reconcile::{reconcile, Classification, Outcome, Reconciliation, Subject};
pub use crate::routes::{
    walk_route, FabricRouteReport, RouteChecker, RouteViolation, RouteViolationKind,
    SwitchRouteReport,
};
pub use crate::types::{
    FabricError, GroupId, Guid, Lid, LinkRate, Mtu, NodeId, NodeKind, PortId, PortNum,
    DEFAULT_MAX_HOPS,
};
