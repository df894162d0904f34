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

#![deny(missing_docs, missing_debug_implementations)]

//! # FabCheck
//!
//! This is a library for diagnosing switched interconnect fabrics
//! (InfiniBand/OPA-class networks).
//!
//! ## Main Concepts
//!
//! The [`fabric::Fabric`] is the main datastructure to operate on. It holds
//! one discovered subnet: nodes (endpoints, switches, routers) with their
//! ports, the physical links between them, the per-switch forwarding tables
//! (see [`forwarding::ForwardingTables`]) and the subnet managers found.
//! The fabric is populated once from the results of a subnet query and is
//! immutable for the duration of one analysis run. Devices are stored on a
//! graph (see [Petgraph](https://docs.rs/petgraph/latest/petgraph/index.html)).
//!
//! Two analyses run on top of it:
//!
//! - [`reconcile::reconcile`] matches the discovered fabric against an
//!   [`expected::ExpectedTopology`] (the administrator's design document)
//!   and classifies every entity on both sides: consistent, attribute
//!   mismatch, unexpected, missing, duplicate, or miswired.
//! - [`routes::RouteChecker`] walks every switch's forwarding tables and
//!   verifies that each programmed destination is reachable, terminates at
//!   the right device, and that every adaptive-routing alternate agrees
//!   with the default path length.
//!
//! Both analyses collect their findings as plain values
//! ([`reconcile::Classification`], [`routes::RouteViolation`]) and never
//! abort on a defect; a fabric with thousands of problems is scanned to the
//! end. Rendering the findings is the job of a downstream report tool.
//!
//! ## Example usage
//!
//! ```
//! use fabcheck::prelude::*;
//! use fabcheck::builder::FabricBuilder;
//!
//! fn main() -> Result<(), FabricError> {
//!     // two spines, four leaves, eight hosts per leaf
//!     let fabric = Fabric::build_two_tier(2, 4, 8)?;
//!
//!     // the forwarding state of a built fabric is consistent
//!     let report = RouteChecker::default().check_fabric(&fabric);
//!     assert!(report.is_clean());
//!     assert_eq!(report.setup_errors, vec![]);
//!
//!     // and the fabric matches its own mirror design
//!     let expected = ExpectedTopology::from_fabric(&fabric);
//!     let verdicts = reconcile(&fabric, Some(&expected));
//!     assert!(verdicts.is_clean());
//!     assert_eq!(verdicts.nodes.fabric_checked, fabric.num_nodes());
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod expected;
pub mod fabric;
pub mod formatter;
pub mod forwarding;
pub mod node;
pub mod prelude;
pub mod reconcile;
pub mod routes;
pub mod types;

#[cfg(test)]
mod test;
