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

//! Module containing all type definitions

use petgraph::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) type IndexType = u32;
/// Node Identification (and index into the graph)
pub type NodeId = NodeIndex<IndexType>;

/// A port on a specific node, the key used by all port-level relations.
pub type PortId = (NodeId, PortNum);

/// Default ceiling on the number of hops a route may take before it is
/// declared broken. Matches the path-length bound of the subnet manager.
pub const DEFAULT_MAX_HOPS: u32 = 64;

/// Globally unique identifier of a device.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Guid(pub u64);

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<u64> for Guid {
    fn from(x: u64) -> Self {
        Self(x)
    }
}

/// Fabric-local address of a port.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lid(pub u32);

impl std::fmt::Display for Lid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u32> for Lid {
    fn from(x: u32) -> Self {
        Self(x)
    }
}

/// Port number, unique within its node. Port 0 is the management port of a
/// switch and carries the switch's base LID.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortNum(pub u8);

impl std::fmt::Display for PortNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for PortNum {
    fn from(x: u8) -> Self {
        Self(x)
    }
}

/// Adaptive-routing port-group identifier, unique within its switch.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroupId(pub u16);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for GroupId {
    fn from(x: u16) -> Self {
        Self(x)
    }
}

/// The kind of a discovered device.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum NodeKind {
    /// A terminal device (host channel adapter).
    Endpoint,
    /// A switching element forwarding by destination LID.
    Switch,
    /// An inter-subnet router. Treated as a terminal device by the route
    /// checker, since its forwarding happens in the next subnet.
    Router,
}

impl NodeKind {
    /// Returns `true` if and only if this is [`NodeKind::Switch`].
    pub fn is_switch(&self) -> bool {
        matches!(self, Self::Switch)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Endpoint => f.write_str("FI"),
            Self::Switch => f.write_str("SW"),
            Self::Router => f.write_str("RT"),
        }
    }
}

/// Signalling rate of a link (per lane generation and width).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LinkRate {
    /// 12.5 Gb/s
    R12g5,
    /// 25 Gb/s
    R25g,
    /// 37.5 Gb/s
    R37g5,
    /// 50 Gb/s
    R50g,
    /// 75 Gb/s
    R75g,
    /// 100 Gb/s
    R100g,
}

impl std::fmt::Display for LinkRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::R12g5 => f.write_str("12.5g"),
            Self::R25g => f.write_str("25g"),
            Self::R37g5 => f.write_str("37.5g"),
            Self::R50g => f.write_str("50g"),
            Self::R75g => f.write_str("75g"),
            Self::R100g => f.write_str("100g"),
        }
    }
}

/// Maximum transfer unit of a port.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Mtu {
    /// 256 bytes
    M256,
    /// 512 bytes
    M512,
    /// 1024 bytes
    M1024,
    /// 2048 bytes
    M2048,
    /// 4096 bytes
    M4096,
    /// 8192 bytes
    M8192,
    /// 10240 bytes
    M10240,
}

impl Mtu {
    /// The MTU in bytes.
    pub fn bytes(&self) -> u32 {
        match self {
            Self::M256 => 256,
            Self::M512 => 512,
            Self::M1024 => 1024,
            Self::M2048 => 2048,
            Self::M4096 => 4096,
            Self::M8192 => 8192,
            Self::M10240 => 10240,
        }
    }
}

impl std::fmt::Display for Mtu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bytes())
    }
}

/// Fabric Errors
///
/// These are the caller-visible setup failures: malformed builder calls and
/// switches without forwarding state. Everything the checkers *find* in a
/// well-formed graph is reported as an accumulated value, never as an error.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FabricError {
    /// Device is not present in the topology
    #[error("Device was not found in the fabric: {0:?}")]
    DeviceNotFound(NodeId),
    /// Port is not present on the given device
    #[error("Device {0:?} has no port {1}")]
    PortNotFound(NodeId, PortNum),
    /// A port with the same number was already added to the device
    #[error("Device {0:?} already has a port {1}")]
    DuplicatePort(NodeId, PortNum),
    /// A device with the same GUID was already added
    #[error("Duplicate node GUID: {0}")]
    DuplicateGuid(Guid),
    /// Two ports claim overlapping LID ranges
    #[error("LID {0} is already assigned to port {1:?}")]
    DuplicateLid(Lid, PortId),
    /// Port already is one end of a physical link
    #[error("Port {0:?} is already linked")]
    PortAlreadyLinked(PortId),
    /// Both ends of a link refer to the same port
    #[error("Cannot link port {0:?} to itself")]
    LinkToSelf(PortId),
    /// The neighbor relation is not symmetric
    #[error("Link is malformed: {0:?} points to {1:?}, but not back")]
    AsymmetricLink(PortId, PortId),
    /// Forwarding tables can only be attached to switches
    #[error("Device {0:?} is not a switch")]
    NotASwitch(NodeId),
    /// A switch carries no forwarding tables at all. This aborts the route
    /// checks for that one switch, not the whole run.
    #[error("Switch {0:?} has no forwarding tables")]
    NoForwardingTables(NodeId),
    /// The LID map names a port that does not exist
    #[error("LID {0} maps to unknown port {1:?}")]
    StaleLidEntry(Lid, PortId),
    /// Json error
    #[error("{0}")]
    JsonError(String),
}

impl From<serde_json::Error> for FabricError {
    fn from(value: serde_json::Error) -> Self {
        Self::JsonError(value.to_string())
    }
}
