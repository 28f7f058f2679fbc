//! Wire messages and the datagram codec.
//!
//! Four message kinds ride the broadcast medium. Encoding is postcard;
//! every message must fit a single datagram. Collection bounds are
//! enforced after decode so a malformed peer cannot make us allocate
//! past the datagram budget.

use crate::types::{
    MAX_ADDRS_PER_NODE, MAX_DATAGRAM, MAX_NAME_LEN, MAX_NEIGHBOR_ENTRIES, MAX_PAYLOAD,
    MAX_ROUTE_HOPS,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encoding: {0}")]
    Encoding(#[from] postcard::Error),
    #[error("datagram too large: {0} bytes")]
    Oversize(usize),
    #[error("bounds: {0}")]
    Bounds(&'static str),
}

/// One row of a HELLO neighbor table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub name: String,
    pub addrs: Vec<IpAddr>,
    /// The announcing node has chosen this neighbor as one of its MPRs.
    pub local_mpr: bool,
    /// This neighbor has chosen the announcing node as one of ITS MPRs.
    pub mprss: bool,
    /// The announcing node has quarantined this neighbor.
    pub isolated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Periodic announcement of identity and one-hop neighborhood.
    Hello {
        sender: String,
        neighbors: Vec<NeighborEntry>,
    },
    /// Topology control bulletin, flooded through MPRs. `mpr_set` is the
    /// sender's MPR selector set; `route` is the ordered list of nodes
    /// that have re-broadcast this bulletin, originator first.
    Tc {
        sender: String,
        mpr_set: Vec<String>,
        route: Vec<String>,
    },
    /// Application unicast, forwarded hop-by-hop by MPRs only.
    /// `forwarders` is the path so far, originator first.
    Custom {
        sender: String,
        dest: String,
        payload: Vec<u8>,
        forwarders: Vec<String>,
    },
    /// Reserved. Decoded and dropped.
    Alert { sender: String, data: Vec<u8> },
}

/// Identity of a CUSTOM message as the IPS sees it: two messages with the
/// same origin, destination and payload are the same message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CustomKey {
    pub sender: String,
    pub dest: String,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::Tc { .. } => "tc",
            Message::Custom { .. } => "custom",
            Message::Alert { .. } => "alert",
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            Message::Hello { sender, .. }
            | Message::Tc { sender, .. }
            | Message::Custom { sender, .. }
            | Message::Alert { sender, .. } => sender,
        }
    }

    /// The IPS matching key, for CUSTOM messages only.
    pub fn custom_key(&self) -> Option<CustomKey> {
        match self {
            Message::Custom {
                sender,
                dest,
                payload,
                ..
            } => Some(CustomKey {
                sender: sender.clone(),
                dest: dest.clone(),
                payload: payload.clone(),
            }),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let bytes = postcard::to_allocvec(self)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(CodecError::Oversize(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() > MAX_DATAGRAM {
            return Err(CodecError::Oversize(data.len()));
        }
        let msg: Message = postcard::from_bytes(data)?;
        msg.validate()?;
        Ok(msg)
    }

    fn validate(&self) -> Result<(), CodecError> {
        check_name(self.sender())?;
        match self {
            Message::Hello { neighbors, .. } => {
                if neighbors.len() > MAX_NEIGHBOR_ENTRIES {
                    return Err(CodecError::Bounds("too many neighbor entries"));
                }
                for nbr in neighbors {
                    check_name(&nbr.name)?;
                    if nbr.addrs.len() > MAX_ADDRS_PER_NODE {
                        return Err(CodecError::Bounds("too many addresses per neighbor"));
                    }
                }
            }
            Message::Tc { mpr_set, route, .. } => {
                if mpr_set.len() > MAX_NEIGHBOR_ENTRIES {
                    return Err(CodecError::Bounds("mpr set too large"));
                }
                if route.len() > MAX_ROUTE_HOPS {
                    return Err(CodecError::Bounds("route too long"));
                }
                for name in mpr_set.iter().chain(route.iter()) {
                    check_name(name)?;
                }
            }
            Message::Custom {
                dest,
                payload,
                forwarders,
                ..
            } => {
                check_name(dest)?;
                if payload.len() > MAX_PAYLOAD {
                    return Err(CodecError::Bounds("payload too large"));
                }
                if forwarders.len() > MAX_ROUTE_HOPS {
                    return Err(CodecError::Bounds("forwarder list too long"));
                }
                for name in forwarders {
                    check_name(name)?;
                }
            }
            Message::Alert { data, .. } => {
                if data.len() > MAX_PAYLOAD {
                    return Err(CodecError::Bounds("alert data too large"));
                }
            }
        }
        Ok(())
    }
}

fn check_name(name: &str) -> Result<(), CodecError> {
    if name.is_empty() {
        return Err(CodecError::Bounds("empty node name"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CodecError::Bounds("node name too long"));
    }
    Ok(())
}
