//! UDP broadcast transport, one socket per local interface.
//!
//! Sockets are hard-bound to their device so emission and reception stay
//! on that link even when routes overlap. A send failure on one interface
//! never stops the others.

use crate::types::MAX_DATAGRAM;
use nix::ifaddrs::getifaddrs;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),
    #[error("interface discovery: {0}")]
    Ifaddrs(#[from] nix::Error),
    #[error("no interfaces matching `{0}`")]
    NoInterfaces(String),
}

/// A local IPv4 interface eligible for the mesh.
#[derive(Debug, Clone)]
pub struct LinkInterface {
    pub name: String,
    pub addr: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

/// Enumerate local IPv4 interfaces whose name contains `pattern`.
pub fn discover_interfaces(pattern: &str) -> Result<Vec<LinkInterface>, TransportError> {
    let mut out = Vec::new();
    for ifa in getifaddrs()? {
        if !ifa.interface_name.contains(pattern) {
            continue;
        }
        let addr = match ifa
            .address
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|s| s.ip())
        {
            Some(ip) => ip,
            None => continue,
        };
        let broadcast = ifa
            .broadcast
            .as_ref()
            .and_then(|a| a.as_sockaddr_in())
            .map(|s| s.ip())
            .unwrap_or(Ipv4Addr::BROADCAST);
        out.push(LinkInterface {
            name: ifa.interface_name.clone(),
            addr,
            broadcast,
        });
    }
    if out.is_empty() {
        return Err(TransportError::NoInterfaces(pattern.to_string()));
    }
    Ok(out)
}

struct BoundSocket {
    iface: LinkInterface,
    socket: Arc<UdpSocket>,
}

/// Datagram broadcast over every eligible local interface.
pub struct BroadcastTransport {
    port: u16,
    sockets: Vec<BoundSocket>,
    local_addrs: HashSet<IpAddr>,
}

impl BroadcastTransport {
    /// Bind one socket per interface on `port`, with broadcast and
    /// port-reuse enabled. Must be called inside a tokio runtime.
    pub fn bind(port: u16, interfaces: &[LinkInterface]) -> Result<Self, TransportError> {
        let mut sockets = Vec::with_capacity(interfaces.len());
        let mut local_addrs = HashSet::new();
        for iface in interfaces {
            let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_reuse_address(true)?;
            socket.set_reuse_port(true)?;
            socket.set_broadcast(true)?;
            socket.set_nonblocking(true)?;
            // Needs CAP_NET_RAW; without it we still work on single-link hosts.
            if let Err(e) = socket.bind_device(Some(iface.name.as_bytes())) {
                debug!(iface = %iface.name, error = %e, "device bind unavailable");
            }
            socket.bind(&SocketAddr::from(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).into())?;
            let socket = UdpSocket::from_std(socket.into())?;
            local_addrs.insert(IpAddr::V4(iface.addr));
            sockets.push(BoundSocket {
                iface: iface.clone(),
                socket: Arc::new(socket),
            });
        }
        Ok(Self {
            port,
            sockets,
            local_addrs,
        })
    }

    pub fn interface_count(&self) -> usize {
        self.sockets.len()
    }

    pub fn local_addrs(&self) -> &HashSet<IpAddr> {
        &self.local_addrs
    }

    /// Whether `addr` is one of our own interface addresses. Used by the
    /// protocol engine to discard loopbacks of its own broadcasts.
    pub fn is_local(&self, addr: &IpAddr) -> bool {
        self.local_addrs.contains(addr)
    }

    /// Emit `data` on every interface toward its broadcast address.
    pub async fn send_broadcast(&self, data: &[u8]) {
        for bs in &self.sockets {
            let dest = SocketAddr::from(SocketAddrV4::new(bs.iface.broadcast, self.port));
            if let Err(e) = bs.socket.send_to(data, dest).await {
                warn!(iface = %bs.iface.name, error = %e, "broadcast send failed");
            }
        }
    }

    /// Spawn one receive loop per socket, feeding `(payload, source_ip)`
    /// into `tx`. Loops end when the receiver is dropped or the returned
    /// handles are aborted.
    pub fn spawn_listeners(&self, tx: mpsc::Sender<(Vec<u8>, IpAddr)>) -> Vec<JoinHandle<()>> {
        self.sockets
            .iter()
            .map(|bs| {
                let socket = bs.socket.clone();
                let tx = tx.clone();
                let iface = bs.iface.name.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; MAX_DATAGRAM];
                    loop {
                        match socket.recv_from(&mut buf).await {
                            Ok((len, src)) => {
                                if tx.send((buf[..len].to_vec(), src.ip())).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                debug!(iface = %iface, error = %e, "receive failed");
                            }
                        }
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_no_match() {
        assert!(matches!(
            discover_interfaces("no-such-interface-pattern"),
            Err(TransportError::NoInterfaces(_))
        ));
    }

    #[tokio::test]
    async fn test_loopback_bind_and_is_local() {
        // Every Linux host has lo; port 0 avoids clashes with a running node.
        let interfaces = match discover_interfaces("lo") {
            Ok(i) => i,
            Err(_) => return,
        };
        let transport = BroadcastTransport::bind(0, &interfaces).unwrap();
        assert_eq!(transport.interface_count(), interfaces.len());
        assert!(transport.is_local(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!transport.is_local(&IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))));
    }
}
