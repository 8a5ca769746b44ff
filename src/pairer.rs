//! Stream pairer (spec.md §4.2): join the two unidirectional half-streams
//! of one TCP connection into a client/server queue pair.

use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::mpsc;

use crate::protocol::packet::Packet;

/// One endpoint of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

/// The four-tuple identifying one direction of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourTuple {
    pub src: Endpoint,
    pub dst: Endpoint,
}

impl FourTuple {
    /// Canonical key: `(network-flow, transport-flow)` rendered as
    /// `srcIP->dstIP:srcPort->dstPort` (spec.md §4.2). The reverse key
    /// (used to find this half-stream's mirror direction) swaps both
    /// flows, i.e. is the key the other direction's `FourTuple` produces.
    fn key(&self) -> String {
        format!("{}->{}:{}->{}", self.src.ip, self.dst.ip, self.src.port, self.dst.port)
    }

    fn reverse_key(&self) -> String {
        format!("{}->{}:{}->{}", self.dst.ip, self.src.ip, self.dst.port, self.src.port)
    }

    /// Which direction this half-stream runs, decided by comparing its
    /// source port against the configured server port (spec.md §4.2).
    pub fn direction(&self, server_port: u16) -> Direction {
        if self.src.port == server_port {
            Direction::ServerToClient
        } else {
            Direction::ClientToServer
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// One direction's decoded-packet queue, announced by the reassembler and
/// filled by a framer task.
pub struct HalfStream {
    pub tuple: FourTuple,
    pub packets: mpsc::Receiver<Packet>,
}

/// Both halves of a matched connection, ready for the dispatcher.
pub struct ConnectionPair {
    pub client: mpsc::Receiver<Packet>,
    pub server: mpsc::Receiver<Packet>,
}

/// Registers half-streams as they're announced and matches them up by
/// reverse key (spec.md §4.2, §3 "Connection pair": "a canonical key holds
/// at most one unmatched half-stream at any time").
#[derive(Default)]
pub struct Pairer {
    pending: HashMap<String, HalfStream>,
}

impl Pairer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly announced half-stream. Returns `Some` with the
    /// matched connection pair the moment its mirror direction shows up;
    /// otherwise stores it and returns `None`.
    ///
    /// A half-stream whose mirror never arrives (spec.md §4.2, "edge
    /// cases") simply stays in `pending` for the life of the process.
    pub fn register(&mut self, half: HalfStream, server_port: u16) -> Option<ConnectionPair> {
        let reverse_key = half.tuple.reverse_key();

        if let Some(mirror) = self.pending.remove(&reverse_key) {
            return Some(match half.tuple.direction(server_port) {
                Direction::ClientToServer => ConnectionPair {
                    client: half.packets,
                    server: mirror.packets,
                },
                Direction::ServerToClient => ConnectionPair {
                    client: mirror.packets,
                    server: half.packets,
                },
            });
        }

        let key = half.tuple.key();
        self.pending.insert(key, half);
        None
    }

    /// Number of half-streams still waiting for their mirror. Exposed for
    /// diagnostics and tests, not used on the hot path.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(ip: &str, port: u16) -> Endpoint {
        Endpoint {
            ip: ip.parse().unwrap(),
            port,
        }
    }

    fn half(src: Endpoint, dst: Endpoint) -> (HalfStream, mpsc::Sender<Packet>) {
        let (tx, rx) = mpsc::channel(8);
        (
            HalfStream {
                tuple: FourTuple { src, dst },
                packets: rx,
            },
            tx,
        )
    }

    #[test]
    fn registers_first_half_and_waits() {
        let mut pairer = Pairer::new();
        let client = endpoint("10.0.0.1", 55000);
        let server = endpoint("10.0.0.2", 4000);
        let (half_stream, _tx) = half(client, server);
        assert!(pairer.register(half_stream, 4000).is_none());
        assert_eq!(pairer.pending_count(), 1);
    }

    #[test]
    fn matches_mirror_direction_and_empties_pending() {
        let mut pairer = Pairer::new();
        let client_ep = endpoint("10.0.0.1", 55000);
        let server_ep = endpoint("10.0.0.2", 4000);

        let (req_half, _req_tx) = half(client_ep, server_ep);
        assert!(pairer.register(req_half, 4000).is_none());

        let (resp_half, _resp_tx) = half(server_ep, client_ep);
        let pair = pairer.register(resp_half, 4000);
        assert!(pair.is_some());
        assert_eq!(pairer.pending_count(), 0);
    }

    #[test]
    fn each_key_holds_at_most_one_unmatched_half_stream() {
        let mut pairer = Pairer::new();
        let client_ep = endpoint("10.0.0.1", 55000);
        let server_ep = endpoint("10.0.0.2", 4000);

        let (first, _tx1) = half(client_ep, server_ep);
        pairer.register(first, 4000);
        assert_eq!(pairer.pending_count(), 1);

        // A second half-stream under the exact same key (e.g. retransmitted
        // SYN re-announced by the reassembler) replaces, not duplicates.
        let (second, _tx2) = half(client_ep, server_ep);
        pairer.register(second, 4000);
        assert_eq!(pairer.pending_count(), 1);
    }

    #[test]
    fn direction_follows_server_port() {
        let client_ep = endpoint("10.0.0.1", 55000);
        let server_ep = endpoint("10.0.0.2", 4000);
        let client_to_server = FourTuple { src: client_ep, dst: server_ep };
        let server_to_client = FourTuple { src: server_ep, dst: client_ep };
        assert_eq!(client_to_server.direction(4000), Direction::ClientToServer);
        assert_eq!(server_to_client.direction(4000), Direction::ServerToClient);
    }
}
