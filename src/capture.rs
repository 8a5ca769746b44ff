//! Packet capture and TCP reassembly (spec.md §1: "external collaborator,
//! specify only the contract"). [`FlowSource`] is that contract; the
//! `pcap`-backed implementation plus the in-order reassembler behind it
//! are deliberately thin (SPEC_FULL.md §1, ADDED).

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use crate::error::{Error, Result};
use crate::pairer::{Endpoint, FourTuple, HalfStream};
use crate::protocol::packet::PacketDecoder;

/// Announces newly observed half-streams to whoever owns the [`crate::pairer::Pairer`].
pub trait FlowSource {
    /// Run the capture loop, sending each reassembled half-stream as it is
    /// first observed. Returns once the interface is closed or capture
    /// fails (spec.md §7, "Capture-fatal").
    fn run(self, announce: mpsc::Sender<HalfStream>) -> Result<()>;
}

/// Bounded queue capacity for both per-half-stream packet queues and the
/// pairer's half-stream announcement channel (spec.md §4.2/§5: "e.g. 1024").
pub const QUEUE_CAPACITY: usize = 1024;

/// How often the capture loop ticks the reassembler to flush idle
/// connections (spec.md §5: "a periodic (≈ 1 minute) tick").
pub const FLUSH_TICK: Duration = Duration::from_secs(60);

/// A half-stream with no activity for longer than this is abandoned on the
/// next tick (spec.md §5: "flush connections idle for more than 2 minutes").
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// One observed TCP segment, handed up from libpcap after Ethernet/IP/TCP
/// header parsing. `seq` is the TCP sequence number of the first payload
/// byte, used only to detect gaps.
struct Segment {
    tuple: FourTuple,
    tcp_seq: u32,
    payload: Bytes,
}

/// Minimal in-order reassembler (SPEC_FULL.md §1: "in-order delivery only,
/// any gap or out-of-order segment ends the half-stream"). One instance
/// per capture session; segments are fed in the order libpcap delivers
/// them, which for a single interface is capture order, not necessarily
/// TCP order after retransmits.
#[derive(Default)]
struct Reassembler {
    streams: HashMap<FourTupleKey, StreamState>,
}

type FourTupleKey = (IpAddr, u16, IpAddr, u16);

struct StreamState {
    next_seq: Option<u32>,
    sender: mpsc::Sender<crate::protocol::packet::Packet>,
    decoder: PacketDecoder,
    buffer: BytesMut,
    last_active: Instant,
}

impl Reassembler {
    fn key(tuple: &FourTuple) -> FourTupleKey {
        (tuple.src.ip, tuple.src.port, tuple.dst.ip, tuple.dst.port)
    }

    /// Feed one segment. On the first segment for a four-tuple, creates
    /// the half-stream's packet queue and announces it; on a sequence gap,
    /// drops the stream state so the half-stream is simply abandoned
    /// (Non-goal: "not lossless").
    async fn feed(
        &mut self,
        segment: Segment,
        announce: &mpsc::Sender<HalfStream>,
    ) {
        let key = Self::key(&segment.tuple);

        let is_new = !self.streams.contains_key(&key);
        if is_new {
            let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
            let half = HalfStream {
                tuple: segment.tuple,
                packets: rx,
            };
            if announce.send(half).await.is_err() {
                return;
            }
            self.streams.insert(
                key,
                StreamState {
                    next_seq: None,
                    sender: tx,
                    decoder: PacketDecoder::new(),
                    buffer: BytesMut::new(),
                    last_active: Instant::now(),
                },
            );
        }

        let Some(state) = self.streams.get_mut(&key) else {
            return;
        };

        if let Some(expected) = state.next_seq {
            if segment.tcp_seq != expected {
                tracing::warn!(?key, "sequence gap, abandoning half-stream");
                self.streams.remove(&key);
                return;
            }
        }
        state.next_seq = Some(segment.tcp_seq.wrapping_add(segment.payload.len() as u32));
        state.last_active = Instant::now();

        state.buffer.extend_from_slice(&segment.payload);
        loop {
            match state.decoder.decode(&mut state.buffer) {
                Ok(Some(packet)) => {
                    if state.sender.send(packet).await.is_err() {
                        self.streams.remove(&key);
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(?key, %err, "framing error, abandoning half-stream");
                    self.streams.remove(&key);
                    return;
                }
            }
        }
    }

    /// Drop every half-stream that hasn't seen a segment in over
    /// `idle_timeout` (spec.md §5: "a periodic (≈ 1 minute) tick instructs
    /// the reassembler to flush connections idle for more than 2 minutes").
    /// Dropping a `StreamState` closes its `sender`, which ends the
    /// half-stream's queue for whichever dispatcher (if any) is reading it.
    fn flush_idle(&mut self, idle_timeout: Duration) {
        let now = Instant::now();
        self.streams.retain(|key, state| {
            let idle = now.duration_since(state.last_active);
            let keep = idle < idle_timeout;
            if !keep {
                tracing::debug!(?key, idle_secs = idle.as_secs(), "flushing idle half-stream");
            }
            keep
        });
    }
}

/// `pcap`-backed [`FlowSource`]: opens a live capture on `interface`,
/// filters to `tcp and port {port}`, and hands reassembled half-streams to
/// the pairer.
pub struct PcapFlowSource {
    pub interface: String,
    pub port: u16,
}

impl FlowSource for PcapFlowSource {
    fn run(self, announce: mpsc::Sender<HalfStream>) -> Result<()> {
        let mut capture =
            pcap::Capture::from_device(self.interface.as_str())
                .map_err(|source| Error::OpenInterface {
                    iface: self.interface.clone(),
                    source,
                })?
                .promisc(true)
                .snaplen(1600)
                .timeout(1000)
                .open()
                .map_err(|source| Error::OpenInterface {
                    iface: self.interface.clone(),
                    source,
                })?;

        let filter = format!("tcp and port {}", self.port);
        capture
            .filter(&filter, true)
            .map_err(|source| Error::InstallFilter {
                filter: filter.clone(),
                source,
            })?;

        let runtime = tokio::runtime::Handle::current();
        let mut reassembler = Reassembler::default();
        let mut last_flush = Instant::now();

        // `.timeout(1000)` above makes `next_packet` return `TimeoutExpired`
        // on a quiet interface instead of blocking forever; that's also what
        // drives the periodic flush tick below (spec.md §5: "a periodic
        // (≈ 1 minute) tick instructs the reassembler to flush connections
        // idle for more than 2 minutes" — the original's `time.Tick(time.Minute)`
        // select-loop case).
        loop {
            match capture.next_packet() {
                Ok(raw) => {
                    if let Some(segment) = parse_tcp_segment(raw.data) {
                        runtime.block_on(reassembler.feed(segment, &announce));
                    }
                }
                Err(pcap::Error::TimeoutExpired) => {}
                Err(_) => break,
            }

            if last_flush.elapsed() >= FLUSH_TICK {
                reassembler.flush_idle(IDLE_TIMEOUT);
                last_flush = Instant::now();
            }
        }

        Ok(())
    }
}

/// Parse Ethernet + IPv4 + TCP headers out of a raw capture frame, enough
/// to recover the four-tuple, TCP sequence number, and payload bytes.
/// Returns `None` for anything that isn't a plain IPv4-over-Ethernet TCP
/// segment (VLAN tags, IPv6, non-TCP transport): out of scope per
/// spec.md's Non-goals.
fn parse_tcp_segment(frame: &[u8]) -> Option<Segment> {
    const ETH_HEADER_LEN: usize = 14;
    const ETHERTYPE_IPV4: u16 = 0x0800;

    if frame.len() < ETH_HEADER_LEN + 20 {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    if ethertype != ETHERTYPE_IPV4 {
        return None;
    }

    let ip = &frame[ETH_HEADER_LEN..];
    let version = ip[0] >> 4;
    if version != 4 {
        return None;
    }
    let ihl = (ip[0] & 0x0F) as usize * 4;
    if ip.len() < ihl + 20 {
        return None;
    }
    let protocol = ip[9];
    const IP_PROTO_TCP: u8 = 6;
    if protocol != IP_PROTO_TCP {
        return None;
    }
    let src_ip = IpAddr::from([ip[12], ip[13], ip[14], ip[15]]);
    let dst_ip = IpAddr::from([ip[16], ip[17], ip[18], ip[19]]);

    let tcp = &ip[ihl..];
    if tcp.len() < 20 {
        return None;
    }
    let src_port = u16::from_be_bytes([tcp[0], tcp[1]]);
    let dst_port = u16::from_be_bytes([tcp[2], tcp[3]]);
    let tcp_seq = u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]);
    let data_offset = (tcp[12] >> 4) as usize * 4;
    if tcp.len() < data_offset {
        return None;
    }

    Some(Segment {
        tuple: FourTuple {
            src: Endpoint { ip: src_ip, port: src_port },
            dst: Endpoint { ip: dst_ip, port: dst_port },
        },
        tcp_seq,
        payload: Bytes::copy_from_slice(&tcp[data_offset..]),
    })
}
