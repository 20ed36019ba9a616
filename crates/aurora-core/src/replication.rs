//! Replication of the per-region "event active" flag to observers.
//!
//! The server side keeps a membership map (observer → region) and pushes the
//! flag on every transition (`broadcast`) and whenever an observer's view
//! may be stale (`sync_one` on join, respawn, and region change). Delivery is
//! at-most-once; receivers hold an [`ObserverView`] that ignores repeats.
//!
//! Wire format: `[version: u8] [postcard-encoded AuroraPacket]`

use crossbeam_channel::{Receiver, Sender, TrySendError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::region::{ObserverId, RegionId};
use crate::state::EventStateStore;

/// Current packet format version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Per-observer queue depth for [`ChannelTransport`].
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Packets
// ---------------------------------------------------------------------------

/// Messages sent from the scheduler to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuroraPacket {
    /// The event flag of the observer's current region.
    State {
        /// Whether the aurora is active.
        active: bool,
    },
}

/// Errors raised while encoding or decoding an [`AuroraPacket`].
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard (de)serialization failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

impl AuroraPacket {
    /// Encodes the packet into a versioned binary payload.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let body = postcard::to_allocvec(self)?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(PROTOCOL_VERSION);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes a versioned binary payload.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        let (&version, body) = data.split_first().ok_or(PacketError::EmptyPayload)?;
        if version != PROTOCOL_VERSION {
            return Err(PacketError::UnsupportedVersion(version));
        }
        Ok(postcard::from_bytes(body)?)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Outbound delivery of the event flag to a single observer.
///
/// Implementations must never block; a message that cannot be delivered
/// right away is dropped.
pub trait Transport: Send + Sync {
    /// Sends `active` to `observer`. Returns `false` if the message was
    /// dropped.
    fn send(&self, observer: ObserverId, active: bool) -> bool;
}

/// Transport over bounded crossbeam channels, one per connected observer.
#[derive(Debug)]
pub struct ChannelTransport {
    senders: DashMap<ObserverId, Sender<Vec<u8>>>,
    queue_depth: usize,
}

impl ChannelTransport {
    /// Creates a transport whose per-observer queues hold `queue_depth`
    /// packets.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            senders: DashMap::new(),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Opens a queue for `observer` and returns its receiving end. A previous
    /// queue for the same observer is replaced.
    pub fn connect(&self, observer: ObserverId) -> Receiver<Vec<u8>> {
        let (tx, rx) = crossbeam_channel::bounded(self.queue_depth);
        self.senders.insert(observer, tx);
        rx
    }

    /// Closes the queue for `observer`.
    pub fn disconnect(&self, observer: ObserverId) {
        self.senders.remove(&observer);
    }

    /// Number of connected observers.
    pub fn connected(&self) -> usize {
        self.senders.len()
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, observer: ObserverId, active: bool) -> bool {
        let payload = match (AuroraPacket::State { active }).encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!("Failed to encode aurora packet: {err}");
                return false;
            }
        };

        let result = match self.senders.get(&observer) {
            Some(tx) => tx.try_send(payload),
            None => {
                tracing::trace!("No queue for {observer}, dropping update");
                return false;
            }
        };

        match result {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Queue for {observer} is full, dropping update");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.senders.remove(&observer);
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ReplicationChannel
// ---------------------------------------------------------------------------

/// Observer membership per region and the send paths built on it.
#[derive(Debug, Default)]
pub struct ReplicationChannel {
    membership: DashMap<ObserverId, RegionId>,
}

impl ReplicationChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Region `observer` is currently associated with.
    pub fn region_of(&self, observer: ObserverId) -> Option<RegionId> {
        self.membership.get(&observer).map(|r| *r)
    }

    /// Observers currently associated with `region`.
    pub fn members(&self, region: RegionId) -> Vec<ObserverId> {
        self.membership
            .iter()
            .filter(|e| *e.value() == region)
            .map(|e| *e.key())
            .collect()
    }

    /// Sends `active` to every member of `region`. Returns the number of
    /// messages accepted by the transport.
    pub fn broadcast(&self, region: RegionId, active: bool, transport: &dyn Transport) -> usize {
        let members = self.members(region);
        let delivered = members
            .iter()
            .filter(|&&observer| transport.send(observer, active))
            .count();
        tracing::debug!(
            "Broadcast active={active} to {delivered}/{} observers in {region}",
            members.len()
        );
        delivered
    }

    /// Sends the current flag of `observer`'s region to `observer` alone.
    /// Returns `false` if the observer is unknown or the message was dropped.
    pub fn sync_one(
        &self,
        observer: ObserverId,
        store: &EventStateStore,
        transport: &dyn Transport,
    ) -> bool {
        let Some(region) = self.region_of(observer) else {
            tracing::debug!("Cannot sync unknown {observer}");
            return false;
        };
        transport.send(observer, store.is_active(region))
    }

    /// An observer connected into `region`.
    pub fn on_join(
        &self,
        observer: ObserverId,
        region: RegionId,
        store: &EventStateStore,
        transport: &dyn Transport,
    ) -> bool {
        self.membership.insert(observer, region);
        tracing::debug!("{observer} joined {region}");
        self.sync_one(observer, store, transport)
    }

    /// An observer respawned, possibly into another region.
    pub fn on_respawn(
        &self,
        observer: ObserverId,
        region: RegionId,
        store: &EventStateStore,
        transport: &dyn Transport,
    ) -> bool {
        self.membership.insert(observer, region);
        self.sync_one(observer, store, transport)
    }

    /// An observer moved to region `to`.
    pub fn on_region_change(
        &self,
        observer: ObserverId,
        to: RegionId,
        store: &EventStateStore,
        transport: &dyn Transport,
    ) -> bool {
        let from = self.membership.insert(observer, to);
        tracing::debug!("{observer} moved from {from:?} to {to}");
        self.sync_one(observer, store, transport)
    }

    /// An observer disconnected. Returns its last region.
    pub fn on_leave(&self, observer: ObserverId) -> Option<RegionId> {
        self.membership.remove(&observer).map(|(_, region)| region)
    }
}

// ---------------------------------------------------------------------------
// ObserverView
// ---------------------------------------------------------------------------

/// Receiver-side copy of the event flag.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObserverView {
    active: bool,
    transitions: u32,
}

impl ObserverView {
    /// A view that starts inactive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the observer currently sees the aurora.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of times the visible flag actually changed.
    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Applies a received flag. Returns `true` if the visible state changed;
    /// a repeated value is a no-op.
    pub fn apply(&mut self, active: bool) -> bool {
        if self.active == active {
            return false;
        }
        self.active = active;
        self.transitions += 1;
        true
    }

    /// Decodes and applies a packet payload.
    pub fn apply_packet(&mut self, data: &[u8]) -> Result<bool, PacketError> {
        match AuroraPacket::decode(data)? {
            AuroraPacket::State { active } => Ok(self.apply(active)),
        }
    }

    /// Applies every payload waiting on `rx`. Malformed payloads are
    /// skipped. Returns the number of visible changes.
    pub fn drain(&mut self, rx: &Receiver<Vec<u8>>) -> usize {
        let mut changes = 0;
        for payload in rx.try_iter() {
            match self.apply_packet(&payload) {
                Ok(true) => changes += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!("Dropping malformed aurora packet: {err}"),
            }
        }
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EventState;
    use crate::testutil::RecordingTransport;

    const OVERWORLD: RegionId = RegionId(0);
    const FROST: RegionId = RegionId(1);

    #[test]
    fn test_packet_wire_format() {
        let bytes = AuroraPacket::State { active: true }.encode().unwrap();
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(
            AuroraPacket::decode(&bytes).unwrap(),
            AuroraPacket::State { active: true }
        );
    }

    #[test]
    fn test_packet_decode_errors() {
        assert!(matches!(
            AuroraPacket::decode(&[]),
            Err(PacketError::EmptyPayload)
        ));
        assert!(matches!(
            AuroraPacket::decode(&[99, 0, 1]),
            Err(PacketError::UnsupportedVersion(99))
        ));
        assert!(matches!(
            AuroraPacket::decode(&[PROTOCOL_VERSION, 7]),
            Err(PacketError::Postcard(_))
        ));
    }

    #[test]
    fn test_broadcast_reaches_only_region_members() {
        let channel = ReplicationChannel::new();
        let store = EventStateStore::in_memory();
        let transport = RecordingTransport::default();
        channel.on_join(ObserverId(1), OVERWORLD, &store, &transport);
        channel.on_join(ObserverId(2), FROST, &store, &transport);
        transport.clear();

        assert_eq!(channel.broadcast(OVERWORLD, true, &transport), 1);
        assert_eq!(transport.sent(), vec![(ObserverId(1), true)]);
    }

    #[test]
    fn test_sync_one_recovers_missed_broadcast() {
        let channel = ReplicationChannel::new();
        let store = EventStateStore::in_memory();
        let transport = ChannelTransport::new(1);
        let rx = transport.connect(ObserverId(1));
        let mut view = ObserverView::new();

        channel.on_join(ObserverId(1), OVERWORLD, &store, &transport);
        view.drain(&rx);
        assert!(!view.is_active());

        // Queue holds one packet: fill it so the transition is dropped.
        store.set(OVERWORLD, EventState::running(13_000, 15_000)).unwrap();
        assert!(transport.send(ObserverId(1), false));
        assert_eq!(channel.broadcast(OVERWORLD, true, &transport), 0);
        view.drain(&rx);
        assert!(!view.is_active());

        assert!(channel.sync_one(ObserverId(1), &store, &transport));
        view.drain(&rx);
        assert!(view.is_active());
    }

    #[test]
    fn test_region_change_syncs_destination_state() {
        let channel = ReplicationChannel::new();
        let store = EventStateStore::in_memory();
        let transport = RecordingTransport::default();
        store.set(FROST, EventState::running(13_000, 14_000)).unwrap();

        channel.on_join(ObserverId(5), OVERWORLD, &store, &transport);
        channel.on_region_change(ObserverId(5), FROST, &store, &transport);
        assert_eq!(
            transport.sent(),
            vec![(ObserverId(5), false), (ObserverId(5), true)]
        );
        assert_eq!(channel.members(FROST), vec![ObserverId(5)]);
        assert!(channel.members(OVERWORLD).is_empty());
    }

    #[test]
    fn test_respawn_resyncs() {
        let channel = ReplicationChannel::new();
        let store = EventStateStore::in_memory();
        let transport = RecordingTransport::default();
        channel.on_join(ObserverId(3), OVERWORLD, &store, &transport);
        store.set(OVERWORLD, EventState::running(13_000, 14_000)).unwrap();
        assert!(channel.on_respawn(ObserverId(3), OVERWORLD, &store, &transport));
        assert_eq!(transport.sent().last(), Some(&(ObserverId(3), true)));
    }

    #[test]
    fn test_leave_removes_membership() {
        let channel = ReplicationChannel::new();
        let store = EventStateStore::in_memory();
        let transport = RecordingTransport::default();
        channel.on_join(ObserverId(4), FROST, &store, &transport);
        assert_eq!(channel.on_leave(ObserverId(4)), Some(FROST));
        assert!(!channel.sync_one(ObserverId(4), &store, &transport));
        assert_eq!(channel.on_leave(ObserverId(4)), None);
    }

    #[test]
    fn test_view_ignores_repeats() {
        let mut view = ObserverView::new();
        assert!(!view.apply(false));
        assert!(view.apply(true));
        assert!(!view.apply(true));
        assert!(view.apply(false));
        assert_eq!(view.transitions(), 2);
    }

    #[test]
    fn test_channel_transport_drops_for_unknown_or_closed() {
        let transport = ChannelTransport::default();
        assert!(!transport.send(ObserverId(1), true));

        let rx = transport.connect(ObserverId(1));
        drop(rx);
        assert!(!transport.send(ObserverId(1), true));
        assert_eq!(transport.connected(), 0);
    }

    #[test]
    fn test_drain_skips_malformed_payloads() {
        let transport = ChannelTransport::default();
        let rx = transport.connect(ObserverId(1));
        let mut view = ObserverView::new();
        transport.send(ObserverId(1), true);
        // Hand-built queue carrying a garbage payload.
        let (tx, stale_rx) = crossbeam_channel::bounded(2);
        tx.send(vec![0xFF]).unwrap();
        tx.send(AuroraPacket::State { active: false }.encode().unwrap())
            .unwrap();

        assert_eq!(view.drain(&rx), 1);
        assert_eq!(view.drain(&stale_rx), 1);
        assert!(!view.is_active());
    }
}
