// Peer broadcast interface consumed by the controller and strategies.
//
// The harness never owns peer connections; it issues broadcasts through
// this trait from a single control-flow path per slot. Implementations
// must tolerate overlapping in-flight sends to disjoint peer subsets.

use std::fmt::{Display, Error as FmtError, Formatter};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fray_common::{block::SignedSlotHeader, shard::DataShard};

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Peer transport failure: {0}")]
    Transport(String),

    #[error("Cannot broadcast to an empty peer subset")]
    EmptyPeerSet,
}

/// Identifier of one peer in the network under test.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "peer-{}", self.0)
    }
}

/// An ordered subset of the network's peers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PeerSet {
    peers: Vec<PeerId>,
}

impl PeerSet {
    pub fn new(peers: Vec<PeerId>) -> Self {
        Self { peers }
    }

    /// The full peer set 0..count.
    pub fn all(count: u64) -> Self {
        Self {
            peers: (0..count).map(PeerId).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerId> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.contains(peer)
    }

    /// Split into two disjoint subsets; the first receives
    /// `ceil(len * fraction)` peers.
    ///
    /// The fraction is clamped so both subsets are non-empty whenever the
    /// set has at least two peers.
    pub fn split_fraction(&self, fraction: f64) -> (PeerSet, PeerSet) {
        let len = self.peers.len();
        let mut first = ((len as f64) * fraction).ceil() as usize;
        if len >= 2 {
            first = first.clamp(1, len - 1);
        } else {
            first = first.min(len);
        }

        let (a, b) = self.peers.split_at(first);
        (PeerSet::new(a.to_vec()), PeerSet::new(b.to_vec()))
    }
}

/// One artifact as it travels over gossip.
#[derive(Clone, Debug)]
pub enum BroadcastArtifact {
    Header(SignedSlotHeader),
    Shard(DataShard),
}

impl BroadcastArtifact {
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastArtifact::Header(_) => "header",
            BroadcastArtifact::Shard(_) => "shard",
        }
    }
}

impl Display for BroadcastArtifact {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            BroadcastArtifact::Header(header) => write!(f, "{}", header),
            BroadcastArtifact::Shard(shard) => write!(f, "{}", shard),
        }
    }
}

/// Fan-out broadcast to a peer subset.
///
/// Implementations must be safe to call concurrently for disjoint subsets.
#[async_trait]
pub trait PeerBroadcaster: Send + Sync {
    async fn broadcast(
        &self,
        artifact: BroadcastArtifact,
        peers: &PeerSet,
    ) -> Result<(), BroadcastError>;
}

/// A delivered artifact as seen by the recording broadcaster.
#[derive(Clone, Debug)]
pub struct BroadcastRecord {
    /// Monotonically increasing delivery sequence
    pub sequence: u64,
    pub artifact: BroadcastArtifact,
    pub peers: PeerSet,
}

/// In-memory broadcaster that records every delivery in order.
///
/// Optionally fails after a configured number of broadcasts to exercise
/// transport-failure paths.
#[derive(Default)]
pub struct RecordingBroadcaster {
    records: Mutex<Vec<BroadcastRecord>>,
    fail_after: Mutex<Option<u64>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every broadcast after the first `count` fail with a transport
    /// error.
    pub fn fail_after(&self, count: u64) {
        *self.fail_after.lock() = Some(count);
    }

    pub fn records(&self) -> Vec<BroadcastRecord> {
        self.records.lock().clone()
    }

    /// Deliveries addressed to a given peer, in sequence order.
    pub fn records_for(&self, peer: &PeerId) -> Vec<BroadcastRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.peers.contains(peer))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

#[async_trait]
impl PeerBroadcaster for RecordingBroadcaster {
    async fn broadcast(
        &self,
        artifact: BroadcastArtifact,
        peers: &PeerSet,
    ) -> Result<(), BroadcastError> {
        if peers.is_empty() {
            return Err(BroadcastError::EmptyPeerSet);
        }

        let mut records = self.records.lock();
        let sequence = records.len() as u64;

        if let Some(limit) = *self.fail_after.lock() {
            if sequence >= limit {
                return Err(BroadcastError::Transport(format!(
                    "injected failure at sequence {}",
                    sequence
                )));
            }
        }

        records.push(BroadcastRecord {
            sequence,
            artifact,
            peers: peers.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fray_common::{
        block::SlotHeader,
        crypto::{Hash, KeyPair},
    };

    fn sample_header() -> SignedSlotHeader {
        let keypair = KeyPair::from_secret_bytes(&[1u8; 32]);
        SlotHeader::new(
            1,
            0,
            Hash::zero(),
            Hash::zero(),
            Hash::zero(),
            Hash::zero(),
            [0u8; 32],
        )
        .sign(&keypair)
    }

    #[test]
    fn test_split_fraction_is_disjoint_and_complete() {
        let peers = PeerSet::all(7);
        let (a, b) = peers.split_fraction(0.5);

        assert_eq!(a.len() + b.len(), 7);
        for peer in a.iter() {
            assert!(!b.contains(peer));
        }
    }

    #[test]
    fn test_split_fraction_never_empties_either_side() {
        let peers = PeerSet::all(2);

        let (a, b) = peers.split_fraction(0.0);
        assert_eq!((a.len(), b.len()), (1, 1));

        let (a, b) = peers.split_fraction(1.0);
        assert_eq!((a.len(), b.len()), (1, 1));
    }

    #[tokio::test]
    async fn test_recording_broadcaster_orders_records() {
        let broadcaster = RecordingBroadcaster::new();
        let peers = PeerSet::all(3);

        broadcaster
            .broadcast(BroadcastArtifact::Header(sample_header()), &peers)
            .await
            .unwrap();
        broadcaster
            .broadcast(BroadcastArtifact::Header(sample_header()), &peers)
            .await
            .unwrap();

        let records = broadcaster.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 0);
        assert_eq!(records[1].sequence, 1);
    }

    #[tokio::test]
    async fn test_recording_broadcaster_injected_failure() {
        let broadcaster = RecordingBroadcaster::new();
        broadcaster.fail_after(1);
        let peers = PeerSet::all(1);

        broadcaster
            .broadcast(BroadcastArtifact::Header(sample_header()), &peers)
            .await
            .unwrap();
        let result = broadcaster
            .broadcast(BroadcastArtifact::Header(sample_header()), &peers)
            .await;

        assert!(matches!(result, Err(BroadcastError::Transport(_))));
    }

    #[tokio::test]
    async fn test_empty_peer_set_rejected() {
        let broadcaster = RecordingBroadcaster::new();
        let result = broadcaster
            .broadcast(BroadcastArtifact::Header(sample_header()), &PeerSet::new(vec![]))
            .await;

        assert!(matches!(result, Err(BroadcastError::EmptyPeerSet)));
    }
}
