//! Relay-to-relay ping statistics.
//!
//! Every accepted relay update folds the requester's measurements into a
//! directed graph `requester -> peer -> latest sample`. Folding overwrites,
//! so replaying a batch leaves the graph unchanged.

use dashmap::DashMap;
use relaynet_core::RelayPingStats;
use std::collections::HashMap;

/// Sentinel for a pair with no usable measurement
pub const INVALID_ROUTE_VALUE: f32 = 10_000.0;

/// Latest measurement of one directed relay pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSample {
    /// Round trip time, milliseconds
    pub rtt: f32,
    /// Jitter, milliseconds
    pub jitter: f32,
    /// Packet loss, percent
    pub packet_loss: f32,
}

impl PingSample {
    /// Sample with every value at [`INVALID_ROUTE_VALUE`].
    pub const INVALID: Self = Self {
        rtt: INVALID_ROUTE_VALUE,
        jitter: INVALID_ROUTE_VALUE,
        packet_loss: INVALID_ROUTE_VALUE,
    };
}

impl From<&RelayPingStats> for PingSample {
    fn from(stats: &RelayPingStats) -> Self {
        Self {
            rtt: stats.rtt,
            jitter: stats.jitter,
            packet_loss: stats.packet_loss,
        }
    }
}

/// Number of cells in the strictly lower triangle of an `n x n` matrix.
#[must_use]
pub const fn tri_matrix_length(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Cell of pair `(i, j)` in a lower-triangular matrix, `i != j`.
///
/// The order of `i` and `j` does not matter.
#[must_use]
pub const fn tri_matrix_index(i: usize, j: usize) -> usize {
    let (hi, lo) = if i > j { (i, j) } else { (j, i) };
    hi * (hi + 1) / 2 - hi + lo
}

/// Concurrent ping relation graph
#[derive(Debug, Default)]
pub struct StatsDatabase {
    entries: DashMap<u64, HashMap<u64, PingSample>>,
}

impl StatsDatabase {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one relay's reported measurements into the graph.
    ///
    /// Reports about `relay_id` itself are dropped. Later reports for the same
    /// peer replace earlier ones.
    pub fn process_stats(&self, relay_id: u64, stats: &[RelayPingStats]) {
        let mut row = self.entries.entry(relay_id).or_default();
        for stat in stats.iter().filter(|s| s.relay_id != relay_id) {
            row.insert(stat.relay_id, PingSample::from(stat));
        }
    }

    /// Forget everything `relay_id` reported. Returns true if it had a row.
    pub fn delete_entry(&self, relay_id: u64) -> bool {
        self.entries.remove(&relay_id).is_some()
    }

    /// Latest sample `from` reported about `to`.
    pub fn entry(&self, from: u64, to: u64) -> Option<PingSample> {
        self.entries.get(&from)?.get(&to).copied()
    }

    /// Peers `relay_id` has reported about, ascending.
    pub fn peers(&self, relay_id: u64) -> Vec<u64> {
        let mut peers: Vec<u64> = self
            .entries
            .get(&relay_id)
            .map(|row| row.keys().copied().collect())
            .unwrap_or_default();
        peers.sort_unstable();
        peers
    }

    /// Conservative bidirectional sample of a pair: the worse of both
    /// directions, or [`PingSample::INVALID`] unless both directions have
    /// been reported.
    pub fn sample(&self, a: u64, b: u64) -> PingSample {
        match (self.entry(a, b), self.entry(b, a)) {
            (Some(ab), Some(ba)) => PingSample {
                rtt: ab.rtt.max(ba.rtt),
                jitter: ab.jitter.max(ba.jitter),
                packet_loss: ab.packet_loss.max(ba.packet_loss),
            },
            _ => PingSample::INVALID,
        }
    }

    /// Copy of the whole graph.
    pub fn snapshot(&self) -> HashMap<u64, HashMap<u64, PingSample>> {
        self.entries
            .iter()
            .map(|row| (*row.key(), row.value().clone()))
            .collect()
    }

    /// Triangular route cost matrix over `relay_ids`.
    ///
    /// Cell [`tri_matrix_index`]`(i, j)` holds the rounded-up RTT between
    /// `relay_ids[i]` and `relay_ids[j]`, or `-1` when the pair is unmeasured
    /// or exceeds either threshold.
    pub fn costs(&self, relay_ids: &[u64], max_jitter: f32, max_packet_loss: f32) -> Vec<i32> {
        let mut costs = vec![-1; tri_matrix_length(relay_ids.len())];
        for i in 0..relay_ids.len() {
            for j in 0..i {
                let sample = self.sample(relay_ids[i], relay_ids[j]);
                if sample.rtt < INVALID_ROUTE_VALUE
                    && sample.jitter <= max_jitter
                    && sample.packet_loss <= max_packet_loss
                {
                    costs[tri_matrix_index(i, j)] = sample.rtt.ceil() as i32;
                }
            }
        }
        costs
    }

    /// Number of relays with a row.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no relay has reported.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
