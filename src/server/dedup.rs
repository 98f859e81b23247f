//! De-duplication: a bounded ordered fingerprint set per channel,
//! plus a parallel MRU of traffic seen on-channel from other speakers.
//! Both are backed by a bounded `VecDeque` of fingerprints with
//! eviction from the front.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

/// Capacity of both the seen-set and the on-channel MRU.
pub const CAPACITY: usize = 100;

/// How many leading characters of a message's first line participate
/// in its fingerprint.
const FINGERPRINT_CHARS: usize = 100;

pub type Fingerprint = u64;

pub fn fingerprint(channel: &str, first_line: &str) -> Fingerprint {
    let truncated: String = first_line.chars().take(FINGERPRINT_CHARS).collect();
    let mut hasher = DefaultHasher::new();
    channel.hash(&mut hasher);
    truncated.hash(&mut hasher);
    hasher.finish()
}

/// A bounded, insertion-ordered set of fingerprints with FIFO
/// eviction, shared by both the outbound seen-set and the inbound
/// on-channel MRU (their promote-on-hit behaviour differs, hence two
/// thin wrappers below rather than one shared type with a mode flag).
struct Ring {
    order: VecDeque<Fingerprint>,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Ring {
        Ring {
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn contains(&self, fp: Fingerprint) -> bool {
        self.order.contains(&fp)
    }

    fn push(&mut self, fp: Fingerprint) {
        if self.order.len() >= self.capacity {
            self.order.pop_front();
        }
        self.order.push_back(fp);
    }

    fn promote(&mut self, fp: Fingerprint) {
        if let Some(pos) = self.order.iter().position(|&x| x == fp) {
            self.order.remove(pos);
        }
        self.push(fp);
    }
}

/// Per-channel outbound dedup set: suppresses re-delivering a message
/// whose first line was already sent recently.
pub struct SeenSet {
    ring: Ring,
}

impl SeenSet {
    pub fn new() -> SeenSet {
        SeenSet {
            ring: Ring::new(CAPACITY),
        }
    }

    /// Returns `true` if this fingerprint was already present (the
    /// whole multi-line message should be dropped); otherwise records
    /// it and returns `false`.
    pub fn check_and_insert(&mut self, fp: Fingerprint) -> bool {
        if self.ring.contains(fp) {
            true
        } else {
            self.ring.push(fp);
            false
        }
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-channel inbound MRU: tracks traffic seen from other speakers so
/// deliveries can suppress echoing what was just said (the second
/// bullet).
pub struct OnChannelMru {
    ring: Ring,
}

impl OnChannelMru {
    pub fn new() -> OnChannelMru {
        OnChannelMru {
            ring: Ring::new(CAPACITY),
        }
    }

    /// Record a `PRIVMSG` observed on-channel from any speaker,
    /// promoting it to the front if already present.
    pub fn observe(&mut self, fp: Fingerprint) {
        self.ring.promote(fp);
    }

    pub fn contains(&self, fp: Fingerprint) -> bool {
        self.ring.contains(fp)
    }
}

impl Default for OnChannelMru {
    fn default() -> Self {
        Self::new()
    }
}
