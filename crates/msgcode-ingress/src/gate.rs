use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

const SEEN_IDS_TRIM_THRESHOLD: usize = 10_000;
const SEEN_IDS_TTL: Duration = Duration::from_secs(3600);
const RECENT_HASH_CAPACITY: usize = 200;

/// Dedup & Rate Gate: drops already-seen messages (by id and by content
/// hash) and rate-limits inbound processing per chat. In-memory only — the
/// durable source of truth for "have we processed this" is the State
/// Store's cursor, not this gate.
pub struct DedupRateGate {
    seen_ids: DashMap<String, Instant>,
    recent_hashes: std::sync::Mutex<RecentHashes>,
    buckets: DashMap<String, TokenBucket>,
    bucket_capacity: u32,
    bucket_refill_per: Duration,
}

struct RecentHashes {
    order: VecDeque<u64>,
    seen: std::collections::HashSet<u64>,
}

impl RecentHashes {
    fn new() -> Self {
        Self {
            order: VecDeque::with_capacity(RECENT_HASH_CAPACITY),
            seen: std::collections::HashSet::new(),
        }
    }

    /// Returns true if `hash` was already present (a duplicate).
    fn check_and_insert(&mut self, hash: u64) -> bool {
        if self.seen.contains(&hash) {
            return true;
        }
        self.order.push_back(hash);
        self.seen.insert(hash);
        if self.order.len() > RECENT_HASH_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        false
    }
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_per_token: Duration,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_token: Duration) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_per_token,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if !self.refill_per_token.is_zero() {
            let refilled = elapsed.as_secs_f64() / self.refill_per_token.as_secs_f64();
            self.tokens = (self.tokens + refilled).min(self.capacity);
        }
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl DedupRateGate {
    pub fn new(bucket_capacity: u32, bucket_refill_per: Duration) -> Self {
        Self {
            seen_ids: DashMap::new(),
            recent_hashes: std::sync::Mutex::new(RecentHashes::new()),
            buckets: DashMap::new(),
            bucket_capacity,
            bucket_refill_per,
        }
    }

    /// Returns true if `message_id` has already been processed; records it
    /// otherwise. Trims entries older than an hour once the table crosses
    /// ~10k entries.
    pub fn check_and_record_id(&self, message_id: &str) -> bool {
        if self.seen_ids.contains_key(message_id) {
            return true;
        }
        self.seen_ids.insert(message_id.to_string(), Instant::now());
        if self.seen_ids.len() > SEEN_IDS_TRIM_THRESHOLD {
            let cutoff = Instant::now() - SEEN_IDS_TTL;
            self.seen_ids.retain(|_, ts| *ts >= cutoff);
        }
        false
    }

    /// Returns true if `(chat_id, text)` was seen recently — catches
    /// accidental duplicates from polling-window overlap that slip past the
    /// id check (e.g. a message id the transport re-assigned).
    pub fn check_and_record_content(&self, chat_id: &str, text: &str) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(chat_id.as_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let hash = u64::from_le_bytes(digest[0..8].try_into().unwrap());
        let mut recent = self.recent_hashes.lock().unwrap();
        recent.check_and_insert(hash)
    }

    /// Returns true if the per-chat bucket has a token available (and
    /// consumes it). Each chat gets its own independent bucket, created
    /// lazily on first use.
    pub fn try_acquire(&self, chat_id: &str) -> bool {
        let mut bucket = self
            .buckets
            .entry(chat_id.to_string())
            .or_insert_with(|| TokenBucket::new(self.bucket_capacity, self.bucket_refill_per));
        bucket.try_take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_dedup_detects_repeat() {
        let gate = DedupRateGate::new(4, Duration::from_secs(2));
        assert!(!gate.check_and_record_id("m1"));
        assert!(gate.check_and_record_id("m1"));
    }

    #[test]
    fn content_dedup_detects_repeat() {
        let gate = DedupRateGate::new(4, Duration::from_secs(2));
        assert!(!gate.check_and_record_content("chat-1", "hello"));
        assert!(gate.check_and_record_content("chat-1", "hello"));
        assert!(!gate.check_and_record_content("chat-1", "different"));
    }

    #[test]
    fn token_bucket_exhausts_then_blocks() {
        let gate = DedupRateGate::new(2, Duration::from_secs(60));
        assert!(gate.try_acquire("chat-1"));
        assert!(gate.try_acquire("chat-1"));
        assert!(!gate.try_acquire("chat-1"));
    }

    #[test]
    fn buckets_are_independent_per_chat() {
        let gate = DedupRateGate::new(1, Duration::from_secs(60));
        assert!(gate.try_acquire("chat-1"));
        assert!(gate.try_acquire("chat-2"));
    }
}
