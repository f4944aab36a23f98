//! Per-client token buckets.

use std::{collections::HashMap, time::Duration};

use parking_lot::Mutex;
use tokio::time::Instant;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admit,
    /// `retry_after` is how long until one token is available, or `None`
    /// when the bucket never refills.
    Reject { retry_after: Option<Duration> },
}

#[cfg(test)]
impl Admission {
    pub fn is_admit(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Continuous-refill token bucket. Starts full.
#[derive(Debug, Clone)]
struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    updated: Instant,
}

impl TokenBucket {
    fn new(rate: f64, burst: u32, now: Instant) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            updated: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.updated).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        // A check stamped earlier than the last one must not rewind the clock.
        if now > self.updated {
            self.updated = now;
        }
    }

    fn take(&mut self, now: Instant) -> Admission {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            return Admission::Admit;
        }

        // A rate small enough to overflow `Duration` is as good as no refill.
        let retry_after = (self.rate > 0.0)
            .then(|| Duration::try_from_secs_f64((1.0 - self.tokens) / self.rate).ok())
            .flatten();
        Admission::Reject { retry_after }
    }
}

#[derive(Debug, Clone)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Thread-safe map from client identity to its bucket and last-seen time.
///
/// Every read and write, including the reaper's sweep, happens under one
/// lock. Check-or-create and token consumption are a single critical
/// section, so two concurrent first requests cannot both create an entry and
/// two concurrent checks cannot spend the same token.
#[derive(Debug)]
pub struct ClientRegistry {
    rate: f64,
    burst: u32,
    clients: Mutex<HashMap<String, ClientEntry>>,
}

impl ClientRegistry {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Checks `identity` against its bucket at the current instant.
    pub fn check(&self, identity: &str) -> Admission {
        self.check_at(identity, Instant::now())
    }

    pub fn check_at(&self, identity: &str, now: Instant) -> Admission {
        let mut clients = self.clients.lock();
        if let Some(entry) = clients.get_mut(identity) {
            entry.last_seen = now;
            return entry.bucket.take(now);
        }

        // First sighting: only now is the key allocated.
        let mut entry = ClientEntry {
            bucket: TokenBucket::new(self.rate, self.burst, now),
            last_seen: now,
        };
        let admission = entry.bucket.take(now);
        clients.insert(identity.to_owned(), entry);
        admission
    }

    /// Drops every entry not seen for longer than `idle`. Returns how many
    /// were removed.
    pub fn reap(&self, idle: Duration, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle);
        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    #[cfg(test)]
    pub fn contains(&self, identity: &str) -> bool {
        self.clients.lock().contains_key(identity)
    }
}
