//! Outbound bandwidth limiter — a token bucket over published bytes.

use std::sync::Mutex;
use std::time::Instant;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter for outbound publish traffic. A limit of zero
/// disables limiting.
pub struct BandwidthLimiter {
    limit_bytes_per_sec: f64,
    burst_ratio: f64,
    bucket: Mutex<Bucket>,
}

impl BandwidthLimiter {
    pub fn new(limit_bytes_per_sec: u64) -> Self {
        Self {
            limit_bytes_per_sec: limit_bytes_per_sec as f64,
            burst_ratio: 1.25,
            bucket: Mutex::new(Bucket {
                tokens: limit_bytes_per_sec as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Attempt to spend `bytes` from the bucket. Returns `false` when the
    /// message should be dropped.
    pub fn should_pass(&self, bytes: usize) -> bool {
        if self.limit_bytes_per_sec == 0.0 {
            return true;
        }
        let mut bucket = self.bucket.lock().unwrap_or_else(|e| e.into_inner());
        let elapsed = bucket.last_refill.elapsed().as_secs_f64();
        bucket.last_refill = Instant::now();
        let cap = self.limit_bytes_per_sec * self.burst_ratio;
        bucket.tokens = (bucket.tokens + elapsed * self.limit_bytes_per_sec).min(cap);
        if bucket.tokens >= bytes as f64 {
            bucket.tokens -= bytes as f64;
            true
        } else {
            false
        }
    }
}
