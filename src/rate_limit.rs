use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How often idle clients are swept from the limiter
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Clients unseen for longer than this are forgotten
pub const CLIENT_IDLE_TTL: Duration = Duration::from_secs(3 * 60);

/// Token bucket refilled continuously at `rate` tokens per second
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(capacity: u32, rate: f64, now: Instant) -> Self {
        Self {
            tokens: f64::from(capacity),
            capacity: f64::from(capacity),
            rate,
            last_refill: now,
        }
    }

    /// Take one token if available
    fn try_take(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Client {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Per-client token-bucket rate limiter
///
/// Cloning shares the same client map. The map lock is only held for the
/// lookup and a single token take, never while a request is being handled.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    clients: Arc<Mutex<HashMap<IpAddr, Client>>>,
    rps: f64,
    burst: u32,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32, enabled: bool) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            rps,
            burst,
            enabled,
        }
    }

    /// Whether requests should be checked at all
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, Client>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a request from `ip` and report whether it may proceed
    pub fn allow(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.lock();

        let client = clients.entry(ip).or_insert_with(|| Client {
            bucket: TokenBucket::full(self.burst, self.rps, now),
            last_seen: now,
        });
        client.last_seen = now;
        client.bucket.try_take(now)
    }

    /// Drop clients that have been idle longer than [`CLIENT_IDLE_TTL`]
    ///
    /// Returns the number of clients evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= CLIENT_IDLE_TTL);
        before - clients.len()
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Start the background task that sweeps idle clients every minute
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = limiter.sweep();
                if evicted > 0 {
                    tracing::debug!("Evicted {} idle rate limiter clients", evicted);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 2));

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(2.0, 4, true);

        for i in 0..4 {
            assert!(limiter.allow(CLIENT), "request {} should be allowed", i);
        }
        assert!(!limiter.allow(CLIENT));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(limiter.allow(CLIENT));
        assert!(!limiter.allow(CLIENT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_are_limited_independently() {
        let limiter = RateLimiter::new(1.0, 1, true);

        assert!(limiter.allow(CLIENT));
        assert!(!limiter.allow(CLIENT));
        assert!(limiter.allow(OTHER));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_never_exceeds_burst() {
        let limiter = RateLimiter::new(2.0, 4, true);
        assert!(limiter.allow(CLIENT));

        tokio::time::advance(Duration::from_secs(60)).await;
        for _ in 0..4 {
            assert!(limiter.allow(CLIENT));
        }
        assert!(!limiter.allow(CLIENT));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_clients() {
        let limiter = RateLimiter::new(2.0, 4, true);
        limiter.allow(CLIENT);

        tokio::time::advance(Duration::from_secs(120)).await;
        limiter.allow(OTHER);
        assert_eq!(limiter.sweep(), 0);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_periodically() {
        let limiter = RateLimiter::new(2.0, 4, true);
        limiter.allow(CLIENT);
        let handle = limiter.spawn_sweeper();

        // Let the sweeper register its interval before moving the clock
        tokio::task::yield_now().await;
        tokio::time::sleep(CLIENT_IDLE_TTL + SWEEP_INTERVAL + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(limiter.tracked_clients(), 0);
        handle.abort();
    }
}
