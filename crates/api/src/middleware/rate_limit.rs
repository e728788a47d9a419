//! Rate limiting middleware.
//!
//! Limits public write endpoints per client IP with a keyed GCRA limiter.
//! Capacity is `rate_limit_per_minute` requests and refills continuously,
//! so a full minute of quiet restores it completely.
//!
//! Idle entries are pruned on the request path once the number of tracked
//! IPs reaches the configured cap. `X-Forwarded-For` is only read when the
//! connecting peer is a trusted proxy.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
};

use crate::app::AppState;
use crate::error::ApiError;

/// Tracked IPs at which idle entries are pruned, unless configured.
pub const DEFAULT_MAX_TRACKED_IPS: usize = 10_000;

type KeyedLimiter<C> =
    RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Per-IP rate limiter shared across requests.
pub struct IpRateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    clock: C,
    per_minute: NonZeroU32,
    max_tracked: usize,
    trusted_proxies: Vec<IpAddr>,
}

impl IpRateLimiter<DefaultClock> {
    /// Returns `None` when `per_minute` is zero (limiting disabled).
    pub fn new(per_minute: u32) -> Option<Self> {
        Self::with_clock(per_minute, DefaultClock::default())
    }
}

impl<C: Clock + Clone> IpRateLimiter<C> {
    pub fn with_clock(per_minute: u32, clock: C) -> Option<Self> {
        let per_minute = NonZeroU32::new(per_minute)?;
        let limiter = RateLimiter::dashmap_with_clock(Quota::per_minute(per_minute), clock.clone());
        Some(Self {
            limiter,
            clock,
            per_minute,
            max_tracked: DEFAULT_MAX_TRACKED_IPS,
            trusted_proxies: Vec::new(),
        })
    }

    pub fn with_max_tracked(mut self, max_tracked: usize) -> Self {
        self.max_tracked = max_tracked.max(1);
        self
    }

    pub fn with_trusted_proxies(mut self, trusted_proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute.get()
    }

    /// Admits one request from `ip`, or returns the seconds until the next
    /// request would be admitted.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if self.limiter.len() >= self.max_tracked {
            self.prune();
        }

        self.limiter.check_key(&ip).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            wait.as_secs().max(1)
        })
    }

    /// Drops state for IPs whose capacity has fully refilled.
    pub fn prune(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        tracing::debug!(
            before = before,
            after = self.limiter.len(),
            "Pruned idle rate limit entries"
        );
    }

    pub fn tracked_ips(&self) -> usize {
        self.limiter.len()
    }

    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
        client_ip(headers, peer, &self.trusted_proxies)
    }
}

impl<C: Clock> std::fmt::Debug for IpRateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpRateLimiter")
            .field("per_minute", &self.per_minute)
            .field("max_tracked", &self.max_tracked)
            .field("trusted_proxies", &self.trusted_proxies)
            .field("tracked_ips", &self.limiter.len())
            .finish()
    }
}

/// Client IP for rate limiting.
///
/// The peer address, unless the peer is a trusted proxy; then the rightmost
/// `X-Forwarded-For` hop that is not itself a trusted proxy. A malformed hop
/// ends the walk and the peer address is used.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> IpAddr {
    let Some(peer_ip) = peer.map(|addr| addr.ip()) else {
        return IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    };
    if !trusted.contains(&peer_ip) {
        return peer_ip;
    }

    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .collect();

    for hop in hops.into_iter().rev() {
        match hop.trim().parse::<IpAddr>() {
            Ok(ip) if trusted.contains(&ip) => continue,
            Ok(ip) => return ip,
            Err(_) => break,
        }
    }
    peer_ip
}

/// Middleware that applies the per-IP limit.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(limiter) = state.rate_limiter.as_ref() else {
        return next.run(req).await;
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = limiter.client_ip(req.headers(), peer);

    if let Err(retry_after) = limiter.check(ip) {
        tracing::warn!(client_ip = %ip, path = %req.uri().path(), "Rate limit exceeded");
        crate::middleware::metrics::record_rate_limited();
        return ApiError::RateLimited {
            limit: limiter.per_minute(),
            retry_after,
        }
        .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::time::Duration;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, last))
    }

    fn peer(addr: &str) -> Option<SocketAddr> {
        Some(addr.parse().unwrap())
    }

    fn limiter(per_minute: u32) -> (IpRateLimiter<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let limiter = IpRateLimiter::with_clock(per_minute, clock.clone()).unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_zero_disables() {
        assert!(IpRateLimiter::new(0).is_none());
        assert!(IpRateLimiter::new(10).is_some());
    }

    #[test]
    fn test_allows_limit_then_rejects() {
        let (limiter, _clock) = limiter(5);
        for i in 0..5 {
            assert!(limiter.check(ip(1)).is_ok(), "request {} should pass", i);
        }
        let retry_after = limiter.check(ip(1)).unwrap_err();
        assert!(retry_after >= 1);
    }

    #[test]
    fn test_window_advance_restores_capacity() {
        let (limiter, clock) = limiter(3);
        for _ in 0..3 {
            limiter.check(ip(1)).unwrap();
        }
        assert!(limiter.check(ip(1)).is_err());

        clock.advance(Duration::from_secs(60));
        for _ in 0..3 {
            assert!(limiter.check(ip(1)).is_ok());
        }
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn test_ips_are_independent() {
        let (limiter, _clock) = limiter(1);
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
        assert!(limiter.check(ip(2)).is_ok());
    }

    #[test]
    fn test_retry_after_reflects_refill() {
        let (limiter, _clock) = limiter(1);
        limiter.check(ip(1)).unwrap();
        let retry_after = limiter.check(ip(1)).unwrap_err();
        assert!((59..=60).contains(&retry_after));
    }

    #[test]
    fn test_prune_drops_idle_ips() {
        let (limiter, clock) = limiter(2);
        limiter.check(ip(1)).unwrap();
        limiter.check(ip(2)).unwrap();
        assert_eq!(limiter.tracked_ips(), 2);

        clock.advance(Duration::from_secs(120));
        limiter.prune();
        assert_eq!(limiter.tracked_ips(), 0);
    }

    #[test]
    fn test_check_prunes_idle_ips_at_capacity() {
        let (limiter, clock) = limiter(2);
        let limiter = limiter.with_max_tracked(1_000);
        for n in 0..1_000u32 {
            limiter.check(IpAddr::V4(Ipv4Addr::from(0x0a00_0000 + n))).unwrap();
        }
        assert_eq!(limiter.tracked_ips(), 1_000);

        clock.advance(Duration::from_secs(600));
        limiter.check(ip(1)).unwrap();
        assert_eq!(limiter.tracked_ips(), 1);
    }

    #[test]
    fn test_active_ips_survive_pruning() {
        let (limiter, _clock) = limiter(1);
        let limiter = limiter.with_max_tracked(2);
        limiter.check(ip(1)).unwrap();
        limiter.check(ip(2)).unwrap();

        limiter.check(ip(3)).unwrap();
        assert_eq!(limiter.tracked_ips(), 3);
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn test_client_ip_ignores_forwarded_for_from_untrusted_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.7".parse().unwrap());
        assert_eq!(
            client_ip(&headers, peer("192.0.2.9:443"), &[]),
            "192.0.2.9".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_takes_rightmost_untrusted_hop() {
        let trusted: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()];
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "1.2.3.4, 198.51.100.7, 10.0.0.2".parse().unwrap(),
        );
        assert_eq!(
            client_ip(&headers, peer("10.0.0.1:5000"), &trusted),
            "198.51.100.7".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn test_client_ip_falls_back_to_peer() {
        let trusted: Vec<IpAddr> = vec!["10.0.0.1".parse().unwrap()];
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "garbage".parse().unwrap());
        let proxy = peer("10.0.0.1:5000");
        assert_eq!(client_ip(&headers, proxy, &trusted), proxy.unwrap().ip());
        assert_eq!(client_ip(&HeaderMap::new(), proxy, &trusted), proxy.unwrap().ip());
        assert_eq!(
            client_ip(&headers, None, &trusted),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }
}
