//! Fetch policy for template downloads
//!
//! Classifies HTTP status codes into what the downloader should do next and
//! bounds how many hops and attempts it may spend.

use rand::Rng;
use std::time::Duration;

/// Status codes followed as redirects
pub const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Status codes retried on the same hop
pub const TRANSIENT_CODES: [u16; 4] = [408, 429, 502, 504];

/// Bounds and pacing for [`TemplateAcquirer`](super::acquire::TemplateAcquirer)
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Maximum hop depth; the first request is hop 1
    pub max_redirects: u32,
    /// Maximum attempts per hop
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_redirects: 5,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl FetchPolicy {
    /// Same bounds, no waiting between attempts
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based) of the same hop
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.base_delay.as_millis() as f64)
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let mut delay = Duration::from_millis(delay_ms as u64).min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let jitter_factor = rand::rng().random_range(0.5..=1.5);
            delay = Duration::from_millis((delay.as_millis() as f64 * jitter_factor) as u64);
        }

        delay
    }
}

/// What a response status means for the download loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: take the body
    Accepted,
    /// Follow `Location` as a new hop
    Redirect,
    /// Try the same hop again
    Transient,
    /// Give up immediately
    Unexpected,
}

impl StatusClass {
    pub fn from_status_code(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Accepted,
            s if REDIRECT_CODES.contains(&s) => StatusClass::Redirect,
            s if TRANSIENT_CODES.contains(&s) => StatusClass::Transient,
            _ => StatusClass::Unexpected,
        }
    }
}
