//! Fixed-window request limiter shared by every provider.
//!
//! One instance is created per session and handed to every job, so switching
//! providers mid-session draws from the same budget. The window starts on the
//! first request after it expires; the request that opens a window counts as
//! the first of that window.

use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Upper bound on suspend-and-retry rounds in [`RateLimiter::acquire`]
pub const MAX_ACQUIRE_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    Allowed,
    /// Retry after `wait`
    Rejected { wait: Duration },
}

impl Acquisition {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Acquisition::Allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limiter still saturated after {attempts} waits")]
    Starved { attempts: u32 },
}

#[derive(Debug)]
struct WindowState {
    window_start: Option<Instant>,
    count: u32,
    limit: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Limiter allowing `limit` requests per minute
    pub fn per_minute(limit: u32) -> Self {
        Self::with_window(limit, DEFAULT_WINDOW)
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            window,
            state: Mutex::new(WindowState {
                window_start: None,
                count: 0,
                limit: limit.max(1),
            }),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.state.lock().limit
    }

    /// Change the ceiling; applies to the current window
    pub fn set_limit(&self, limit: u32) {
        self.state.lock().limit = limit.max(1);
    }

    /// Requests counted in the current window
    pub fn request_count(&self) -> u32 {
        self.state.lock().count
    }

    pub fn try_acquire(&self) -> Acquisition {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Acquisition {
        let mut state = self.state.lock();

        let elapsed = match state.window_start {
            Some(start) if now.saturating_duration_since(start) < self.window => {
                now.saturating_duration_since(start)
            }
            _ => {
                state.window_start = Some(now);
                state.count = 1;
                return Acquisition::Allowed;
            }
        };

        if state.count < state.limit {
            state.count += 1;
            Acquisition::Allowed
        } else {
            Acquisition::Rejected {
                wait: self.window - elapsed,
            }
        }
    }

    /// Acquire a slot, suspending for each rejection's wait. Returns the
    /// number of waits taken.
    pub async fn acquire(&self) -> Result<u32, RateLimitError> {
        let mut waits = 0;
        while waits < MAX_ACQUIRE_ATTEMPTS {
            match self.try_acquire() {
                Acquisition::Allowed => return Ok(waits),
                Acquisition::Rejected { wait } => {
                    log::debug!("Rate limit reached, waiting {:?}", wait);
                    waits += 1;
                    tokio::time::sleep(wait).await;
                }
            }
        }
        match self.try_acquire() {
            Acquisition::Allowed => Ok(waits),
            Acquisition::Rejected { .. } => Err(RateLimitError::Starved { attempts: waits }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_with_limit_two() {
        let limiter = RateLimiter::per_minute(2);
        let t0 = Instant::now();

        assert!(limiter.try_acquire_at(t0).is_allowed());
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(1)).is_allowed());

        match limiter.try_acquire_at(t0 + Duration::from_secs(10)) {
            Acquisition::Rejected { wait } => {
                assert_eq!(wait, Duration::from_secs(50));
                assert!(wait <= DEFAULT_WINDOW);
            }
            Acquisition::Allowed => panic!("third request in window must be rejected"),
        }
        assert_eq!(limiter.request_count(), 2);

        // Past the window: allowed, count restarts at 1
        assert!(limiter.try_acquire_at(t0 + Duration::from_secs(61)).is_allowed());
        assert_eq!(limiter.request_count(), 1);
    }

    #[test]
    fn test_window_resets_exactly_at_length() {
        let limiter = RateLimiter::per_minute(1);
        let t0 = Instant::now();
        assert!(limiter.try_acquire_at(t0).is_allowed());
        assert!(!limiter.try_acquire_at(t0 + Duration::from_millis(59_999)).is_allowed());
        assert!(limiter.try_acquire_at(t0 + DEFAULT_WINDOW).is_allowed());
    }

    #[test]
    fn test_set_limit_applies_live() {
        let limiter = RateLimiter::per_minute(1);
        let t0 = Instant::now();
        assert!(limiter.try_acquire_at(t0).is_allowed());
        assert!(!limiter.try_acquire_at(t0).is_allowed());
        limiter.set_limit(3);
        assert!(limiter.try_acquire_at(t0).is_allowed());
        assert_eq!(limiter.limit(), 3);

        limiter.set_limit(0);
        assert_eq!(limiter.limit(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_out_the_window() {
        let limiter = RateLimiter::per_minute(2);
        let start = Instant::now();

        assert_eq!(limiter.acquire().await, Ok(0));
        assert_eq!(limiter.acquire().await, Ok(0));
        assert_eq!(limiter.acquire().await, Ok(1));

        assert!(start.elapsed() >= DEFAULT_WINDOW);
        assert_eq!(limiter.request_count(), 1);
    }
}
