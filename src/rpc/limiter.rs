use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window limiter: at most `max_requests` admissions per `window`.
/// Callers wait for a free slot instead of being rejected.
pub struct RateLimiter {
    requests: Mutex<VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self::with_window(max_requests, Duration::from_secs(1))
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();

                while let Some(&front) = requests.front() {
                    if now.duration_since(front) >= self.window {
                        requests.pop_front();
                    } else {
                        break;
                    }
                }

                if requests.len() < self.max_requests as usize {
                    requests.push_back(now);
                    return;
                }

                match requests.front() {
                    Some(&oldest) => self.window.saturating_sub(now.duration_since(oldest)),
                    None => Duration::ZERO,
                }
            };

            tracing::trace!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}
