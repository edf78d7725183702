//! Time utilities for match scheduling and uptime reporting

use std::time::{Duration, Instant};

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Whole seconds left, rounded up so a countdown only shows 0 once time is out
pub fn remaining_secs(remaining: Duration) -> u64 {
    let millis = remaining.as_millis() as u64;
    millis.div_ceil(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_rounds_up() {
        assert_eq!(remaining_secs(Duration::from_millis(60_000)), 60);
        assert_eq!(remaining_secs(Duration::from_millis(59_001)), 60);
        assert_eq!(remaining_secs(Duration::from_millis(1)), 1);
        assert_eq!(remaining_secs(Duration::ZERO), 0);
    }

    #[test]
    fn uptime_starts_after_init() {
        init_server_time();
        assert!(uptime_secs() < 5);
    }
}
