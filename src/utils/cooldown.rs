//! Live-scan cooldown guard.
//!
//! Blocks rapid re-scans of the same (student, subject) pair at the scan
//! endpoint only. The classifier stays cooldown-free so replayed and repeated
//! submissions keep their idempotent semantics.

use moka::future::Cache;
use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

static SCAN_CACHE: Lazy<Cache<(i64, i64), Instant>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        // cache-level TTL is just an eviction upper bound; the window check
        // below is what enforces the cooldown
        .time_to_live(Duration::from_secs(24 * 60 * 60))
        .build()
});

/// True if this pair scanned within the window; otherwise records the scan.
pub async fn hit(student_id: i64, subject_id: i64, window: Duration) -> bool {
    if window.is_zero() {
        return false;
    }
    let key = (student_id, subject_id);
    let now = Instant::now();

    if let Some(last) = SCAN_CACHE.get(&key).await {
        if now.duration_since(last) < window {
            return true;
        }
    }
    SCAN_CACHE.insert(key, now).await;
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own student ids; the cache is process-global.

    #[actix_web::test]
    async fn second_scan_inside_window_is_blocked() {
        assert!(!hit(500, 10, Duration::from_secs(60)).await);
        assert!(hit(500, 10, Duration::from_secs(60)).await);
        // a different subject is independent
        assert!(!hit(500, 11, Duration::from_secs(60)).await);
    }

    #[actix_web::test]
    async fn zero_window_disables_the_guard() {
        assert!(!hit(501, 10, Duration::ZERO).await);
        assert!(!hit(501, 10, Duration::ZERO).await);
    }

    #[actix_web::test]
    async fn scan_allowed_again_after_window() {
        assert!(!hit(502, 10, Duration::from_millis(20)).await);
        actix_web::rt::time::sleep(Duration::from_millis(50)).await;
        assert!(!hit(502, 10, Duration::from_millis(20)).await);
    }
}
