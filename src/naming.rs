use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use rand::Rng;

/// Source of the names stored files are saved under.
pub trait NameGenerator: Send + Sync + 'static {
    fn generate(&self, original_name: &str) -> String;
}

/// `<epoch-millis>-<random>.<ext>`.
///
/// Uniqueness is probabilistic: two uploads in the same millisecond collide only if
/// they also draw the same random number. Nothing checks for or retries a collision.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampNames;

impl NameGenerator for TimestampNames {
    fn generate(&self, original_name: &str) -> String {
        let stamp = Utc::now().timestamp_millis();
        let suffix: u32 = rand::thread_rng().gen_range(0..=1_000_000_000);
        compose(stamp, suffix, original_name)
    }
}

/// Deterministic names for tests: a fixed stamp followed by a counter.
#[derive(Debug)]
pub struct SequentialNames {
    stamp: i64,
    next: AtomicU32,
}

impl SequentialNames {
    pub fn new(stamp: i64) -> Self {
        Self {
            stamp,
            next: AtomicU32::new(1),
        }
    }
}

impl NameGenerator for SequentialNames {
    fn generate(&self, original_name: &str) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        compose(self.stamp, n, original_name)
    }
}

fn compose(stamp: i64, suffix: u32, original_name: &str) -> String {
    match extension(original_name) {
        Some(ext) => format!("{stamp}-{suffix}.{ext}"),
        None => format!("{stamp}-{suffix}"),
    }
}

/// Lower-cased extension of the last path segment, without the dot.
///
/// A name whose only dot is the leading one (`.env`) has no extension. A trailing dot
/// yields an empty extension.
pub fn extension(original_name: &str) -> Option<String> {
    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);

    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) => Some(base[idx + 1..].to_lowercase()),
    }
}
