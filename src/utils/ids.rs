//! Thread id generation.
//!
//! Production runs use calendar-keyed ids like `2026-W32` so one thread
//! exists per publishing cycle; ad-hoc runs get a random id.

use chrono::{Datelike, Utc};
use rand::RngExt;

/// Weekly thread id in the form `{year}-W{week:02}`.
#[must_use]
pub fn weekly_thread_id(year: i32, week: u32) -> String {
    format!("{year}-W{week:02}")
}

/// Weekly thread id for the current ISO week.
#[must_use]
pub fn current_week_thread_id() -> String {
    let week = Utc::now().iso_week();
    weekly_thread_id(week.year(), week.week())
}

/// Random thread id for ad-hoc runs.
#[must_use]
pub fn random_thread_id() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    let suffix: String = (0..8)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect();
    format!("run-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_id_is_zero_padded() {
        assert_eq!(weekly_thread_id(2026, 7), "2026-W07");
        assert_eq!(weekly_thread_id(2026, 32), "2026-W32");
    }

    #[test]
    fn random_ids_are_distinct() {
        let a = random_thread_id();
        let b = random_thread_id();
        assert!(a.starts_with("run-"));
        assert_ne!(a, b);
    }
}
