//! Unified nanosecond timing helpers
//!
//! Wall-clock nanoseconds are used for everything that crosses a process
//! boundary (message timestamps, journal frames, ring-buffer activity
//! tracking). Monotonic `Instant`s are used for pacing decisions inside a
//! single process (scheduler anchors, replay dispatch times).

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as nanoseconds since the Unix epoch.
#[inline(always)]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Nanoseconds elapsed since `earlier_ns`, saturating at zero.
#[inline(always)]
pub fn ns_since(earlier_ns: u64) -> u64 {
    now_ns().saturating_sub(earlier_ns)
}

/// Sleep until `target` on the monotonic clock.
///
/// Returns immediately when the target is already in the past.
#[inline]
pub fn sleep_until(target: Instant) {
    let now = Instant::now();
    if target > now {
        std::thread::sleep(target - now);
    }
}

/// Greatest common divisor of two durations, in nanosecond resolution.
pub fn gcd(a: Duration, b: Duration) -> Duration {
    let (mut a, mut b) = (a.as_nanos() as u64, b.as_nanos() as u64);
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    Duration::from_nanos(a)
}

/// Least common multiple of two durations, in nanosecond resolution.
///
/// Saturates at `Duration::MAX`-ish values instead of overflowing when the
/// periods are pathologically coprime.
pub fn lcm(a: Duration, b: Duration) -> Duration {
    let g = gcd(a, b);
    if g.is_zero() {
        return Duration::ZERO;
    }
    let an = a.as_nanos() as u64;
    let bn = b.as_nanos() as u64;
    Duration::from_nanos((an / g.as_nanos() as u64).saturating_mul(bn))
}
