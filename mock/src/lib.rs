//! Mock types for testing.

pub mod serial;

use std::thread;
use std::time::{Duration, Instant};

/// How long tests wait for the service thread to catch up before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Polls `condition` until it returns `true` or [`WAIT_TIMEOUT`] has passed. Returns whether the
/// condition was met.
pub fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;

    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }

        thread::sleep(Duration::from_millis(2));
    }
}
