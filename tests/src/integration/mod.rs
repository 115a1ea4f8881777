//! # Integration Scenarios
//!
//! Buses wired with the real plugins, driven the way the host drives them.

pub mod fanout;
pub mod host_flow;
pub mod lifecycle;
pub mod properties;

#[cfg(test)]
pub(crate) mod support {
    use std::thread;
    use std::time::{Duration, Instant};

    /// Poll `condition` every 10ms for up to 5s.
    pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
