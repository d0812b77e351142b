//! Tunnel liveness monitoring.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::{CONNECTIONSTATE_REQUEST_TIMEOUT, MAX_HEARTBEAT_FAILURES};

/// Schedules connection-state probes and counts consecutive failures.
///
/// The monitor is single-flight: `start` replaces any prior run and
/// `stop` is idempotent. It holds scheduling state only; the client owns
/// the probe I/O and reacts when [`on_timeout`](Self::on_timeout)
/// reports the connection dead.
#[derive(Debug, Default)]
pub struct HeartbeatMonitor {
    running: bool,
    failures: u32,
    next_probe: Option<Instant>,
    probe_deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Start monitoring; the first probe is due one interval from `now`.
    pub fn start(&mut self, now: Instant, interval: Duration) {
        self.running = true;
        self.failures = 0;
        self.next_probe = Some(now + interval);
        self.probe_deadline = None;
    }

    /// Stop monitoring and clear all scheduling state.
    pub fn stop(&mut self) {
        self.running = false;
        self.failures = 0;
        self.next_probe = None;
        self.probe_deadline = None;
    }

    /// Whether the monitor is active.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Consecutive probe failures so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// When the next probe is due, if scheduled.
    pub fn next_probe(&self) -> Option<Instant> {
        self.next_probe.filter(|_| self.running)
    }

    /// When the outstanding probe's answer window closes, if one is in
    /// flight.
    pub fn probe_deadline(&self) -> Option<Instant> {
        self.probe_deadline.filter(|_| self.running)
    }

    /// Record that a probe was sent at `now`.
    pub fn probe_sent(&mut self, now: Instant) {
        self.next_probe = None;
        self.probe_deadline = Some(now + CONNECTIONSTATE_REQUEST_TIMEOUT);
    }

    /// Record a successful connection-state response: failure count goes
    /// back to zero and the next probe is scheduled.
    pub fn on_success(&mut self, now: Instant, interval: Duration) {
        self.failures = 0;
        self.probe_deadline = None;
        if self.running {
            self.next_probe = Some(now + interval);
        }
    }

    /// Record a probe timeout. Returns `true` once the failure threshold
    /// is reached and the connection must be declared dead.
    pub fn on_timeout(&mut self) -> bool {
        self.probe_deadline = None;
        self.failures += 1;
        self.failures >= MAX_HEARTBEAT_FAILURES
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(60);

    #[test]
    fn test_start_stop() {
        let mut monitor = HeartbeatMonitor::default();
        assert!(!monitor.is_running());
        assert!(monitor.next_probe().is_none());

        let now = Instant::now();
        monitor.start(now, INTERVAL);
        assert!(monitor.is_running());
        assert_eq!(monitor.next_probe(), Some(now + INTERVAL));

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
        assert!(monitor.next_probe().is_none());
    }

    #[test]
    fn test_start_replaces_prior_run() {
        let mut monitor = HeartbeatMonitor::default();
        let now = Instant::now();

        monitor.start(now, INTERVAL);
        monitor.probe_sent(now);
        assert!(!monitor.on_timeout());
        assert_eq!(monitor.failures(), 1);

        monitor.start(now, INTERVAL);
        assert_eq!(monitor.failures(), 0);
        assert!(monitor.probe_deadline().is_none());
    }

    #[test]
    fn test_three_strikes() {
        let mut monitor = HeartbeatMonitor::default();
        let now = Instant::now();
        monitor.start(now, INTERVAL);

        monitor.probe_sent(now);
        assert!(!monitor.on_timeout());
        monitor.probe_sent(now);
        assert!(!monitor.on_timeout());
        monitor.probe_sent(now);
        assert!(monitor.on_timeout());
    }

    #[test]
    fn test_success_resets_counter() {
        let mut monitor = HeartbeatMonitor::default();
        let now = Instant::now();
        monitor.start(now, INTERVAL);

        monitor.probe_sent(now);
        monitor.on_timeout();
        monitor.probe_sent(now);
        monitor.on_timeout();
        assert_eq!(monitor.failures(), 2);

        // A successful response before the third strike starts over.
        monitor.on_success(now, INTERVAL);
        assert_eq!(monitor.failures(), 0);
        assert_eq!(monitor.next_probe(), Some(now + INTERVAL));

        monitor.probe_sent(now);
        assert!(!monitor.on_timeout());
    }
}
