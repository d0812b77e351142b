//! Tunneling sequence counter and acknowledgment tracking.

use std::collections::HashMap;

use tokio::time::Instant;

use crate::error::{KnxIpError, Result};

/// Bookkeeping for one acknowledgment-pending send.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// Destination address of the telegram, for timeout reporting.
    pub destination: String,
    /// Whether the acknowledge-request control bit was set.
    pub ack_requested: bool,
    /// When the acknowledgment window closes.
    pub deadline: Instant,
}

/// The 8-bit tunneling sequence counter plus the pending-request table.
///
/// Outgoing requests are tagged with the current counter value; the
/// counter only moves when the gateway acknowledges, jumping to
/// `acked + 1` mod 256. Timeout identity is bound to the wire sequence
/// number, the protocol's own correlation key.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    counter: u8,
    pending: HashMap<u8, PendingRequest>,
}

impl SequenceTracker {
    /// The counter value the next outgoing request will be tagged with.
    pub fn current(&self) -> u8 {
        self.counter
    }

    /// Arm an acknowledgment timeout for `seq`.
    ///
    /// Overwriting a live entry would silently leak its timeout, so a
    /// second outstanding send at the same sequence number is rejected
    /// as a protocol violation.
    pub fn arm(&mut self, seq: u8, request: PendingRequest) -> Result<()> {
        if self.pending.contains_key(&seq) {
            return Err(KnxIpError::InvalidState(
                "acknowledgment already pending for this sequence number",
            ));
        }
        self.pending.insert(seq, request);
        Ok(())
    }

    /// Cancel the timeout for `seq`. Returns the entry, or `None` if no
    /// acknowledgment was pending (a no-op).
    pub fn cancel(&mut self, seq: u8) -> Option<PendingRequest> {
        self.pending.remove(&seq)
    }

    /// Advance the counter to `(acked + 1) mod 256`.
    pub fn advance(&mut self, acked: u8) {
        self.counter = acked.wrapping_add(1);
    }

    /// Whether an acknowledgment is pending for `seq`.
    pub fn is_pending(&self, seq: u8) -> bool {
        self.pending.contains_key(&seq)
    }

    /// The closest pending deadline, if any.
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every entry whose deadline has passed.
    pub fn take_expired(&mut self, now: Instant) -> Vec<(u8, PendingRequest)> {
        let expired: Vec<u8> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        expired
            .into_iter()
            .filter_map(|seq| self.pending.remove(&seq).map(|p| (seq, p)))
            .collect()
    }

    /// Reset counter and pending table, as done on connect and disconnect.
    pub fn reset(&mut self) {
        self.counter = 0;
        self.pending.clear();
    }

    /// Number of acknowledgment-pending sends.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(deadline: Instant) -> PendingRequest {
        PendingRequest {
            destination: "1/2/3".to_string(),
            ack_requested: true,
            deadline,
        }
    }

    #[test]
    fn test_advance_follows_ack() {
        let mut tracker = SequenceTracker::default();
        assert_eq!(tracker.current(), 0);

        tracker.advance(0);
        assert_eq!(tracker.current(), 1);
        tracker.advance(10);
        assert_eq!(tracker.current(), 11);
    }

    #[test]
    fn test_counter_wraps_at_256() {
        let mut tracker = SequenceTracker::default();
        tracker.advance(255);
        assert_eq!(tracker.current(), 0);
    }

    #[test]
    fn test_arm_cancel() {
        let mut tracker = SequenceTracker::default();
        let deadline = Instant::now() + Duration::from_secs(1);

        tracker.arm(10, request(deadline)).unwrap();
        assert!(tracker.is_pending(10));
        assert_eq!(tracker.earliest_deadline(), Some(deadline));

        let entry = tracker.cancel(10).unwrap();
        assert_eq!(entry.destination, "1/2/3");
        assert!(!tracker.is_pending(10));
        assert!(tracker.cancel(10).is_none());
    }

    #[test]
    fn test_arm_rejects_live_entry() {
        let mut tracker = SequenceTracker::default();
        let deadline = Instant::now() + Duration::from_secs(1);

        tracker.arm(5, request(deadline)).unwrap();
        assert!(matches!(
            tracker.arm(5, request(deadline)),
            Err(KnxIpError::InvalidState(_))
        ));
    }

    #[test]
    fn test_take_expired() {
        let mut tracker = SequenceTracker::default();
        let now = Instant::now();

        tracker.arm(1, request(now - Duration::from_millis(10))).unwrap();
        tracker.arm(2, request(now + Duration::from_secs(5))).unwrap();

        let expired = tracker.take_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, 1);
        assert!(tracker.is_pending(2));
    }

    #[test]
    fn test_reset() {
        let mut tracker = SequenceTracker::default();
        tracker.advance(41);
        tracker
            .arm(42, request(Instant::now() + Duration::from_secs(1)))
            .unwrap();

        tracker.reset();
        assert_eq!(tracker.current(), 0);
        assert_eq!(tracker.pending_count(), 0);
    }
}
