//! One-slot response handoff between the reader and the indication thread.
//!
//! The reader arms the slot before issuing a request and then blocks in
//! [`ResponseSlot::wait`]. The indication thread calls
//! [`ResponseSlot::post`] with the hardware's answer, which wakes the
//! reader. The wait is bounded by an optional timeout and can be cancelled
//! from any thread.
//!
//! Hardware answers requests in order and responses carry no tag, so a
//! request abandoned by a timeout or cancellation still owes one response.
//! Each such debt is recorded with an expiry one grace period after the
//! request was abandoned. [`ResponseSlot::arm`] does not let a new request
//! out until every debt is either paid (the late answer arrived and was
//! discarded) or expired (the answer is assumed lost), so a late answer is
//! never handed to a different request.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Grace period used when none is configured
pub const DEFAULT_GRACE: Duration = Duration::from_millis(1000);

/// Result of waiting on the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A response was delivered
    Ready(u64),
    /// The timeout elapsed first
    TimedOut,
    /// The slot was cancelled
    Cancelled,
}

/// Result of arming the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmOutcome {
    /// Ready for a request; `lost` owed responses expired while settling
    Armed { lost: usize },
    /// The slot is cancelled, the request must not be sent
    Cancelled,
}

/// What happened to a posted response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Handed to the waiting reader
    Delivered,
    /// Answer to an abandoned request, dropped
    Stale,
    /// Nobody was waiting, dropped
    Unsolicited,
}

#[derive(Debug, Default)]
struct SlotState {
    waiting: bool,
    value: Option<u64>,
    /// Expiry of each response still owed, oldest first
    owed: VecDeque<Instant>,
    cancelled: bool,
}

impl SlotState {
    fn abandon(&mut self, grace: Duration) {
        self.waiting = false;
        self.owed.push_back(Instant::now() + grace);
    }
}

/// Binary wait/signal slot carrying a single 64-bit response.
#[derive(Debug)]
pub struct ResponseSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    grace: Duration,
}

impl Default for ResponseSlot {
    fn default() -> Self {
        Self::with_grace(DEFAULT_GRACE)
    }
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot that gives an abandoned request `grace` to deliver
    /// its late answer before assuming it lost.
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            state: Mutex::new(SlotState::default()),
            ready: Condvar::new(),
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Marks a request as in flight.
    ///
    /// Blocks while responses owed to abandoned requests are neither paid
    /// nor expired. Returns [`ArmOutcome::Cancelled`] when the slot is
    /// cancelled; the caller must not issue the request in that case.
    pub fn arm(&self) -> ArmOutcome {
        let mut state = self.state.lock();
        let mut lost = 0;

        loop {
            if state.cancelled {
                return ArmOutcome::Cancelled;
            }

            let now = Instant::now();
            while state.owed.front().is_some_and(|expiry| *expiry <= now) {
                state.owed.pop_front();
                lost += 1;
            }

            match state.owed.front().copied() {
                Some(expiry) => {
                    self.ready.wait_until(&mut state, expiry);
                }
                None => break,
            }
        }

        state.waiting = true;
        state.value = None;
        ArmOutcome::Armed { lost }
    }

    /// Withdraws an armed request that was never sent.
    pub fn disarm(&self) {
        let mut state = self.state.lock();
        state.waiting = false;
        state.value = None;
    }

    /// Delivers a response from the indication thread.
    pub fn post(&self, value: u64) -> PostOutcome {
        let mut state = self.state.lock();
        if state.owed.pop_front().is_some() {
            // wakes a reader settling debts in arm()
            self.ready.notify_all();
            return PostOutcome::Stale;
        }
        if !state.waiting || state.value.is_some() {
            return PostOutcome::Unsolicited;
        }
        state.value = Some(value);
        self.ready.notify_all();
        PostOutcome::Delivered
    }

    /// Blocks until a response is posted, the timeout elapses or the slot
    /// is cancelled. `None` waits without a bound.
    pub fn wait(&self, timeout: Option<Duration>) -> WaitOutcome {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();

        loop {
            if let Some(value) = state.value.take() {
                state.waiting = false;
                return WaitOutcome::Ready(value);
            }
            if state.cancelled {
                state.abandon(self.grace);
                return WaitOutcome::Cancelled;
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        if let Some(value) = state.value.take() {
                            state.waiting = false;
                            return WaitOutcome::Ready(value);
                        }
                        state.abandon(self.grace);
                        return WaitOutcome::TimedOut;
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    /// Cancels the current wait and every later one until [`reset`].
    ///
    /// [`reset`]: ResponseSlot::reset
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.ready.notify_all();
    }

    /// Clears cancellation. Responses still owed to abandoned requests stay
    /// owed until they arrive or expire.
    pub fn reset(&self) {
        self.state.lock().cancelled = false;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// Number of responses still owed to abandoned requests.
    pub fn owed(&self) -> usize {
        self.state.lock().owed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn armed(slot: &ResponseSlot) -> bool {
        matches!(slot.arm(), ArmOutcome::Armed { .. })
    }

    #[test]
    fn test_post_before_wait() {
        let slot = ResponseSlot::new();
        assert!(armed(&slot));
        assert_eq!(slot.post(7), PostOutcome::Delivered);
        assert_eq!(slot.wait(None), WaitOutcome::Ready(7));
    }

    #[test]
    fn test_post_from_other_thread_wakes_waiter() {
        let slot = Arc::new(ResponseSlot::new());
        assert!(armed(&slot));

        let poster = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.post(u64::MAX)
            })
        };

        assert_eq!(
            slot.wait(Some(Duration::from_secs(5))),
            WaitOutcome::Ready(u64::MAX)
        );
        assert_eq!(poster.join().unwrap(), PostOutcome::Delivered);
    }

    #[test]
    fn test_unsolicited_post_is_dropped() {
        let slot = ResponseSlot::new();
        assert_eq!(slot.post(1), PostOutcome::Unsolicited);

        assert!(armed(&slot));
        assert_eq!(slot.post(2), PostOutcome::Delivered);
        // second answer for the same request
        assert_eq!(slot.post(3), PostOutcome::Unsolicited);
        assert_eq!(slot.wait(None), WaitOutcome::Ready(2));
    }

    #[test]
    fn test_timeout_then_late_response_is_stale() {
        let slot = ResponseSlot::with_grace(Duration::from_secs(5));
        assert!(armed(&slot));
        assert_eq!(
            slot.wait(Some(Duration::from_millis(10))),
            WaitOutcome::TimedOut
        );
        assert_eq!(slot.owed(), 1);

        assert_eq!(slot.post(100), PostOutcome::Stale);
        assert_eq!(slot.arm(), ArmOutcome::Armed { lost: 0 });
        assert_eq!(slot.post(200), PostOutcome::Delivered);
        assert_eq!(slot.wait(None), WaitOutcome::Ready(200));
        assert_eq!(slot.owed(), 0);
    }

    #[test]
    fn test_arm_waits_for_late_response() {
        let slot = Arc::new(ResponseSlot::with_grace(Duration::from_secs(5)));
        assert!(armed(&slot));
        assert_eq!(slot.wait(Some(Duration::ZERO)), WaitOutcome::TimedOut);

        let poster = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                slot.post(11)
            })
        };

        // arm must not return before the late answer is consumed
        assert_eq!(slot.arm(), ArmOutcome::Armed { lost: 0 });
        assert_eq!(poster.join().unwrap(), PostOutcome::Stale);
        assert_eq!(slot.post(22), PostOutcome::Delivered);
        assert_eq!(slot.wait(None), WaitOutcome::Ready(22));
    }

    #[test]
    fn test_owed_response_expires_after_grace() {
        let slot = ResponseSlot::with_grace(Duration::from_millis(20));
        assert!(armed(&slot));
        assert_eq!(
            slot.wait(Some(Duration::from_millis(5))),
            WaitOutcome::TimedOut
        );

        let started = Instant::now();
        assert_eq!(slot.arm(), ArmOutcome::Armed { lost: 1 });
        assert!(started.elapsed() <= Duration::from_secs(5));
        assert_eq!(slot.owed(), 0);

        assert_eq!(slot.post(5), PostOutcome::Delivered);
        assert_eq!(slot.wait(None), WaitOutcome::Ready(5));
    }

    #[test]
    fn test_cancel_unblocks_waiter() {
        let slot = Arc::new(ResponseSlot::new());
        assert!(armed(&slot));

        let canceller = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.cancel();
            })
        };

        assert_eq!(slot.wait(None), WaitOutcome::Cancelled);
        canceller.join().unwrap();
        assert_eq!(slot.owed(), 1);
    }

    #[test]
    fn test_cancel_unblocks_arm_while_settling() {
        let slot = Arc::new(ResponseSlot::with_grace(Duration::from_secs(30)));
        assert!(armed(&slot));
        assert_eq!(slot.wait(Some(Duration::ZERO)), WaitOutcome::TimedOut);

        let canceller = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.cancel();
            })
        };

        assert_eq!(slot.arm(), ArmOutcome::Cancelled);
        canceller.join().unwrap();
    }

    #[test]
    fn test_cancel_is_sticky_until_reset() {
        let slot = ResponseSlot::new();
        slot.cancel();
        assert!(slot.is_cancelled());
        assert_eq!(slot.arm(), ArmOutcome::Cancelled);

        slot.reset();
        assert!(!slot.is_cancelled());
        assert!(armed(&slot));
    }

    #[test]
    fn test_reset_keeps_owed_responses() {
        let slot = ResponseSlot::with_grace(Duration::from_secs(5));
        assert!(armed(&slot));
        assert_eq!(slot.wait(Some(Duration::ZERO)), WaitOutcome::TimedOut);
        slot.reset();

        assert_eq!(slot.owed(), 1);
        assert_eq!(slot.post(9), PostOutcome::Stale);
    }

    #[test]
    fn test_disarm_drops_later_post() {
        let slot = ResponseSlot::new();
        assert!(armed(&slot));
        slot.disarm();
        assert_eq!(slot.post(5), PostOutcome::Unsolicited);
    }
}
