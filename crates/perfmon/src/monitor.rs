//! Blocking counter reader.
//!
//! [`PerfMonitor`] turns the asynchronous request/indication pair into a
//! synchronous `read_counter` call. Each read arms the response slot,
//! issues the request through the [`RequestProxy`], and blocks until the
//! indication thread hands back the value, the response timeout elapses,
//! or the read is cancelled.
//!
//! Reads are serialized with an internal lock so there is never more than
//! one request in flight per reader. A read abandoned by timeout or
//! cancellation leaves its answer owed; the next read is held back until
//! that answer arrives or one grace period (the response timeout) passes,
//! so every read returns its own counter's value.

use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::counter_list::{load_counter_list, CounterEntry};
use crate::error::{PerfMonError, Result};
use crate::handoff::{ArmOutcome, PostOutcome, ResponseSlot, WaitOutcome};
use crate::transport::{IndicationHandler, RequestProxy};
use crate::types::{ChannelIds, CounterIndex, CounterRequest, CounterResponse};

/// Default bound on how long a read waits for its indication
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Reader settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Channels the reader is bound to
    pub channels: ChannelIds,
    /// Bound on each read; `None` waits forever
    pub response_timeout: Option<Duration>,
    /// Log every request/response pair at info level
    pub verbose: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            channels: ChannelIds::new(5, 6),
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            verbose: false,
        }
    }
}

/// Snapshot of reader counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Reads that returned a value
    pub completed: u64,
    /// Reads that hit the response timeout
    pub timed_out: u64,
    /// Reads abandoned through cancellation
    pub cancelled: u64,
    /// Late responses discarded for abandoned reads
    pub stale: u64,
    /// Responses that arrived with no read in progress
    pub unsolicited: u64,
    /// Owed responses that never arrived within the grace period
    pub lost: u64,
}

#[derive(Debug, Default)]
struct Stats {
    completed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    stale: AtomicU64,
    unsolicited: AtomicU64,
    lost: AtomicU64,
}

#[derive(Debug)]
struct Shared {
    slot: ResponseSlot,
    stats: Stats,
}

impl Shared {
    fn new(grace: Duration) -> Self {
        Self {
            slot: ResponseSlot::with_grace(grace),
            stats: Stats::default(),
        }
    }

    fn deliver(&self, value: u64) {
        match self.slot.post(value) {
            PostOutcome::Delivered => {}
            PostOutcome::Stale => {
                self.stats.stale.fetch_add(1, Ordering::Relaxed);
                warn!("Discarding late response {} for an abandoned read", value);
            }
            PostOutcome::Unsolicited => {
                self.stats.unsolicited.fetch_add(1, Ordering::Relaxed);
                warn!("Discarding response {} with no read in progress", value);
            }
        }
    }
}

/// Indication-side handle to a reader.
///
/// Given to the transport so its indication thread can deliver responses.
#[derive(Debug, Clone)]
pub struct IndicationHandle {
    shared: Arc<Shared>,
}

impl IndicationHandler for IndicationHandle {
    fn resp(&self, response: CounterResponse) {
        self.shared.deliver(response.value);
    }
}

/// Cancels reads on a reader from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    /// Aborts the read in progress, if any, and every later read until
    /// [`PerfMonitor::reset`] is called.
    pub fn cancel(&self) {
        self.shared.slot.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.slot.is_cancelled()
    }
}

/// Blocking reader over a request proxy and its indication channel
#[derive(Debug)]
pub struct PerfMonitor<P> {
    proxy: P,
    shared: Arc<Shared>,
    request_lock: Mutex<()>,
    settings: MonitorSettings,
}

impl<P: RequestProxy> PerfMonitor<P> {
    /// Creates a reader, handing `open` the indication handle it needs to
    /// build the transport.
    pub fn connect<F>(settings: MonitorSettings, open: F) -> Result<Self>
    where
        F: FnOnce(IndicationHandle) -> Result<P>,
    {
        let grace = settings
            .response_timeout
            .unwrap_or(DEFAULT_RESPONSE_TIMEOUT);
        let shared = Arc::new(Shared::new(grace));
        let proxy = open(IndicationHandle {
            shared: shared.clone(),
        })?;

        info!(
            "Performance monitor connected ({}, timeout {:?})",
            settings.channels, settings.response_timeout
        );

        Ok(Self {
            proxy,
            shared,
            request_lock: Mutex::new(()),
            settings,
        })
    }

    /// Reads one counter, blocking until the hardware answers.
    pub fn read_counter(&self, index: CounterIndex) -> Result<u64> {
        let _in_flight = self.request_lock.lock();

        match self.shared.slot.arm() {
            ArmOutcome::Armed { lost: 0 } => {}
            ArmOutcome::Armed { lost } => {
                self.shared
                    .stats
                    .lost
                    .fetch_add(lost as u64, Ordering::Relaxed);
                warn!(
                    "{} owed response(s) never arrived within {:?}, assuming lost",
                    lost,
                    self.shared.slot.grace()
                );
            }
            ArmOutcome::Cancelled => {
                self.shared.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                return Err(PerfMonError::Cancelled { index });
            }
        }
        if let Err(e) = self.proxy.request(CounterRequest::new(index)) {
            self.shared.slot.disarm();
            return Err(e);
        }

        let started = Instant::now();
        match self.shared.slot.wait(self.settings.response_timeout) {
            WaitOutcome::Ready(value) => {
                self.shared.stats.completed.fetch_add(1, Ordering::Relaxed);
                if self.settings.verbose {
                    info!("Counter {} = {} ({:?})", index, value, started.elapsed());
                } else {
                    debug!("Counter {} = {}", index, value);
                }
                Ok(value)
            }
            WaitOutcome::TimedOut => {
                self.shared.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                let waited = started.elapsed();
                warn!("No response for counter {} after {:?}", index, waited);
                Err(PerfMonError::Timeout { index, waited })
            }
            WaitOutcome::Cancelled => {
                self.shared.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!("Read of counter {} cancelled", index);
                Err(PerfMonError::Cancelled { index })
            }
        }
    }

    /// Enables or disables counting in hardware. Fire-and-forget.
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        debug!("Setting counting enabled={}", enabled);
        self.proxy.set_enable(enabled)
    }

    /// Reads every entry in order, stopping at the first failed read.
    pub fn read_entries(&self, entries: &[CounterEntry]) -> Result<Vec<(String, u64)>> {
        entries
            .iter()
            .map(|entry| Ok((entry.name.clone(), self.read_counter(entry.index)?)))
            .collect()
    }

    /// Reads every counter named in the list file at `path` and writes
    /// `name = value` lines to `out`. Returns the number of lines written.
    pub fn write_all<W: Write>(&self, path: impl AsRef<Path>, out: &mut W) -> Result<usize> {
        let entries = load_counter_list(path)?;
        for entry in &entries {
            let value = self.read_counter(entry.index)?;
            writeln!(out, "{} = {}", entry.name, value)?;
        }
        out.flush()?;
        Ok(entries.len())
    }

    /// [`write_all`](Self::write_all) to standard output.
    pub fn print_all(&self, path: impl AsRef<Path>) -> Result<usize> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_all(path, &mut out)
    }
}

impl<P> PerfMonitor<P> {
    /// Delivers a response as if from the indication thread.
    pub fn on_response(&self, value: u64) {
        self.shared.deliver(value);
    }

    /// Handle the transport uses to deliver responses
    pub fn indication_handle(&self) -> IndicationHandle {
        IndicationHandle {
            shared: self.shared.clone(),
        }
    }

    /// Handle that cancels reads from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: self.shared.clone(),
        }
    }

    /// Clears cancellation. Answers still owed to abandoned reads keep being
    /// discarded when they arrive, or expire after the grace period.
    pub fn reset(&self) {
        self.shared.slot.reset();
    }

    pub fn stats(&self) -> ReadStats {
        let stats = &self.shared.stats;
        ReadStats {
            completed: stats.completed.load(Ordering::Relaxed),
            timed_out: stats.timed_out.load(Ordering::Relaxed),
            cancelled: stats.cancelled.load(Ordering::Relaxed),
            stale: stats.stale.load(Ordering::Relaxed),
            unsolicited: stats.unsolicited.load(Ordering::Relaxed),
            lost: stats.lost.load(Ordering::Relaxed),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn proxy(&self) -> &P {
        &self.proxy
    }
}
