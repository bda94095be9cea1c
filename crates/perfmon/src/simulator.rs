//! In-process stand-in for the performance-counter hardware.
//!
//! Commands travel over an unbounded channel to a dedicated indication
//! thread, which answers reads by calling the registered
//! [`IndicationHandler`]. This mirrors the real arrangement where
//! responses come back on a thread the reader does not own.

use std::collections::{HashMap, HashSet};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{PerfMonError, Result};
use crate::transport::{IndicationHandler, RequestProxy};
use crate::types::{ChannelIds, CounterIndex, CounterRequest, CounterResponse};

/// Counter state and behaviour of a simulated device.
#[derive(Debug, Clone)]
pub struct DeviceModel {
    counters: HashMap<CounterIndex, u64>,
    silent: HashSet<CounterIndex>,
    slow: HashMap<CounterIndex, Duration>,
    latency: Duration,
    increment: u64,
    enabled: bool,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            counters: HashMap::new(),
            silent: HashSet::new(),
            slow: HashMap::new(),
            latency: Duration::ZERO,
            increment: 1,
            enabled: false,
        }
    }
}

impl DeviceModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial value of a counter.
    pub fn with_counter(mut self, index: CounterIndex, value: u64) -> Self {
        self.counters.insert(index, value);
        self
    }

    /// Makes the device ignore reads of `index`.
    pub fn with_silent(mut self, index: CounterIndex) -> Self {
        self.silent.insert(index);
        self
    }

    /// Delay before each indication is delivered.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay before answering reads of `index`, in place of the device-wide
    /// latency.
    pub fn with_counter_latency(mut self, index: CounterIndex, latency: Duration) -> Self {
        self.slow.insert(index, latency);
        self
    }

    fn latency_for(&self, index: CounterIndex) -> Duration {
        self.slow.get(&index).copied().unwrap_or(self.latency)
    }

    /// Amount a counter advances per read while counting is enabled.
    pub fn with_increment(mut self, increment: u64) -> Self {
        self.increment = increment;
        self
    }

    /// Returns the current value and advances it if counting is enabled.
    /// Unmapped counters read as zero.
    fn sample(&mut self, index: CounterIndex) -> u64 {
        let slot = self.counters.entry(index).or_insert(0);
        let value = *slot;
        if self.enabled {
            *slot = slot.wrapping_add(self.increment);
        }
        value
    }
}

#[derive(Debug)]
enum Command {
    Read(CounterRequest),
    SetEnable(bool),
}

/// Simulated device with its own indication thread.
///
/// Dropping the device closes the command channel and joins the thread.
#[derive(Debug)]
pub struct SimulatedDevice {
    channels: ChannelIds,
    commands: Option<mpsc::UnboundedSender<Command>>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedDevice {
    /// Starts the indication thread, delivering responses to `handler`.
    pub fn spawn<H>(channels: ChannelIds, model: DeviceModel, handler: H) -> Result<Self>
    where
        H: IndicationHandler + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name(format!("perfmon-ind-{}", channels.indication_id))
            .spawn(move || run_indication_loop(model, rx, handler))?;

        info!("Simulated device started ({})", channels);

        Ok(Self {
            channels,
            commands: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn channels(&self) -> ChannelIds {
        self.channels
    }

    fn send(&self, command: Command) -> Result<()> {
        let tx = self
            .commands
            .as_ref()
            .ok_or_else(|| PerfMonError::Transport("device is shut down".to_string()))?;
        tx.send(command).map_err(|_| {
            PerfMonError::Transport(format!(
                "indication thread for channel {} has stopped",
                self.channels.indication_id
            ))
        })
    }
}

impl RequestProxy for SimulatedDevice {
    fn request(&self, request: CounterRequest) -> Result<()> {
        self.send(Command::Read(request))
    }

    fn set_enable(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetEnable(enabled))
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        // closing the channel ends the indication loop
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Indication thread for {} panicked", self.channels);
            }
        }
    }
}

fn run_indication_loop<H: IndicationHandler>(
    mut model: DeviceModel,
    mut commands: mpsc::UnboundedReceiver<Command>,
    handler: H,
) {
    while let Some(command) = commands.blocking_recv() {
        match command {
            Command::SetEnable(enabled) => {
                debug!("Counting {}", if enabled { "enabled" } else { "disabled" });
                model.enabled = enabled;
            }
            Command::Read(request) => {
                if model.silent.contains(&request.index) {
                    debug!("Ignoring read of silent counter {}", request.index);
                    continue;
                }
                let value = model.sample(request.index);
                let latency = model.latency_for(request.index);
                if !latency.is_zero() {
                    thread::sleep(latency);
                }
                handler.resp(CounterResponse::new(value));
            }
        }
    }
    debug!("Indication loop exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Instant;

    #[derive(Default)]
    struct Recorder {
        values: Mutex<Vec<u64>>,
    }

    impl IndicationHandler for Recorder {
        fn resp(&self, response: CounterResponse) {
            self.values.lock().push(response.value);
        }
    }

    impl Recorder {
        fn wait_for(&self, count: usize) -> Vec<u64> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while Instant::now() < deadline {
                let values = self.values.lock();
                if values.len() >= count {
                    return values.clone();
                }
                drop(values);
                thread::sleep(Duration::from_millis(1));
            }
            self.values.lock().clone()
        }
    }

    fn ids() -> ChannelIds {
        ChannelIds::new(5, 6)
    }

    #[test]
    fn test_sample_unmapped_is_zero() {
        let mut model = DeviceModel::new();
        assert_eq!(model.sample(CounterIndex::new(9)), 0);
    }

    #[test]
    fn test_sample_advances_only_when_enabled() {
        let idx = CounterIndex::new(1);
        let mut model = DeviceModel::new().with_counter(idx, 10).with_increment(5);
        assert_eq!(model.sample(idx), 10);
        assert_eq!(model.sample(idx), 10);

        model.enabled = true;
        assert_eq!(model.sample(idx), 10);
        assert_eq!(model.sample(idx), 15);
    }

    #[test]
    fn test_sample_wraps() {
        let idx = CounterIndex::new(1);
        let mut model = DeviceModel::new().with_counter(idx, u64::MAX);
        model.enabled = true;
        assert_eq!(model.sample(idx), u64::MAX);
        assert_eq!(model.sample(idx), 0);
    }

    #[test]
    fn test_counter_latency_overrides_device_latency() {
        let model = DeviceModel::new()
            .with_latency(Duration::from_millis(5))
            .with_counter_latency(CounterIndex::new(2), Duration::from_millis(50));
        assert_eq!(
            model.latency_for(CounterIndex::new(1)),
            Duration::from_millis(5)
        );
        assert_eq!(
            model.latency_for(CounterIndex::new(2)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_device_answers_reads_in_order() {
        let recorder = Arc::new(Recorder::default());
        let model = DeviceModel::new()
            .with_counter(CounterIndex::new(1), 100)
            .with_counter(CounterIndex::new(2), 200);
        let device = SimulatedDevice::spawn(ids(), model, recorder.clone()).unwrap();

        device
            .request(CounterRequest::new(CounterIndex::new(2)))
            .unwrap();
        device
            .request(CounterRequest::new(CounterIndex::new(1)))
            .unwrap();

        assert_eq!(recorder.wait_for(2), vec![200, 100]);
    }

    #[test]
    fn test_device_skips_silent_counters() {
        let recorder = Arc::new(Recorder::default());
        let model = DeviceModel::new()
            .with_counter(CounterIndex::new(1), 1)
            .with_silent(CounterIndex::new(7));
        let device = SimulatedDevice::spawn(ids(), model, recorder.clone()).unwrap();

        device
            .request(CounterRequest::new(CounterIndex::new(7)))
            .unwrap();
        device
            .request(CounterRequest::new(CounterIndex::new(1)))
            .unwrap();

        assert_eq!(recorder.wait_for(1), vec![1]);
        drop(device);
        assert_eq!(recorder.values.lock().len(), 1);
    }

    #[test]
    fn test_drop_joins_indication_thread() {
        let recorder = Arc::new(Recorder::default());
        let device = SimulatedDevice::spawn(ids(), DeviceModel::new(), recorder.clone()).unwrap();
        device.set_enable(true).unwrap();
        drop(device);
        // the device held the only other reference through the thread
        assert_eq!(Arc::strong_count(&recorder), 1);
    }
}
