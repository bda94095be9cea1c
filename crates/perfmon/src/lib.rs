//! Performance Counter Monitor
//!
//! Blocking reader for hardware performance counters. Counter reads are
//! issued over a request channel and answered asynchronously on an
//! indication channel serviced by a separate thread; [`PerfMonitor`] hides
//! that split behind a timeout-bound, cancellable `read_counter` call and
//! prints named counters listed in a plain-text file.

pub mod config;
pub mod counter_list;
pub mod error;
pub mod handoff;
pub mod monitor;
pub mod simulator;
pub mod transport;
pub mod types;

pub use config::{MonitorConfig, PerfMonConfig, SimulatorConfig, DEFAULT_CONFIG_PATH};
pub use counter_list::{load_counter_list, parse_counter_list, parse_line, CounterEntry};
pub use error::*;
pub use handoff::{ArmOutcome, PostOutcome, ResponseSlot, WaitOutcome, DEFAULT_GRACE};
pub use monitor::{
    CancelHandle, IndicationHandle, MonitorSettings, PerfMonitor, ReadStats,
    DEFAULT_RESPONSE_TIMEOUT,
};
pub use simulator::{DeviceModel, SimulatedDevice};
pub use transport::{IndicationHandler, RequestProxy};
pub use types::{ChannelIds, CounterIndex, CounterRequest, CounterResponse};
