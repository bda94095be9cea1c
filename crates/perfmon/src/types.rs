//! Core perfmon types.
//!
//! Counter indices, the request/response pair exchanged with hardware, and
//! the channel ids a reader is bound to.

use std::fmt;
use std::str::FromStr;

use crate::error::PerfMonError;

/// Hardware counter index.
///
/// Parses from decimal (`42`) or `0x`-prefixed hex (`0x2a`); both forms of
/// the same number produce the same index. Displays as hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterIndex(u32);

impl CounterIndex {
    /// Creates an index from its raw value.
    pub const fn new(raw: u32) -> Self {
        CounterIndex(raw)
    }

    /// Returns the raw index value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl From<u32> for CounterIndex {
    fn from(raw: u32) -> Self {
        CounterIndex(raw)
    }
}

impl FromStr for CounterIndex {
    type Err = PerfMonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => (hex, 16),
            None => (s, 10),
        };
        // from_str_radix tolerates a leading '+'
        if digits.starts_with(['+', '-']) {
            return Err(PerfMonError::CounterList(format!(
                "invalid counter index '{}': sign not allowed",
                s
            )));
        }
        u32::from_str_radix(digits, radix)
            .map(CounterIndex)
            .map_err(|e| PerfMonError::CounterList(format!("invalid counter index '{}': {}", s, e)))
    }
}

impl fmt::Display for CounterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Request sent to hardware for a single counter read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRequest {
    pub index: CounterIndex,
}

impl CounterRequest {
    pub fn new(index: CounterIndex) -> Self {
        Self { index }
    }
}

/// Value delivered by the indication channel in answer to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterResponse {
    pub value: u64,
}

impl CounterResponse {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

/// Request and indication channel ids a reader is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelIds {
    /// Channel hardware uses to deliver responses
    pub indication_id: u32,
    /// Channel software uses to issue commands
    pub request_id: u32,
}

impl ChannelIds {
    pub fn new(indication_id: u32, request_id: u32) -> Self {
        Self {
            indication_id,
            request_id,
        }
    }
}

impl fmt::Display for ChannelIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "indication={} request={}",
            self.indication_id, self.request_id
        )
    }
}
