//! Request and indication seams between the reader and the hardware.
//!
//! A transport implements [`RequestProxy`] to carry commands into the
//! device, and calls an [`IndicationHandler`] from its own thread whenever
//! the device answers.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{CounterRequest, CounterResponse};

/// Software-side handle used to send commands into hardware.
pub trait RequestProxy: Send + Sync {
    /// Asks the device for one counter value. The answer arrives later
    /// through the indication channel.
    fn request(&self, request: CounterRequest) -> Result<()>;

    /// Starts or stops counting. No acknowledgement is sent back.
    fn set_enable(&self, enabled: bool) -> Result<()>;
}

/// Receiver of hardware-initiated responses.
///
/// Called from the transport's indication thread, never from the thread
/// that issued the request.
pub trait IndicationHandler: Send + Sync {
    fn resp(&self, response: CounterResponse);
}

impl<T: RequestProxy + ?Sized> RequestProxy for Arc<T> {
    fn request(&self, request: CounterRequest) -> Result<()> {
        (**self).request(request)
    }

    fn set_enable(&self, enabled: bool) -> Result<()> {
        (**self).set_enable(enabled)
    }
}

impl<T: RequestProxy + ?Sized> RequestProxy for Box<T> {
    fn request(&self, request: CounterRequest) -> Result<()> {
        (**self).request(request)
    }

    fn set_enable(&self, enabled: bool) -> Result<()> {
        (**self).set_enable(enabled)
    }
}

impl<T: IndicationHandler + ?Sized> IndicationHandler for Arc<T> {
    fn resp(&self, response: CounterResponse) {
        (**self).resp(response)
    }
}
