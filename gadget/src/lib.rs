//! Interface layer between USB device-controller drivers and the function
//! drivers ("gadgets") that implement a device class or vendor protocol on
//! top of them.
//!
//! A controller driver implements [`UsbController`] and accepts a single
//! registered [`GadgetDriver`] at a time. The function driver owns its
//! [`Request`] objects and their buffers; a request is lent to the
//! controller by `queue` and handed back, by value, to its completion
//! callback.

#![cfg_attr(not(test), no_std)]

pub mod controller;
pub mod driver;
pub mod request;
pub mod setup;

pub use controller::UsbController;
pub use driver::GadgetDriver;
pub use request::{Completion, Request};
pub use setup::SetupData;

/// Error codes shared across the gadget stack.
///
/// Only `InvalidArgument`, `NotReady` and `Busy` are returned synchronously
/// from API calls. The remaining kinds are terminal request statuses,
/// delivered through a request's completion callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// A parameter was malformed: bad endpoint number, unsupported
    /// descriptor, unknown request handle.
    InvalidArgument,
    /// The operation needs a registered function driver or an enabled
    /// endpoint that is not there.
    NotReady,
    /// The resource is already in use: endpoint already enabled, a driver
    /// already registered, or a full request queue.
    Busy,
    /// The transfer ended because a STALL handshake was raised on the
    /// endpoint.
    Stalled,
    /// The host abandoned the control transfer by starting a new one, or a
    /// bus reset tore it down.
    Aborted,
    /// An OUT packet carried more data than the request buffer could hold;
    /// the excess was discarded.
    Overflow,
    /// The endpoint was disabled, or the function driver unregistered, while
    /// the request was still queued.
    Shutdown,
}

/// Bus speeds a controller or function driver can operate at.
///
/// `Unknown` is the state before the first bus reset has been observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Speed {
    Unknown,
    Low,
    Full,
}
