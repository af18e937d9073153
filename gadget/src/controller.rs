//! The controller operations a function driver may invoke.

use crate::request::Request;
use crate::setup::EndpointDescriptor;
use crate::{Error, Speed};

/// Device-controller operations, as seen by a registered function driver.
///
/// All calls execute synchronously in the controller's single execution
/// context; none block. Callbacks receive this trait object so they can
/// invoke further operations re-entrantly.
pub trait UsbController {
    /// Configure and activate a non-control endpoint from its descriptor.
    ///
    /// Fails with `InvalidArgument` for the control endpoint, a descriptor
    /// address that does not match `endpoint`, an unsupported transfer type,
    /// or a max packet size the FIFO cannot hold; with `Busy` if the
    /// endpoint is already enabled.
    fn endpoint_enable(
        &mut self,
        endpoint: usize,
        descriptor: &EndpointDescriptor,
    ) -> Result<(), Error>;

    /// Deactivate an endpoint. Every still-queued request fails with
    /// `Shutdown` before this returns.
    fn endpoint_disable(&mut self, endpoint: usize) -> Result<(), Error>;

    /// Append a request to the endpoint's transfer queue. Transfers start
    /// immediately when the hardware is ready; a request may therefore
    /// complete (and its callback run) before `queue` returns.
    ///
    /// A request rejected with an error is dropped, so callers must stay
    /// within the per-endpoint queue depth.
    fn queue(&mut self, endpoint: usize, request: Request) -> Result<(), Error>;

    /// Remove a still-queued request, identified by its `handle`, failing it
    /// with `Aborted` through its completion callback.
    fn dequeue(&mut self, endpoint: usize, handle: u32) -> Result<(), Error>;

    /// Assert or clear the endpoint's STALL condition. Clearing also resets
    /// the data toggle. Setting halt on the control endpoint forces the
    /// stall-then-status sequence of the control state machine.
    fn set_halt(&mut self, endpoint: usize, halted: bool) -> Result<(), Error>;

    /// Bytes currently held in an OUT-capable endpoint's FIFO.
    fn fifo_status(&self, endpoint: usize) -> Result<usize, Error>;

    /// Discard whatever the endpoint's FIFO holds.
    fn fifo_flush(&mut self, endpoint: usize) -> Result<(), Error>;

    /// The current USB frame number.
    fn frame_number(&self) -> u16;

    /// Bus speed negotiated at the last reset, `Unknown` before that.
    fn speed(&self) -> Speed;

    /// Drives the self-powered bit reported by GET_STATUS.
    fn set_selfpowered(&mut self, selfpowered: bool);

    /// Connect to or disconnect from the bus via the platform's pull-up
    /// control. Fails with `InvalidArgument` when the platform has none.
    fn pullup(&mut self, enable: bool) -> Result<(), Error>;

    /// Report configured VBUS current draw to the platform.
    fn vbus_draw(&mut self, current_ma: u16) -> Result<(), Error>;
}
