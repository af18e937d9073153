//! The function-driver ("gadget") side of the interface.

use crate::controller::UsbController;
use crate::setup::SetupData;
use crate::{Error, Speed};

/// A USB function driver: the implementation of one device class or vendor
/// protocol, layered over a device controller.
///
/// `bind`, `unbind` and `setup` are the mandatory callbacks; the bus-event
/// notifications default to no-ops. All callbacks run synchronously from the
/// controller's interrupt dispatch and receive the controller so they can
/// queue requests or reconfigure endpoints on the spot.
pub trait GadgetDriver {
    /// The highest bus speed the driver supports. Registration is refused
    /// unless this is `Speed::Full`.
    fn max_speed(&self) -> Speed {
        Speed::Full
    }

    /// Called once at registration, before the controller is enabled.
    /// Descriptor discovery and endpoint allocation happen here.
    fn bind(&self, controller: &mut dyn UsbController) -> Result<(), Error>;

    /// Called at unregistration. The driver must release all outstanding
    /// requests.
    fn unbind(&self, controller: &mut dyn UsbController);

    /// Called for every control request the core does not dispatch itself,
    /// including descriptor reads and all class/vendor requests, and for
    /// SET_CONFIGURATION/SET_INTERFACE after internal bookkeeping.
    ///
    /// For a request with a data stage the driver must queue a transfer on
    /// endpoint zero before returning. Returning an error means
    /// "unsupported" and stalls the control endpoint.
    fn setup(&self, controller: &mut dyn UsbController, setup: &SetupData) -> Result<(), Error>;

    fn disconnect(&self, _controller: &mut dyn UsbController) {}

    fn suspend(&self, _controller: &mut dyn UsbController) {}

    fn resume(&self, _controller: &mut dyn UsbController) {}
}
