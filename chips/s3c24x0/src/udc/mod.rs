//! Device-side driver for the on-chip full-speed USB controller.
//!
//! The controller presents one control endpoint and four bulk/interrupt
//! endpoints to a single registered function driver. Everything runs from
//! the boot loop's interrupt-pending check: [`Udc::handle_interrupt`]
//! classifies the pending bus and endpoint events and drives the EP0 control
//! state machine and the FIFO transfer engine, both of which complete
//! requests synchronously from that context.

pub mod bus;
mod control;
mod endpoint;
pub mod registers;
mod transfer;

#[cfg(test)]
pub(crate) mod testutil;

use tock_registers::interfaces::Readable;

use gadget::driver::GadgetDriver;
use gadget::request::Request;
use gadget::setup::{EndpointAddress, EndpointDescriptor, TransferDirection, TransferType};
use gadget::{Error, Speed, UsbController};

use self::bus::{bits, view, Reg, UdcBus};
use self::control::Ep0State;
use self::endpoint::{EndpointState, EP0_MAX_PACKET, FIFO_SIZE, NUM_ENDPOINTS};
use self::registers::{Ep0Csr, EpInt, FuncAddr, InCsr1, InCsr2, MaxP, OutCsr1, UsbInt};

pub use self::registers::{UdcRegisters, UDC_BASE};

/// Pull-up commands handed to the board's control hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UdcCommand {
    Connect,
    Disconnect,
}

/// Board integration for the controller.
///
/// Pad muxing, clock ungating and the system interrupt controller are the
/// board's responsibility before the driver is brought up; the driver itself
/// only needs the pull-up command hook and, optionally, a VBUS draw hook.
#[derive(Default)]
pub struct UdcPlatform {
    pub udc_command: Option<fn(UdcCommand)>,
    pub vbus_draw: Option<fn(u16)>,
}

impl UdcPlatform {
    pub const fn new() -> UdcPlatform {
        UdcPlatform {
            udc_command: None,
            vbus_draw: None,
        }
    }
}

const EP0_DESCRIPTOR: EndpointDescriptor = EndpointDescriptor {
    endpoint_address: EndpointAddress::new(0, TransferDirection::HostToDevice),
    transfer_type: TransferType::Control,
    max_packet_size: EP0_MAX_PACKET,
    interval: 0,
};

/// The USB device controller.
pub struct Udc<'a, B: UdcBus> {
    bus: B,
    platform: UdcPlatform,
    driver: Option<&'a dyn GadgetDriver>,
    endpoints: [EndpointState; NUM_ENDPOINTS],
    ep0_state: Ep0State,
    speed: Speed,
    address: u8,
    configuration: u8,
    selfpowered: bool,
    remote_wakeup: bool,
}

impl<'a, B: UdcBus> Udc<'a, B> {
    pub fn new(bus: B, platform: UdcPlatform) -> Udc<'a, B> {
        Udc {
            bus,
            platform,
            driver: None,
            endpoints: [
                EndpointState::new(Some(EP0_DESCRIPTOR)),
                EndpointState::new(None),
                EndpointState::new(None),
                EndpointState::new(None),
                EndpointState::new(None),
            ],
            ep0_state: Ep0State::Idle,
            speed: Speed::Unknown,
            address: 0,
            configuration: 0,
            selfpowered: false,
            remote_wakeup: false,
        }
    }

    /// Hook up a function driver, bind it, and bring the controller up.
    pub fn register_function_driver(&mut self, driver: &'a dyn GadgetDriver) -> Result<(), Error> {
        if self.driver.is_some() {
            return Err(Error::Busy);
        }
        if driver.max_speed() != Speed::Full {
            log::warn!("udc: function driver does not support full speed");
            return Err(Error::InvalidArgument);
        }
        self.driver = Some(driver);
        if let Err(e) = driver.bind(self) {
            log::warn!("udc: function driver bind failed");
            self.driver = None;
            return Err(e);
        }
        self.enable_controller();
        log::info!("udc: registered function driver");
        Ok(())
    }

    /// Tear a function driver down again. `driver` must be the one
    /// currently registered.
    pub fn unregister_function_driver(
        &mut self,
        driver: &'a dyn GadgetDriver,
    ) -> Result<(), Error> {
        let current = match self.driver {
            Some(d) => d,
            None => return Err(Error::NotReady),
        };
        let same = core::ptr::eq(
            current as *const dyn GadgetDriver as *const (),
            driver as *const dyn GadgetDriver as *const (),
        );
        if !same {
            return Err(Error::InvalidArgument);
        }
        current.disconnect(self);
        self.disable_controller();
        for endpoint in 0..NUM_ENDPOINTS {
            self.nuke(endpoint, Error::Shutdown);
        }
        current.unbind(self);
        self.driver = None;
        log::info!("udc: unregistered function driver");
        Ok(())
    }

    /// Arm the controller: clear out whatever interrupt state predates the
    /// driver and unmask the reset/suspend sources.
    pub fn enable_controller(&mut self) {
        self.bus.write(Reg::EpIntPending, 0xff);
        self.bus.write(Reg::UsbIntPending, 0xff);
        self.bus
            .write(Reg::UsbIntEnable, bits(UsbInt::RESET::SET + UsbInt::SUSPEND::SET));
        self.bus.write(Reg::EpIntEnable, bits(EpInt::EP0::SET));
        self.speed = Speed::Unknown;
    }

    /// Mask every controller interrupt source and drop off the bus.
    pub fn disable_controller(&mut self) {
        self.bus.write(Reg::UsbIntEnable, 0);
        self.bus.write(Reg::EpIntEnable, 0);
        self.bus.write(Reg::EpIntPending, 0xff);
        self.bus.write(Reg::UsbIntPending, 0xff);
        if let Some(command) = self.platform.udc_command {
            command(UdcCommand::Disconnect);
        }
        self.speed = Speed::Unknown;
    }

    /// Top-level interrupt entry point, called whenever the controller's
    /// interrupt-pending bit is up.
    pub fn handle_interrupt(&mut self) {
        // The interrupted context may be mid-sequence on the shared INDEX
        // register; restore it on every exit path.
        let saved_index = self.bus.read(Reg::Index);

        let usb_int = view::<UsbInt::Register>(self.bus.read(Reg::UsbIntPending));
        let ep_int = view::<EpInt::Register>(self.bus.read(Reg::EpIntPending));
        // Writing the observed bits back clears exactly those; events raised
        // since the read stay pending for the next pass.
        self.bus.write(Reg::UsbIntPending, usb_int.get());
        self.bus.write(Reg::EpIntPending, ep_int.get());

        if usb_int.is_set(UsbInt::RESET) {
            // A reset invalidates whatever was in progress; nothing else in
            // this pass is worth looking at.
            self.handle_reset();
            self.bus.write(Reg::Index, saved_index);
            return;
        }

        if usb_int.is_set(UsbInt::RESUME) {
            log::debug!("udc: resume");
            if self.speed != Speed::Unknown {
                if let Some(driver) = self.driver {
                    driver.resume(self);
                }
            }
        }

        if usb_int.is_set(UsbInt::SUSPEND) {
            log::debug!("udc: suspend");
            if self.speed != Speed::Unknown {
                if let Some(driver) = self.driver {
                    driver.suspend(self);
                }
            }
        }

        if ep_int.is_set(EpInt::EP0) {
            self.handle_ep0();
        }
        for endpoint in 1..NUM_ENDPOINTS {
            if ep_int.get() & (1 << endpoint) != 0 {
                self.handle_endpoint(endpoint);
            }
        }

        self.bus.write(Reg::Index, saved_index);
    }

    fn handle_reset(&mut self) {
        log::info!("udc: bus reset");
        self.speed = Speed::Full;
        self.address = 0;
        self.configuration = 0;
        self.bus.write(Reg::FuncAddr, bits(FuncAddr::UPDATE::SET));
        self.bus.indexed_write(0, Reg::MaxP, bits(MaxP::SIZE::Bytes8));
        self.ep0_state = Ep0State::Idle;
        for endpoint in 0..NUM_ENDPOINTS {
            self.nuke(endpoint, Error::Aborted);
            if endpoint != 0 {
                // The configuration died with the bus session.
                self.endpoints[endpoint].descriptor = None;
                self.endpoints[endpoint].halted = false;
            }
        }
    }

    /// Generic per-endpoint service: clear a sent-stall first, then move
    /// data if a request is in flight and the FIFO is ready.
    fn handle_endpoint(&mut self, endpoint: usize) {
        let descriptor = match self.endpoints[endpoint].descriptor {
            Some(d) => d,
            None => return,
        };
        if descriptor.endpoint_address.is_in() {
            let csr = view::<InCsr1::Register>(self.bus.indexed_read(endpoint, Reg::InCsr1));
            if csr.is_set(InCsr1::SENT_STALL) {
                log::debug!("ep{}: sent stall", endpoint);
                self.bus.indexed_write(
                    endpoint,
                    Reg::InCsr1,
                    csr.get() & !bits(InCsr1::SENT_STALL::SET + InCsr1::PKT_RDY::SET),
                );
            }
            if !self.endpoints[endpoint].halted
                && !csr.is_set(InCsr1::PKT_RDY)
                && !self.endpoints[endpoint].queue.is_empty()
            {
                self.write_fifo(endpoint);
            }
        } else {
            let csr = view::<OutCsr1::Register>(self.bus.indexed_read(endpoint, Reg::OutCsr1));
            if csr.is_set(OutCsr1::SENT_STALL) {
                log::debug!("ep{}: sent stall", endpoint);
                self.bus.indexed_write(
                    endpoint,
                    Reg::OutCsr1,
                    csr.get() & !bits(OutCsr1::SENT_STALL::SET),
                );
            }
            if !self.endpoints[endpoint].halted
                && csr.is_set(OutCsr1::PKT_RDY)
                && !self.endpoints[endpoint].queue.is_empty()
            {
                self.read_fifo(endpoint);
            }
        }
    }

    /// Start the head request if the hardware is already able to take it.
    fn kickstart(&mut self, endpoint: usize) {
        if endpoint == 0 {
            match self.ep0_state {
                Ep0State::InDataPhase => {
                    let csr = view::<Ep0Csr::Register>(self.bus.indexed_read(0, Reg::InCsr1));
                    if !csr.is_set(Ep0Csr::IPKT_RDY) {
                        self.write_fifo(0);
                    }
                }
                Ep0State::OutDataPhase => {
                    let csr = view::<Ep0Csr::Register>(self.bus.indexed_read(0, Reg::InCsr1));
                    if csr.is_set(Ep0Csr::OPKT_RDY) {
                        self.read_fifo(0);
                    }
                }
                _ => {}
            }
        } else if self.endpoints[endpoint].is_in() {
            let csr = view::<InCsr1::Register>(self.bus.indexed_read(endpoint, Reg::InCsr1));
            if !csr.is_set(InCsr1::PKT_RDY) {
                self.write_fifo(endpoint);
            }
        } else {
            let csr = view::<OutCsr1::Register>(self.bus.indexed_read(endpoint, Reg::OutCsr1));
            if csr.is_set(OutCsr1::PKT_RDY) {
                self.read_fifo(endpoint);
            }
        }
    }

    /// Deliver a finished request to its owner. The request has already
    /// left the queue, so a callback that queues anew sees a consistent
    /// slot.
    fn complete_request(&mut self, endpoint: usize, mut request: Request, status: Result<(), Error>) {
        request.status = Some(status);
        if let Err(e) = status {
            log::debug!("ep{}: request failed: {:?}", endpoint, e);
        }
        if let Some(complete) = request.complete {
            complete(self, endpoint as u8, request);
        }
    }

    /// Fail every queued request on the endpoint with `error`.
    fn nuke(&mut self, endpoint: usize, error: Error) {
        while let Some(request) = self.endpoints[endpoint].queue.pop_front() {
            self.complete_request(endpoint, request, Err(error));
        }
    }

    fn fifo_count(&self, endpoint: usize) -> usize {
        let low = self.bus.indexed_read(endpoint, Reg::OutFifoCnt1) as usize;
        let high = self.bus.indexed_read(endpoint, Reg::OutFifoCnt2) as usize;
        (high << 8) | low
    }
}

impl<'a, B: UdcBus> UsbController for Udc<'a, B> {
    fn endpoint_enable(
        &mut self,
        endpoint: usize,
        descriptor: &EndpointDescriptor,
    ) -> Result<(), Error> {
        if endpoint == 0 || endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        if descriptor.endpoint_address.index() != endpoint {
            return Err(Error::InvalidArgument);
        }
        match descriptor.transfer_type {
            TransferType::Bulk | TransferType::Interrupt => {}
            TransferType::Control | TransferType::Isochronous => {
                return Err(Error::InvalidArgument)
            }
        }
        if self.endpoints[endpoint].enabled() {
            return Err(Error::Busy);
        }
        if descriptor.max_packet_size == 0 || descriptor.max_packet_size > FIFO_SIZE {
            return Err(Error::InvalidArgument);
        }
        let size = match descriptor.max_packet_size {
            8 => MaxP::SIZE::Bytes8,
            16 => MaxP::SIZE::Bytes16,
            32 => MaxP::SIZE::Bytes32,
            64 => MaxP::SIZE::Bytes64,
            _ => return Err(Error::InvalidArgument),
        };

        self.bus.indexed_write(endpoint, Reg::MaxP, bits(size));
        if descriptor.endpoint_address.is_in() {
            self.bus
                .indexed_write(endpoint, Reg::InCsr2, bits(InCsr2::MODE_IN::SET));
            self.bus.indexed_write(
                endpoint,
                Reg::InCsr1,
                bits(InCsr1::FIFO_FLUSH::SET + InCsr1::CLR_DATA_TOGGLE::SET),
            );
        } else {
            self.bus.indexed_write(endpoint, Reg::InCsr2, 0);
            self.bus.indexed_write(
                endpoint,
                Reg::OutCsr1,
                bits(OutCsr1::FIFO_FLUSH::SET + OutCsr1::CLR_DATA_TOGGLE::SET),
            );
        }
        let enabled = self.bus.read(Reg::EpIntEnable);
        self.bus
            .write(Reg::EpIntEnable, enabled | (1 << endpoint) as u8);

        self.endpoints[endpoint].descriptor = Some(*descriptor);
        self.endpoints[endpoint].halted = false;
        log::info!(
            "ep{}: enabled, {:?} {:?}, max packet {}",
            endpoint,
            descriptor.transfer_type,
            descriptor.endpoint_address.transfer_direction(),
            descriptor.max_packet_size
        );
        Ok(())
    }

    fn endpoint_disable(&mut self, endpoint: usize) -> Result<(), Error> {
        if endpoint == 0 || endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        if !self.endpoints[endpoint].enabled() {
            return Err(Error::NotReady);
        }
        self.nuke(endpoint, Error::Shutdown);
        self.endpoints[endpoint].descriptor = None;
        self.endpoints[endpoint].halted = false;
        let enabled = self.bus.read(Reg::EpIntEnable);
        self.bus
            .write(Reg::EpIntEnable, enabled & !((1 << endpoint) as u8));
        log::info!("ep{}: disabled", endpoint);
        Ok(())
    }

    fn queue(&mut self, endpoint: usize, mut request: Request) -> Result<(), Error> {
        if endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        if self.driver.is_none() {
            return Err(Error::NotReady);
        }
        if endpoint != 0 && !self.endpoints[endpoint].enabled() {
            return Err(Error::NotReady);
        }
        if request.buf.as_ref().map_or(0, |b| b.len()) < request.length {
            return Err(Error::InvalidArgument);
        }
        request.actual = 0;
        request.status = None;

        let was_empty = self.endpoints[endpoint].queue.is_empty();
        if self.endpoints[endpoint].queue.push_back(request).is_err() {
            return Err(Error::Busy);
        }
        if was_empty && !self.endpoints[endpoint].halted {
            self.kickstart(endpoint);
        }
        Ok(())
    }

    fn dequeue(&mut self, endpoint: usize, handle: u32) -> Result<(), Error> {
        if endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        match self.endpoints[endpoint].queue.remove(handle) {
            Some(request) => {
                self.complete_request(endpoint, request, Err(Error::Aborted));
                Ok(())
            }
            None => Err(Error::InvalidArgument),
        }
    }

    fn set_halt(&mut self, endpoint: usize, halted: bool) -> Result<(), Error> {
        if endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        if endpoint == 0 {
            // Halting EP0 forces the control machine's stall-then-status
            // sequence; the hardware clears the condition itself afterwards.
            if halted {
                self.bus
                    .indexed_write(0, Reg::InCsr1, bits(Ep0Csr::SEND_STALL::SET));
                self.ep0_state = Ep0State::Stall;
            }
            return Ok(());
        }
        if !self.endpoints[endpoint].enabled() {
            return Err(Error::NotReady);
        }
        if self.endpoints[endpoint].halted == halted {
            return Ok(());
        }
        self.endpoints[endpoint].halted = halted;
        let is_in = self.endpoints[endpoint].is_in();
        if is_in {
            let csr = self.bus.indexed_read(endpoint, Reg::InCsr1);
            if halted {
                self.bus
                    .indexed_write(endpoint, Reg::InCsr1, csr | bits(InCsr1::SEND_STALL::SET));
            } else {
                let cleared = csr & !bits(InCsr1::SEND_STALL::SET + InCsr1::SENT_STALL::SET);
                self.bus.indexed_write(
                    endpoint,
                    Reg::InCsr1,
                    cleared | bits(InCsr1::CLR_DATA_TOGGLE::SET),
                );
            }
        } else {
            let csr = self.bus.indexed_read(endpoint, Reg::OutCsr1);
            if halted {
                self.bus
                    .indexed_write(endpoint, Reg::OutCsr1, csr | bits(OutCsr1::SEND_STALL::SET));
            } else {
                let cleared = csr & !bits(OutCsr1::SEND_STALL::SET + OutCsr1::SENT_STALL::SET);
                self.bus.indexed_write(
                    endpoint,
                    Reg::OutCsr1,
                    cleared | bits(OutCsr1::CLR_DATA_TOGGLE::SET),
                );
            }
        }
        if !halted && is_in && !self.endpoints[endpoint].queue.is_empty() {
            self.kickstart(endpoint);
        }
        Ok(())
    }

    fn fifo_status(&self, endpoint: usize) -> Result<usize, Error> {
        if endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        if !self.endpoints[endpoint].enabled() {
            return Err(Error::NotReady);
        }
        if endpoint != 0 && self.endpoints[endpoint].is_in() {
            // Only the OUT side exposes its occupancy.
            return Err(Error::InvalidArgument);
        }
        Ok(self.fifo_count(endpoint))
    }

    fn fifo_flush(&mut self, endpoint: usize) -> Result<(), Error> {
        if endpoint >= NUM_ENDPOINTS {
            return Err(Error::InvalidArgument);
        }
        if !self.endpoints[endpoint].enabled() {
            return Err(Error::NotReady);
        }
        if self.endpoints[endpoint].is_in() {
            self.bus
                .indexed_write(endpoint, Reg::InCsr1, bits(InCsr1::FIFO_FLUSH::SET));
        } else {
            self.bus
                .indexed_write(endpoint, Reg::OutCsr1, bits(OutCsr1::FIFO_FLUSH::SET));
        }
        Ok(())
    }

    fn frame_number(&self) -> u16 {
        let low = self.bus.read(Reg::FrameNum1) as u16;
        let high = self.bus.read(Reg::FrameNum2) as u16;
        ((high << 8) | low) & 0x7ff
    }

    fn speed(&self) -> Speed {
        self.speed
    }

    fn set_selfpowered(&mut self, selfpowered: bool) {
        self.selfpowered = selfpowered;
    }

    fn pullup(&mut self, enable: bool) -> Result<(), Error> {
        let command = match self.platform.udc_command {
            Some(c) => c,
            None => return Err(Error::InvalidArgument),
        };
        if enable {
            self.enable_controller();
            command(UdcCommand::Connect);
        } else {
            self.disable_controller();
        }
        Ok(())
    }

    fn vbus_draw(&mut self, current_ma: u16) -> Result<(), Error> {
        match self.platform.vbus_draw {
            Some(hook) => {
                hook(current_ma);
                Ok(())
            }
            None => Err(Error::InvalidArgument),
        }
    }
}
