//! The EP0 control-transfer state machine.

use tock_registers::interfaces::Readable;

use gadget::setup::{FeatureSelector, Recipient, SetupData, TransferDirection};
use gadget::{Error, UsbController};

use super::bus::{bits, view, Reg, UdcBus};
use super::endpoint::NUM_ENDPOINTS;
use super::registers::{Ep0Csr, FuncAddr};
use super::Udc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Ep0State {
    /// Nothing in progress; waiting for a setup packet.
    Idle,
    /// The eight setup bytes are read and being dispatched.
    SetupPending,
    /// Device-to-host data stage in progress.
    InDataPhase,
    /// Host-to-device data stage in progress.
    OutDataPhase,
    /// Data stage finished, status stage handed to the hardware.
    EndXfer,
    /// A forced stall is on the wire.
    Stall,
}

impl<'a, B: UdcBus> Udc<'a, B> {
    /// Service the control endpoint.
    pub(crate) fn handle_ep0(&mut self) {
        let csr = view::<Ep0Csr::Register>(self.bus.indexed_read(0, Reg::InCsr1));

        // Sent-stall and setup-end outrank any data-phase bit and must be
        // cleared before the state switch runs.
        if csr.is_set(Ep0Csr::SENT_STALL) {
            log::debug!("ep0: stall handshake sent");
            self.bus.indexed_write(
                0,
                Reg::InCsr1,
                csr.get() & !bits(Ep0Csr::SENT_STALL::SET),
            );
            self.nuke(0, Error::Stalled);
            self.ep0_state = Ep0State::Idle;
        }
        if csr.is_set(Ep0Csr::SETUP_END) {
            log::debug!("ep0: transfer cut short by new setup");
            self.bus
                .indexed_write(0, Reg::InCsr1, bits(Ep0Csr::SERVICED_SETUP_END::SET));
            self.nuke(0, Error::Aborted);
            self.ep0_state = Ep0State::Idle;
            // The fresh setup packet is taken on the next pass.
            return;
        }

        let csr = view::<Ep0Csr::Register>(self.bus.indexed_read(0, Reg::InCsr1));
        match self.ep0_state {
            Ep0State::Idle | Ep0State::SetupPending => {
                if csr.is_set(Ep0Csr::OPKT_RDY) {
                    self.handle_setup();
                }
            }
            Ep0State::InDataPhase => {
                if !csr.is_set(Ep0Csr::IPKT_RDY) {
                    self.write_fifo(0);
                }
            }
            Ep0State::OutDataPhase => {
                if csr.is_set(Ep0Csr::OPKT_RDY) {
                    self.read_fifo(0);
                }
            }
            Ep0State::EndXfer => self.ep0_state = Ep0State::Idle,
            Ep0State::Stall => self.ep0_state = Ep0State::Idle,
        }
    }

    fn handle_setup(&mut self) {
        self.ep0_state = Ep0State::SetupPending;
        let count = self.fifo_count(0);
        let mut raw = [0u8; 8];
        for byte in raw.iter_mut().take(count.min(8)) {
            *byte = self.bus.read(Reg::Fifo(0));
        }
        if count != 8 {
            // Not a setup packet; stall instead of guessing.
            log::warn!("ep0: malformed setup packet ({} bytes)", count);
            self.bus.indexed_write(
                0,
                Reg::InCsr1,
                bits(Ep0Csr::SERVICED_OPKT_RDY::SET + Ep0Csr::SEND_STALL::SET),
            );
            self.ep0_state = Ep0State::Idle;
            return;
        }
        let setup = match SetupData::parse(&raw) {
            Some(s) => s,
            None => return,
        };
        log::debug!(
            "ep0: setup type={:#04x} req={:#04x} value={:#06x} index={:#06x} length={}",
            setup.request_type.0,
            setup.request_code,
            setup.value,
            setup.index,
            setup.length
        );

        use gadget::setup::StandardRequest::*;
        match setup.standard_request() {
            Some(SetAddress { device_address }) => self.ep0_set_address(device_address),
            Some(GetStatus { recipient_index }) => self.ep0_get_status(&setup, recipient_index),
            Some(GetConfiguration) => {
                let configuration = self.configuration;
                self.ep0_reply(&[configuration]);
            }
            Some(ClearFeature {
                feature,
                recipient_index,
            }) => self.ep0_feature(&setup, feature, recipient_index, false),
            Some(SetFeature {
                feature,
                recipient_index,
            }) => self.ep0_feature(&setup, feature, recipient_index, true),
            Some(SetConfiguration {
                configuration_value,
            }) => {
                self.configuration = configuration_value;
                log::info!("udc: set configuration {}", configuration_value);
                self.ep0_status_ack();
                self.forward_acknowledged(&setup);
            }
            Some(SetInterface { interface, alternate }) => {
                log::info!("udc: set interface {} alternate {}", interface, alternate);
                self.ep0_status_ack();
                self.forward_acknowledged(&setup);
            }
            None => self.forward_setup(&setup),
        }
    }

    /// SET_ADDRESS: latch the new address into the hardware, which completes
    /// the status phase on its own; no status-phase FIFO traffic from here.
    fn ep0_set_address(&mut self, device_address: u16) {
        self.bus
            .indexed_write(0, Reg::InCsr1, bits(Ep0Csr::SERVICED_OPKT_RDY::SET));
        let address = (device_address & 0x7f) as u8;
        self.address = address;
        self.bus
            .write(Reg::FuncAddr, address | bits(FuncAddr::UPDATE::SET));
        self.ep0_state = Ep0State::Idle;
        log::debug!("ep0: set address {}", address);
    }

    fn ep0_get_status(&mut self, setup: &SetupData, recipient_index: u16) {
        let status: [u8; 2] = match setup.request_type.recipient() {
            Recipient::Device => [
                (self.selfpowered as u8) | ((self.remote_wakeup as u8) << 1),
                0,
            ],
            Recipient::Interface => [0, 0],
            Recipient::Endpoint => {
                let endpoint = (recipient_index & 0x0f) as usize;
                if endpoint >= NUM_ENDPOINTS || !self.endpoints[endpoint].enabled() {
                    self.ep0_stall();
                    return;
                }
                [self.endpoints[endpoint].halted as u8, 0]
            }
            _ => {
                self.ep0_stall();
                return;
            }
        };
        self.ep0_reply(&status);
    }

    fn ep0_feature(
        &mut self,
        setup: &SetupData,
        feature: FeatureSelector,
        recipient_index: u16,
        set: bool,
    ) {
        match (setup.request_type.recipient(), feature) {
            (Recipient::Device, FeatureSelector::DeviceRemoteWakeup) => {
                self.remote_wakeup = set;
                self.ep0_status_ack();
            }
            (Recipient::Endpoint, FeatureSelector::EndpointHalt) => {
                let endpoint = (recipient_index & 0x0f) as usize;
                if endpoint == 0
                    || endpoint >= NUM_ENDPOINTS
                    || !self.endpoints[endpoint].enabled()
                {
                    self.ep0_stall();
                    return;
                }
                let _ = self.set_halt(endpoint, set);
                self.ep0_status_ack();
            }
            _ => self.ep0_stall(),
        }
    }

    /// Requests the core does not terminate itself: hand them to the
    /// function driver with the data-phase state already set up.
    fn forward_setup(&mut self, setup: &SetupData) {
        self.ep0_state = match setup.request_type.transfer_direction() {
            TransferDirection::DeviceToHost => Ep0State::InDataPhase,
            TransferDirection::HostToDevice => Ep0State::OutDataPhase,
        };
        self.bus
            .indexed_write(0, Reg::InCsr1, bits(Ep0Csr::SERVICED_OPKT_RDY::SET));

        let driver = match self.driver {
            Some(d) => d,
            None => {
                self.ep0_stall();
                return;
            }
        };
        match driver.setup(self, setup) {
            Ok(()) => {
                if setup.length == 0 {
                    self.bus
                        .indexed_write(0, Reg::InCsr1, bits(Ep0Csr::DATA_END::SET));
                    self.ep0_state = Ep0State::Idle;
                }
            }
            Err(_) => {
                log::debug!("ep0: request {:#04x} unsupported by driver", setup.request_code);
                self.ep0_stall();
            }
        }
    }

    /// SET_CONFIGURATION/SET_INTERFACE are acknowledged internally first,
    /// then shown to the driver so it can (re)build its endpoint queues.
    fn forward_acknowledged(&mut self, setup: &SetupData) {
        let driver = match self.driver {
            Some(d) => d,
            None => return,
        };
        if driver.setup(self, setup).is_err() {
            self.ep0_stall();
        }
    }

    /// Write a short reply straight into the FIFO, completing the control
    /// transfer in place without going through the request queue.
    fn ep0_reply(&mut self, data: &[u8]) {
        self.bus
            .indexed_write(0, Reg::InCsr1, bits(Ep0Csr::SERVICED_OPKT_RDY::SET));
        for byte in data {
            self.bus.write(Reg::Fifo(0), *byte);
        }
        self.bus.indexed_write(
            0,
            Reg::InCsr1,
            bits(Ep0Csr::IPKT_RDY::SET + Ep0Csr::DATA_END::SET),
        );
        self.ep0_state = Ep0State::Idle;
    }

    /// Finish a request with no data stage.
    fn ep0_status_ack(&mut self) {
        self.bus.indexed_write(
            0,
            Reg::InCsr1,
            bits(Ep0Csr::SERVICED_OPKT_RDY::SET + Ep0Csr::DATA_END::SET),
        );
        self.ep0_state = Ep0State::Idle;
    }

    pub(crate) fn ep0_stall(&mut self) {
        self.bus.indexed_write(
            0,
            Reg::InCsr1,
            bits(Ep0Csr::SERVICED_OPKT_RDY::SET + Ep0Csr::SEND_STALL::SET),
        );
        self.nuke(0, Error::Stalled);
        self.ep0_state = Ep0State::Idle;
    }
}
