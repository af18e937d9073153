//! The FIFO transfer engine: packet-by-packet movement between request
//! buffers and the hardware FIFOs.

use tock_registers::interfaces::Readable;

use gadget::Error;

use super::bus::{bits, view, Reg, UdcBus};
use super::control::Ep0State;
use super::registers::{Ep0Csr, InCsr1, OutCsr1, UsbInt};
use super::Udc;

/// What a `write_fifo` pass did with the head request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    /// A full packet went out and more data is pending.
    Continue,
    /// A packet shorter than max-packet ended the transfer.
    CompleteShort,
    /// A full packet satisfied the requested length, no ZLP owed.
    CompleteFull,
}

impl<'a, B: UdcBus> Udc<'a, B> {
    /// Move the next packet of the endpoint's head request into the FIFO and
    /// mark it ready in one register write. On EP0 the final packet also
    /// raises data-end in that same write, folding data-phase completion and
    /// status-phase start together, unless a bus reset is already pending.
    ///
    /// Completes the request (after the mark-ready write, never before) when
    /// the packet was the last one.
    pub(crate) fn write_fifo(&mut self, endpoint: usize) -> Option<WriteOutcome> {
        let max_packet = self.endpoints[endpoint].max_packet();
        let request = self.endpoints[endpoint].queue.front_mut()?;
        let count = request.remaining().min(max_packet);
        if let Some(buf) = request.buf.as_ref() {
            for i in 0..count {
                self.bus.write(Reg::Fifo(endpoint), buf[request.actual + i]);
            }
        }
        request.actual += count;

        let outcome = if count < max_packet {
            WriteOutcome::CompleteShort
        } else if request.remaining() == 0 && !request.zero {
            WriteOutcome::CompleteFull
        } else {
            // A full packet with the ZLP flag still owed stays in flight;
            // the next pass emits the terminating zero-length packet.
            WriteOutcome::Continue
        };
        let last = outcome != WriteOutcome::Continue;

        if endpoint == 0 {
            let mut csr = Ep0Csr::IPKT_RDY::SET;
            if last {
                let usb_int = view::<UsbInt::Register>(self.bus.read(Reg::UsbIntPending));
                if usb_int.is_set(UsbInt::RESET) {
                    // The bus already tore the transfer down; signalling
                    // data-end into the reset would be wrong.
                    log::debug!("ep0: reset pending, suppressing data-end");
                } else {
                    csr = csr + Ep0Csr::DATA_END::SET;
                }
            }
            self.bus.indexed_write(0, Reg::InCsr1, bits(csr));
        } else {
            self.bus
                .indexed_write(endpoint, Reg::InCsr1, bits(InCsr1::PKT_RDY::SET));
        }

        if last {
            if let Some(request) = self.endpoints[endpoint].queue.pop_front() {
                if endpoint == 0 {
                    self.ep0_state = Ep0State::EndXfer;
                }
                self.complete_request(endpoint, request, Ok(()));
            }
        }
        Some(outcome)
    }

    /// Drain the endpoint's FIFO into the head request's buffer.
    ///
    /// A packet that does not fit completes the request with `Overflow` and
    /// the excess is dropped along with the packet-ready acknowledgement.
    pub(crate) fn read_fifo(&mut self, endpoint: usize) {
        let max_packet = self.endpoints[endpoint].max_packet();
        let available = self.fifo_count(endpoint);
        let request = match self.endpoints[endpoint].queue.front_mut() {
            Some(r) => r,
            None => return,
        };
        let space = request.remaining();
        let count = available.min(space);
        if let Some(buf) = request.buf.as_mut() {
            for i in 0..count {
                buf[request.actual + i] = self.bus.read(Reg::Fifo(endpoint));
            }
        }
        request.actual += count;

        let overflow = available > space;
        // The control endpoint's setup stage fixed the transfer length, so a
        // full short packet does not end it early; elsewhere a short packet
        // always terminates.
        let last = overflow
            || if endpoint == 0 {
                request.remaining() == 0
            } else {
                count < max_packet || request.remaining() == 0
            };

        if endpoint == 0 {
            let mut csr = Ep0Csr::SERVICED_OPKT_RDY::SET;
            if overflow {
                csr = csr + Ep0Csr::SEND_STALL::SET;
            } else if last {
                csr = csr + Ep0Csr::DATA_END::SET;
            }
            self.bus.indexed_write(0, Reg::InCsr1, bits(csr));
        } else {
            let csr = self.bus.indexed_read(endpoint, Reg::OutCsr1);
            self.bus.indexed_write(
                endpoint,
                Reg::OutCsr1,
                csr & !bits(OutCsr1::PKT_RDY::SET),
            );
        }

        if last {
            if let Some(request) = self.endpoints[endpoint].queue.pop_front() {
                if endpoint == 0 {
                    self.ep0_state = if overflow {
                        Ep0State::Idle
                    } else {
                        Ep0State::EndXfer
                    };
                }
                let status = if overflow {
                    log::warn!("ep{}: OUT data overran the request buffer", endpoint);
                    Err(Error::Overflow)
                } else {
                    Ok(())
                };
                self.complete_request(endpoint, request, status);
            }
        }
    }
}
