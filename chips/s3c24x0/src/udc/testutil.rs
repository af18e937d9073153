//! Scripted stand-ins for the hardware and the function driver.
//!
//! `FakeBus` models the controller's register file well enough to drive the
//! engine from tests: the per-endpoint CSRs sit behind the INDEX register
//! exactly as on the chip, FIFO reads consume bytes previously "sent by the
//! host", and marking an IN packet ready moves it to a transmit log the
//! tests inspect.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use gadget::driver::GadgetDriver;
use gadget::request::Request;
use gadget::setup::SetupData;
use gadget::{Error, Speed, UsbController};

use super::bus::{bits, Reg, UdcBus};
use super::endpoint::NUM_ENDPOINTS;
use super::registers::{Ep0Csr, InCsr1, OutCsr1};

/// One packet the fake "transmitted" to the host.
#[derive(Clone, Debug)]
pub(crate) struct SentPacket {
    pub bytes: Vec<u8>,
    pub data_end: bool,
}

#[derive(Default)]
struct FakeState {
    func_addr: u8,
    power: u8,
    ep_int: u8,
    usb_int: u8,
    ep_int_en: u8,
    usb_int_en: u8,
    index: u8,
    frame: u16,
    maxp: [u8; NUM_ENDPOINTS],
    ep0_csr: u8,
    in_csr1: [u8; NUM_ENDPOINTS],
    in_csr2: [u8; NUM_ENDPOINTS],
    out_csr1: [u8; NUM_ENDPOINTS],
    out_csr2: [u8; NUM_ENDPOINTS],
    out_fifo: [VecDeque<u8>; NUM_ENDPOINTS],
    in_fifo: [Vec<u8>; NUM_ENDPOINTS],
    sent: [Vec<SentPacket>; NUM_ENDPOINTS],
    toggle_resets: [usize; NUM_ENDPOINTS],
    flushes: [usize; NUM_ENDPOINTS],
    ep0_status_acks: usize,
}

pub(crate) struct FakeBus {
    state: RefCell<FakeState>,
}

impl FakeBus {
    pub fn new() -> FakeBus {
        FakeBus {
            state: RefCell::new(FakeState::default()),
        }
    }

    // -- host-side scripting ------------------------------------------------

    /// A SETUP transaction lands in the EP0 FIFO.
    pub fn host_setup(&self, bytes: &[u8]) {
        let mut s = self.state.borrow_mut();
        s.out_fifo[0].clear();
        s.out_fifo[0].extend(bytes.iter().copied());
        s.ep0_csr = bits(Ep0Csr::OPKT_RDY::SET);
        s.ep_int |= 1;
    }

    /// An OUT data packet lands in an endpoint FIFO.
    pub fn host_out(&self, endpoint: usize, bytes: &[u8]) {
        let mut s = self.state.borrow_mut();
        s.out_fifo[endpoint].extend(bytes.iter().copied());
        if endpoint == 0 {
            s.ep0_csr |= bits(Ep0Csr::OPKT_RDY::SET);
        } else {
            s.out_csr1[endpoint] |= bits(OutCsr1::PKT_RDY::SET);
        }
        s.ep_int |= 1 << endpoint;
    }

    /// The host consumed an IN packet; the endpoint interrupt fires.
    pub fn host_in_ack(&self, endpoint: usize) {
        self.state.borrow_mut().ep_int |= 1 << endpoint;
    }

    pub fn raise_bus_event(&self, value: u8) {
        self.state.borrow_mut().usb_int |= value;
    }

    pub fn raise_setup_end(&self) {
        let mut s = self.state.borrow_mut();
        s.ep0_csr |= bits(Ep0Csr::SETUP_END::SET);
        s.ep_int |= 1;
    }

    pub fn raise_ep0_sent_stall(&self) {
        let mut s = self.state.borrow_mut();
        s.ep0_csr |= bits(Ep0Csr::SENT_STALL::SET);
        s.ep_int |= 1;
    }

    pub fn raise_sent_stall(&self, endpoint: usize, is_in: bool) {
        let mut s = self.state.borrow_mut();
        if is_in {
            s.in_csr1[endpoint] |= bits(InCsr1::SENT_STALL::SET);
        } else {
            s.out_csr1[endpoint] |= bits(OutCsr1::SENT_STALL::SET);
        }
        s.ep_int |= 1 << endpoint;
    }

    pub fn set_frame(&self, frame: u16) {
        self.state.borrow_mut().frame = frame;
    }

    // -- inspection ---------------------------------------------------------

    pub fn func_addr(&self) -> u8 {
        self.state.borrow().func_addr
    }

    pub fn index(&self) -> u8 {
        self.state.borrow().index
    }

    pub fn ep0_csr(&self) -> u8 {
        self.state.borrow().ep0_csr
    }

    pub fn in_csr(&self, endpoint: usize) -> u8 {
        self.state.borrow().in_csr1[endpoint]
    }

    pub fn out_csr(&self, endpoint: usize) -> u8 {
        self.state.borrow().out_csr1[endpoint]
    }

    pub fn maxp(&self, endpoint: usize) -> u8 {
        self.state.borrow().maxp[endpoint]
    }

    pub fn ep_int_en(&self) -> u8 {
        self.state.borrow().ep_int_en
    }

    pub fn usb_int_en(&self) -> u8 {
        self.state.borrow().usb_int_en
    }

    pub fn sent(&self, endpoint: usize) -> Vec<SentPacket> {
        self.state.borrow().sent[endpoint].clone()
    }

    pub fn toggle_resets(&self, endpoint: usize) -> usize {
        self.state.borrow().toggle_resets[endpoint]
    }

    pub fn ep0_status_acks(&self) -> usize {
        self.state.borrow().ep0_status_acks
    }

    pub fn out_fifo_len(&self, endpoint: usize) -> usize {
        self.state.borrow().out_fifo[endpoint].len()
    }

    pub fn write_reg(&self, reg: Reg, value: u8) {
        self.write(reg, value);
    }

    // -- register semantics -------------------------------------------------

    fn ep0_csr_write(s: &mut FakeState, value: u8) {
        let serviced_opkt = bits(Ep0Csr::SERVICED_OPKT_RDY::SET);
        let serviced_se = bits(Ep0Csr::SERVICED_SETUP_END::SET);
        let send_stall = bits(Ep0Csr::SEND_STALL::SET);
        let sent_stall = bits(Ep0Csr::SENT_STALL::SET);
        let ipkt = bits(Ep0Csr::IPKT_RDY::SET);
        let opkt = bits(Ep0Csr::OPKT_RDY::SET);
        let data_end = bits(Ep0Csr::DATA_END::SET);
        let setup_end = bits(Ep0Csr::SETUP_END::SET);

        if value & serviced_opkt != 0 {
            s.ep0_csr &= !opkt;
            s.out_fifo[0].clear();
        }
        if value & serviced_se != 0 {
            s.ep0_csr &= !setup_end;
        }
        if value & send_stall != 0 {
            s.ep0_csr |= send_stall;
        }
        if value & sent_stall == 0 {
            s.ep0_csr &= !sent_stall;
        }
        if value & ipkt != 0 {
            let bytes = core::mem::take(&mut s.in_fifo[0]);
            s.sent[0].push(SentPacket {
                bytes,
                data_end: value & data_end != 0,
            });
        } else if value & data_end != 0 {
            s.ep0_status_acks += 1;
        }
    }

    fn in_csr1_write(s: &mut FakeState, endpoint: usize, value: u8) {
        let pkt = bits(InCsr1::PKT_RDY::SET);
        let flush = bits(InCsr1::FIFO_FLUSH::SET);
        let clrdt = bits(InCsr1::CLR_DATA_TOGGLE::SET);
        let level = bits(InCsr1::SEND_STALL::SET + InCsr1::SENT_STALL::SET);

        if value & pkt != 0 {
            let bytes = core::mem::take(&mut s.in_fifo[endpoint]);
            s.sent[endpoint].push(SentPacket {
                bytes,
                data_end: false,
            });
        }
        if value & flush != 0 {
            s.in_fifo[endpoint].clear();
            s.flushes[endpoint] += 1;
        }
        if value & clrdt != 0 {
            s.toggle_resets[endpoint] += 1;
        }
        s.in_csr1[endpoint] = value & level;
    }

    fn out_csr1_write(s: &mut FakeState, endpoint: usize, value: u8) {
        let pkt = bits(OutCsr1::PKT_RDY::SET);
        let flush = bits(OutCsr1::FIFO_FLUSH::SET);
        let clrdt = bits(OutCsr1::CLR_DATA_TOGGLE::SET);
        let level = bits(OutCsr1::SEND_STALL::SET + OutCsr1::SENT_STALL::SET)
            | bits(OutCsr1::PKT_RDY::SET);

        if s.out_csr1[endpoint] & pkt != 0 && value & pkt == 0 {
            // Packet released; whatever the driver left unread is gone.
            s.out_fifo[endpoint].clear();
        }
        if value & flush != 0 {
            s.out_fifo[endpoint].clear();
            s.flushes[endpoint] += 1;
        }
        if value & clrdt != 0 {
            s.toggle_resets[endpoint] += 1;
        }
        s.out_csr1[endpoint] = value & level;
    }
}

impl UdcBus for FakeBus {
    fn read(&self, reg: Reg) -> u8 {
        let mut s = self.state.borrow_mut();
        let idx = s.index as usize;
        match reg {
            Reg::FuncAddr => s.func_addr,
            Reg::Power => s.power,
            Reg::EpIntPending => s.ep_int,
            Reg::UsbIntPending => s.usb_int,
            Reg::EpIntEnable => s.ep_int_en,
            Reg::UsbIntEnable => s.usb_int_en,
            Reg::FrameNum1 => (s.frame & 0xff) as u8,
            Reg::FrameNum2 => (s.frame >> 8) as u8,
            Reg::Index => s.index,
            Reg::MaxP => s.maxp[idx],
            Reg::InCsr1 => {
                if idx == 0 {
                    s.ep0_csr
                } else {
                    s.in_csr1[idx]
                }
            }
            Reg::InCsr2 => s.in_csr2[idx],
            Reg::OutCsr1 => s.out_csr1[idx],
            Reg::OutCsr2 => s.out_csr2[idx],
            Reg::OutFifoCnt1 => (s.out_fifo[idx].len() & 0xff) as u8,
            Reg::OutFifoCnt2 => (s.out_fifo[idx].len() >> 8) as u8,
            Reg::Fifo(n) => s.out_fifo[n].pop_front().unwrap_or(0),
        }
    }

    fn write(&self, reg: Reg, value: u8) {
        let mut s = self.state.borrow_mut();
        let idx = s.index as usize;
        match reg {
            Reg::FuncAddr => s.func_addr = value,
            Reg::Power => s.power = value,
            Reg::EpIntPending => s.ep_int &= !value,
            Reg::UsbIntPending => s.usb_int &= !value,
            Reg::EpIntEnable => s.ep_int_en = value,
            Reg::UsbIntEnable => s.usb_int_en = value,
            Reg::Index => s.index = value,
            Reg::MaxP => s.maxp[idx] = value,
            Reg::InCsr1 => {
                if idx == 0 {
                    Self::ep0_csr_write(&mut s, value);
                } else {
                    Self::in_csr1_write(&mut s, idx, value);
                }
            }
            Reg::InCsr2 => s.in_csr2[idx] = value,
            Reg::OutCsr1 => Self::out_csr1_write(&mut s, idx, value),
            Reg::OutCsr2 => s.out_csr2[idx] = value,
            Reg::FrameNum1 | Reg::FrameNum2 | Reg::OutFifoCnt1 | Reg::OutFifoCnt2 => {}
            Reg::Fifo(n) => s.in_fifo[n].push(value),
        }
    }
}

// -- completion recording ---------------------------------------------------

#[derive(Clone, Debug)]
pub(crate) struct Completed {
    pub endpoint: u8,
    pub handle: u32,
    pub status: Option<Result<(), Error>>,
    pub actual: usize,
    pub data: Vec<u8>,
}

thread_local! {
    static COMPLETIONS: RefCell<Vec<Completed>> = RefCell::new(Vec::new());
}

/// Completion callback that logs into a thread-local the test drains.
pub(crate) fn record_completion(
    _controller: &mut dyn UsbController,
    endpoint: u8,
    request: Request,
) {
    let data = request
        .buf
        .as_ref()
        .map_or_else(Vec::new, |b| b[..request.actual].to_vec());
    COMPLETIONS.with(|c| {
        c.borrow_mut().push(Completed {
            endpoint,
            handle: request.handle,
            status: request.status,
            actual: request.actual,
            data,
        })
    });
}

pub(crate) fn take_completions() -> Vec<Completed> {
    COMPLETIONS.with(|c| c.borrow_mut().drain(..).collect())
}

pub(crate) fn leak_buf(data: &[u8]) -> &'static mut [u8] {
    Box::leak(data.to_vec().into_boxed_slice())
}

/// An OUT request with a zeroed buffer of `length` bytes.
pub(crate) fn out_request(length: usize, handle: u32) -> Request {
    let mut request = Request::new(leak_buf(&vec![0u8; length]));
    request.handle = handle;
    request.complete = Some(record_completion);
    request
}

/// An IN request carrying `data`.
pub(crate) fn in_request(data: &[u8], handle: u32) -> Request {
    let mut request = Request::new(leak_buf(data));
    request.handle = handle;
    request.complete = Some(record_completion);
    request
}

// -- recording function driver ----------------------------------------------

pub(crate) type SetupHook = fn(&mut dyn UsbController, &SetupData) -> Result<(), Error>;

pub(crate) struct RecordingDriver {
    pub speed: Speed,
    pub bind_result: Cell<Result<(), Error>>,
    pub bound: Cell<usize>,
    pub unbound: Cell<usize>,
    pub disconnected: Cell<usize>,
    pub suspended: Cell<usize>,
    pub resumed: Cell<usize>,
    pub setups: RefCell<Vec<SetupData>>,
    pub setup_hook: Cell<Option<SetupHook>>,
}

impl RecordingDriver {
    pub fn new() -> RecordingDriver {
        RecordingDriver::with_speed(Speed::Full)
    }

    pub fn with_speed(speed: Speed) -> RecordingDriver {
        RecordingDriver {
            speed,
            bind_result: Cell::new(Ok(())),
            bound: Cell::new(0),
            unbound: Cell::new(0),
            disconnected: Cell::new(0),
            suspended: Cell::new(0),
            resumed: Cell::new(0),
            setups: RefCell::new(Vec::new()),
            setup_hook: Cell::new(None),
        }
    }
}

impl GadgetDriver for RecordingDriver {
    fn max_speed(&self) -> Speed {
        self.speed
    }

    fn bind(&self, _controller: &mut dyn UsbController) -> Result<(), Error> {
        self.bound.set(self.bound.get() + 1);
        self.bind_result.get()
    }

    fn unbind(&self, _controller: &mut dyn UsbController) {
        self.unbound.set(self.unbound.get() + 1);
    }

    fn setup(&self, controller: &mut dyn UsbController, setup: &SetupData) -> Result<(), Error> {
        self.setups.borrow_mut().push(*setup);
        match self.setup_hook.get() {
            Some(hook) => hook(controller, setup),
            None => Ok(()),
        }
    }

    fn disconnect(&self, _controller: &mut dyn UsbController) {
        self.disconnected.set(self.disconnected.get() + 1);
    }

    fn suspend(&self, _controller: &mut dyn UsbController) {
        self.suspended.set(self.suspended.get() + 1);
    }

    fn resume(&self, _controller: &mut dyn UsbController) {
        self.resumed.set(self.resumed.get() + 1);
    }
}
