//! Register map of the on-chip full-speed USB device controller.
//!
//! The block is a set of byte-significant registers on word-aligned
//! addresses. A handful of them (MAXP, the CSRs, the OUT FIFO counters) are
//! windows onto per-endpoint state: the INDEX register selects which
//! endpoint they currently address.

use tock_registers::interfaces::{Readable, Writeable};
use tock_registers::register_bitfields;
use tock_registers::registers::{ReadOnly, ReadWrite};

use super::bus::{Reg, UdcBus};
use crate::support::StaticRef;

#[repr(C)]
pub struct UdcRegisters {
    /// Device address; bit 7 latches a new address into the hardware.
    /// - Address: 0x00
    func_addr: ReadWrite<u8, FuncAddr::Register>,
    _pad0: [u8; 3],
    /// Power management.
    /// - Address: 0x04
    power: ReadWrite<u8, Power::Register>,
    _pad1: [u8; 3],
    /// Per-endpoint interrupt pending, write-one-to-clear.
    /// - Address: 0x08
    ep_int: ReadWrite<u8, EpInt::Register>,
    _pad2: [u8; 3],
    _reserved0: [u8; 12],
    /// Bus-event interrupt pending, write-one-to-clear.
    /// - Address: 0x18
    usb_int: ReadWrite<u8, UsbInt::Register>,
    _pad3: [u8; 3],
    /// Per-endpoint interrupt enable.
    /// - Address: 0x1c
    ep_int_en: ReadWrite<u8, EpInt::Register>,
    _pad4: [u8; 3],
    _reserved1: [u8; 12],
    /// Bus-event interrupt enable.
    /// - Address: 0x2c
    usb_int_en: ReadWrite<u8, UsbInt::Register>,
    _pad5: [u8; 3],
    /// Frame number, low byte.
    /// - Address: 0x30
    frame_num1: ReadOnly<u8>,
    _pad6: [u8; 3],
    /// Frame number, high bits.
    /// - Address: 0x34
    frame_num2: ReadOnly<u8>,
    _pad7: [u8; 3],
    /// Endpoint selector for the indexed registers below.
    /// - Address: 0x38
    index: ReadWrite<u8>,
    _pad8: [u8; 3],
    _reserved2: [u8; 4],
    /// Indexed: max packet size code.
    /// - Address: 0x40
    maxp: ReadWrite<u8, MaxP::Register>,
    _pad9: [u8; 3],
    /// Indexed: IN control/status. Decodes as the EP0 CSR when INDEX is 0.
    /// - Address: 0x44
    in_csr1: ReadWrite<u8, InCsr1::Register>,
    _pad10: [u8; 3],
    /// Indexed: IN control 2.
    /// - Address: 0x48
    in_csr2: ReadWrite<u8, InCsr2::Register>,
    _pad11: [u8; 3],
    _reserved3: [u8; 4],
    /// Indexed: OUT control/status.
    /// - Address: 0x50
    out_csr1: ReadWrite<u8, OutCsr1::Register>,
    _pad12: [u8; 3],
    /// Indexed: OUT control 2.
    /// - Address: 0x54
    out_csr2: ReadWrite<u8, OutCsr2::Register>,
    _pad13: [u8; 3],
    /// Indexed: OUT FIFO occupancy, low byte.
    /// - Address: 0x58
    out_fifo_cnt1: ReadOnly<u8>,
    _pad14: [u8; 3],
    /// Indexed: OUT FIFO occupancy, high byte.
    /// - Address: 0x5c
    out_fifo_cnt2: ReadOnly<u8>,
    _pad15: [u8; 3],
    _reserved4: [u8; 32],
    /// Per-endpoint FIFO data windows.
    /// - Address: 0x80 + 4n
    fifo: [FifoWindow; 5],
}

#[repr(C)]
struct FifoWindow {
    data: ReadWrite<u8>,
    _reserved: [u8; 3],
}

register_bitfields![u8,
    pub FuncAddr [
        UPDATE OFFSET(7) NUMBITS(1) [],
        ADDR OFFSET(0) NUMBITS(7) []
    ],
    pub Power [
        ISO_UPDATE 7,
        USB_RESET 3,
        MCU_RESUME 2,
        SUSPEND_MODE 1,
        SUSPEND_EN 0
    ],
    pub UsbInt [
        RESET 2,
        RESUME 1,
        SUSPEND 0
    ],
    pub EpInt [
        EP4 4,
        EP3 3,
        EP2 2,
        EP1 1,
        EP0 0
    ],
    pub MaxP [
        SIZE OFFSET(0) NUMBITS(4) [
            Bytes8 = 1,
            Bytes16 = 2,
            Bytes32 = 4,
            Bytes64 = 8
        ]
    ],
    /// IN_CSR1 as seen while INDEX selects the control endpoint.
    pub Ep0Csr [
        SERVICED_SETUP_END 7,
        SERVICED_OPKT_RDY 6,
        SEND_STALL 5,
        SETUP_END 4,
        DATA_END 3,
        SENT_STALL 2,
        IPKT_RDY 1,
        OPKT_RDY 0
    ],
    pub InCsr1 [
        CLR_DATA_TOGGLE 6,
        SENT_STALL 5,
        SEND_STALL 4,
        FIFO_FLUSH 3,
        UNDER_RUN 2,
        PKT_RDY 0
    ],
    pub InCsr2 [
        AUTO_SET 7,
        ISO 6,
        MODE_IN 5,
        DMA_INT_EN 4
    ],
    pub OutCsr1 [
        CLR_DATA_TOGGLE 7,
        SENT_STALL 6,
        SEND_STALL 5,
        FIFO_FLUSH 4,
        DATA_ERROR 3,
        OVER_RUN 2,
        FIFO_FULL 1,
        PKT_RDY 0
    ],
    pub OutCsr2 [
        AUTO_CLR 7,
        ISO 6,
        DMA_INT_EN 5
    ]
];

pub const UDC_BASE: StaticRef<UdcRegisters> =
    unsafe { StaticRef::new(0x5200_0140 as *const UdcRegisters) };

impl UdcBus for StaticRef<UdcRegisters> {
    fn read(&self, reg: Reg) -> u8 {
        match reg {
            Reg::FuncAddr => self.func_addr.get(),
            Reg::Power => self.power.get(),
            Reg::EpIntPending => self.ep_int.get(),
            Reg::UsbIntPending => self.usb_int.get(),
            Reg::EpIntEnable => self.ep_int_en.get(),
            Reg::UsbIntEnable => self.usb_int_en.get(),
            Reg::FrameNum1 => self.frame_num1.get(),
            Reg::FrameNum2 => self.frame_num2.get(),
            Reg::Index => self.index.get(),
            Reg::MaxP => self.maxp.get(),
            Reg::InCsr1 => self.in_csr1.get(),
            Reg::InCsr2 => self.in_csr2.get(),
            Reg::OutCsr1 => self.out_csr1.get(),
            Reg::OutCsr2 => self.out_csr2.get(),
            Reg::OutFifoCnt1 => self.out_fifo_cnt1.get(),
            Reg::OutFifoCnt2 => self.out_fifo_cnt2.get(),
            Reg::Fifo(n) => self.fifo[n].data.get(),
        }
    }

    fn write(&self, reg: Reg, value: u8) {
        match reg {
            Reg::FuncAddr => self.func_addr.set(value),
            Reg::Power => self.power.set(value),
            Reg::EpIntPending => self.ep_int.set(value),
            Reg::UsbIntPending => self.usb_int.set(value),
            Reg::EpIntEnable => self.ep_int_en.set(value),
            Reg::UsbIntEnable => self.usb_int_en.set(value),
            Reg::Index => self.index.set(value),
            Reg::MaxP => self.maxp.set(value),
            Reg::InCsr1 => self.in_csr1.set(value),
            Reg::InCsr2 => self.in_csr2.set(value),
            Reg::OutCsr1 => self.out_csr1.set(value),
            Reg::OutCsr2 => self.out_csr2.set(value),
            // Frame counters and FIFO occupancy ignore writes, as in
            // hardware.
            Reg::FrameNum1 | Reg::FrameNum2 | Reg::OutFifoCnt1 | Reg::OutFifoCnt2 => {}
            Reg::Fifo(n) => self.fifo[n].data.set(value),
        }
    }
}
