//! Byte-wide access to the controller register file.
//!
//! The engine never touches registers directly: everything goes through
//! [`UdcBus`], so the production MMIO block and the scripted model used by
//! the tests are interchangeable. Registers that sit behind the hardware's
//! INDEX selector are reached with `indexed_read`/`indexed_write`, which
//! take the endpoint number explicitly and perform the INDEX write
//! themselves.

use tock_registers::fields::FieldValue;
use tock_registers::{LocalRegisterCopy, RegisterLongName};

/// The controller's registers, including the per-endpoint FIFO windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg {
    FuncAddr,
    Power,
    EpIntPending,
    UsbIntPending,
    EpIntEnable,
    UsbIntEnable,
    FrameNum1,
    FrameNum2,
    Index,
    MaxP,
    InCsr1,
    InCsr2,
    OutCsr1,
    OutCsr2,
    OutFifoCnt1,
    OutFifoCnt2,
    /// FIFO data window of endpoint `n`.
    Fifo(usize),
}

/// Byte-wide read/write primitives over the register file.
pub trait UdcBus {
    fn read(&self, reg: Reg) -> u8;
    fn write(&self, reg: Reg, value: u8);

    /// Read an endpoint-indexed register, selecting the endpoint first.
    fn indexed_read(&self, endpoint: usize, reg: Reg) -> u8 {
        self.write(Reg::Index, endpoint as u8);
        self.read(reg)
    }

    /// Write an endpoint-indexed register, selecting the endpoint first.
    fn indexed_write(&self, endpoint: usize, reg: Reg, value: u8) {
        self.write(Reg::Index, endpoint as u8);
        self.write(reg, value);
    }
}

impl<B: UdcBus> UdcBus for &B {
    fn read(&self, reg: Reg) -> u8 {
        (**self).read(reg)
    }

    fn write(&self, reg: Reg, value: u8) {
        (**self).write(reg, value);
    }
}

/// View a raw register byte through its bitfield definition.
pub(crate) fn view<R: RegisterLongName>(value: u8) -> LocalRegisterCopy<u8, R> {
    LocalRegisterCopy::new(value)
}

/// Collapse field values into the raw byte to put on the bus.
pub(crate) fn bits<R: RegisterLongName>(fields: FieldValue<u8, R>) -> u8 {
    fields.into()
}
