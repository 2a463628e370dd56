//! ISA PnP port-IO primitives and register offsets.
//!
//! The isolation protocol runs over three well-known ports (`ADDRESS`,
//! `WRITE_DATA`, and a probed `READ_DATA` port) plus a byte-wide register
//! window addressed indirectly through `ADDRESS`/`WRITE_DATA`. This module
//! carries the register map and the [`IsaBus`] abstraction the rest of the
//! crate is written against, the way `ata.rs`'s `Bus` wraps a fixed set of
//! `Port`s for its host kernel.

use bitflags::bitflags;
use x86_64::instructions::port::{Port, PortWriteOnly};

bitflags! {
    /// Bits of the `ACTIVATE` register (`reg::ACTIVATE`).
    pub struct Activate: u8 {
        const ENABLED = 0x01;
    }
}

bitflags! {
    /// Bits of the `IO_RANGE_CHECK` register (`reg::IO_RANGE_CHECK`).
    pub struct IoRangeCheck: u8 {
        const RANGE_CHECK_ACTIVE = 0x04;
    }
}

bitflags! {
    /// Bits of the 24-/32-bit memory control registers
    /// (`reg::MEMORY_CONTROL`, `reg::MEMORY_CONTROL_32`).
    pub struct MemoryControl: u8 {
        const UPPER_LIMIT = 0x01;
    }
}

/// Card-select-number host key address port (write-only).
pub const ADDRESS_PORT: u16 = 0x279;
/// Write-data port; also used during the isolation key sequence.
pub const WRITE_DATA_PORT: u16 = 0xA79;

/// The six ports a Read Data Port device may legally occupy, in probe order.
/// Matches `Ports[]` in the original driver's Read Port requirements builder,
/// excluding the two fixed ports (`ADDRESS`/`WRITE_DATA`) which are never
/// themselves candidates for the *read* port.
pub const READ_PORT_CANDIDATES: [u16; 6] = [0x274, 0x3E4, 0x204, 0x2E4, 0x354, 0x2F4];

/// Register indices written to `ADDRESS` to select a byte in the logical
/// device's configuration space.
pub mod reg {
    pub const SET_RD_DATA_PORT: u8 = 0x00;
    pub const CONFIG_CONTROL: u8 = 0x02;
    pub const WAKE: u8 = 0x03;
    pub const RESOURCE_DATA: u8 = 0x04;
    pub const STATUS: u8 = 0x05;
    pub const CARD_SELECT_NUMBER: u8 = 0x06;
    pub const LOGICAL_DEVICE_NUMBER: u8 = 0x07;
    pub const ACTIVATE: u8 = 0x30;
    pub const IO_RANGE_CHECK: u8 = 0x31;
    pub const MEMORY_CONTROL: u8 = 0x47;
    pub const MEMORY_CONTROL_32: u8 = 0x85;

    /// I/O base register for slot `index` (0..8).
    pub fn io_base(index: usize) -> u8 {
        (0x60 + 2 * index) as u8
    }

    /// IRQ select/type register pair for slot `index` (0..2).
    pub fn irq_no(index: usize) -> u8 {
        (0x70 + 2 * index) as u8
    }

    pub fn irq_type(index: usize) -> u8 {
        irq_no(index) + 1
    }

    /// DMA channel register for slot `index` (0..2).
    pub fn dma_channel(index: usize) -> u8 {
        (0x74 + index) as u8
    }

    /// 24-bit memory range base/limit registers for slot `index` (0..4).
    /// Slot 0 lands at `0x40`/`0x43`, which is the same address the regular
    /// `0x40 + 8*index` stride produces for `index == 0` -- there is no
    /// separate "gap" formula, just a stride that happens to start at the
    /// control-register-adjacent offset.
    pub fn mem_base(index: usize) -> u8 {
        (0x40 + 8 * index) as u8
    }

    pub fn mem_limit(index: usize) -> u8 {
        (0x43 + 8 * index) as u8
    }

    /// 32-bit memory range base/limit registers for slot `index` (0..4).
    pub fn mem_base_32(index: usize) -> u8 {
        (0x76 + 16 * index) as u8
    }

    pub fn mem_limit_32(index: usize) -> u8 {
        (0x7b + 16 * index) as u8
    }
}

/// DMA channel value meaning "no channel assigned". Channel 4 is the
/// cascade channel and is never assignable to a card.
pub const DMA_NO_CHANNEL: u8 = 4;

/// Abstracts the three physical ports the isolation/config protocol needs,
/// so the protocol state machine can run against real hardware or a
/// scripted mock in tests.
pub trait IsaBus {
    /// Select register `reg` for the next data read/write.
    fn write_address(&mut self, reg: u8);
    /// Write a byte to the currently addressed register.
    fn write_data(&mut self, value: u8);
    /// Read the next byte from the Read Data Port.
    fn read_data(&mut self) -> u8;
    /// Busy-wait for at least `nanoseconds`, used between protocol steps.
    fn stall(&mut self, nanoseconds: u64);
    /// Reprogram the Read Data Port used by `read_data`.
    fn set_read_data_port(&mut self, port: u16);
}

/// Real hardware implementation, one per ISA PnP bus instance.
pub struct HardwareBus {
    address: PortWriteOnly<u8>,
    write_data: PortWriteOnly<u8>,
    read_data: Port<u8>,
}

impl HardwareBus {
    /// # Safety
    /// The caller must guarantee exclusive ownership of the fixed ISA PnP
    /// ports (`0x279`, `0xA79`) for the lifetime of this bus.
    pub unsafe fn new() -> Self {
        HardwareBus {
            address: PortWriteOnly::new(ADDRESS_PORT),
            write_data: PortWriteOnly::new(WRITE_DATA_PORT),
            read_data: Port::new(READ_PORT_CANDIDATES[0]),
        }
    }
}

impl IsaBus for HardwareBus {
    fn write_address(&mut self, reg: u8) {
        unsafe { self.address.write(reg) }
    }

    fn write_data(&mut self, value: u8) {
        unsafe { self.write_data.write(value) }
    }

    fn read_data(&mut self) -> u8 {
        unsafe { self.read_data.read() }
    }

    fn stall(&mut self, nanoseconds: u64) {
        crate::time::nanowait(nanoseconds);
    }

    fn set_read_data_port(&mut self, port: u16) {
        self.read_data = Port::new(port);
    }
}
