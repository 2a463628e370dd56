//! Device model: the per-card/per-logical-device state built up by tag
//! parsing and current-resource readback, grounded on
//! `ISAPNP_LOGICAL_DEVICE`/`ISAPNP_IO`/`ISAPNP_IRQ`/`ISAPNP_DMA` in
//! `isapnp.h`.

use alloc::string::String;
use alloc::vec::Vec;

/// Relative preference among a dependent function's alternatives, lowest
/// value wins ties when the host arbitrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Preferred = 0,
    Acceptable = 1,
    Suboptimal = 2,
}

impl Priority {
    pub fn from_tag_byte(byte: u8) -> Priority {
        match byte {
            0 => Priority::Preferred,
            1 => Priority::Acceptable,
            _ => Priority::Suboptimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoDescriptor {
    pub minimum: u16,
    pub maximum: u16,
    pub alignment: u8,
    pub length: u8,
    /// `Information` bit 0: true selects 16-bit decode, false 10-bit.
    pub decode_16bit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqDescriptor {
    /// Bitmask over IRQ0..15.
    pub mask: u16,
    /// Raw `Information` byte. Bit 2 (0x4) or bit 3 (0x8) set means
    /// level-sensitive/shareable; otherwise edge-triggered/exclusive.
    pub information: u8,
}

impl IrqDescriptor {
    pub fn level_sensitive(&self) -> bool {
        self.information & 0x0c != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaDescriptor {
    /// Bitmask over DMA channel 0..7.
    pub mask: u8,
    /// Raw `Information` byte: bits 0-1 transfer size, bit 2 bus-mastering,
    /// bits 3-4 timing class.
    pub information: u8,
}

/// DMA transfer-size capability, `Information` bits 0-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTransferSize {
    EightBit,
    EightOrSixteenBit,
    SixteenBit,
}

/// DMA timing class, `Information` bits 3-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTiming {
    Compatible,
    TypeA,
    TypeB,
    TypeF,
}

impl DmaDescriptor {
    pub fn bus_master(&self) -> bool {
        self.information & 0x04 != 0
    }

    pub fn transfer_size(&self) -> DmaTransferSize {
        match self.information & 0x03 {
            0 => DmaTransferSize::EightBit,
            1 => DmaTransferSize::EightOrSixteenBit,
            _ => DmaTransferSize::SixteenBit,
        }
    }

    pub fn timing(&self) -> DmaTiming {
        match (self.information >> 3) & 0x03 {
            0 => DmaTiming::Compatible,
            1 => DmaTiming::TypeA,
            2 => DmaTiming::TypeB,
            _ => DmaTiming::TypeF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRangeDescriptor {
    pub information: u8,
    pub minimum: u16,
    pub maximum: u16,
    pub alignment: u16,
    /// In 256-byte units; actual byte length is `length << 8`.
    pub length: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRange32Descriptor {
    pub information: u8,
    pub minimum: u32,
    pub maximum: u32,
    pub alignment: u32,
    pub length: u32,
}

/// One alternative within a dependent-function (`STARTDEP`/`ENDDEP`)
/// bracket. Each resource kind appears at most once per alternative; a
/// `None` means the kind has no alternative descriptor in this set.
#[derive(Debug, Clone, Default)]
pub struct DependentSet {
    pub priority: Priority,
    pub io: Option<IoDescriptor>,
    pub irq: Option<IrqDescriptor>,
    pub dma: Option<DmaDescriptor>,
    pub mem: Option<MemRangeDescriptor>,
    pub mem32: Option<MemRange32Descriptor>,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Acceptable
    }
}

/// Resources a device is currently configured with, read back from its
/// active configuration registers.
#[derive(Debug, Clone, Default)]
pub struct CurrentResources {
    pub io: Vec<u16>,
    pub irq: Vec<(u8, u8)>,
    pub dma: Vec<u8>,
    pub mem: Vec<(u32, u32)>,
    pub mem32: Vec<(u32, u32)>,
    pub activated: bool,
}

/// A single logical function of a card, identified by its Logical Device
/// Number (LDN) within the card's Card Select Number (CSN).
#[derive(Debug, Clone)]
pub struct LogicalDevice {
    pub csn: u8,
    pub ldn: u8,
    pub card_vendor: [u8; 3],
    pub card_prod_id: u16,
    pub serial_number: u32,
    pub log_vendor_id: u16,
    pub log_prod_id: u16,
    /// Raw flags byte from the `LOGDEVID` tag's fifth payload byte, present
    /// when the tag carries 6 payload bytes; `0` for the 5-byte form that
    /// omits it.
    pub log_dev_flags: u8,
    pub compatible_ids: Vec<(u16, u16)>,
    pub io: [Option<IoDescriptor>; 8],
    pub irq: [Option<IrqDescriptor>; 2],
    pub dma: [Option<DmaDescriptor>; 2],
    pub mem: [Option<MemRangeDescriptor>; 4],
    pub mem32: [Option<MemRange32Descriptor>; 4],
    pub dependent_sets: Vec<DependentSet>,
    pub friendly_name: Option<String>,
    pub current: CurrentResources,
    pub present: bool,
}

impl LogicalDevice {
    pub fn new(csn: u8, ldn: u8, card_vendor: [u8; 3], card_prod_id: u16, serial_number: u32) -> Self {
        LogicalDevice {
            csn,
            ldn,
            card_vendor,
            card_prod_id,
            serial_number,
            log_vendor_id: 0,
            log_prod_id: 0,
            log_dev_flags: 0,
            compatible_ids: Vec::new(),
            io: [None; 8],
            irq: [None; 2],
            dma: [None; 2],
            mem: [None; 4],
            mem32: [None; 4],
            dependent_sets: Vec::new(),
            friendly_name: None,
            current: CurrentResources::default(),
            present: false,
        }
    }

    pub fn log_vendor_letters(&self) -> [u8; 3] {
        crate::ids::expand_vendor_id(self.log_vendor_id)
    }
}
