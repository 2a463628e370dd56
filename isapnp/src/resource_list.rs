//! Reports a device's *current* resource assignment in the same descriptor
//! shape requirements use, and applies a host-arbitrated assignment back
//! onto the card's configuration registers. Grounded on
//! `IsaFdoCreateResources` (report direction) and the register writers in
//! `hardware.c` (apply direction).

use alloc::vec::Vec;

use crate::isolation;
use crate::model::{DmaTiming, DmaTransferSize, LogicalDevice};
use crate::ports::{reg, IsaBus};
use crate::requirements::{RequirementDescriptor, ResourceOption, ANY_PROCESSOR_AFFINITY};

/// Current resources, reported in the same descriptor shape as
/// requirements so the host can diff an assignment against what is active.
pub fn current_resource_list(device: &LogicalDevice) -> Vec<RequirementDescriptor> {
    if !device.current.activated {
        return Vec::new();
    }

    let mut out = Vec::new();
    for &base in &device.current.io {
        let matching = device.io.iter().flatten().find(|d| d.minimum == base);
        let length = matching.map(|d| d.length as u16).unwrap_or(1);
        let decode_16bit = matching.map(|d| d.decode_16bit).unwrap_or(true);
        out.push(RequirementDescriptor::Io {
            option: ResourceOption::Required,
            minimum: base,
            maximum: base + length - 1,
            alignment: 1,
            length: length as u8,
            decode_16bit,
        });
    }
    for &(no, ty) in &device.current.irq {
        out.push(RequirementDescriptor::Irq {
            option: ResourceOption::Required,
            vector: no,
            level_sensitive: ty & 0x01 != 0,
            shared: ty & 0x01 != 0,
            affinity: ANY_PROCESSOR_AFFINITY,
        });
    }
    for &channel in &device.current.dma {
        // The current-resources registers don't carry a DMA information
        // byte; report the conservative 8-bit, non-bus-mastering,
        // compatible-timing defaults the way ResourceBuilder does.
        out.push(RequirementDescriptor::Dma {
            option: ResourceOption::Required,
            channel,
            bus_master: false,
            transfer_size: DmaTransferSize::EightBit,
            timing: DmaTiming::Compatible,
        });
    }
    for &(base, length) in &device.current.mem {
        out.push(RequirementDescriptor::MemRange {
            option: ResourceOption::Required,
            minimum: base,
            maximum: base + length - 1,
            alignment: 1,
            length,
        });
    }
    for &(base, length) in &device.current.mem32 {
        out.push(RequirementDescriptor::MemRange32 {
            option: ResourceOption::Required,
            minimum: base,
            maximum: base + length - 1,
            alignment: 1,
            length,
        });
    }
    out
}

fn write_byte(bus: &mut dyn IsaBus, address: u8, value: u8) {
    bus.write_address(address);
    bus.write_data(value);
}

fn write_word(bus: &mut dyn IsaBus, address: u8, value: u16) {
    write_byte(bus, address, (value >> 8) as u8);
    write_byte(bus, address + 1, value as u8);
}

/// Write a host-arbitrated resource assignment into a device's
/// configuration registers and activate it. `assignment` must contain at
/// most one descriptor per physical slot (8 I/O, 2 IRQ, 2 DMA, 4+4 memory);
/// excess entries are a caller bug, not a protocol condition, so they are
/// simply not written.
pub fn apply_assignment(bus: &mut dyn IsaBus, csn: u8, ldn: u8, assignment: &[RequirementDescriptor]) {
    isolation::wake_and_select(bus, csn, ldn);

    let mut io_slot = 0usize;
    let mut irq_slot = 0usize;
    let mut dma_slot = 0usize;
    let mut mem_slot = 0usize;
    let mut mem32_slot = 0usize;

    for descriptor in assignment {
        match *descriptor {
            RequirementDescriptor::Io { minimum, .. } if io_slot < 8 => {
                write_word(bus, reg::io_base(io_slot), minimum);
                io_slot += 1;
            }
            RequirementDescriptor::Irq { vector, level_sensitive, .. } if irq_slot < 2 => {
                write_byte(bus, reg::irq_no(irq_slot), vector);
                write_byte(bus, reg::irq_type(irq_slot), if level_sensitive { 0x01 } else { 0x00 });
                irq_slot += 1;
            }
            RequirementDescriptor::Dma { channel, .. } if dma_slot < 2 => {
                write_byte(bus, reg::dma_channel(dma_slot), channel);
                dma_slot += 1;
            }
            RequirementDescriptor::MemRange { minimum, length, .. } if mem_slot < 4 => {
                write_word(bus, reg::mem_base(mem_slot), (minimum >> 8) as u16);
                write_word(bus, reg::mem_limit(mem_slot), ((minimum + length) >> 8) as u16);
                mem_slot += 1;
            }
            RequirementDescriptor::MemRange32 { minimum, length, .. } if mem32_slot < 4 => {
                write_byte(bus, reg::mem_base_32(mem32_slot), (minimum >> 24) as u8);
                write_byte(bus, reg::mem_base_32(mem32_slot) + 1, (minimum >> 16) as u8);
                write_byte(bus, reg::mem_base_32(mem32_slot) + 2, (minimum >> 8) as u8);
                write_byte(bus, reg::mem_base_32(mem32_slot) + 3, minimum as u8);
                let limit = minimum + length;
                write_byte(bus, reg::mem_limit_32(mem32_slot), (limit >> 24) as u8);
                write_byte(bus, reg::mem_limit_32(mem32_slot) + 1, (limit >> 16) as u8);
                write_byte(bus, reg::mem_limit_32(mem32_slot) + 2, (limit >> 8) as u8);
                write_byte(bus, reg::mem_limit_32(mem32_slot) + 3, limit as u8);
                mem32_slot += 1;
            }
            _ => {}
        }
    }

    isolation::set_device_activation(bus, csn, ldn, true);
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Records every `(address, value)` pair written through `write_data`,
    /// ignoring the isolation/wake chatter `wake_and_select` and
    /// `set_device_activation` also emit.
    struct RecordingBus {
        last_address: u8,
        writes: Vec<(u8, u8)>,
    }

    impl IsaBus for RecordingBus {
        fn write_address(&mut self, reg: u8) {
            self.last_address = reg;
        }

        fn write_data(&mut self, value: u8) {
            self.writes.push((self.last_address, value));
        }

        fn read_data(&mut self) -> u8 {
            0xff
        }

        fn stall(&mut self, _nanoseconds: u64) {}

        fn set_read_data_port(&mut self, _port: u16) {}
    }

    #[test]
    fn apply_assignment_writes_io_and_irq_registers() {
        let mut bus = RecordingBus { last_address: 0, writes: Vec::new() };
        let assignment = [
            RequirementDescriptor::Io { option: ResourceOption::Required, minimum: 0x0300, maximum: 0x0307, alignment: 1, length: 8, decode_16bit: true },
            RequirementDescriptor::Irq {
                option: ResourceOption::Required,
                vector: 5,
                level_sensitive: false,
                shared: false,
                affinity: ANY_PROCESSOR_AFFINITY,
            },
        ];

        apply_assignment(&mut bus, 1, 0, &assignment);

        assert!(bus.writes.contains(&(reg::io_base(0), 0x03)));
        assert!(bus.writes.contains(&(reg::io_base(0) + 1, 0x00)));
        assert!(bus.writes.contains(&(reg::irq_no(0), 5)));
        assert!(bus.writes.contains(&(reg::ACTIVATE, 0x01)));
    }
}
