//! Current-resource readback: what a logical device is actually configured
//! with right now, as opposed to what it's permitted to be configured with.
//! Grounded on `ReadCurrentResources` in `hardware.c`.

use crate::isolation;
use crate::model::{CurrentResources, LogicalDevice};
use crate::ports::{reg, Activate, MemoryControl, DMA_NO_CHANNEL, IsaBus};

fn read_byte(bus: &mut dyn IsaBus, address: u8) -> u8 {
    bus.write_address(address);
    bus.read_data()
}

fn read_word(bus: &mut dyn IsaBus, address: u8) -> u16 {
    let hi = read_byte(bus, address) as u16;
    let lo = read_byte(bus, address + 1) as u16;
    (hi << 8) | lo
}

fn read_dword(bus: &mut dyn IsaBus, address: u8) -> u32 {
    let mut value = 0u32;
    for i in 0..4 {
        value = (value << 8) | read_byte(bus, address + i) as u32;
    }
    value
}

/// Populate `device.current` by reading its active configuration registers.
/// Leaves `current` empty (and `activated = false`) if the device's
/// `ACTIVATE` bit is clear.
pub fn read_current_resources(bus: &mut dyn IsaBus, device: &mut LogicalDevice, csn: u8) {
    isolation::wake_and_select(bus, csn, device.ldn);

    let activate = Activate::from_bits_truncate(read_byte(bus, reg::ACTIVATE));
    if !activate.contains(Activate::ENABLED) {
        device.current = CurrentResources::default();
        return;
    }

    let mut current = CurrentResources::default();

    for slot in 0..8 {
        let base = read_word(bus, reg::io_base(slot));
        if base == 0 {
            break;
        }
        current.io.push(base);
    }

    for slot in 0..2 {
        let no = read_byte(bus, reg::irq_no(slot));
        if no == 0 {
            break;
        }
        let ty = read_byte(bus, reg::irq_type(slot));
        current.irq.push((no, ty));
    }

    for slot in 0..2 {
        let channel = read_byte(bus, reg::dma_channel(slot));
        if channel == DMA_NO_CHANNEL {
            break;
        }
        current.dma.push(channel);
    }

    let mem_upper_limit =
        MemoryControl::from_bits_truncate(read_byte(bus, reg::MEMORY_CONTROL)).contains(MemoryControl::UPPER_LIMIT);
    for slot in 0..4 {
        let base = (read_word(bus, reg::mem_base(slot)) as u32) << 8;
        if base == 0 {
            break;
        }
        let limit = (read_word(bus, reg::mem_limit(slot)) as u32) << 8;
        let length = if mem_upper_limit {
            limit.saturating_sub(base)
        } else {
            (!limit.wrapping_add(1)) & 0x00ff_ffff
        };
        current.mem.push((base, length));
    }

    let mem32_upper_limit =
        MemoryControl::from_bits_truncate(read_byte(bus, reg::MEMORY_CONTROL_32)).contains(MemoryControl::UPPER_LIMIT);
    for slot in 0..4 {
        let base = read_dword(bus, reg::mem_base_32(slot));
        if base == 0 {
            break;
        }
        let limit = read_dword(bus, reg::mem_limit_32(slot));
        let length = if mem32_upper_limit {
            limit.saturating_sub(base)
        } else {
            // Full 32-bit mask here, unlike the 24-bit range above --
            // the original source reuses the 24-bit mask for this case too,
            // which truncates any range above 16MiB; treated as a bug.
            !limit.wrapping_add(1)
        };
        current.mem32.push((base, length));
    }

    current.activated = true;
    device.current = current;
}
