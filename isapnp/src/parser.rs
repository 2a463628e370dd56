//! Decodes a card's resource-data tag stream into one [`LogicalDevice`] per
//! `LOGDEVID` tag. Grounded on the `ParseTags` state machine in
//! `hardware.c`; re-shaped into a single forward pass building a `Vec`
//! rather than the original's memory-constrained re-entrant scan, since the
//! constraint that shaped the original (parsing into a fixed caller-owned
//! struct one logical device at a time) does not apply here.

use alloc::vec::Vec;

use crate::error::{IsaPnpError, Result};
use crate::model::{DependentSet, IoDescriptor, IrqDescriptor, DmaDescriptor, LogicalDevice, MemRangeDescriptor, MemRange32Descriptor, Priority};
use crate::tag::{RawTag, TagKind, TagReader};

const MAX_ALTERNATIVES: usize = 8;

#[derive(PartialEq, Eq)]
enum DependentState {
    NotStarted,
    Started,
}

/// Next free index into each fixed resource array. Ordinary fixed
/// descriptors fill slots in order; `ENDDEP` additionally advances the
/// cursor of any kind the just-closed alternative set populated, so a fixed
/// descriptor appearing after a dependent-function block doesn't land in a
/// slot an alternative logically already claimed.
#[derive(Default)]
struct FixedSlotCursors {
    io: usize,
    irq: usize,
    dma: usize,
    mem: usize,
    mem32: usize,
}

/// Parse every `LOGDEVID` tag's worth of resource data out of `buffer`,
/// producing one [`LogicalDevice`] per logical device the card advertises.
pub fn parse_card(
    buffer: &[u8],
    csn: u8,
    card_vendor: [u8; 3],
    card_prod_id: u16,
    serial_number: u32,
) -> Result<Vec<LogicalDevice>> {
    let mut reader = TagReader::new(buffer);
    let mut devices = Vec::new();
    let mut dep_state = DependentState::NotStarted;
    let mut cursors = FixedSlotCursors::default();

    loop {
        let tag = match reader.next_tag() {
            Ok(Some(tag)) => tag,
            Ok(None) => break,
            Err(err) => {
                log::warn!("isapnp: tag parse failed for csn {}: {}", csn, err);
                return Err(err);
            }
        };
        match tag.kind {
            TagKind::LogicalDeviceId => {
                let ldn = devices.len() as u8;
                let mut device = LogicalDevice::new(csn, ldn, card_vendor, card_prod_id, serial_number);
                apply_log_dev_id(&mut device, &tag)?;
                devices.push(device);
                dep_state = DependentState::NotStarted;
                cursors = FixedSlotCursors::default();
            }
            other => {
                let device = devices.last_mut().ok_or(IsaPnpError::InvalidTag)?;
                apply_tag(device, other, &tag, &mut dep_state, &mut cursors)?;
            }
        }
    }

    Ok(devices)
}

fn apply_log_dev_id(device: &mut LogicalDevice, tag: &RawTag) -> Result<()> {
    if tag.payload.len() != 5 && tag.payload.len() != 6 {
        return Err(IsaPnpError::InvalidTag);
    }
    device.log_vendor_id = u16::from_be_bytes([tag.payload[0], tag.payload[1]]);
    device.log_prod_id = u16::from_be_bytes([tag.payload[2], tag.payload[3]]);
    device.log_dev_flags = if tag.payload.len() == 6 { tag.payload[4] } else { 0 };
    Ok(())
}

fn active_set<'a>(device: &'a mut LogicalDevice, dep_state: &DependentState) -> Option<&'a mut DependentSet> {
    if *dep_state == DependentState::Started {
        device.dependent_sets.last_mut()
    } else {
        None
    }
}

fn apply_tag(
    device: &mut LogicalDevice,
    kind: TagKind,
    tag: &RawTag,
    dep_state: &mut DependentState,
    cursors: &mut FixedSlotCursors,
) -> Result<()> {
    match kind {
        TagKind::CompatibleDeviceId => {
            if tag.payload.len() != 4 {
                return Err(IsaPnpError::InvalidTag);
            }
            let vendor = u16::from_be_bytes([tag.payload[0], tag.payload[1]]);
            let prod_id = u16::from_be_bytes([tag.payload[2], tag.payload[3]]);
            device.compatible_ids.push((vendor, prod_id));
        }
        TagKind::Irq => {
            if tag.payload.len() != 2 && tag.payload.len() != 3 {
                return Err(IsaPnpError::InvalidTag);
            }
            let mask = u16::from_le_bytes([tag.payload[0], tag.payload[1]]);
            let information = if tag.payload.len() == 3 { tag.payload[2] } else { 0x01 };
            let descriptor = IrqDescriptor { mask, information };
            if let Some(set) = active_set(device, dep_state) {
                set.irq = Some(descriptor);
            } else {
                let slot = device.irq.get_mut(cursors.irq).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.irq += 1;
            }
        }
        TagKind::Dma => {
            if tag.payload.len() != 2 {
                return Err(IsaPnpError::InvalidTag);
            }
            let descriptor = DmaDescriptor { mask: tag.payload[0], information: tag.payload[1] };
            if let Some(set) = active_set(device, dep_state) {
                set.dma = Some(descriptor);
            } else {
                let slot = device.dma.get_mut(cursors.dma).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.dma += 1;
            }
        }
        TagKind::StartDependentFunction => {
            if device.dependent_sets.len() >= MAX_ALTERNATIVES {
                return Err(IsaPnpError::OutOfMemory);
            }
            let priority = if tag.payload.is_empty() {
                Priority::Acceptable
            } else {
                Priority::from_tag_byte(tag.payload[0])
            };
            device.dependent_sets.push(DependentSet {
                priority,
                ..Default::default()
            });
            *dep_state = DependentState::Started;
        }
        TagKind::EndDependentFunction => {
            if let Some(set) = device.dependent_sets.last() {
                if set.io.is_some() {
                    cursors.io += 1;
                }
                if set.irq.is_some() {
                    cursors.irq += 1;
                }
                if set.dma.is_some() {
                    cursors.dma += 1;
                }
                if set.mem.is_some() {
                    cursors.mem += 1;
                }
                if set.mem32.is_some() {
                    cursors.mem32 += 1;
                }
            }
            *dep_state = DependentState::NotStarted;
        }
        TagKind::IoPort => {
            if tag.payload.len() != 7 {
                return Err(IsaPnpError::InvalidTag);
            }
            let descriptor = IoDescriptor {
                decode_16bit: tag.payload[0] & 0x1 != 0,
                minimum: u16::from_le_bytes([tag.payload[1], tag.payload[2]]),
                maximum: u16::from_le_bytes([tag.payload[3], tag.payload[4]]),
                alignment: tag.payload[5],
                length: tag.payload[6],
            };
            if let Some(set) = active_set(device, dep_state) {
                set.io = Some(descriptor);
            } else {
                let slot = device.io.get_mut(cursors.io).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.io += 1;
            }
        }
        TagKind::FixedIoPort => {
            if tag.payload.len() != 3 {
                return Err(IsaPnpError::InvalidTag);
            }
            let base = u16::from_le_bytes([tag.payload[0], tag.payload[1]]);
            let length = tag.payload[2];
            let descriptor = IoDescriptor {
                decode_16bit: true,
                minimum: base,
                maximum: base,
                alignment: 1,
                length,
            };
            if let Some(set) = active_set(device, dep_state) {
                set.io = Some(descriptor);
            } else {
                let slot = device.io.get_mut(cursors.io).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.io += 1;
            }
        }
        TagKind::MemoryRange => {
            if tag.payload.len() != 9 {
                return Err(IsaPnpError::InvalidTag);
            }
            let length = u16::from_le_bytes([tag.payload[7], tag.payload[8]]);
            let descriptor = MemRangeDescriptor {
                information: tag.payload[0],
                minimum: u16::from_le_bytes([tag.payload[1], tag.payload[2]]),
                maximum: u16::from_le_bytes([tag.payload[3], tag.payload[4]]),
                alignment: u16::from_le_bytes([tag.payload[5], tag.payload[6]]),
                length,
            };
            if let Some(set) = active_set(device, dep_state) {
                set.mem = Some(descriptor);
            } else {
                let slot = device.mem.get_mut(cursors.mem).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.mem += 1;
            }
        }
        TagKind::Memory32Range => {
            if tag.payload.len() != 17 {
                return Err(IsaPnpError::InvalidTag);
            }
            let descriptor = MemRange32Descriptor {
                information: tag.payload[0],
                minimum: u32::from_le_bytes([tag.payload[1], tag.payload[2], tag.payload[3], tag.payload[4]]),
                maximum: u32::from_le_bytes([tag.payload[5], tag.payload[6], tag.payload[7], tag.payload[8]]),
                alignment: u32::from_le_bytes([tag.payload[9], tag.payload[10], tag.payload[11], tag.payload[12]]),
                length: u32::from_le_bytes([tag.payload[13], tag.payload[14], tag.payload[15], tag.payload[16]]),
            };
            if let Some(set) = active_set(device, dep_state) {
                set.mem32 = Some(descriptor);
            } else {
                let slot = device.mem32.get_mut(cursors.mem32).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.mem32 += 1;
            }
        }
        TagKind::FixedMemory32Range => {
            if tag.payload.len() != 9 {
                return Err(IsaPnpError::InvalidTag);
            }
            let base = u32::from_le_bytes([tag.payload[0], tag.payload[1], tag.payload[2], tag.payload[3]]);
            let length = u32::from_le_bytes([tag.payload[4], tag.payload[5], tag.payload[6], tag.payload[7]]);
            let descriptor = MemRange32Descriptor {
                information: tag.payload[8],
                minimum: base,
                maximum: base,
                alignment: 1,
                length,
            };
            if let Some(set) = active_set(device, dep_state) {
                set.mem32 = Some(descriptor);
            } else {
                let slot = device.mem32.get_mut(cursors.mem32).ok_or(IsaPnpError::OutOfMemory)?;
                *slot = Some(descriptor);
                cursors.mem32 += 1;
            }
        }
        TagKind::AnsiIdentifierString => {
            if device.friendly_name.is_none() {
                let mut name = alloc::string::String::from_utf8_lossy(tag.payload).into_owned();
                while name.ends_with(' ') {
                    name.pop();
                }
                device.friendly_name = Some(name);
            }
        }
        TagKind::UnicodeIdentifierString | TagKind::VendorDefined | TagKind::VendorDefinedLarge => {
            // No portable representation; skipped the way the original
            // driver leaves UNICODESTR unimplemented.
        }
        TagKind::LogicalDeviceId | TagKind::End => unreachable!("handled by caller"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tag(name: u8, payload: &[u8]) -> alloc::vec::Vec<u8> {
        let mut out = alloc::vec![(name << 3) | (payload.len() as u8)];
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_single_device_with_io_and_irq() {
        let mut buffer = Vec::new();
        buffer.extend(small_tag(0x1, &[0x41, 0x00, 0x01, 0x02, 0x00]));
        buffer.extend(small_tag(0x7, &[0x01, 0x00, 0x02, 0x00, 0x03, 0x08, 0x08]));
        buffer.extend(small_tag(0x3, &[0x00, 0x08]));
        buffer.extend(small_tag(0xf, &[]));

        let devices = parse_card(&buffer, 1, [b'P', b'N', b'P'], 0x0a03, 0x1234_5678).unwrap();
        assert_eq!(devices.len(), 1);
        let device = &devices[0];
        assert!(device.io[0].is_some());
        assert!(device.irq[0].is_some());
    }

    #[test]
    fn enddep_advances_the_fixed_slot_past_the_kind_the_alternative_used() {
        let mut buffer = Vec::new();
        buffer.extend(small_tag(0x1, &[0x41, 0x00, 0x01, 0x02, 0x00]));
        buffer.extend(small_tag(0x5, &[0x00]));
        buffer.extend(small_tag(0x3, &[0xa0, 0x00]));
        buffer.extend(small_tag(0x6, &[]));
        buffer.extend(small_tag(0x3, &[0x08, 0x00]));
        buffer.extend(small_tag(0xf, &[]));

        let devices = parse_card(&buffer, 1, [b'P', b'N', b'P'], 0x0a03, 1).unwrap();
        let device = &devices[0];
        assert!(device.irq[0].is_none(), "slot 0 stays reserved for the dependent-function's alternative");
        assert_eq!(device.irq[1].as_ref().map(|d| d.mask), Some(0x0008));
    }

    #[test]
    fn dependent_sets_keep_alternatives_separate_from_fixed() {
        let mut buffer = Vec::new();
        buffer.extend(small_tag(0x1, &[0x41, 0x00, 0x01, 0x02, 0x00]));
        buffer.extend(small_tag(0x5, &[0x00]));
        buffer.extend(small_tag(0x3, &[0x00, 0x08]));
        buffer.extend(small_tag(0x6, &[]));
        buffer.extend(small_tag(0xf, &[]));

        let devices = parse_card(&buffer, 1, [b'P', b'N', b'P'], 0x0a03, 1).unwrap();
        let device = &devices[0];
        assert!(device.irq[0].is_none());
        assert_eq!(device.dependent_sets.len(), 1);
        assert!(device.dependent_sets[0].irq.is_some());
    }
}
