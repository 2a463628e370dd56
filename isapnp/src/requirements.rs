//! Builds the host-facing resource *requirements* lists (what a device may
//! be configured with) from a [`LogicalDevice`]'s fixed descriptors and
//! dependent-function alternatives. Grounded on `IsaFdoCreateRequirements`
//! in `isapnp.c`.
//!
//! The core never arbitrates; it only publishes these lists -- resource
//! arbitration is host-owned. The host picks one
//! `AlternativeList` and hands back a concrete assignment, which the core
//! then writes into the device's configuration registers.

use alloc::vec::Vec;

use crate::model::{DependentSet, DmaDescriptor, DmaTiming, DmaTransferSize, IoDescriptor, IrqDescriptor, LogicalDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOption {
    Required,
    Alternative,
}

/// Interrupt affinity mask meaning "any processor" -- all bits set, mirroring
/// `IsaFdoCreateResources` setting `Affinity = -1` on every reported IRQ.
pub const ANY_PROCESSOR_AFFINITY: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
pub enum RequirementDescriptor {
    Io { option: ResourceOption, minimum: u16, maximum: u16, alignment: u8, length: u8, decode_16bit: bool },
    Irq { option: ResourceOption, vector: u8, level_sensitive: bool, shared: bool, affinity: u32 },
    Dma { option: ResourceOption, channel: u8, bus_master: bool, transfer_size: DmaTransferSize, timing: DmaTiming },
    MemRange { option: ResourceOption, minimum: u32, maximum: u32, alignment: u32, length: u32 },
    MemRange32 { option: ResourceOption, minimum: u32, maximum: u32, alignment: u32, length: u32 },
}

/// One candidate configuration: the full set of descriptors the host may
/// assign together. `AlternativeLists[0]` is always the all-fixed-resources
/// baseline; subsequent lists substitute in one dependent-function
/// alternative each, ordered by [`Priority`](crate::model::Priority).
#[derive(Debug, Clone, Default)]
pub struct RequirementsList {
    pub alternative_lists: Vec<Vec<RequirementDescriptor>>,
}

fn convert_io(d: IoDescriptor, option: ResourceOption) -> RequirementDescriptor {
    RequirementDescriptor::Io {
        option,
        minimum: d.minimum,
        maximum: d.minimum + d.length as u16 - 1,
        alignment: d.alignment,
        length: d.length,
        decode_16bit: d.decode_16bit,
    }
}

/// Expand an IRQ mask into one edge-triggered descriptor per set bit (first
/// bit `Required`, the rest `Alternative`), plus -- when the descriptor's
/// information byte advertises level-sensitive capability (bits 2 or 3) --
/// one additional level-sensitive `Alternative` descriptor right after each
/// edge one.
fn push_irq_mask(out: &mut Vec<RequirementDescriptor>, d: IrqDescriptor, mut first: bool) {
    for vector in 0..16u8 {
        if d.mask & (1 << vector) == 0 {
            continue;
        }
        let option = if first { ResourceOption::Required } else { ResourceOption::Alternative };
        out.push(RequirementDescriptor::Irq {
            option,
            vector,
            level_sensitive: false,
            shared: false,
            affinity: ANY_PROCESSOR_AFFINITY,
        });
        if d.level_sensitive() {
            out.push(RequirementDescriptor::Irq {
                option: ResourceOption::Alternative,
                vector,
                level_sensitive: true,
                shared: true,
                affinity: ANY_PROCESSOR_AFFINITY,
            });
        }
        first = false;
    }
}

/// Expand a DMA mask into one descriptor per set bit (first bit `Required`,
/// the rest `Alternative`), carrying the shared information byte's
/// bus-mastering/transfer-size/timing flags on every expanded descriptor.
fn push_dma_mask(out: &mut Vec<RequirementDescriptor>, d: DmaDescriptor, mut first: bool) {
    for channel in 0..8u8 {
        if d.mask & (1 << channel) == 0 {
            continue;
        }
        let option = if first { ResourceOption::Required } else { ResourceOption::Alternative };
        out.push(RequirementDescriptor::Dma {
            option,
            channel,
            bus_master: d.bus_master(),
            transfer_size: d.transfer_size(),
            timing: d.timing(),
        });
        first = false;
    }
}

/// Build the fixed (always-present) descriptors for a device, in
/// Io/Irq/Dma/MemRange/MemRange32 order -- the order the original driver
/// lays out `List[0]` in.
fn fixed_descriptors(device: &LogicalDevice) -> Vec<RequirementDescriptor> {
    let mut out = Vec::new();

    for io in device.io.iter().flatten() {
        out.push(convert_io(*io, ResourceOption::Required));
    }
    for irq in device.irq.iter().flatten() {
        push_irq_mask(&mut out, *irq, true);
    }
    for dma in device.dma.iter().flatten() {
        push_dma_mask(&mut out, *dma, true);
    }
    for mem in device.mem.iter().flatten() {
        let length = (mem.length as u32) << 8;
        out.push(RequirementDescriptor::MemRange {
            option: ResourceOption::Required,
            minimum: (mem.minimum as u32) << 8,
            maximum: ((mem.maximum as u32) << 8) + length - 1,
            alignment: if mem.alignment == 0 { 0x1_0000 } else { mem.alignment as u32 },
            length,
        });
    }
    for mem32 in device.mem32.iter().flatten() {
        out.push(RequirementDescriptor::MemRange32 {
            option: ResourceOption::Required,
            minimum: mem32.minimum,
            maximum: mem32.minimum + mem32.length - 1,
            alignment: mem32.alignment,
            length: mem32.length,
        });
    }

    out
}

/// Append one dependent-function alternative's descriptors, marked
/// `Alternative` (except the first bit of a multi-bit IRQ/DMA mask, which
/// still needs a `Required` anchor within its own alternative list).
///
/// Whether a resource kind appears at all is decided once, from
/// `dependent_sets[0]` alone -- not per alternative -- matching
/// `IsaFdoCreateRequirements`'s `Alternatives->X[0]` presence check, which
/// gates every list's emission of kind `X` and then indexes
/// `Alternatives->X[BestConfig[i]]` for the value. A set that omits a kind
/// `dependent_sets[0]` carries falls back to alternative 0's own value for
/// it, since every alternative is expected to supply the kinds alternative 0
/// establishes.
fn append_alternative(out: &mut Vec<RequirementDescriptor>, dependent_sets: &[DependentSet], idx: usize) {
    let baseline = &dependent_sets[0];
    let set = &dependent_sets[idx];

    if baseline.io.is_some() {
        let io = set.io.or(baseline.io).unwrap();
        out.push(convert_io(io, ResourceOption::Alternative));
    }
    if baseline.irq.is_some() {
        let irq = set.irq.or(baseline.irq).unwrap();
        push_irq_mask(out, irq, false);
    }
    if baseline.dma.is_some() {
        let dma = set.dma.or(baseline.dma).unwrap();
        push_dma_mask(out, dma, false);
    }
    if baseline.mem.is_some() {
        let mem = set.mem.or(baseline.mem).unwrap();
        let length = (mem.length as u32) << 8;
        out.push(RequirementDescriptor::MemRange {
            option: ResourceOption::Alternative,
            minimum: (mem.minimum as u32) << 8,
            maximum: ((mem.maximum as u32) << 8) + length - 1,
            alignment: if mem.alignment == 0 { 0x1_0000 } else { mem.alignment as u32 },
            length,
        });
    }
    if baseline.mem32.is_some() {
        let mem32 = set.mem32.or(baseline.mem32).unwrap();
        out.push(RequirementDescriptor::MemRange32 {
            option: ResourceOption::Alternative,
            minimum: mem32.minimum,
            maximum: mem32.minimum + mem32.length - 1,
            alignment: mem32.alignment,
            length: mem32.length,
        });
    }
}

/// Build the full requirements list for `device`: a fixed baseline plus one
/// `AlternativeList` per dependent-function set, ordered best-priority
/// first. Any of `O(n^2)` stable sorts is acceptable here -- at most 8
/// alternatives per device.
pub fn build_requirements(device: &LogicalDevice) -> RequirementsList {
    let fixed = fixed_descriptors(device);

    if device.dependent_sets.is_empty() {
        return RequirementsList { alternative_lists: alloc::vec![fixed] };
    }

    let mut order: Vec<usize> = (0..device.dependent_sets.len()).collect();
    for i in 1..order.len() {
        let mut j = i;
        while j > 0 && device.dependent_sets[order[j - 1]].priority > device.dependent_sets[order[j]].priority {
            order.swap(j - 1, j);
            j -= 1;
        }
    }

    let lists = order
        .into_iter()
        .map(|idx| {
            let mut list = fixed.clone();
            append_alternative(&mut list, &device.dependent_sets, idx);
            list
        })
        .collect();

    RequirementsList { alternative_lists: lists }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DmaDescriptor, Priority};

    fn device_with_alternatives() -> LogicalDevice {
        let mut device = LogicalDevice::new(1, 0, [b'P', b'N', b'P'], 0x0a03, 1);
        device.dependent_sets.push(DependentSet {
            priority: Priority::Suboptimal,
            dma: Some(DmaDescriptor { mask: 0b0000_0010, information: 0 }),
            ..Default::default()
        });
        device.dependent_sets.push(DependentSet {
            priority: Priority::Preferred,
            dma: Some(DmaDescriptor { mask: 0b0000_0001, information: 0 }),
            ..Default::default()
        });
        device
    }

    #[test]
    fn alternative_lists_are_priority_sorted() {
        let requirements = build_requirements(&device_with_alternatives());
        assert_eq!(requirements.alternative_lists.len(), 2);
        let first_channel = requirements.alternative_lists[0].iter().find_map(|d| match d {
            RequirementDescriptor::Dma { channel, .. } => Some(*channel),
            _ => None,
        });
        assert_eq!(first_channel, Some(0));
    }

    #[test]
    fn no_alternatives_yields_single_list() {
        let device = LogicalDevice::new(1, 0, [b'P', b'N', b'P'], 0x0a03, 1);
        let requirements = build_requirements(&device);
        assert_eq!(requirements.alternative_lists.len(), 1);
    }

    #[test]
    fn resource_kind_presence_is_decided_from_the_first_alternative() {
        // dependent_sets[0] carries an IRQ but no DMA; dependent_sets[1]
        // carries a DMA but no IRQ. Every emitted list must follow
        // dependent_sets[0]'s shape: IRQ present, DMA absent, everywhere.
        let mut device = LogicalDevice::new(1, 0, [b'P', b'N', b'P'], 0x0a03, 1);
        device.dependent_sets.push(DependentSet {
            priority: Priority::Preferred,
            irq: Some(IrqDescriptor { mask: 0b0000_0100, information: 0x01 }),
            ..Default::default()
        });
        device.dependent_sets.push(DependentSet {
            priority: Priority::Suboptimal,
            dma: Some(DmaDescriptor { mask: 0b0000_0001, information: 0 }),
            ..Default::default()
        });

        let requirements = build_requirements(&device);
        assert_eq!(requirements.alternative_lists.len(), 2);
        for list in &requirements.alternative_lists {
            let has_irq = list.iter().any(|d| matches!(d, RequirementDescriptor::Irq { .. }));
            let has_dma = list.iter().any(|d| matches!(d, RequirementDescriptor::Dma { .. }));
            assert!(has_irq, "every alternative list must carry the IRQ dependent_sets[0] establishes");
            assert!(!has_dma, "DMA must be omitted everywhere since dependent_sets[0] has none");
        }
    }
}
