//! Resource-data tag stream: reading raw tag+length framing off the wire
//! and decoding it into typed tags. Grounded on `ReadTags`/`ParseTags` in
//! `hardware.c`, minus that function's `#if 1` synthetic-data injection
//! block, which was debug scaffolding rather than protocol behavior.

use bit_field::BitField;

use crate::error::{IsaPnpError, Result};

/// A resource-data tag's type, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    LogicalDeviceId,
    CompatibleDeviceId,
    Irq,
    Dma,
    StartDependentFunction,
    EndDependentFunction,
    IoPort,
    FixedIoPort,
    VendorDefined,
    End,
    MemoryRange,
    AnsiIdentifierString,
    UnicodeIdentifierString,
    VendorDefinedLarge,
    Memory32Range,
    FixedMemory32Range,
}

/// One raw tag read off the stream: its kind and the exact payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag<'a> {
    pub kind: TagKind,
    pub payload: &'a [u8],
}

fn small_tag_kind(name: u8) -> Option<TagKind> {
    Some(match name {
        0x1 => TagKind::LogicalDeviceId,
        0x2 => TagKind::CompatibleDeviceId,
        0x3 => TagKind::Irq,
        0x4 => TagKind::Dma,
        0x5 => TagKind::StartDependentFunction,
        0x6 => TagKind::EndDependentFunction,
        0x7 => TagKind::IoPort,
        0x8 => TagKind::FixedIoPort,
        0xe => TagKind::VendorDefined,
        0xf => TagKind::End,
        _ => return None,
    })
}

fn large_tag_kind(name: u8) -> Option<TagKind> {
    Some(match name {
        0x1 => TagKind::MemoryRange,
        0x2 => TagKind::AnsiIdentifierString,
        0x3 => TagKind::UnicodeIdentifierString,
        0x4 => TagKind::VendorDefinedLarge,
        0x5 => TagKind::Memory32Range,
        0x6 => TagKind::FixedMemory32Range,
        _ => return None,
    })
}

/// Walks a resource-data byte buffer, yielding one [`RawTag`] per call.
/// `buffer` must hold the entire tag stream already read from the card
/// (via repeated Read Data Port polling); this type does no I/O itself.
pub struct TagReader<'a> {
    buffer: &'a [u8],
    cursor: usize,
}

impl<'a> TagReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        TagReader { buffer, cursor: 0 }
    }

    /// Read the next tag. Returns `Ok(None)` once an `End` tag has been
    /// consumed. Returns [`IsaPnpError::BufferOverflow`] if a declared
    /// length runs past the buffer, and [`IsaPnpError::InvalidTag`] for a
    /// zero tag byte or an unrecognized large-tag name.
    pub fn next_tag(&mut self) -> Result<Option<RawTag<'a>>> {
        if self.cursor >= self.buffer.len() {
            return Err(IsaPnpError::BufferOverflow);
        }
        let tag_byte = self.buffer[self.cursor];
        if tag_byte == 0 {
            return Err(IsaPnpError::InvalidTag);
        }
        self.cursor += 1;

        let (kind, length) = if !tag_byte.get_bit(7) {
            let name = tag_byte.get_bits(3..7);
            let length = tag_byte.get_bits(0..3) as usize;
            let kind = small_tag_kind(name).ok_or(IsaPnpError::InvalidTag)?;
            (kind, length)
        } else {
            if self.cursor + 2 > self.buffer.len() {
                return Err(IsaPnpError::BufferOverflow);
            }
            let name = tag_byte.get_bits(0..7);
            let length = u16::from_le_bytes([self.buffer[self.cursor], self.buffer[self.cursor + 1]]) as usize;
            self.cursor += 2;
            if tag_byte == 0xff && length == 0xffff {
                return Err(IsaPnpError::InvalidTag);
            }
            let kind = large_tag_kind(name).ok_or(IsaPnpError::InvalidTag)?;
            (kind, length)
        };

        if self.cursor + length > self.buffer.len() {
            return Err(IsaPnpError::BufferOverflow);
        }
        let payload = &self.buffer[self.cursor..self.cursor + length];
        self.cursor += length;

        if kind == TagKind::End {
            return Ok(None);
        }
        Ok(Some(RawTag { kind, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_logical_device_id_small_tag() {
        // name=0x1, length=6 -> tag byte 0b0_0001_110 = 0x0e, wait: small tag
        // layout is bit7=0, bits6-3=name, bits2-0=length.
        let tag_byte = (0x1 << 3) | 0x6;
        let buffer = [tag_byte, 1, 2, 3, 4, 5, 6, 0x79, 0x00];
        let mut reader = TagReader::new(&buffer);
        let tag = reader.next_tag().unwrap().unwrap();
        assert_eq!(tag.kind, TagKind::LogicalDeviceId);
        assert_eq!(tag.payload, &[1, 2, 3, 4, 5, 6]);
        let end = reader.next_tag().unwrap();
        assert!(end.is_none());
    }

    #[test]
    fn rejects_zero_tag_byte() {
        let buffer = [0u8];
        let mut reader = TagReader::new(&buffer);
        assert_eq!(reader.next_tag(), Err(IsaPnpError::InvalidTag));
    }

    #[test]
    fn detects_buffer_overflow_on_truncated_payload() {
        let tag_byte = (0x1 << 3) | 0x6;
        let buffer = [tag_byte, 1, 2];
        let mut reader = TagReader::new(&buffer);
        assert_eq!(reader.next_tag(), Err(IsaPnpError::BufferOverflow));
    }

    #[test]
    fn reads_large_memory_range_tag() {
        let tag_byte = 0x80 | 0x1;
        let mut buffer = alloc::vec![tag_byte, 9, 0];
        buffer.extend_from_slice(&[0u8; 9]);
        buffer.push(0x79);
        buffer.push(0x00);
        let mut reader = TagReader::new(&buffer);
        let tag = reader.next_tag().unwrap().unwrap();
        assert_eq!(tag.kind, TagKind::MemoryRange);
        assert_eq!(tag.payload.len(), 9);
    }
}
