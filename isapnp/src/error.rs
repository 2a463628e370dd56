use core::fmt;

/// Failure modes surfaced by the core across isolation, tag parsing and
/// resource construction. Mirrors the plain, derive-only error enums used
/// for subsystem errors elsewhere in the kernel (no `thiserror`/`anyhow`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsaPnpError {
    /// A resource-data tag byte did not decode to a known small or large tag.
    InvalidTag,
    /// A tag's declared length ran past the end of the scratch buffer.
    BufferOverflow,
    /// The 8-bit LFSR checksum over a card's identifier did not match.
    ChecksumMismatch,
    /// The bounded scratch allocation for a probe could not be grown.
    OutOfMemory,
    /// The host rejected an arbitrated resource assignment.
    ResourceConflict,
    /// Operation targeted a CSN/LDN pair with no device present.
    DeviceAbsent,
    /// Minor function is not owned by the core; the host must forward it.
    HostRelayed,
}

impl fmt::Display for IsaPnpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            IsaPnpError::InvalidTag => "invalid resource-data tag",
            IsaPnpError::BufferOverflow => "resource-data buffer exhausted",
            IsaPnpError::ChecksumMismatch => "card identifier checksum mismatch",
            IsaPnpError::OutOfMemory => "out of memory building device state",
            IsaPnpError::ResourceConflict => "resource assignment conflicts",
            IsaPnpError::DeviceAbsent => "no device present for CSN/LDN",
            IsaPnpError::HostRelayed => "request is not core-owned, relay to host",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, IsaPnpError>;
