//! The bit-serial isolation protocol: wakes every un-isolated card
//! simultaneously, then uses the LFSR key stream and a bus-wide open-drain
//! wired-AND on the Read Data Port to assign each card a unique Card Select
//! Number (CSN) one at a time. Grounded on `TryIsolate` in `hardware.c`.

use crate::error::{IsaPnpError, Result};
use crate::lfsr;
use crate::ports::{reg, IoRangeCheck, IsaBus};

const ISOLATION_READ_RETRIES: u32 = 20;
const STALL_NANOS: u64 = 1_000; // 1 microsecond is acceptable between protocol steps

fn write_address(bus: &mut dyn IsaBus, value: u8) {
    bus.write_address(value);
}

fn write_byte(bus: &mut dyn IsaBus, address: u8, value: u8) {
    write_address(bus, address);
    bus.write_data(value);
}

fn read_byte(bus: &mut dyn IsaBus, address: u8) -> u8 {
    write_address(bus, address);
    bus.read_data()
}

fn read_status(bus: &mut dyn IsaBus) -> u8 {
    read_byte(bus, reg::STATUS)
}

/// Poll the status register for up to [`ISOLATION_READ_RETRIES`] iterations,
/// returning the resource-data byte once ready, or `0xff` on timeout --
/// matches `PeekByte`'s degrade-rather-than-fail behavior.
fn peek_byte(bus: &mut dyn IsaBus) -> u8 {
    for _ in 0..ISOLATION_READ_RETRIES {
        if read_status(bus) & 0x01 != 0 {
            return read_byte(bus, reg::RESOURCE_DATA);
        }
        bus.stall(STALL_NANOS);
    }
    0xff
}

/// Fill `out` with up to `out.len()` resource-data bytes from the card
/// currently woken, returning the count actually read before an implicit
/// end.
pub fn peek(bus: &mut dyn IsaBus, out: &mut [u8]) {
    for slot in out.iter_mut() {
        *slot = peek_byte(bus);
    }
}

fn send_key(bus: &mut dyn IsaBus) {
    bus.stall(STALL_NANOS);
    bus.write_address(0x00);
    bus.write_address(0x00);
    for byte in lfsr::key_sequence() {
        bus.write_address(byte);
    }
}

fn wait_for_key(bus: &mut dyn IsaBus) {
    bus.write_address(reg::CONFIG_CONTROL);
}

fn reset_csn(bus: &mut dyn IsaBus) {
    write_byte(bus, reg::CONFIG_CONTROL, 0x04);
}

fn wake(bus: &mut dyn IsaBus, csn: u8) {
    write_byte(bus, reg::WAKE, csn);
}

fn write_csn(bus: &mut dyn IsaBus, csn: u8) {
    write_byte(bus, reg::CARD_SELECT_NUMBER, csn);
}

/// Reprogram the shared Read Data Port register, taking the port's I/O
/// address shifted right two bits as the hardware expects.
pub fn set_read_data_port(bus: &mut dyn IsaBus, port: u16) {
    write_byte(bus, reg::SET_RD_DATA_PORT, (port >> 2) as u8);
}

fn enter_isolation_state(bus: &mut dyn IsaBus) {
    write_address(bus, reg::WAKE);
}

/// Result of one isolation pass: the number of cards successfully isolated
/// (also the highest CSN assigned). Returns [`IsaPnpError::ResourceConflict`]
/// if the Read Data Port is shared with another bus and in active use (bus
/// saw life but no valid 0x55AA framing -- a port conflict, not "no cards"),
/// or [`IsaPnpError::ChecksumMismatch`] if an isolating card's identifier
/// fails its checksum.
pub fn try_isolate(bus: &mut dyn IsaBus) -> Result<u8> {
    wait_for_key(bus);
    send_key(bus);
    reset_csn(bus);
    bus.stall(STALL_NANOS);
    bus.stall(STALL_NANOS);

    wait_for_key(bus);
    send_key(bus);
    wake(bus, 0);
    bus.stall(STALL_NANOS);

    let mut csn: u8 = 0;
    loop {
        enter_isolation_state(bus);
        bus.stall(STALL_NANOS);

        let mut identifier = [0u8; 9];
        let mut seen_55aa = false;
        let mut seen_life = false;

        for byte_slot in identifier.iter_mut() {
            let mut byte = 0u8;
            for _ in 0..8 {
                let hi = bus.read_data();
                bus.stall(STALL_NANOS);
                let lo = bus.read_data();
                bus.stall(STALL_NANOS);
                let data = ((hi as u16) << 8) | lo as u16;
                if data != 0xffff {
                    seen_life = true;
                }
                byte >>= 1;
                if data == 0x55aa {
                    byte |= 0x80;
                    seen_55aa = true;
                }
            }
            *byte_slot = byte;
        }

        if !seen_55aa {
            if csn > 0 {
                break;
            }
            if seen_life {
                log::warn!("isapnp: read data port conflict, bus saw activity but no valid framing");
                wait_for_key(bus);
                return Err(IsaPnpError::ResourceConflict);
            }
            break;
        }

        let checksum_input: [u8; 8] = identifier[0..8].try_into().unwrap();
        if identifier[8] != lfsr::checksum(&checksum_input) {
            log::warn!("isapnp: checksum mismatch isolating card at csn {}", csn + 1);
            wait_for_key(bus);
            return Err(IsaPnpError::ChecksumMismatch);
        }

        csn += 1;
        log::debug!("isapnp: isolated card at csn {}", csn);
        write_csn(bus, csn);
        bus.stall(STALL_NANOS);
        wake(bus, 0);
        bus.stall(STALL_NANOS);
    }

    wait_for_key(bus);
    Ok(csn)
}

/// Wake a card and select one of its logical devices, leaving it addressed
/// for register reads or writes. Does not touch the device's activation
/// state.
pub fn wake_and_select(bus: &mut dyn IsaBus, csn: u8, ldn: u8) {
    wait_for_key(bus);
    send_key(bus);
    wake(bus, csn);
    write_byte(bus, reg::LOGICAL_DEVICE_NUMBER, ldn);
}

/// Activate or deactivate a single logical device, wrapping it in the
/// wake/key sequence the card requires to accept configuration writes.
pub fn set_device_activation(bus: &mut dyn IsaBus, csn: u8, ldn: u8, activate: bool) {
    wait_for_key(bus);
    send_key(bus);
    wake(bus, csn);
    write_byte(bus, reg::LOGICAL_DEVICE_NUMBER, ldn);
    if activate {
        let mut range_check = IoRangeCheck::from_bits_truncate(read_byte(bus, reg::IO_RANGE_CHECK));
        range_check.remove(IoRangeCheck::RANGE_CHECK_ACTIVE);
        write_byte(bus, reg::IO_RANGE_CHECK, range_check.bits());
        write_byte(bus, reg::ACTIVATE, 0x01);
    } else {
        write_byte(bus, reg::ACTIVATE, 0x00);
    }
    bus.stall(STALL_NANOS);
    wait_for_key(bus);
}
