//! A scripted `IsaBus` that plays back the wired-AND isolation protocol for
//! a fixed set of card identifiers, without any real hardware. Enough to
//! exercise [`isapnp::isolation::try_isolate`] end to end.

use isapnp::ports::IsaBus;

/// Route the core's `log` output through `env_logger` so a failing test can
/// be re-run with `RUST_LOG=debug` to see the isolation trace. Safe to call
/// from every test; only the first call does anything.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LastCall {
    None,
    WroteAddress(u8),
    InIsolation,
}

pub struct MockBus {
    remaining: Vec<[u8; 9]>,
    pub isolated: Vec<[u8; 9]>,
    contenders: Vec<usize>,
    byte_idx: usize,
    bit_idx: usize,
    read_phase: u8,
    current_bit_is_one: bool,
    last_call: LastCall,
    /// When set, every isolation read reports a busy line that never frames
    /// into a valid `0x55`/`0xAA` pair -- another bus is actively driving
    /// the shared Read Data Port without this one's cooperation.
    phantom_life: bool,
}

const WAKE: u8 = 0x03;
const CARD_SELECT_NUMBER: u8 = 0x06;

impl MockBus {
    pub fn new(cards: Vec<[u8; 9]>) -> Self {
        MockBus {
            remaining: cards,
            isolated: Vec::new(),
            contenders: Vec::new(),
            byte_idx: 0,
            bit_idx: 0,
            read_phase: 0,
            current_bit_is_one: false,
            last_call: LastCall::None,
            phantom_life: false,
        }
    }

    /// A Read Data Port shared with another bus that is actively driving it:
    /// isolation sees activity but never a valid `0x55AA` frame, matching
    /// the "bus saw life but no valid framing" port-conflict case.
    pub fn with_phantom_life() -> Self {
        let mut bus = MockBus::new(Vec::new());
        bus.phantom_life = true;
        bus
    }

    fn isolation_read(&mut self) -> u8 {
        if self.byte_idx >= 9 {
            return 0xff;
        }
        if self.read_phase == 0 {
            let bit_idx = self.bit_idx;
            let byte_idx = self.byte_idx;
            let bit_set = self
                .contenders
                .iter()
                .any(|&i| (self.remaining[i][byte_idx] >> bit_idx) & 1 == 1);
            self.current_bit_is_one = bit_set;
            if bit_set {
                self.contenders.retain(|&i| (self.remaining[i][byte_idx] >> bit_idx) & 1 == 1);
            }
            self.read_phase = 1;
            if bit_set {
                0x55
            } else {
                0xff
            }
        } else {
            self.read_phase = 0;
            let result = if self.current_bit_is_one { 0xaa } else { 0xff };
            self.bit_idx += 1;
            if self.bit_idx == 8 {
                self.bit_idx = 0;
                self.byte_idx += 1;
            }
            result
        }
    }
}

impl IsaBus for MockBus {
    fn write_address(&mut self, reg: u8) {
        self.last_call = LastCall::WroteAddress(reg);
    }

    fn write_data(&mut self, value: u8) {
        if let LastCall::WroteAddress(reg) = self.last_call {
            match reg {
                WAKE if value == 0 => {
                    self.contenders = (0..self.remaining.len()).collect();
                    self.byte_idx = 0;
                    self.bit_idx = 0;
                    self.read_phase = 0;
                }
                CARD_SELECT_NUMBER => {
                    if let Some(&winner) = self.contenders.first() {
                        self.isolated.push(self.remaining.remove(winner));
                    }
                }
                _ => {}
            }
        }
        self.last_call = LastCall::None;
    }

    fn read_data(&mut self) -> u8 {
        if matches!(self.last_call, LastCall::WroteAddress(WAKE)) {
            self.last_call = LastCall::InIsolation;
        }
        if matches!(self.last_call, LastCall::InIsolation) {
            if self.phantom_life {
                0x33
            } else {
                self.isolation_read()
            }
        } else {
            0xff
        }
    }

    fn stall(&mut self, _nanoseconds: u64) {}

    fn set_read_data_port(&mut self, _port: u16) {}
}

/// Build a 9-byte card identifier (vendor id, product id, serial number)
/// with a correct trailing checksum byte.
pub fn card_identifier(vendor: u16, product: u16, serial: u32) -> [u8; 9] {
    let mut id = [0u8; 9];
    id[0..2].copy_from_slice(&vendor.to_be_bytes());
    id[2..4].copy_from_slice(&product.to_be_bytes());
    id[4..8].copy_from_slice(&serial.to_be_bytes());
    let checksum_input: [u8; 8] = id[0..8].try_into().unwrap();
    id[8] = isapnp::lfsr::checksum(&checksum_input);
    id
}
