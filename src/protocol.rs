//! Register-level protocol definitions shared by every transport.
//!
//! The SA32 exposes its process values as 16-bit Modbus registers. Scalar
//! values occupy one register; floating-point values occupy two consecutive
//! registers holding an IEEE-754 single-precision value. How those 32 bits
//! are spread over the two registers depends on the device configuration,
//! so both the byte order within a register and the word order across the
//! register pair are explicit parameters of the codec.

use std::time::Duration;

/// Default Modbus TCP port.
pub const DEFAULT_TCP_PORT: u16 = 502;
/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// Default serial data bits.
pub const DEFAULT_DATA_BITS: u8 = 8;
/// Default serial stop bits.
pub const DEFAULT_STOP_BITS: u8 = 1;
/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Lowest valid Modbus slave/unit address.
pub const SLAVE_ID_MIN: u8 = 1;
/// Highest valid Modbus slave/unit address.
pub const SLAVE_ID_MAX: u8 = 247;

/// Number of registers occupied by a 32-bit float.
pub const FLOAT_REGISTER_COUNT: u16 = 2;

/// Register table addressed by a read request.
///
/// Holding registers are read/write (function codes 0x03/0x06/0x10),
/// input registers are read-only (function code 0x04).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterKind {
    Holding,
    Input,
}

/// Endianness of the two bytes within one 16-bit register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

/// Ordering of the high/low 16-bit halves of a 32-bit value across the
/// two consecutive registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WordOrder {
    #[default]
    Big,
    Little,
}

/// Encodes a 32-bit float into two registers.
///
/// With [`WordOrder::Big`] the high-order half of the IEEE-754 value lands
/// in the lower-numbered register (the first element); [`ByteOrder::Little`]
/// swaps the two bytes inside each register. The two axes are independent.
///
/// NaN and infinity are passed through bit-exact; there is no failure mode.
pub fn encode_float(value: f32, byte_order: ByteOrder, word_order: WordOrder) -> [u16; 2] {
    let bits = value.to_bits();
    let hi = (bits >> 16) as u16;
    let lo = bits as u16;
    let (hi, lo) = match byte_order {
        ByteOrder::Big => (hi, lo),
        ByteOrder::Little => (hi.swap_bytes(), lo.swap_bytes()),
    };
    match word_order {
        WordOrder::Big => [hi, lo],
        WordOrder::Little => [lo, hi],
    }
}

/// Decodes two registers into a 32-bit float. Inverse of [`encode_float`]
/// for the same byte and word order.
pub fn decode_float(registers: [u16; 2], byte_order: ByteOrder, word_order: WordOrder) -> f32 {
    let (hi, lo) = match word_order {
        WordOrder::Big => (registers[0], registers[1]),
        WordOrder::Little => (registers[1], registers[0]),
    };
    let (hi, lo) = match byte_order {
        ByteOrder::Big => (hi, lo),
        ByteOrder::Little => (hi.swap_bytes(), lo.swap_bytes()),
    };
    f32::from_bits(((hi as u32) << 16) | lo as u32)
}
