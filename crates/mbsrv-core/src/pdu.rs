//! PDU codec: decoding request bytes into a typed [`ModbusRequest`] and
//! encoding responses back to bytes.
//!
//! Decoding never panics on truncated or malformed input — it returns
//! [`DecodeError`]. Quantity/byte-count range checks are deliberately *not*
//! performed here; the codec only parses the wire shape. Range and quantity
//! policy belongs to the dispatcher (see `dispatch.rs`), which is what
//! produces the 0x02/0x03 exceptions.

use thiserror::Error;

/// Read Coils.
pub const FC_READ_COILS: u8 = 0x01;
/// Read Discrete Inputs.
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
/// Read Holding Registers.
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
/// Read Input Registers.
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
/// Write Single Coil.
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
/// Write Single Register.
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
/// Write Multiple Coils.
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
/// Write Multiple Registers.
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Modbus exception codes.
///
/// The full defined set is carried even though this server's dispatcher
/// only ever constructs [`ExceptionCode::IllegalFunction`],
/// [`ExceptionCode::IllegalDataAddress`], and
/// [`ExceptionCode::IllegalDataValue`] — the rest exist so the type is
/// complete against the Modbus specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExceptionCode {
    /// Illegal function code (0x01).
    IllegalFunction = 0x01,
    /// Illegal data address (0x02).
    IllegalDataAddress = 0x02,
    /// Illegal data value (0x03).
    IllegalDataValue = 0x03,
    /// Slave device failure (0x04).
    SlaveDeviceFailure = 0x04,
    /// Acknowledge (0x05).
    Acknowledge = 0x05,
    /// Slave device busy (0x06).
    SlaveDeviceBusy = 0x06,
    /// Memory parity error (0x08).
    MemoryParityError = 0x08,
    /// Gateway path unavailable (0x0A).
    GatewayPathUnavailable = 0x0A,
    /// Gateway target device failed to respond (0x0B).
    GatewayTargetDeviceFailedToRespond = 0x0B,
}

impl ExceptionCode {
    /// The 1-byte value carried on the wire.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// A decoded Modbus request, tagged by function code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    /// Read Coils (0x01) or Read Discrete Inputs (0x02) — the function code
    /// is kept so the response echoes it, the bank access is identical.
    ReadBits {
        /// Requesting function code (0x01 or 0x02).
        function: u8,
        /// Starting address.
        addr: u16,
        /// Number of bits requested.
        count: u16,
    },
    /// Read Holding Registers (0x03) or Read Input Registers (0x04).
    ReadWords {
        /// Requesting function code (0x03 or 0x04).
        function: u8,
        /// Starting address.
        addr: u16,
        /// Number of registers requested.
        count: u16,
    },
    /// Write Single Coil (0x05).
    WriteSingleCoil {
        /// Address of the coil.
        addr: u16,
        /// Raw on/off value as received (0xFF00 is "on", anything else is
        /// interpreted as "off" per the wire constraint).
        value: u16,
    },
    /// Write Single Register (0x06).
    WriteSingleRegister {
        /// Address of the register.
        addr: u16,
        /// Value to write.
        value: u16,
    },
    /// Write Multiple Coils (0x0F).
    WriteMultipleCoils {
        /// Starting address.
        addr: u16,
        /// Declared coil count.
        count: u16,
        /// Declared byte count.
        byte_count: u8,
        /// Packed coil data, LSB-first within each byte.
        data: Vec<u8>,
    },
    /// Write Multiple Registers (0x10).
    WriteMultipleRegisters {
        /// Starting address.
        addr: u16,
        /// Declared register count.
        count: u16,
        /// Declared byte count.
        byte_count: u8,
        /// Register values, decoded big-endian.
        values: Vec<u16>,
    },
    /// Any function code not in the table above. Always dispatches to
    /// [`ExceptionCode::IllegalFunction`].
    Unknown {
        /// The unrecognized function code.
        function: u8,
    },
}

impl ModbusRequest {
    /// The function code this request was decoded from (without the
    /// exception high bit).
    #[must_use]
    pub fn function_code(&self) -> u8 {
        match self {
            Self::ReadBits { function, .. } | Self::ReadWords { function, .. } => *function,
            Self::WriteSingleCoil { .. } => FC_WRITE_SINGLE_COIL,
            Self::WriteSingleRegister { .. } => FC_WRITE_SINGLE_REGISTER,
            Self::WriteMultipleCoils { .. } => FC_WRITE_MULTIPLE_COILS,
            Self::WriteMultipleRegisters { .. } => FC_WRITE_MULTIPLE_REGISTERS,
            Self::Unknown { function } => *function,
        }
    }
}

/// Errors that terminate the connection rather than producing an exception
/// PDU — malformed framing, not a protocol-level refusal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The PDU was empty (no function code byte at all).
    #[error("empty PDU")]
    EmptyPdu,

    /// The function code has the high bit set (reserved for exception
    /// responses); a request PDU must never carry one.
    #[error("reserved function code 0x{0:02X}")]
    ReservedFunctionCode(u8),

    /// The PDU was shorter than the fixed-size fields its function code
    /// requires.
    #[error("PDU too short for function 0x{function:02X}: need {needed} bytes, got {got}")]
    Truncated {
        /// Function code being decoded.
        function: u8,
        /// Minimum bytes required.
        needed: usize,
        /// Bytes actually available.
        got: usize,
    },
}

/// Decode a request PDU.
///
/// `pdu` is the payload following the MBAP header — the unit id has already
/// been consumed, so the first byte here is the function code.
///
/// # Errors
///
/// Returns [`DecodeError::EmptyPdu`] or [`DecodeError::ReservedFunctionCode`]
/// for conditions the session handler must treat as framing errors (close
/// the connection), and [`DecodeError::Truncated`] when the body is shorter
/// than the function code's fixed fields require.
pub fn decode_request(pdu: &[u8]) -> Result<ModbusRequest, DecodeError> {
    let function = *pdu.first().ok_or(DecodeError::EmptyPdu)?;
    if function > 0x7F {
        return Err(DecodeError::ReservedFunctionCode(function));
    }

    match function {
        FC_READ_COILS | FC_READ_DISCRETE_INPUTS => {
            let (addr, count) = read_addr_count(pdu, function)?;
            Ok(ModbusRequest::ReadBits {
                function,
                addr,
                count,
            })
        }
        FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
            let (addr, count) = read_addr_count(pdu, function)?;
            Ok(ModbusRequest::ReadWords {
                function,
                addr,
                count,
            })
        }
        FC_WRITE_SINGLE_COIL => {
            let (addr, value) = read_addr_count(pdu, function)?;
            Ok(ModbusRequest::WriteSingleCoil { addr, value })
        }
        FC_WRITE_SINGLE_REGISTER => {
            let (addr, value) = read_addr_count(pdu, function)?;
            Ok(ModbusRequest::WriteSingleRegister { addr, value })
        }
        FC_WRITE_MULTIPLE_COILS => {
            if pdu.len() < 6 {
                return Err(DecodeError::Truncated {
                    function,
                    needed: 6,
                    got: pdu.len(),
                });
            }
            let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
            let count = u16::from_be_bytes([pdu[3], pdu[4]]);
            let byte_count = pdu[5];
            let needed = 6 + byte_count as usize;
            if pdu.len() < needed {
                return Err(DecodeError::Truncated {
                    function,
                    needed,
                    got: pdu.len(),
                });
            }
            Ok(ModbusRequest::WriteMultipleCoils {
                addr,
                count,
                byte_count,
                data: pdu[6..needed].to_vec(),
            })
        }
        FC_WRITE_MULTIPLE_REGISTERS => {
            if pdu.len() < 6 {
                return Err(DecodeError::Truncated {
                    function,
                    needed: 6,
                    got: pdu.len(),
                });
            }
            let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
            let count = u16::from_be_bytes([pdu[3], pdu[4]]);
            let byte_count = pdu[5];
            let needed = 6 + byte_count as usize;
            if pdu.len() < needed {
                return Err(DecodeError::Truncated {
                    function,
                    needed,
                    got: pdu.len(),
                });
            }
            let values = pdu[6..needed]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Ok(ModbusRequest::WriteMultipleRegisters {
                addr,
                count,
                byte_count,
                values,
            })
        }
        other => Ok(ModbusRequest::Unknown { function: other }),
    }
}

/// Parse the common `addr: u16, trailing: u16` shape shared by reads and
/// single writes.
fn read_addr_count(pdu: &[u8], function: u8) -> Result<(u16, u16), DecodeError> {
    if pdu.len() < 5 {
        return Err(DecodeError::Truncated {
            function,
            needed: 5,
            got: pdu.len(),
        });
    }
    let addr = u16::from_be_bytes([pdu[1], pdu[2]]);
    let trailing = u16::from_be_bytes([pdu[3], pdu[4]]);
    Ok((addr, trailing))
}

/// Pack a sequence of bits into bytes, LSB-first within each byte, as used
/// for coil/discrete-input read responses and write-multiple-coils request
/// bodies.
#[must_use]
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let byte_count = bits.len().div_ceil(8);
    let mut bytes = vec![0u8; byte_count];
    for (i, &bit) in bits.iter().enumerate() {
        if bit {
            bytes[i / 8] |= 1 << (i % 8);
        }
    }
    bytes
}

/// Unpack `count` bits from packed bytes, LSB-first within each byte.
#[must_use]
pub fn unpack_bits(bytes: &[u8], count: u16) -> Vec<bool> {
    (0..count as usize)
        .map(|i| bytes[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

/// Encode a successful read-bits response payload (FC, byte count, packed
/// data).
#[must_use]
pub fn encode_read_bits_response(function: u8, bits: &[bool]) -> Vec<u8> {
    let packed = pack_bits(bits);
    let mut out = Vec::with_capacity(2 + packed.len());
    out.push(function);
    out.push(packed.len() as u8);
    out.extend_from_slice(&packed);
    out
}

/// Encode a successful read-words response payload (FC, byte count,
/// big-endian words).
#[must_use]
pub fn encode_read_words_response(function: u8, words: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + words.len() * 2);
    out.push(function);
    out.push((words.len() * 2) as u8);
    for word in words {
        out.extend_from_slice(&word.to_be_bytes());
    }
    out
}

/// Encode a write-single-* echo response (FC, addr, value).
#[must_use]
pub fn encode_write_single_response(function: u8, addr: u16, value: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    out.push(function);
    out.extend_from_slice(&addr.to_be_bytes());
    out.extend_from_slice(&value.to_be_bytes());
    out
}

/// Encode a write-multiple-* response (FC, addr, count).
#[must_use]
pub fn encode_write_multiple_response(function: u8, addr: u16, count: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    out.push(function);
    out.extend_from_slice(&addr.to_be_bytes());
    out.extend_from_slice(&count.to_be_bytes());
    out
}

/// Encode an exception response (FC | 0x80, exception code).
#[must_use]
pub fn encode_exception(function: u8, exception: ExceptionCode) -> Vec<u8> {
    vec![function | 0x80, exception.code()]
}
