//! Maps a decoded [`ModbusRequest`] onto [`DataBank`] operations, applying
//! the quantity and address-range policy that produces exception PDUs.
//!
//! This is a pure function of `(request, bank)` — no connection state, no
//! I/O — so the whole dispatch policy can be exercised with plain unit
//! tests instead of a socket.

use crate::bank::DataBank;
use crate::pdu::{
    self, DecodeError, ExceptionCode, ModbusRequest, FC_READ_COILS, FC_READ_DISCRETE_INPUTS,
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
};

const MAX_READ_BITS: u16 = 2000;
const MAX_READ_WORDS: u16 = 125;
const MAX_WRITE_COILS: u16 = 1968;
const MAX_WRITE_REGISTERS: u16 = 123;

/// Result of dispatching one request: either the response PDU payload
/// (function code included) or the exception to report.
pub type DispatchOutcome = Result<Vec<u8>, ExceptionCode>;

/// Apply `request` against `bank` and produce a response or exception PDU
/// payload, per the following policy:
///
/// 1. Unrecognized function code → `IllegalFunction`.
/// 2. Quantity outside the per-function allowed range → `IllegalDataValue`.
/// 3. For 0x0F, `byte_count < ceil(count/8)` → `IllegalDataValue`.
/// 4. For 0x10, `byte_count != count*2` → `IllegalDataValue`.
/// 5. Address range exceeds the space → `IllegalDataAddress`.
/// 6. Otherwise, success.
///
/// Holding/input registers and coils/discrete-inputs are deliberately
/// aliased to the same underlying bit/word space (see DESIGN.md).
#[must_use]
pub fn dispatch(request: &ModbusRequest, bank: &DataBank) -> DispatchOutcome {
    match *request {
        ModbusRequest::ReadBits {
            function,
            addr,
            count,
        } => {
            debug_assert!(function == FC_READ_COILS || function == FC_READ_DISCRETE_INPUTS);
            if !(1..=MAX_READ_BITS).contains(&count) {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let bits = bank
                .get_bits(addr, count)
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(pdu::encode_read_bits_response(function, &bits))
        }
        ModbusRequest::ReadWords {
            function,
            addr,
            count,
        } => {
            debug_assert!(
                function == FC_READ_HOLDING_REGISTERS || function == FC_READ_INPUT_REGISTERS
            );
            if !(1..=MAX_READ_WORDS).contains(&count) {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let words = bank
                .get_words(addr, count)
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(pdu::encode_read_words_response(function, &words))
        }
        ModbusRequest::WriteSingleCoil { addr, value } => {
            let on = value == 0xFF00;
            bank.set_bits(addr, &[on])
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(pdu::encode_write_single_response(
                pdu::FC_WRITE_SINGLE_COIL,
                addr,
                value,
            ))
        }
        ModbusRequest::WriteSingleRegister { addr, value } => {
            bank.set_words(addr, &[value])
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(pdu::encode_write_single_response(
                pdu::FC_WRITE_SINGLE_REGISTER,
                addr,
                value,
            ))
        }
        ModbusRequest::WriteMultipleCoils {
            addr,
            count,
            byte_count,
            ref data,
        } => {
            if !(1..=MAX_WRITE_COILS).contains(&count) {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let expected_bytes = (count as usize).div_ceil(8);
            if (byte_count as usize) < expected_bytes || data.len() < expected_bytes {
                return Err(ExceptionCode::IllegalDataValue);
            }
            let bits = pdu::unpack_bits(data, count);
            bank.set_bits(addr, &bits)
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(pdu::encode_write_multiple_response(
                pdu::FC_WRITE_MULTIPLE_COILS,
                addr,
                count,
            ))
        }
        ModbusRequest::WriteMultipleRegisters {
            addr,
            count,
            byte_count,
            ref values,
        } => {
            if !(1..=MAX_WRITE_REGISTERS).contains(&count) {
                return Err(ExceptionCode::IllegalDataValue);
            }
            if byte_count as usize != count as usize * 2 || values.len() != count as usize {
                return Err(ExceptionCode::IllegalDataValue);
            }
            bank.set_words(addr, values)
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            Ok(pdu::encode_write_multiple_response(
                pdu::FC_WRITE_MULTIPLE_REGISTERS,
                addr,
                count,
            ))
        }
        ModbusRequest::Unknown { .. } => Err(ExceptionCode::IllegalFunction),
    }
}

/// Decode, then dispatch — the full "valid framing, bad or good PDU" path a
/// session handler runs after it has already validated the MBAP header.
///
/// A [`DecodeError`] here is always a framing-level fault: the caller must
/// close the connection rather than send an exception PDU.
pub fn decode_and_dispatch(pdu: &[u8], bank: &DataBank) -> Result<DispatchOutcome, DecodeError> {
    let request = pdu::decode_request(pdu)?;
    Ok(dispatch(&request, bank))
}

/// Build the final response PDU bytes for a [`DispatchOutcome`], applying
/// the exception encoding when dispatch failed.
#[must_use]
pub fn encode_outcome(function: u8, outcome: DispatchOutcome) -> Vec<u8> {
    match outcome {
        Ok(payload) => payload,
        Err(exception) => pdu::encode_exception(function, exception),
    }
}
