#![doc = "Protocol core for a Modbus TCP (MBAP) server: the shared data bank, the PDU codec, and the dispatcher."]

pub mod bank;
pub mod dispatch;
pub mod pdu;

pub use bank::DataBank;
pub use dispatch::{decode_and_dispatch, dispatch, encode_outcome, DispatchOutcome};
pub use pdu::{decode_request, DecodeError, ExceptionCode, ModbusRequest};
