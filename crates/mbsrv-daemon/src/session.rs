//! Per-connection MBAP framing loop: read header, validate, read body,
//! dispatch, reply — strictly serial, terminating the connection on any
//! framing violation rather than replying with an exception.

use std::net::SocketAddr;
use std::sync::Arc;

use mbsrv_core::{dispatch, encode_outcome, DataBank, DecodeError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::metrics::{CloseReason, Metrics};
use crate::signals::ShutdownHandle;

const MBAP_HEADER_SIZE: usize = 7;

/// Run the framing loop for one accepted connection until it closes.
///
/// `bank` and `metrics` are shared with every other session; `shutdown` is
/// polled once per iteration so a server-wide shutdown causes the next
/// `ReadHeader` to race against the shutdown signal rather than block
/// forever on an idle peer.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    bank: Arc<DataBank>,
    metrics: Arc<Metrics>,
    mut shutdown: ShutdownHandle,
    max_connections: Option<u32>,
) {
    debug!(%peer, "session started");
    metrics.record_accept(max_connections);

    let reason = loop {
        let mut header_buf = [0u8; MBAP_HEADER_SIZE];

        tokio::select! {
            biased;
            () = shutdown.wait() => break CloseReason::Eof,
            result = stream.read_exact(&mut header_buf) => {
                match result {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        break CloseReason::Eof;
                    }
                    Err(e) => {
                        warn!(%peer, error = %e, "header read failed");
                        break CloseReason::IoError;
                    }
                }
            }
        }

        let transaction_id = u16::from_be_bytes([header_buf[0], header_buf[1]]);
        let protocol_id = u16::from_be_bytes([header_buf[2], header_buf[3]]);
        let length = u16::from_be_bytes([header_buf[4], header_buf[5]]);
        let unit_id = header_buf[6];

        if protocol_id != 0 || !(2 < length && length < 256) {
            warn!(%peer, protocol_id, length, "invalid MBAP header, closing connection");
            break CloseReason::FramingError;
        }

        let body_len = (length - 1) as usize;
        let mut body = vec![0u8; body_len];
        if let Err(e) = stream.read_exact(&mut body).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                break CloseReason::Eof;
            }
            warn!(%peer, error = %e, "body read failed");
            break CloseReason::IoError;
        }

        let function = body[0];
        if function > 0x7F {
            warn!(%peer, function, "reserved function code, closing connection");
            break CloseReason::FramingError;
        }

        let outcome = match dispatch::decode_and_dispatch(&body, &bank) {
            Ok(outcome) => outcome,
            Err(DecodeError::ReservedFunctionCode(_)) => {
                break CloseReason::FramingError;
            }
            Err(DecodeError::EmptyPdu | DecodeError::Truncated { .. }) => {
                Err(mbsrv_core::ExceptionCode::IllegalDataValue)
            }
        };

        metrics.record_request(function);
        if let Err(exception) = &outcome {
            metrics.record_exception(*exception);
        }

        let response_pdu = encode_outcome(function, outcome);

        let mut frame = Vec::with_capacity(MBAP_HEADER_SIZE + response_pdu.len());
        frame.extend_from_slice(&transaction_id.to_be_bytes());
        frame.extend_from_slice(&0u16.to_be_bytes());
        frame.extend_from_slice(&((response_pdu.len() + 1) as u16).to_be_bytes());
        frame.push(unit_id);
        frame.extend_from_slice(&response_pdu);

        trace!(%peer, transaction_id, bytes = frame.len(), "sending response");

        if let Err(e) = stream.write_all(&frame).await {
            warn!(%peer, error = %e, "write failed");
            break CloseReason::IoError;
        }
    };

    metrics.record_close(reason);
    debug!(%peer, ?reason, "session closed");
}
