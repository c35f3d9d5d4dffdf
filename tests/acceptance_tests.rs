//! End-to-end acceptance tests driven over real TCP sockets against a
//! spawned [`Listener`], exercising the MBAP framing rules and dispatch
//! policy exactly as a client on the wire would see them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mbsrv_core::DataBank;
use mbsrv_daemon::{Listener, Metrics, ShutdownHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn spawn_listener() -> (SocketAddr, Arc<DataBank>, Arc<Metrics>, ShutdownHandle) {
    let bank = Arc::new(DataBank::new());
    let metrics = Arc::new(Metrics::new());
    let shutdown = ShutdownHandle::new();

    let listener = Listener::bind(
        "127.0.0.1:0",
        bank.clone(),
        metrics.clone(),
        shutdown.clone(),
        None,
    )
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();
    listener.spawn();

    (addr, bank, metrics, shutdown)
}

async fn roundtrip(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream.write_all(request).await.unwrap();

    let mut header = [0u8; 7];
    stream.read_exact(&mut header).await.unwrap();
    let length = u16::from_be_bytes([header[4], header[5]]);
    let mut body = vec![0u8; (length - 1) as usize];
    stream.read_exact(&mut body).await.unwrap();

    let mut full = header.to_vec();
    full.extend_from_slice(&body);
    full
}

#[tokio::test]
async fn read_three_coils_on_a_fresh_bank() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = roundtrip(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0xFF, 0x01, 0x00, 0x00, 0x00, 0x03],
    )
    .await;

    assert_eq!(
        response,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0xFF, 0x01, 0x01, 0x00]
    );
}

#[tokio::test]
async fn write_single_coil_is_visible_to_a_later_read() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let write = roundtrip(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x07, 0xFF, 0x00],
    )
    .await;
    assert_eq!(
        write,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x05, 0x00, 0x07, 0xFF, 0x00]
    );

    let read = roundtrip(
        &mut stream,
        &[0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x01, 0x00, 0x00, 0x00, 0x0A],
    )
    .await;
    assert_eq!(
        read,
        vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x01, 0x02, 0x80, 0x00]
    );
}

#[tokio::test]
async fn write_single_register_then_read_it_back() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let write = roundtrip(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x0A, 0x12, 0x34],
    )
    .await;
    assert_eq!(
        write,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x06, 0x00, 0x0A, 0x12, 0x34]
    );

    let read = roundtrip(
        &mut stream,
        &[0x00, 0x02, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x0A, 0x00, 0x01],
    )
    .await;
    assert_eq!(
        read,
        vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x12, 0x34]
    );
}

#[tokio::test]
async fn zero_quantity_is_an_illegal_data_value_exception() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = roundtrip(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x00],
    )
    .await;

    assert_eq!(
        response,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x03]
    );
}

#[tokio::test]
async fn address_overflow_is_an_illegal_data_address_exception() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = roundtrip(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0xFF, 0xFF, 0x00, 0x02],
    )
    .await;

    assert_eq!(
        response,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0x83, 0x02]
    );
}

#[tokio::test]
async fn unknown_function_code_is_an_illegal_function_exception() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let response = roundtrip(
        &mut stream,
        &[0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01, 0x42, 0x00, 0x00, 0x00, 0x01],
    )
    .await;

    assert_eq!(
        response,
        vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x03, 0x01, 0xC2, 0x01]
    );
}

#[tokio::test]
async fn truncated_header_closes_the_connection_silently() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&[0x00, 0x01, 0x00, 0x00]).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close promptly")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn nonzero_protocol_id_closes_the_connection() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(&[0x00, 0x01, 0x00, 0x01, 0x00, 0x06, 0x01, 0x03, 0x00, 0x00, 0x00, 0x01])
        .await
        .unwrap();

    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server should close promptly")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn length_field_out_of_the_valid_range_closes_the_connection() {
    let (addr, _bank, _metrics, _shutdown) = spawn_listener().await;

    // length = 2 is below the minimum of 3 (unit id + at least a 2-byte PDU).
    let mut short = TcpStream::connect(addr).await.unwrap();
    short
        .write_all(&[0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x01])
        .await
        .unwrap();
    let mut buf = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(2), short.read(&mut buf))
        .await
        .expect("server should close promptly")
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn concurrent_clients_writing_distinct_registers_lose_no_updates() {
    let (addr, bank, _metrics, _shutdown) = spawn_listener().await;

    let mut tasks = Vec::new();
    for client in 0u16..8 {
        let addr = addr;
        tasks.push(tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for round in 0u16..20 {
                let value = client * 100 + round;
                let pdu = [
                    0x06,
                    (client >> 8) as u8,
                    (client & 0xFF) as u8,
                    (value >> 8) as u8,
                    (value & 0xFF) as u8,
                ];
                let mut request = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x06, 0x01];
                request.extend_from_slice(&pdu);
                let response = roundtrip(&mut stream, &request).await;
                assert_eq!(response[7], 0x06);
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    for client in 0u16..8 {
        let expected = client * 100 + 19;
        assert_eq!(bank.get_words(client, 1).unwrap(), vec![expected]);
    }
}
