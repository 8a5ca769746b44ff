//! Black-box scenarios S1-S6 driven straight through the dispatcher.

use bytes::Bytes;
use mysql_sniff::dispatcher::{Dispatcher, SqlSink};
use mysql_sniff::protocol::packet::Packet;
use tokio::sync::mpsc;

#[derive(Default)]
struct CapturedLines(Vec<String>);

impl SqlSink for CapturedLines {
    fn emit(&mut self, line: &str) {
        self.0.push(line.to_string());
    }
}

fn packet(seq: u8, payload: &[u8]) -> Packet {
    Packet {
        seq,
        payload: Bytes::copy_from_slice(payload),
    }
}

/// Drive one connection's client/server packets through a fresh
/// `Dispatcher`, returning every emitted line.
async fn drive(client_packets: Vec<Packet>, server_packets: Vec<Packet>) -> Vec<String> {
    let (server_tx, mut server_rx) = mpsc::channel(16);
    for p in server_packets {
        server_tx.send(p).await.unwrap();
    }
    drop(server_tx);

    let mut dispatcher = Dispatcher::new(CapturedLines::default());
    let (client_tx, mut client_rx) = mpsc::channel(16);
    for p in client_packets {
        client_tx.send(p).await.unwrap();
    }
    drop(client_tx);

    while let Some(packet) = client_rx.recv().await {
        dispatcher.dispatch_for_test(packet, &mut server_rx).await;
    }
    dispatcher.into_sink().0
}

fn prepare_ok(stmt_id: u32, num_columns: u16, num_params: u16) -> Vec<u8> {
    let mut out = vec![0u8];
    out.extend_from_slice(&stmt_id.to_le_bytes());
    out.extend_from_slice(&num_columns.to_le_bytes());
    out.extend_from_slice(&num_params.to_le_bytes());
    out
}

fn prepare_request(query: &[u8]) -> Vec<u8> {
    let mut out = vec![0x16u8];
    out.extend_from_slice(query);
    out
}

fn execute_request(stmt_id: u32, bitmap: &[u8], new_bound: u8, types: &[(u8, u8)], values: &[u8]) -> Vec<u8> {
    let mut out = vec![0x17u8];
    out.extend_from_slice(&stmt_id.to_le_bytes());
    out.push(0); // flags
    out.extend_from_slice(&1u32.to_le_bytes()); // iteration count
    out.extend_from_slice(bitmap);
    out.push(new_bound);
    if new_bound == 1 {
        for (t, f) in types {
            out.push(*t);
            out.push(*f);
        }
    }
    out.extend_from_slice(values);
    out
}

fn long_data_request(stmt_id: u32, param_index: u16, data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x18u8];
    out.extend_from_slice(&stmt_id.to_le_bytes());
    out.extend_from_slice(&param_index.to_le_bytes());
    out.extend_from_slice(data);
    out
}

#[tokio::test]
async fn s1_text_insert() {
    let lines = drive(
        vec![packet(0, b"\x03insert into test_sql.test values( 7, '7' )")],
        vec![],
    )
    .await;
    assert_eq!(lines, vec!["insert into test_sql.test values( 7, '7' );"]);
}

#[tokio::test]
async fn s2_prepare_execute_int_and_string() {
    let mut values = Vec::new();
    values.extend_from_slice(&1024i32.to_le_bytes());
    values.push(4);
    values.extend_from_slice(b"1024");

    let lines = drive(
        vec![
            packet(0, &prepare_request(b"insert into test_sql.test values( ?, ? )")),
            packet(1, &execute_request(1, &[0x00], 1, &[(0x03, 0x00), (0xFD, 0x00)], &values)),
        ],
        vec![packet(1, &prepare_ok(1, 0, 2))],
    )
    .await;

    assert_eq!(
        lines,
        vec![
            "# exec prepare stmt:  insert into test_sql.test values( ?, ? );",
            "# binary exec a prepare stmt rewrite it like: ",
            "insert into test_sql.test values( 1024, '1024' )",
        ]
    );
}

#[tokio::test]
async fn s3_prepare_execute_both_null() {
    let lines = drive(
        vec![
            packet(0, &prepare_request(b"insert into test_sql.test values( ?, ? )")),
            packet(1, &execute_request(1, &[0x03], 1, &[(0x03, 0x00), (0xFD, 0x00)], &[])),
        ],
        vec![packet(1, &prepare_ok(1, 0, 2))],
    )
    .await;

    assert_eq!(
        lines[2],
        "insert into test_sql.test values( NULL, NULL )"
    );
}

#[tokio::test]
async fn s4_long_data() {
    let lines = drive(
        vec![
            packet(0, &prepare_request(b"select ? ;")),
            packet(1, &long_data_request(1, 0, b"hello ")),
            packet(2, &long_data_request(1, 0, b"world")),
            packet(3, &execute_request(1, &[0x01], 0, &[], &[])),
        ],
        vec![packet(1, &prepare_ok(1, 0, 1))],
    )
    .await;

    assert_eq!(lines[2], "select 'hello world' ;");
}

#[tokio::test]
async fn s5_unknown_statement_id_emits_nothing() {
    let lines = drive(
        vec![packet(0, &execute_request(42, &[], 0, &[], &[]))],
        vec![],
    )
    .await;
    assert!(lines.is_empty());
}

#[tokio::test]
async fn s6_init_db() {
    let lines = drive(vec![packet(0, b"\x02test_sql")], vec![]).await;
    assert_eq!(lines, vec!["use test_sql;"]);
}
