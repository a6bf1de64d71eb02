//! End-to-end tests driving the compiled `kvcli` binary, matching the
//! teacher's `kv-cli/tests/cli.rs` use of `assert_cmd`.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use assert_cmd::cargo::cargo_bin;
use predicates::str::contains;

#[test]
fn help_lists_the_serve_and_client_subcommands() {
    let mut cmd = assert_cmd::Command::cargo_bin("kvcli").unwrap();
    cmd.arg("--help").assert().success().stdout(contains("serve")).stdout(contains("client"));
}

struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_server(tcp_addr: &str) -> ServerGuard {
    let child = Command::new(cargo_bin("kvcli"))
        .args(["serve", "--tcp-addr", tcp_addr, "--no-http"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn kvcli serve");
    ServerGuard(child)
}

fn connect_with_retry(addr: &str) -> TcpStream {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(stream) = TcpStream::connect(addr) {
            return stream;
        }
        if std::time::Instant::now() > deadline {
            panic!("server never came up on {addr}");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
#[serial_test::serial]
fn set_get_del_over_the_wire_matches_the_literal_scenario() {
    let addr = "127.0.0.1:18888";
    let _server = spawn_server(addr);
    let stream = connect_with_retry(addr);
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    let mut roundtrip = |line: &str| -> String {
        writeln!(writer, "{line}").unwrap();
        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        response
    };

    assert_eq!(roundtrip("SET a 1"), "OK\r\n");
    assert_eq!(roundtrip("GET a"), "1\n");
    assert_eq!(roundtrip("DEL a"), "OK\r\n");
    assert_eq!(roundtrip("GET a"), "\r\n");
}

#[test]
#[serial_test::serial]
fn rollback_discards_an_uncommitted_set() {
    let addr = "127.0.0.1:18889";
    let _server = spawn_server(addr);
    let stream = connect_with_retry(addr);
    let mut writer = stream.try_clone().unwrap();
    let mut reader = BufReader::new(stream);

    let mut roundtrip = |line: &str| -> String {
        writeln!(writer, "{line}").unwrap();
        let mut response = String::new();
        reader.read_line(&mut response).unwrap();
        response
    };

    assert_eq!(roundtrip("BEGIN"), "OK\r\n");
    assert_eq!(roundtrip("SET x hello"), "OK\r\n");
    assert_eq!(roundtrip("ROLLBACK"), "OK\r\n");
    assert_eq!(roundtrip("GET x"), "\r\n");
}
