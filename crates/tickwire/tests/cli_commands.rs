#![cfg(feature = "cli")]

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn tickwire() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_tickwire"));
    command.arg("--log-level").arg("error");
    command
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("listener should bind")
        .local_addr()
        .expect("local addr")
        .port()
}

fn wait_for_listener(port: u16, timeout: Duration) {
    let start = Instant::now();
    while TcpStream::connect(("127.0.0.1", port)).is_err() {
        if start.elapsed() >= timeout {
            panic!("server on port {port} did not come up");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn send_writes_one_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let port = listener.local_addr().expect("local addr").port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let mut wire = Vec::new();
        stream.read_to_end(&mut wire).expect("read until client closes");
        wire
    });

    let status = tickwire()
        .args(["send", "127.0.0.1", &port.to_string(), "--protocol", "5"])
        .args(["--data", "hi"])
        .status()
        .expect("send should run");
    assert!(status.success());

    let wire = server.join().expect("server thread");
    // Heartbeats are 1s apart by default; the client is gone long before.
    assert_eq!(wire, [0x08, 0x00, 0x00, 0x00, 0x05, 0x00, b'h', b'i']);
}

#[test]
fn send_wait_prints_echo_from_serve() {
    let port = free_port();
    let mut server = tickwire()
        .args(["serve", &format!("127.0.0.1:{port}"), "--count", "1"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_listener(port, Duration::from_secs(5));

    let output = tickwire()
        .args(["--format", "json", "send", "127.0.0.1", &port.to_string()])
        .args(["--protocol", "300", "--json", "{\"hello\":\"world\"}"])
        .args(["--wait", "--wait-timeout", "3s"])
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let line = String::from_utf8(output.stdout).expect("utf8 stdout");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json output");
    assert_eq!(value["protocol"], 300);
    assert_eq!(value["protocol_name"], "USER");
    assert_eq!(value["payload"], "{\"hello\":\"world\"}");

    let status = server.wait().expect("serve should exit");
    assert!(status.success());
}

#[test]
fn connect_refused_exits_with_failure() {
    let port = free_port();
    let status = tickwire()
        .args(["connect", "127.0.0.1", &port.to_string(), "--timeout", "2s"])
        .status()
        .expect("connect should run");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn invalid_duration_is_usage_error() {
    let status = tickwire()
        .args(["send", "127.0.0.1", "1", "--timeout", "soon"])
        .status()
        .expect("send should run");
    assert_eq!(status.code(), Some(64));
}

#[test]
fn version_prints_name() {
    let output = tickwire()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("tickwire "));
}
