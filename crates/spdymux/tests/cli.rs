#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn spdymux() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_spdymux"));
    cmd.arg("--log-level").arg("error");
    cmd
}

struct Server {
    child: Child,
    addr: String,
}

impl Server {
    fn start_once() -> Self {
        let mut child = spdymux()
            .arg("serve")
            .arg("127.0.0.1:0")
            .arg("--once")
            .arg("--print-addr")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");

        let stdout = child.stdout.take().expect("stdout should be piped");
        let mut addr = String::new();
        BufReader::new(stdout)
            .read_line(&mut addr)
            .expect("serve should print its address");
        Self {
            child,
            addr: addr.trim().to_string(),
        }
    }

    fn wait(mut self, timeout: Duration) -> Option<i32> {
        let start = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait().expect("serve should be waitable") {
                return status.code();
            }
            if start.elapsed() >= timeout {
                let _ = self.child.kill();
                let _ = self.child.wait();
                return None;
            }
            thread::sleep(Duration::from_millis(25));
        }
    }
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be json"))
        .collect()
}

#[test]
fn get_against_serve_echoes_headers_and_body() {
    let server = Server::start_once();

    let output = spdymux()
        .arg("--format")
        .arg("json")
        .arg("get")
        .arg(&server.addr)
        .arg("--path")
        .arg("/echo")
        .arg("--header")
        .arg("x-test=1")
        .arg("--data")
        .arg("hello")
        .output()
        .expect("get should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let records = json_lines(&output);
    assert_eq!(records.len(), 2);

    assert_eq!(records[0]["kind"], "headers");
    assert_eq!(records[0]["stream_id"], 1);
    assert_eq!(records[0]["headers"][":status"][0], "200");
    assert_eq!(records[0]["headers"][":method"][0], "GET");
    assert_eq!(records[0]["headers"][":path"][0], "/echo");
    assert_eq!(records[0]["headers"]["x-test"][0], "1");

    assert_eq!(records[1]["kind"], "data");
    assert_eq!(records[1]["payload"], "hello");
    assert_eq!(records[1]["payload_size"], 5);

    assert_eq!(server.wait(Duration::from_secs(5)), Some(0));
}

#[test]
fn get_lines_sends_one_frame_per_line() {
    let server = Server::start_once();

    let mut child = spdymux()
        .arg("--format")
        .arg("json")
        .arg("get")
        .arg(&server.addr)
        .arg("--lines")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("get should start");
    child
        .stdin
        .take()
        .expect("stdin should be piped")
        .write_all(b"first\nsecond\r\n")
        .expect("stdin should accept input");
    let output = child.wait_with_output().expect("get should finish");

    assert!(output.status.success());
    let payloads: Vec<String> = json_lines(&output)
        .into_iter()
        .filter(|record| record["kind"] == "data")
        .map(|record| record["payload"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(payloads, vec!["first", "second"]);

    assert_eq!(server.wait(Duration::from_secs(5)), Some(0));
}

#[test]
fn get_raw_prints_body_only() {
    let server = Server::start_once();

    let output = spdymux()
        .arg("--format")
        .arg("raw")
        .arg("get")
        .arg(&server.addr)
        .arg("--data")
        .arg("raw body")
        .output()
        .expect("get should run");

    assert!(output.status.success());
    assert_eq!(output.stdout, b"raw body");
    let _ = server.wait(Duration::from_secs(5));
}

#[test]
fn get_refused_connection_returns_3() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("ephemeral bind");
        listener.local_addr().expect("local addr").to_string()
    };

    let output = spdymux()
        .arg("get")
        .arg(&addr)
        .arg("--timeout")
        .arg("2s")
        .output()
        .expect("get should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn malformed_header_returns_64() {
    let output = spdymux()
        .arg("get")
        .arg("127.0.0.1:1")
        .arg("--header")
        .arg("missing-separator")
        .output()
        .expect("get should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package_version() {
    let output = spdymux()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("spdymux {}", env!("CARGO_PKG_VERSION"))
    );
}
