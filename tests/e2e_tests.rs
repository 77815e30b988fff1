//! End-to-end tests against a spawned router process

mod common;

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use common::free_port;

/// Router child process, killed on drop
struct RouterProcess {
    child: Child,
    port: u16,
}

impl RouterProcess {
    fn spawn(group_size: u32) -> Self {
        let port = free_port();
        let child = Command::new(env!("CARGO_BIN_EXE_peer-review"))
            .args([
                "-q",
                "serve",
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
                "-n",
                &group_size.to_string(),
            ])
            .env_remove("PEER_REVIEW_CONFIG")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        Self { child, port }
    }

    fn connect(&self) -> Peer {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            match TcpStream::connect(("127.0.0.1", self.port)) {
                Ok(stream) => return Peer::new(stream),
                Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
                Err(e) => panic!("router never came up: {}", e),
            }
        }
    }
}

impl Drop for RouterProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

struct Peer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send(&mut self, line: &str) {
        self.writer.write_all(format!("{}\n", line).as_bytes()).unwrap();
    }

    fn recv(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }
}

#[test]
fn test_pair_of_workers_exchange_a_review() {
    let router = RouterProcess::spawn(2);

    let mut first = router.connect();
    first.send("client");
    let mut second = router.connect();
    second.send("client");

    assert_eq!(first.recv(), "start 0");
    assert_eq!(second.recv(), "start 1");

    first.send("check 1 0");
    assert_eq!(second.recv(), "check 1 0");

    second.send("queue 1");
    assert_eq!(second.recv(), "queue 0 1");

    second.send("reviewed 0 1 0");
    assert_eq!(first.recv(), "reviewed 0 1 0");

    second.send("queue 1");
    assert_eq!(second.recv(), "queue -1 1");
}

#[test]
fn test_full_group_refuses_extra_client() {
    let router = RouterProcess::spawn(2);

    let mut first = router.connect();
    first.send("client");
    let mut second = router.connect();
    second.send("client");
    assert_eq!(first.recv(), "start 0");
    assert_eq!(second.recv(), "start 1");

    let mut extra = router.connect();
    extra.send("client");
    assert_eq!(extra.recv(), "break 2");
}

#[test]
fn test_monitor_sees_group_start() {
    let router = RouterProcess::spawn(2);

    let mut monitor = router.connect();
    monitor.send("monitor");
    // Attach is asynchronous to the next client's accept
    thread::sleep(Duration::from_millis(200));

    let mut first = router.connect();
    first.send("client");
    let mut second = router.connect();
    second.send("client");
    assert_eq!(first.recv(), "start 0");

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let line = monitor.recv();
        if line.contains("work started") {
            break;
        }
        assert!(Instant::now() < deadline, "no start event seen");
    }
}
