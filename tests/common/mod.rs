#![allow(dead_code)]
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command as StdCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::cargo::{self};

/// Test helper that starts/stops a bounce server for integration tests.
pub struct EchoServerTest {
    child: Child,
    addr: String,
    port: u16,
}

impl EchoServerTest {
    /// Start the server on an ephemeral localhost port.
    pub fn start() -> Self {
        // Choose a free local port to avoid conflicts across tests/machines.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
            let p = l.local_addr().expect("local addr").port();
            drop(l);
            p
        };
        let addr = format!("127.0.0.1:{port}");

        let bin_path = cargo::cargo_bin!("bounce");
        let mut child = StdCommand::new(bin_path)
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn bounce server");

        // Wait until the server starts accepting connections on the chosen port.
        let start = Instant::now();
        loop {
            match TcpStream::connect(&addr) {
                Ok(_) => break,
                Err(_) => {
                    if start.elapsed() > Duration::from_secs(5) {
                        let _ = child.kill();
                        let _ = child.wait();
                        panic!("Timed out waiting for server to accept connections on {addr}");
                    }
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }

        Self { child, addr, port }
    }

    /// Open a new TCP connection to the running server.
    pub fn connect(&self) -> TcpStream {
        let stream = TcpStream::connect(&self.addr).expect("connect to server");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        stream
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Drop for EchoServerTest {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
