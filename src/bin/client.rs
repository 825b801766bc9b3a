//! Interactive echo client.
//!
//! Opens one connection and exchanges lines with the operator: each line
//! typed is sent to the server and the echoed reply printed. Typing
//! `exit` quits without sending; the server itself never interprets
//! payload bytes, so the convention is purely client-side.

use bounce::net::{Endpoint, ReadStatus, TcpSocket, WriteStatus};
use clap::Parser;
use std::io::{self, BufRead, Write};

const RECV_BUFFER_SIZE: usize = 1024;

/// Command-line arguments for the echo client
#[derive(Parser, Debug)]
#[command(name = "bounce-client")]
#[command(about = "Interactive client for the bounce echo server", long_about = None)]
struct CliArgs {
    /// IPv4 address of the server
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 5008)]
    port: u16,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let addr = Endpoint::parse(&args.host, args.port)?;

    // The socket stays in blocking mode; each send waits for its echo.
    let mut socket = TcpSocket::open()?;
    socket.connect(addr)?;
    println!("Connected to {addr}");

    let stdin = io::stdin();
    let mut line = String::new();
    let mut recv_buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim_end_matches(['\r', '\n']);
        if message == "exit" {
            break;
        }
        if message.is_empty() {
            continue;
        }

        if let WriteStatus::WouldBlock = socket.write(message.as_bytes())? {
            continue;
        }

        match socket.read(&mut recv_buf)? {
            ReadStatus::Data(n) => {
                println!("echo: {}", String::from_utf8_lossy(&recv_buf[..n]));
            }
            ReadStatus::Closed => {
                println!("Server disconnected");
                break;
            }
            ReadStatus::WouldBlock => continue,
        }
    }

    Ok(())
}
