//! IMPv2 message injection utility
//!
//! A small tool for poking a running agent from the command line: binds an
//! ephemeral socket, sends one message, and optionally waits briefly for a
//! reply.
//!
//! ## Usage
//!
//! ```bash
//! # Ask an agent for its status
//! imp-send --to IT --port 10700 STATUS
//!
//! # Start a 30 second operation and watch the DONE come back
//! imp-send --to IT --port 10700 --wait 5 GO 30
//!
//! # Liveness check
//! imp-send --to IT --port 10700 PING
//!
//! # Send an explicit EXEC from a named console
//! imp-send --to IT --port 10700 --from MC1 --kind EXEC ABORT
//! ```

use clap::Parser;
use std::process;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};

use impagent::protocol::{Message, MessageKind};
use impagent::transport::{resolve, RECV_BUFFER_LEN};

/// Send one IMPv2 message to an agent
#[derive(Parser)]
#[command(name = "imp-send")]
#[command(about = "Send one IMPv2 message to a running agent")]
#[command(version)]
struct Args {
    /// Recipient node id
    #[arg(long, required = true)]
    to: String,

    /// Target host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Target UDP port
    #[arg(long, required = true)]
    port: u16,

    /// Sender node id to claim
    #[arg(long, default_value = "OPER")]
    from: String,

    /// Message type (REQ, EXEC, DONE, STATUS, WARNING, ERROR, FATAL)
    #[arg(long, default_value = "REQ")]
    kind: String,

    /// Seconds to wait for a reply (0 = fire and forget)
    #[arg(long, default_value = "2")]
    wait: u64,

    /// Message body
    #[arg(trailing_var_arg = true)]
    body: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let kind = match MessageKind::from_token(&format!("{}:", args.kind.to_ascii_uppercase())) {
        Some(kind) => kind,
        None => {
            eprintln!("unknown message type: {}", args.kind);
            process::exit(1);
        }
    };

    let body = args.body.join(" ");
    let wire = match Message::new(&args.from, &args.to, kind, &body).encode() {
        Ok(wire) => wire,
        Err(e) => {
            eprintln!("cannot encode message: {e}");
            process::exit(1);
        }
    };

    let target = match resolve(&args.host, args.port).await {
        Ok(target) => target,
        Err(e) => {
            eprintln!("cannot resolve {}:{}: {e}", args.host, args.port);
            process::exit(1);
        }
    };

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            eprintln!("cannot bind socket: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = socket.send_to(wire.as_bytes(), target).await {
        eprintln!("send failed: {e}");
        process::exit(1);
    }
    println!("sent to {target}: {}", wire.trim_end());

    if args.wait == 0 {
        return;
    }

    let mut buf = [0u8; RECV_BUFFER_LEN];
    match timeout(Duration::from_secs(args.wait), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => {
            let raw = String::from_utf8_lossy(&buf[..len]);
            println!("reply from {from}: {}", raw.trim_end());
        }
        Ok(Err(e)) => {
            eprintln!("receive failed: {e}");
            process::exit(1);
        }
        Err(_) => println!("no reply within {}s", args.wait),
    }
}
