//! Asks a running daemon to evaluate immediately.
//!
//! Usage:
//!   cargo run --bin trigger_now
//!
//! Honours `TRIGGER_PORT` (from the environment or `.env`).

use std::{
    env,
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, TcpStream},
    process,
    time::Duration,
};

const DEFAULT_TRIGGER_PORT: u16 = 65432;

fn main() {
    let _ = dotenvy::dotenv();

    let port = match env::var("TRIGGER_PORT") {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            eprintln!("Error: TRIGGER_PORT must be a valid port number, got {raw:?}");
            process::exit(2);
        }),
        Err(_) => DEFAULT_TRIGGER_PORT,
    };
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));

    match TcpStream::connect_timeout(&addr, Duration::from_secs(2)) {
        Ok(_stream) => println!("Trigger sent to temperature alert service."),
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
            eprintln!("Error: temperature alert service is not running on port {port}.");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
