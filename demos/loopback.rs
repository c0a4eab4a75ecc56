//! Loopback Master - drives a simulated RMF device over an in-memory pipe.
//!
//! This example demonstrates:
//! - Connecting a master to any `AsyncRead + AsyncWrite` transport
//! - Writing and reading registers
//! - Observing unsolicited traffic and frame errors
//!
//! # Running
//!
//! ```text
//! RUST_LOG=rmf_master=debug cargo run --example loopback
//! ```

use std::collections::HashMap;
use std::time::Duration;

use rmf_master::protocol::{FrameParser, Message, ParseEvent, RESPONSE_FLAG};
use rmf_master::RmfMaster;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Address the simulated device answers to.
const DEVICE_ADDRESS: u8 = 5;

/// A register-file device speaking RMF on its side of the pipe.
async fn simulated_device(mut port: DuplexStream) {
    let mut registers: HashMap<u16, u16> = HashMap::new();
    let mut parser = FrameParser::new();
    let mut buf = [0u8; 64];

    loop {
        let n = match port.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        for event in parser.push(&buf[..n]) {
            let ParseEvent::Message(cmd) = event else {
                continue;
            };
            if cmd.device_address != DEVICE_ADDRESS {
                continue;
            }

            let data = match cmd.command {
                2 => registers.get(&cmd.register).copied().unwrap_or(0),
                3 => {
                    registers.insert(cmd.register, cmd.data);
                    0
                }
                _ => continue,
            };

            let reply = Message::new(
                cmd.device_address,
                cmd.command | RESPONSE_FLAG,
                cmd.register,
                data,
            );
            if port.write_all(&reply.to_wire()).await.is_err() {
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (master_side, device_side) = duplex(256);
    tokio::spawn(simulated_device(device_side));

    let master = RmfMaster::builder()
        .response_timeout(Duration::from_millis(100))
        .connect(master_side)?;

    let mut events = master.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ParseEvent::Message(msg) => println!("observed {:?}", msg),
                ParseEvent::Error(err) => println!("observed error: {}", err),
            }
        }
    });

    master.write_register(5, 10, 1234).await?;
    println!("register 10 = {}", master.read_register(5, 10).await?);

    // Nobody answers at address 6.
    match master.read_register(6, 10).await {
        Ok(value) => println!("unexpected answer {}", value),
        Err(e) => println!("address 6: {}", e),
    }

    // Rejected before anything is sent.
    if let Err(e) = master.write_register(64, 1, 1).await {
        println!("address 64: {}", e);
    }

    master.close().await?;
    Ok(())
}
