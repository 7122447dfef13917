//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p horde_server -- [--config server.json] [--addr 127.0.0.1:3000]
//!                                [--tick-ms 16] [--broadcast-ms 100]
//!
//! Flags override values loaded from `--config`.
//!
//! Console commands:
//!   status         - Show connections, players and enemies
//!   spawn [count]  - Spawn enemies regardless of the cap
//!   quit           - Shutdown server

use std::env;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use horde_server::server::{ConsoleReply, GameServer};
use horde_shared::{character::InMemoryDirectory, config::ServerConfig};
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ServerConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => ServerConfig::from_json_file(&args[i + 1])?,
        _ => ServerConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-ms" if i + 1 < args.len() => {
                cfg.tick_ms = args[i + 1].parse().context("parse --tick-ms")?;
                i += 2;
            }
            "--broadcast-ms" if i + 1 < args.len() => {
                cfg.broadcast_ms = args[i + 1].parse().context("parse --broadcast-ms")?;
                i += 2;
            }
            "--config" => i += 2,
            other => {
                warn!(arg = %other, "Ignoring unknown argument");
                i += 1;
            }
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(
        addr = %cfg.server_addr,
        tick_ms = cfg.tick_ms,
        broadcast_ms = cfg.broadcast_ms,
        max_enemies = cfg.world.max_enemies,
        "Starting server"
    );

    let server = Arc::new(
        GameServer::bind(cfg, Arc::new(InMemoryDirectory::new()))
            .await
            .context("create server")?,
    );
    let local = server.local_addr()?;
    info!(%local, "Server listening");
    let mut task = server.clone().spawn();

    // Stdin reader thread feeding the console.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Server ready. Type 'status' for info, 'spawn [count]' to add enemies, 'quit' to exit.");
    println!();

    loop {
        tokio::select! {
            Some(line) = console_rx.recv() => match server.exec_console(&line) {
                ConsoleReply::Lines(lines) => {
                    for l in lines {
                        println!("{l}");
                    }
                }
                ConsoleReply::Quit => break,
            },
            res = &mut task => {
                res.context("server task panicked")??;
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    task.abort();
    Ok(())
}
