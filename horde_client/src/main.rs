//! Standalone headless client (bot).
//!
//! Usage:
//!   cargo run -p horde_client -- [--addr 127.0.0.1:3000] [--id bot_1] [--name Bot]
//!
//! The bot connects, joins, wanders around and hits any enemy that comes
//! close. Stdin accepts a few commands:
//!   status          - Show local world view
//!   say <message>   - Send chat message
//!   quit            - Exit client

use std::env;
use std::io::{BufRead, Write};
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use horde_client::{client::ClientState, input::Wander, GameClient};
use horde_shared::net::{CharacterId, ServerMsg};
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

struct BotArgs {
    addr: String,
    id: String,
    name: String,
}

fn parse_args() -> BotArgs {
    let mut out = BotArgs {
        addr: "127.0.0.1:3000".to_string(),
        id: format!("bot_{}", std::process::id()),
        name: "Bot".to_string(),
    };
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                out.addr = args[i + 1].clone();
                i += 2;
            }
            "--id" if i + 1 < args.len() => {
                out.id = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                out.name = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    out
}

const STEP: f32 = 4.0;
const WANDER_BOUND: f32 = 1000.0;
const HIT_RANGE: f32 = 150.0;
const HIT_DAMAGE: f32 = 10.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let addr: SocketAddr = args.addr.parse().context("parse --addr")?;
    info!(server = %addr, id = %args.id, "Starting client");

    let mut client = GameClient::connect(addr).await.context("connect")?;
    let me = CharacterId::new(args.id.clone());
    client.join(&me, &args.name, None, None).await?;

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

    println!("Client joined as {me}. Type 'status' for info, 'quit' to exit.");
    println!();

    let mut wander = Wander::new(STEP, WANDER_BOUND);
    let mut rng = rand::rngs::StdRng::from_entropy();
    let mut move_tick = interval(Duration::from_millis(100));
    move_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut hit_tick = interval(Duration::from_millis(500));
    hit_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = client.recv() => match msg {
                Ok(ServerMsg::PlayerDied { player_id }) if player_id == me => {
                    info!("Killed; rejoining");
                    client.join(&me, &args.name, None, None).await?;
                }
                Ok(ServerMsg::ChatBroadcast(env)) => println!("[{}] {}", env.name, env.message),
                Ok(_) => {}
                Err(_) => {}
            },
            _ = move_tick.tick() => {
                let to = wander.next(client.position, &mut rng);
                client.move_to(to).await?;
            }
            _ = hit_tick.tick() => {
                let target = client.world.nearest_enemy(client.position, HIT_RANGE).map(|e| e.id);
                if let Some(enemy) = target {
                    client.hit_enemy(enemy, HIT_DAMAGE).await?;
                }
            }
            Some(line) = console_rx.recv() => {
                let tokens: Vec<&str> = line.split_whitespace().collect();
                match tokens.first().copied() {
                    Some("status") => {
                        println!("State: {:?}", client.state);
                        println!("Connection: {}", client.connection_id);
                        println!("Position: ({:.1}, {:.1})", client.position.x, client.position.y);
                        println!("Players: {}", client.world.players.len());
                        println!("Enemies: {}", client.world.enemies.len());
                    }
                    Some("say") => client.chat(&tokens[1..].join(" ")).await?,
                    Some("quit") | Some("exit") => break,
                    _ => println!("Commands: status, say <message>, quit"),
                }
            }
        }

        if client.state == ClientState::Disconnected {
            println!("Disconnected from server.");
            break;
        }
    }

    let _ = client.close().await;
    Ok(())
}
