//! Headless client that registers, wanders for a while and disconnects.

use bincode::{deserialize, serialize};
use clap::Parser;
use log::{info, warn};
use shared::{MovementIntent, Packet, Tile, DEFAULT_PORT, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    #[arg(short, long, default_value = "bot")]
    username: String,

    /// Number of input frames to send
    #[arg(short, long, default_value = "120")]
    frames: u32,

    /// Press the action key every this many frames (0 disables)
    #[arg(long, default_value = "30")]
    action_every: u32,
}

fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Cycles through the eight compass directions a few frames at a time.
fn wander(frame: u32, action_every: u32) -> MovementIntent {
    let heading = (frame / 15) % 8;
    MovementIntent {
        up: matches!(heading, 7 | 0 | 1),
        right: matches!(heading, 1..=3),
        down: matches!(heading, 3..=5),
        left: matches!(heading, 5..=7),
        action: action_every > 0 && frame % action_every == 0,
        ..MovementIntent::default()
    }
}

async fn send(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> std::io::Result<()> {
    let data = serialize(packet).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

fn describe(packet: &Packet) {
    match packet {
        Packet::WorldState {
            tick,
            level,
            players,
            npcs,
            ..
        } => info!(
            "tick {} level {}: {} players, {} npcs",
            tick,
            level,
            players.len(),
            npcs.len()
        ),
        Packet::FloorData { floor } => {
            let walkable = floor
                .tiles
                .iter()
                .filter_map(|code| Tile::from_code(*code))
                .filter(|tile| !tile.is_solid())
                .count();
            info!(
                "floor {} ({}x{}, {} walkable) up {:?} down {:?}",
                floor.level, floor.width, floor.height, walkable, floor.up_stairs, floor.down_stairs
            )
        }
        Packet::FloorChanged { level, direction } => {
            info!("moved {} to level {}", direction.as_str(), level)
        }
        Packet::PositionCorrection { x, y, .. } => info!("corrected to ({:.1}, {:.1})", x, y),
        Packet::Error { message } => warn!("server error: {}", message),
        other => info!("{:?}", other),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let server_addr = args.server.parse::<SocketAddr>()?;
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    info!("Bot socket bound to {}", socket.local_addr()?);

    send(
        &socket,
        &Packet::Register {
            client_version: PROTOCOL_VERSION,
            username: args.username.clone(),
        },
        server_addr,
    )
    .await?;

    let mut buf = [0u8; 65536];
    let (len, _) = timeout(Duration::from_secs(3), socket.recv_from(&mut buf)).await??;
    match deserialize::<Packet>(&buf[..len])? {
        Packet::Registered { player_id, level } => {
            info!("Registered as player {} on level {}", player_id, level)
        }
        other => {
            warn!("Expected Registered but got: {:?}", other);
            return Ok(());
        }
    }

    for frame in 1..=args.frames {
        let input = Packet::Input {
            sequence: frame,
            timestamp: get_timestamp(),
            intent: wander(frame, args.action_every),
        };
        send(&socket, &input, server_addr).await?;

        // Drain whatever has arrived since the last frame
        while let Ok(Ok((len, _))) =
            timeout(Duration::from_millis(1), socket.recv_from(&mut buf)).await
        {
            match deserialize::<Packet>(&buf[..len]) {
                Ok(packet) => describe(&packet),
                Err(e) => warn!("Undecodable packet: {}", e),
            }
        }
        sleep(Duration::from_millis(33)).await;
    }

    send(&socket, &Packet::Disconnect, server_addr).await?;
    info!("Bot finished");
    Ok(())
}
