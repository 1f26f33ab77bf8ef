//! Server network layer: UDP tasks, packet validation and the fixed-rate simulation loop.
//!
//! Every world mutation happens on the task running [`Server::run`]. Packets and
//! timeouts reach it through one channel, ticks through an interval, and `select!`
//! serialises the two, so a broadcast snapshot never observes a half-applied command.

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::world::{WorldEvent, WorldManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{InputState, Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Longest simulated step per tick, in seconds.
pub const MAX_TICK_DELTA: f32 = 0.05;

const RECV_BUFFER_SIZE: usize = 4096;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    /// Same packet to each listed client still connected.
    SendToClients { packet: Packet, client_ids: Vec<u32> },
}

/// Owns the world and coordinates networking with simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: WorldManager,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        world: WorldManager,
        tick_duration: Duration,
        max_clients: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            world,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn world(&self) -> &WorldManager {
        &self.world
    }

    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[0..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClients { packet, client_ids } => {
                        let addrs: Vec<(u32, SocketAddr)> = {
                            let clients_guard = clients.read().await;
                            client_ids
                                .iter()
                                .filter_map(|id| clients_guard.addr_of(*id).map(|a| (*id, a)))
                                .collect()
                        };

                        for (client_id, addr) in addrs {
                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_to_clients(&self, packet: Packet, client_ids: Vec<u32>) {
        if client_ids.is_empty() {
            return;
        }
        if let Err(e) = self
            .game_tx
            .send(GameMessage::SendToClients { packet, client_ids })
        {
            error!("Failed to queue packet for clients: {}", e);
        }
    }

    fn send_to_client(&self, packet: Packet, client_id: u32) {
        self.send_to_clients(packet, vec![client_id]);
    }

    async fn client_for(&self, addr: SocketAddr) -> Option<u32> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    /// Validates one inbound packet and applies it to the world or the input queue.
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Register {
                client_version,
                username,
            } => self.handle_register(client_version, &username, addr).await,

            Packet::Input {
                sequence,
                timestamp,
                intent,
            } => {
                let Some(client_id) = self.client_for(addr).await else {
                    return;
                };
                if !intent.is_valid() {
                    warn!("Dropping input with invalid camera from client {}", client_id);
                    return;
                }
                let input = InputState {
                    sequence,
                    timestamp,
                    intent,
                };
                let mut clients = self.clients.write().await;
                clients.add_input(client_id, input);
            }

            Packet::PositionUpdate {
                timestamp, x, y, ..
            } => {
                let Some(client_id) = self.client_for(addr).await else {
                    return;
                };
                let accepted = x.is_finite()
                    && y.is_finite()
                    && self
                        .world
                        .process_position_update(client_id, x, y, timestamp)
                        .unwrap_or(false);
                if !accepted {
                    self.send_correction(client_id);
                }
            }

            Packet::FloorRequest { level } => {
                let Some(client_id) = self.client_for(addr).await else {
                    return;
                };
                let response = match self.world.get_floor_snapshot(level) {
                    Ok(floor) => Packet::FloorData { floor },
                    Err(e) => {
                        debug!("Floor request {} from client {} failed: {}", level, client_id, e);
                        Packet::Error {
                            message: e.to_string(),
                        }
                    }
                };
                self.send_packet(response, addr);
            }

            Packet::ItemAction { action } => {
                let Some(client_id) = self.client_for(addr).await else {
                    return;
                };
                match self.world.apply_item_action(client_id, action) {
                    Ok(()) => self.send_inventory(client_id),
                    Err(e) => self.send_packet(
                        Packet::Error {
                            message: e.to_string(),
                        },
                        addr,
                    ),
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                    self.world.remove_player(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Admits a client: checks the protocol version and username, replaces any
    /// session already bound to `addr`, then sends the welcome sequence of
    /// `Registered`, the village `FloorData` and the starting inventory.
    async fn handle_register(&mut self, client_version: u32, username: &str, addr: SocketAddr) {
        info!(
            "Client registering from {} (version: {})",
            addr, client_version
        );
        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }
        let Some(username) = shared::validate_username(username) else {
            self.send_packet(
                Packet::Error {
                    message: "invalid username".to_string(),
                },
                addr,
            );
            return;
        };

        // A second Register from the same address replaces the old session
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            let mut clients = self.clients.write().await;
            clients.remove_client(&existing_id);
            self.world.remove_player(existing_id);
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, username.clone())
        };
        let Some(client_id) = client_id else {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Server full".to_string(),
                },
                addr,
            );
            return;
        };

        let registered = self
            .world
            .register_player(client_id, &username)
            .and_then(|level| Ok((level, self.world.get_floor_snapshot(level)?)));
        match registered {
            Ok((level, floor)) => {
                self.send_packet(
                    Packet::Registered {
                        player_id: client_id,
                        level,
                    },
                    addr,
                );
                self.send_packet(Packet::FloorData { floor }, addr);
                self.send_inventory(client_id);
            }
            Err(e) => {
                error!("Registering client {} failed: {}", client_id, e);
                let mut clients = self.clients.write().await;
                clients.remove_client(&client_id);
                self.world.remove_player(client_id);
                self.send_packet(
                    Packet::Error {
                        message: e.to_string(),
                    },
                    addr,
                );
            }
        }
    }

    fn send_correction(&self, client_id: u32) {
        if let Some(player) = self.world.player(client_id) {
            let pos = player.position;
            self.send_to_client(
                Packet::PositionCorrection {
                    x: pos.x,
                    y: pos.y,
                    z: pos.z,
                },
                client_id,
            );
        }
    }

    fn send_inventory(&self, client_id: u32) {
        if let Some(player) = self.world.player(client_id) {
            self.send_to_client(
                Packet::InventoryUpdate {
                    inventory: player.inventory().to_vec(),
                    equipment: player.equipment().clone(),
                    stats: *player.stats(),
                },
                client_id,
            );
        }
    }

    /// Applies every buffered input in timestamp order, then acknowledges them.
    async fn process_inputs(&mut self) {
        let all_inputs = {
            let clients = self.clients.read().await;
            clients.get_chronological_inputs()
        };
        if all_inputs.is_empty() {
            return;
        }

        let mut clients = self.clients.write().await;
        for (client_id, input) in all_inputs {
            if let Err(e) = self.world.set_player_input(client_id, input.intent) {
                debug!("Input from client {} not applied: {}", client_id, e);
            }
            clients.mark_input_processed(client_id, input.sequence);
        }
        clients.cleanup_processed_inputs();
    }

    /// Turns world events into packets for the one client each event concerns.
    fn dispatch_events(&mut self, events: Vec<WorldEvent>) {
        for event in events {
            match event {
                WorldEvent::PositionRejected { player_id, .. } => self.send_correction(player_id),
                WorldEvent::FloorChanged {
                    player_id,
                    to,
                    direction,
                    ..
                } => {
                    self.send_to_client(
                        Packet::FloorChanged {
                            level: to,
                            direction,
                        },
                        player_id,
                    );
                    match self.world.get_floor_snapshot(to) {
                        Ok(floor) => self.send_to_client(Packet::FloorData { floor }, player_id),
                        Err(e) => error!("Level {} snapshot failed: {}", to, e),
                    }
                }
                WorldEvent::TreasureCollected { player_id, item } => {
                    debug!("Player {} picked up {}", player_id, item.name);
                    self.send_inventory(player_id);
                }
                WorldEvent::LeveledUp { player_id, .. } => self.send_inventory(player_id),
            }
        }
    }

    /// Sends each occupied floor's state only to the players on it.
    async fn broadcast_world_state(&self) {
        let timestamp = now_millis();
        let clients = self.clients.read().await;
        if clients.is_empty() {
            return;
        }

        for level in self.world.generated_levels() {
            let Some(floor) = self.world.floor(level) else {
                continue;
            };
            let client_ids = floor.player_ids();
            if client_ids.is_empty() {
                continue;
            }
            let Some(snapshot) = self.world.get_broadcast_snapshot(level) else {
                continue;
            };
            let packet = Packet::WorldState {
                tick: self.world.tick(),
                timestamp,
                level,
                last_processed_input: clients.get_last_processed_inputs(&client_ids),
                players: snapshot.players,
                npcs: snapshot.npcs,
                treasures: snapshot.treasures,
            };
            self.send_to_clients(packet, client_ids);
        }
    }

    async fn tick(&mut self, dt: f32) {
        self.process_inputs().await;
        let events = self.world.update(dt);
        self.dispatch_events(events);
        self.broadcast_world_state().await;
    }

    /// Main server loop coordinating all operations
    ///
    /// Starts the receiver, sender and timeout tasks, then waits on two sources with
    /// `select!`: messages from those tasks and the tick interval. Packets are
    /// handled the moment they arrive. Ticks drain the buffered inputs, advance the
    /// world by the elapsed time (capped at [`MAX_TICK_DELTA`]), notify the clients
    /// affected by world events and broadcast each floor's state to the players on
    /// it.
    ///
    /// Both branches run on this task, so world state is never touched concurrently.
    /// Missed ticks are skipped instead of replayed in a burst. Returns when a
    /// `Shutdown` message arrives or every sender is gone.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.world.remove_player(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let elapsed = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    let dt = clamp_delta(elapsed);
                    if dt < elapsed {
                        warn!("Tick took {:.1}ms, simulating {:.0}ms", elapsed * 1000.0, dt * 1000.0);
                    }
                    self.tick(dt).await;

                    if self.world.tick() % 60 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!(
                                "Tick {} ({}ms world time): {} clients, {} floors live, {:.1}Hz",
                                self.world.tick(),
                                self.world.clock_ms(),
                                client_count,
                                self.world.generated_levels().len(),
                                1.0 / elapsed.max(f32::EPSILON)
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

/// Caps a measured frame time so a stall never turns into one huge step.
pub fn clamp_delta(elapsed: f32) -> f32 {
    elapsed.clamp(0.0, MAX_TICK_DELTA)
}

fn now_millis() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use shared::{ItemAction, MovementIntent};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    async fn test_server(max_clients: usize) -> Server {
        let world = WorldManager::new(WorldConfig::default(), Some(7)).unwrap();
        tokio_test::assert_ok!(
            Server::new("127.0.0.1:0", world, Duration::from_millis(16), max_clients).await
        )
    }

    fn drain(server: &mut Server) -> Vec<GameMessage> {
        let mut out = Vec::new();
        while let Ok(message) = server.game_rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn packets(messages: &[GameMessage]) -> Vec<&Packet> {
        messages
            .iter()
            .map(|m| match m {
                GameMessage::SendPacket { packet, .. } => packet,
                GameMessage::SendToClients { packet, .. } => packet,
            })
            .collect()
    }

    async fn register(server: &mut Server, addr: SocketAddr, name: &str) -> u32 {
        server
            .handle_packet(
                Packet::Register {
                    client_version: PROTOCOL_VERSION,
                    username: name.to_string(),
                },
                addr,
            )
            .await;
        server.clients.read().await.find_client_by_addr(addr).unwrap()
    }

    #[test]
    fn test_clamp_delta() {
        assert_eq!(clamp_delta(0.016), 0.016);
        assert_eq!(clamp_delta(0.5), MAX_TICK_DELTA);
        assert_eq!(clamp_delta(-1.0), 0.0);
    }

    #[test]
    fn test_timestamp_is_recent() {
        let a = now_millis();
        std::thread::sleep(Duration::from_millis(2));
        assert!(now_millis() > a);
    }

    #[tokio::test]
    async fn test_register_sends_welcome_packets() {
        let mut server = test_server(4).await;
        let id = register(&mut server, test_addr(), "ann").await;

        let sent = drain(&mut server);
        let sent = packets(&sent);
        assert!(matches!(sent[0], Packet::Registered { player_id, level: 0 } if *player_id == id));
        assert!(matches!(sent[1], Packet::FloorData { floor } if floor.level == 0));
        assert!(matches!(sent[2], Packet::InventoryUpdate { inventory, .. } if inventory.len() == 2));
        assert_eq!(server.world().player_floor(id), Some(0));
    }

    #[tokio::test]
    async fn test_register_rejects_bad_version_and_name() {
        let mut server = test_server(4).await;
        server
            .handle_packet(
                Packet::Register {
                    client_version: PROTOCOL_VERSION + 1,
                    username: "ann".to_string(),
                },
                test_addr(),
            )
            .await;
        server
            .handle_packet(
                Packet::Register {
                    client_version: PROTOCOL_VERSION,
                    username: "\n".to_string(),
                },
                test_addr(),
            )
            .await;

        let sent = drain(&mut server);
        let sent = packets(&sent);
        assert!(matches!(sent[0], Packet::Disconnected { .. }));
        assert!(matches!(sent[1], Packet::Error { .. }));
        assert!(server.clients.read().await.is_empty());
        assert_eq!(server.world().player_count(), 0);
    }

    #[tokio::test]
    async fn test_server_full() {
        let mut server = test_server(1).await;
        register(&mut server, test_addr(), "ann").await;
        drain(&mut server);

        let other: SocketAddr = "127.0.0.1:40002".parse().unwrap();
        server
            .handle_packet(
                Packet::Register {
                    client_version: PROTOCOL_VERSION,
                    username: "bob".to_string(),
                },
                other,
            )
            .await;
        let sent = drain(&mut server);
        assert!(matches!(
            packets(&sent)[0],
            Packet::Disconnected { reason } if reason == "Server full"
        ));
    }

    #[tokio::test]
    async fn test_reregister_replaces_session() {
        let mut server = test_server(4).await;
        let first = register(&mut server, test_addr(), "ann").await;
        let second = register(&mut server, test_addr(), "ann").await;

        assert_ne!(first, second);
        assert!(server.world().player(first).is_none());
        assert!(server.world().player(second).is_some());
        assert_eq!(server.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_floor_request_gets_error() {
        let mut server = test_server(4).await;
        register(&mut server, test_addr(), "ann").await;
        drain(&mut server);

        server
            .handle_packet(Packet::FloorRequest { level: 7 }, test_addr())
            .await;
        let sent = drain(&mut server);
        assert!(matches!(
            packets(&sent)[0],
            Packet::Error { message } if message == "floor 7 unavailable"
        ));

        server
            .handle_packet(Packet::FloorRequest { level: 2 }, test_addr())
            .await;
        let sent = drain(&mut server);
        assert!(matches!(packets(&sent)[0], Packet::FloorData { floor } if floor.level == 2));
    }

    #[tokio::test]
    async fn test_implausible_position_is_corrected() {
        let mut server = test_server(4).await;
        let id = register(&mut server, test_addr(), "ann").await;
        drain(&mut server);
        let start = server.world().player(id).unwrap().position;

        server
            .handle_packet(
                Packet::PositionUpdate {
                    sequence: 1,
                    timestamp: 100,
                    x: start.x + 400.0,
                    y: start.y,
                },
                test_addr(),
            )
            .await;
        let sent = drain(&mut server);
        assert!(matches!(
            packets(&sent)[0],
            Packet::PositionCorrection { x, .. } if *x == start.x
        ));

        server
            .handle_packet(
                Packet::PositionUpdate {
                    sequence: 2,
                    timestamp: 200,
                    x: f32::NAN,
                    y: start.y,
                },
                test_addr(),
            )
            .await;
        assert_eq!(drain(&mut server).len(), 1);
        assert_eq!(server.world().player(id).unwrap().position, start);
    }

    #[tokio::test]
    async fn test_inputs_applied_on_tick() {
        let mut server = test_server(4).await;
        let id = register(&mut server, test_addr(), "ann").await;
        drain(&mut server);
        let start = server.world().player(id).unwrap().position;

        let intent = MovementIntent {
            up: true,
            ..MovementIntent::default()
        };
        server
            .handle_packet(
                Packet::Input {
                    sequence: 1,
                    timestamp: 10,
                    intent,
                },
                test_addr(),
            )
            .await;
        server.tick(1.0 / 60.0).await;

        let player = server.world().player(id).unwrap();
        assert!(player.position.y < start.y);

        let sent = drain(&mut server);
        let state = packets(&sent)
            .into_iter()
            .find_map(|p| match p {
                Packet::WorldState {
                    last_processed_input,
                    players,
                    level,
                    ..
                } => Some((last_processed_input.clone(), players.len(), *level)),
                _ => None,
            })
            .unwrap();
        assert_eq!(state.0.get(&id), Some(&1));
        assert_eq!(state.1, 1);
        assert_eq!(state.2, 0);
    }

    #[tokio::test]
    async fn test_invalid_camera_input_dropped() {
        let mut server = test_server(4).await;
        register(&mut server, test_addr(), "ann").await;
        let intent = MovementIntent {
            camera: Some((f32::INFINITY, 0.0)),
            ..MovementIntent::default()
        };
        server
            .handle_packet(
                Packet::Input {
                    sequence: 1,
                    timestamp: 10,
                    intent,
                },
                test_addr(),
            )
            .await;
        assert!(server.clients.read().await.get_chronological_inputs().is_empty());
    }

    #[tokio::test]
    async fn test_item_action_round_trip() {
        let mut server = test_server(4).await;
        register(&mut server, test_addr(), "ann").await;
        drain(&mut server);

        server
            .handle_packet(
                Packet::ItemAction {
                    action: ItemAction::Equip {
                        item_id: crate::items::WOODEN_SWORD,
                    },
                },
                test_addr(),
            )
            .await;
        server
            .handle_packet(
                Packet::ItemAction {
                    action: ItemAction::Use { item_id: 999 },
                },
                test_addr(),
            )
            .await;

        let sent = drain(&mut server);
        let sent = packets(&sent);
        assert!(matches!(sent[0], Packet::InventoryUpdate { equipment, .. } if equipment.weapon.is_some()));
        assert!(matches!(sent[1], Packet::Error { .. }));
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let mut server = test_server(4).await;
        let id = register(&mut server, test_addr(), "ann").await;
        server.handle_packet(Packet::Disconnect, test_addr()).await;

        assert!(server.world().player(id).is_none());
        assert!(server.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_server_bound_packets_from_unknown_addr_ignored() {
        let mut server = test_server(4).await;
        server
            .handle_packet(Packet::FloorRequest { level: 0 }, test_addr())
            .await;
        server
            .handle_packet(
                Packet::Registered {
                    player_id: 1,
                    level: 0,
                },
                test_addr(),
            )
            .await;
        assert!(drain(&mut server).is_empty());
    }
}
