//! Integration tests across the shared protocol, the world simulation and the UDP server.

use assert_approx_eq::assert_approx_eq;
use bincode::{deserialize, serialize};
use server::config::WorldConfig;
use server::entity::{Npc, Player};
use server::floor::FloorWorld;
use server::grid::{Grid, Room};
use server::level_gen::GeneratedLevel;
use server::world::{WorldEvent, WorldManager};
use shared::{MovementIntent, NpcKind, Packet, Position, StairsDirection, Tile};
use std::sync::Arc;
use std::time::Duration;

const DT: f32 = 1.0 / 60.0;

fn open_level(width: usize, height: usize) -> GeneratedLevel {
    let mut grid = Grid::new(width, height);
    grid.fill_rect(1, 1, width as isize - 2, height as isize - 2, Tile::Floor);
    GeneratedLevel {
        level: 1,
        grid,
        rooms: vec![Room::new(1, 1, width - 2, height - 2)],
        up_stairs: None,
        down_stairs: None,
        spawn: (1, 1),
    }
}

fn player_at(id: u32, cell: (usize, usize), config: &WorldConfig) -> Player {
    Player::new(
        id,
        format!("player{}", id),
        1,
        Grid::cell_center(cell, config.tile_size),
        &config.player,
    )
}

fn hunter(id: u32, cell: (usize, usize), config: &WorldConfig) -> Npc {
    Npc {
        id,
        kind: NpcKind::Skeleton,
        position: Grid::cell_center(cell, config.tile_size),
        health: 30,
        max_health: 30,
        level: 1,
        is_aggressive: true,
    }
}

/// PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    #[test]
    fn world_state_survives_the_wire() {
        let mut world = WorldManager::new(WorldConfig::default(), Some(5)).unwrap();
        world.register_player(1, "wire").unwrap();
        let snapshot = world.get_broadcast_snapshot(0).unwrap();

        let packet = Packet::WorldState {
            tick: world.tick(),
            timestamp: 99,
            level: snapshot.level,
            last_processed_input: [(1, 4)].into_iter().collect(),
            players: snapshot.players.clone(),
            npcs: snapshot.npcs,
            treasures: snapshot.treasures,
        };
        let decoded: Packet = deserialize(&serialize(&packet).unwrap()).unwrap();

        match decoded {
            Packet::WorldState {
                players,
                last_processed_input,
                ..
            } => {
                assert_eq!(players, snapshot.players);
                assert_eq!(last_processed_input.get(&1), Some(&4));
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
    }

    #[test]
    fn floor_data_matches_grid() {
        let mut world = WorldManager::new(WorldConfig::default(), Some(6)).unwrap();
        let snapshot = world.get_floor_snapshot(1).unwrap();
        let decoded: Packet =
            deserialize(&serialize(&Packet::FloorData { floor: snapshot.clone() }).unwrap())
                .unwrap();

        let Packet::FloorData { floor } = decoded else {
            panic!("expected FloorData");
        };
        assert_eq!(floor, snapshot);
        let grid = world.floor(1).unwrap().grid();
        for y in 0..grid.height() {
            for x in 0..grid.width() {
                let code = floor.tiles[y * floor.width as usize + x];
                assert_eq!(Tile::from_code(code), grid.get(x, y));
            }
        }
    }

    #[test]
    fn malformed_bytes_do_not_decode() {
        let garbage: [&[u8]; 3] = [&[], &[0xff, 0xff, 0xff, 0xff], &[42; 3]];
        for bytes in garbage {
            assert!(deserialize::<Packet>(bytes).is_err());
        }
    }
}

/// WORLD SCENARIOS
mod world_tests {
    use super::*;

    fn press_action(world: &mut WorldManager, id: u32) {
        let intent = MovementIntent {
            action: true,
            ..MovementIntent::default()
        };
        world.set_player_input(id, intent).unwrap();
    }

    #[test]
    fn descending_lands_on_next_up_stairs() {
        let mut world = WorldManager::new(WorldConfig::default(), Some(21)).unwrap();
        world.register_player(1, "delver").unwrap();
        world.generate_floor(1).unwrap();
        assert!(world.move_player_to_floor(1, 1));

        let tile_size = world.config().tile_size;
        let floor = world.floor_mut(1).unwrap();
        let down = floor.down_stairs().unwrap();
        floor.get_player_mut(1).unwrap().position = Grid::cell_center(down, tile_size);
        assert_eq!(
            floor.handle_stairs_interaction(1).direction,
            Some(StairsDirection::Down)
        );

        press_action(&mut world, 1);
        let events = world.update(DT);

        assert!(events.contains(&WorldEvent::FloorChanged {
            player_id: 1,
            from: 1,
            to: 2,
            direction: StairsDirection::Down,
        }));
        let player = world.player(1).unwrap();
        assert_eq!(player.previous_floor, 1);
        assert_eq!(player.current_floor, 2);
        let up = world.floor(2).unwrap().up_stairs().unwrap();
        assert_eq!(player.position, Grid::cell_center(up, tile_size));
        assert!(world.floor(1).unwrap().get_player(1).is_none());
    }

    #[test]
    fn action_away_from_stairs_does_nothing() {
        let mut world = WorldManager::new(WorldConfig::default(), Some(22)).unwrap();
        world.register_player(1, "idle").unwrap();
        press_action(&mut world, 1);
        let events = world.update(DT);
        assert!(events.is_empty());
        assert_eq!(world.player_floor(1), Some(0));
    }

    #[test]
    fn every_floor_has_the_right_stairs() {
        let mut world = WorldManager::new(WorldConfig::default(), Some(23)).unwrap();
        world.pregenerate_all().unwrap();
        let last = world.config().last_level();

        for level in 0..=last {
            let grid = world.floor(level).unwrap().grid();
            let ups = grid.count(Tile::StairsUp);
            let downs = grid.count(Tile::StairsDown);
            match level {
                0 => assert_eq!((ups, downs), (0, 1)),
                l if l == last => assert_eq!((ups, downs), (1, 0)),
                _ => assert_eq!((ups, downs), (1, 1), "level {}", level),
            }
        }
    }

    #[test]
    fn npc_chases_until_wall() {
        let config = Arc::new(WorldConfig::default());
        let mut level = open_level(14, 8);
        level.grid.fill_rect(7, 1, 7, 6, Tile::Wall);
        let mut floor = FloorWorld::new(level, Arc::clone(&config));
        floor.add_player(player_at(1, (9, 3), &config));
        floor.spawn_npc(hunter(1, (4, 3), &config));

        let target = floor.get_player(1).unwrap().position;
        let mut last = floor.npcs().next().unwrap().position.planar_distance(&target);
        let mut stalled = false;
        for _ in 0..300 {
            floor.update(DT, 0);
            let npc = floor.npcs().next().unwrap();
            assert!(!floor.check_collision(&npc.position, config.npc.size));
            let now = npc.position.planar_distance(&target);
            if stalled {
                assert_eq!(now, last, "npc advanced after being blocked");
            } else if now == last {
                stalled = true;
            } else {
                assert!(now < last);
            }
            last = now;
        }
        assert!(stalled);
        assert!(floor.npcs().next().unwrap().position.x < 7.0 * config.tile_size);
    }

    #[test]
    fn solid_tiles_block_players_and_npcs() {
        let config = Arc::new(WorldConfig::default());
        let tile = config.tile_size;
        for solid in [Tile::Wall, Tile::Obstacle] {
            let mut level = open_level(10, 6);
            level.grid.set(5, 2, solid);
            let mut floor = FloorWorld::new(level, Arc::clone(&config));

            let into_solid = Grid::cell_center((5, 2), tile);
            floor.add_player(player_at(1, (3, 2), &config));
            assert!(!floor.update_player_position(1, into_solid));
            assert!(floor.check_collision(&into_solid, config.npc.size));

            // An NPC chasing a player behind the solid tile stops in front of it
            floor.add_player(player_at(2, (7, 2), &config));
            floor.remove_player(1);
            floor.spawn_npc(hunter(1, (3, 2), &config));
            for _ in 0..240 {
                floor.update(DT, 0);
            }
            let npc = floor.npcs().next().unwrap();
            assert!(npc.position.x + config.npc.size / 2.0 <= 5.0 * tile);
        }
    }

    #[test]
    fn implausible_speed_is_rejected() {
        let config = Arc::new(WorldConfig::default());
        let mut floor = FloorWorld::new(open_level(30, 30), Arc::clone(&config));
        floor.add_player(player_at(1, (15, 15), &config));
        let origin = floor.get_player(1).unwrap().position;
        assert!(floor.process_position_update(1, origin.x, origin.y, 1_000));

        let limit = config.player.move_speed * (1.0 + config.player.speed_tolerance) / 1000.0;
        let mut timestamp = 1_000;
        for (step, dx) in [5.0_f32, 40.0, 10.0, 3.0, 90.0, 12.0].into_iter().enumerate() {
            let before = floor.get_player(1).unwrap().position;
            let elapsed = 50 + step as u64 * 10;
            timestamp += elapsed;
            let accepted =
                floor.process_position_update(1, before.x + dx, before.y, timestamp);
            let speed = dx / elapsed as f32;

            assert_eq!(accepted, speed <= limit, "dx {} over {}ms", dx, elapsed);
            let after = floor.get_player(1).unwrap().position;
            if accepted {
                assert_eq!(after.x, before.x + dx);
            } else {
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn held_keys_and_position_updates_share_speed_cap() {
        let config = Arc::new(WorldConfig::default());
        let mut floor = FloorWorld::new(open_level(40, 10), Arc::clone(&config));
        floor.add_player(player_at(1, (35, 5), &config));
        let origin = floor.get_player(1).unwrap().position;
        assert!(floor.process_position_update(1, origin.x, origin.y, 1_000));

        let limit = config.player.move_speed * (1.0 + config.player.speed_tolerance) / 1000.0;
        let left = MovementIntent {
            left: true,
            ..MovementIntent::default()
        };
        let mut accepted = vec![(origin, 1_000u64)];
        let mut timestamp = 1_000;

        for round in 0..8 {
            floor.get_player_mut(1).unwrap().set_intent(left);
            for _ in 0..6 {
                floor.update(DT, 0);
            }
            timestamp += 100;
            let here = floor.get_player(1).unwrap().position;
            // Every other round tries to sneak an extra step in on top of the keys
            let extra = if round % 2 == 0 { 17.0 } else { 0.0 };
            if floor.process_position_update(1, here.x - extra, here.y, timestamp) {
                accepted.push((floor.get_player(1).unwrap().position, timestamp));
            }
        }

        assert!(accepted.len() > 1);
        for pair in accepted.windows(2) {
            let (from, t0) = pair[0];
            let (to, t1) = pair[1];
            let speed = from.planar_distance(&to) / (t1 - t0) as f32;
            assert!(speed <= limit, "{} units/ms between accepted updates", speed);
        }
    }

    #[test]
    fn diagonal_tick_is_not_faster() {
        let config = Arc::new(WorldConfig::default());
        let mut floor = FloorWorld::new(open_level(30, 30), Arc::clone(&config));
        floor.add_player(player_at(1, (8, 15), &config));
        floor.add_player(player_at(2, (20, 15), &config));

        let up = MovementIntent {
            up: true,
            ..MovementIntent::default()
        };
        let up_right = MovementIntent { right: true, ..up };
        floor.get_player_mut(1).unwrap().set_intent(up);
        floor.get_player_mut(2).unwrap().set_intent(up_right);

        let start: Vec<Position> = [1, 2]
            .iter()
            .map(|id| floor.get_player(*id).unwrap().position)
            .collect();
        floor.update(DT, 0);

        let moved: Vec<f32> = [1, 2]
            .iter()
            .zip(&start)
            .map(|(id, s)| floor.get_player(*id).unwrap().position.planar_distance(s))
            .collect();
        assert_approx_eq!(moved[0], config.player.move_speed * DT, 1e-3);
        assert_approx_eq!(moved[0], moved[1], 1e-3);
    }
}

/// NETWORK TESTS
mod server_tests {
    use super::*;
    use server::network::Server;
    use shared::PROTOCOL_VERSION;
    use tokio::net::UdpSocket;
    use tokio::time::timeout;

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buf = vec![0u8; 65536];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        deserialize(&buf[..len]).unwrap()
    }

    #[tokio::test]
    async fn register_and_receive_world_state() {
        let world = WorldManager::new(WorldConfig::default(), Some(9)).unwrap();
        let mut server = Server::new("127.0.0.1:0", world, Duration::from_millis(16), 4)
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Garbage first: the server must drop it and keep serving
        socket.send_to(&[1, 2, 3], server_addr).await.unwrap();
        let register = Packet::Register {
            client_version: PROTOCOL_VERSION,
            username: "udp".to_string(),
        };
        socket
            .send_to(&serialize(&register).unwrap(), server_addr)
            .await
            .unwrap();

        let player_id = match recv_packet(&socket).await {
            Packet::Registered { player_id, level } => {
                assert_eq!(level, 0);
                player_id
            }
            other => panic!("Expected Registered, got {:?}", other),
        };

        let mut saw_floor = false;
        let mut saw_state = false;
        for _ in 0..20 {
            match recv_packet(&socket).await {
                Packet::FloorData { floor } => {
                    assert_eq!(floor.level, 0);
                    saw_floor = true;
                }
                Packet::WorldState { players, level, .. } => {
                    assert_eq!(level, 0);
                    assert!(players.iter().any(|p| p.id == player_id));
                    saw_state = true;
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_floor && saw_state);

        socket
            .send_to(&serialize(&Packet::Disconnect).unwrap(), server_addr)
            .await
            .unwrap();
    }
}
