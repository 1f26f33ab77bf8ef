//! Connected sessions and their buffered movement input.
//!
//! A session exists from a successful `Register` until disconnect or timeout. Its id
//! doubles as the player id in the world. Inputs are buffered per session and drained
//! once per tick in timestamp order across all sessions.

use log::{info, warn};
use shared::InputState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a session is dropped.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Inputs kept per session before the oldest are discarded.
pub const MAX_PENDING_INPUTS: usize = 128;

/// A registered client and its input state
///
/// Each client keeps:
/// - Connection metadata (id, address, username, last activity)
/// - The highest input sequence applied, echoed back in world-state packets
/// - Inputs buffered until the next tick, sorted by sequence and bounded
#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    pub username: String,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Highest input sequence number applied to the world
    pub last_processed_input: u32,
    pub pending_inputs: Vec<InputState>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, username: String) -> Self {
        Self {
            id,
            addr,
            username,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Buffers an input in sequence order. Inputs already applied are ignored.
    pub fn add_input(&mut self, input: InputState) {
        self.last_seen = Instant::now();
        if input.sequence <= self.last_processed_input
            || self.pending_inputs.iter().any(|i| i.sequence == input.sequence)
        {
            return;
        }

        self.pending_inputs.push(input);
        // Sort by sequence to handle out-of-order packet delivery
        self.pending_inputs.sort_by_key(|i| i.sequence);
        if self.pending_inputs.len() > MAX_PENDING_INPUTS {
            let excess = self.pending_inputs.len() - MAX_PENDING_INPUTS;
            self.pending_inputs.drain(..excess);
            warn!("Client {} input buffer overflowed, dropped {}", self.id, excess);
        }
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// All sessions, capped at `max_clients`.
///
/// The manager hands out session ids, which double as player ids in the world. It
/// enforces the capacity limit and merges every session's buffered inputs into one
/// timestamp-ordered stream, so a tick applies inputs in the same order no matter
/// which socket read them first.
///
/// The network layer shares it between the run loop and the sender and timeout tasks
/// behind an `RwLock`.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Opens a session for `addr`. Returns `None` when the server is full.
    ///
    /// Ids are never reused while the process runs, so a late packet aimed at an
    /// old session cannot land on a new player.
    pub fn add_client(&mut self, addr: SocketAddr, username: String) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} ({}) connected from {}", client_id, username, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, username));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!("Client {} disconnected", client.id);
        Some(client)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes the activity timestamp for packets that carry no input.
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn add_input(&mut self, client_id: u32, input: InputState) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.add_input(input);
                true
            }
            None => false,
        }
    }

    /// Unprocessed inputs of every session, oldest timestamp first.
    pub fn get_chronological_inputs(&self) -> Vec<(u32, InputState)> {
        let mut all_inputs: Vec<(u32, InputState)> = self
            .clients
            .iter()
            .flat_map(|(client_id, client)| {
                client
                    .pending_inputs
                    .iter()
                    .filter(|input| input.sequence > client.last_processed_input)
                    .map(|input| (*client_id, *input))
            })
            .collect();

        all_inputs.sort_by_key(|(client_id, input)| (input.timestamp, *client_id, input.sequence));
        all_inputs
    }

    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            let done = client.last_processed_input;
            client.pending_inputs.retain(|input| input.sequence > done);
        }
    }

    /// Acknowledged input sequence for each of `ids` that is still connected.
    pub fn get_last_processed_inputs(&self, ids: &[u32]) -> HashMap<u32, u32> {
        ids.iter()
            .filter_map(|id| {
                self.clients
                    .get(id)
                    .map(|client| (*id, client.last_processed_input))
            })
            .collect()
    }

    /// Removes sessions silent for longer than `timeout` and returns their ids.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            info!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }
        timed_out
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
