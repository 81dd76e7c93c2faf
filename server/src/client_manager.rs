//! Client connection management for the map server
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - The map each client reports as loaded
//! - Client capacity management and address tracking

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Represents a connected client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: u32,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    /// Map the client had loaded when it last connected
    pub current_map: Option<String>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_seen: now,
            current_map: None,
        }
    }

    /// Returns true if nothing has been heard from this client for longer
    /// than `timeout`.
    pub fn is_timed_out(&self, timeout: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

/// Tracks all connected clients and enforces the capacity limit
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<u32, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr, now: Instant) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        let client = Client::new(client_id, addr, now);
        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, client);

        Some(client_id)
    }

    /// Removes a client from the server. Returns false if they were already
    /// gone.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn get(&self, client_id: u32) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Marks the client as active. Returns false if the client ID is unknown.
    pub fn touch(&mut self, client_id: u32, now: Instant) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn set_current_map(&mut self, client_id: u32, map: Option<String>) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.current_map = map;
        }
    }

    /// Removes clients that stayed silent longer than `timeout` and returns
    /// their IDs.
    pub fn check_timeouts(&mut self, timeout: Duration, now: Instant) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout, now))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr, Instant::now());

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert!(client.current_map.is_none());
    }

    #[test]
    fn test_client_timeout() {
        let start = Instant::now();
        let client = Client::new(1, test_addr(), start);

        assert!(!client.is_timed_out(Duration::from_secs(1), start));
        assert!(client.is_timed_out(Duration::from_secs(1), start + Duration::from_secs(2)));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);
        let now = Instant::now();

        let client_id1 = manager.add_client(test_addr(), now).unwrap();
        let client_id2 = manager.add_client(test_addr2(), now).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let now = Instant::now();

        assert!(manager.add_client(test_addr(), now).is_some());
        assert!(manager.add_client(test_addr2(), now).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr(), Instant::now()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(manager.is_empty());
        assert!(!manager.remove_client(&client_id));
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let now = Instant::now();
        let client_id1 = manager.add_client(test_addr(), now).unwrap();
        manager.add_client(test_addr2(), now).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_current_map_is_tracked() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr(), Instant::now()).unwrap();

        manager.set_current_map(client_id, Some("Tutorial".to_string()));
        assert_eq!(
            manager.get(client_id).and_then(|c| c.current_map.as_deref()),
            Some("Tutorial")
        );
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(2);
        let start = Instant::now();
        let quiet = manager.add_client(test_addr(), start).unwrap();
        let active = manager.add_client(test_addr2(), start).unwrap();

        let later = start + Duration::from_secs(4);
        assert!(manager.touch(active, later));
        assert!(!manager.touch(999, later));

        let timed_out = manager.check_timeouts(Duration::from_secs(3), later);
        assert_eq!(timed_out, vec![quiet]);
        assert_eq!(manager.len(), 1);
        assert!(manager.get(active).is_some());
    }
}
