//! Server network layer handling UDP communications and map routing

use crate::client_manager::ClientManager;
use crate::game_mode::{game_mode_for, GameMode, GAME_MODE_UPDATE_INTERVAL};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, ServerType, CLIENT_VERSION, STARTING_MAP};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maps hosted by this server. The first one is where new clients are
    /// sent.
    pub maps: Vec<String>,
    pub server_type: ServerType,
    pub max_clients: usize,
    pub client_timeout: Duration,
    /// How long an FFA server stays up once its last player has left.
    pub empty_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            maps: vec![STARTING_MAP.to_string()],
            server_type: ServerType::Town,
            max_clients: 32,
            client_timeout: Duration::from_secs(30),
            empty_grace: Duration::from_secs(60),
        }
    }
}

/// Connection bookkeeping and map routing, without any I/O.
///
/// Every handler returns the packets to send in response so the UDP loop
/// and the tests share the same logic.
pub struct ServerState {
    config: ServerConfig,
    clients: ClientManager,
    game_mode: Option<Box<dyn GameMode>>,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let game_mode = game_mode_for(config.server_type, config.empty_grace);
        if let Some(mode) = &game_mode {
            info!("Game mode: {}", mode.name());
        }

        Self {
            clients: ClientManager::new(config.max_clients),
            config,
            game_mode,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn default_map(&self) -> &str {
        self.config
            .maps
            .first()
            .map(String::as_str)
            .unwrap_or(STARTING_MAP)
    }

    pub fn hosts(&self, map_name: &str) -> bool {
        self.config.maps.iter().any(|map| map == map_name)
    }

    pub fn handle_packet(
        &mut self,
        packet: Packet,
        addr: SocketAddr,
        now: Instant,
    ) -> Vec<(Packet, SocketAddr)> {
        if let Some(client_id) = self.clients.find_client_by_addr(addr) {
            self.clients.touch(client_id, now);
        }

        match packet {
            Packet::Connect {
                client_version,
                current_map,
            } => self.handle_connect(client_version, current_map, addr, now),

            Packet::ActivatePortal {
                from_map,
                to_map,
                server_type,
            } => {
                let Some(client_id) = self.clients.find_client_by_addr(addr) else {
                    warn!("Portal request from unknown client at {}", addr);
                    return Vec::new();
                };

                info!(
                    "Client {} takes portal {} -> {}",
                    client_id,
                    from_map.as_deref().unwrap_or("<none>"),
                    to_map
                );

                let change = if self.hosts(&to_map) {
                    Packet::ChangeMap {
                        map_name: to_map,
                        server_type,
                    }
                } else {
                    warn!("Map '{}' is not hosted here, sending client back", to_map);
                    self.change_to_default()
                };
                vec![(change, addr)]
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.clients.find_client_by_addr(addr) {
                    self.clients.remove_client(&client_id);
                }
                // Acknowledged even for unknown clients so they stop waiting.
                vec![(
                    Packet::Disconnected {
                        reason: "Client requested disconnect".to_string(),
                    },
                    addr,
                )]
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
                Vec::new()
            }
        }
    }

    fn handle_connect(
        &mut self,
        client_version: u32,
        current_map: Option<String>,
        addr: SocketAddr,
        now: Instant,
    ) -> Vec<(Packet, SocketAddr)> {
        info!(
            "Client connecting from {} (version: {}, map: {})",
            addr,
            client_version,
            current_map.as_deref().unwrap_or("<none>")
        );

        if client_version != CLIENT_VERSION {
            let reason = format!(
                "Client version {} not supported (expected {})",
                client_version, CLIENT_VERSION
            );
            return vec![(Packet::Disconnected { reason }, addr)];
        }

        // Remove existing connection if present
        if let Some(existing_id) = self.clients.find_client_by_addr(addr) {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.clients.remove_client(&existing_id);
        }

        let Some(client_id) = self.clients.add_client(addr, now) else {
            let reason = "Server full".to_string();
            return vec![(Packet::Disconnected { reason }, addr)];
        };

        let on_hosted_map = current_map.as_deref().map_or(false, |map| self.hosts(map));
        self.clients.set_current_map(client_id, current_map);

        let mut responses = vec![(Packet::Connected { client_id }, addr)];
        if !on_hosted_map {
            responses.push((self.change_to_default(), addr));
        }
        responses
    }

    fn change_to_default(&self) -> Packet {
        Packet::ChangeMap {
            map_name: self.default_map().to_string(),
            server_type: self.config.server_type,
        }
    }

    pub fn check_timeouts(&mut self, now: Instant) -> Vec<u32> {
        self.clients.check_timeouts(self.config.client_timeout, now)
    }

    /// Runs the game mode update. Returns true when the server should stop.
    pub fn update_game_mode(&mut self, now: Instant) -> bool {
        let player_count = self.clients.len();
        match self.game_mode.as_mut() {
            Some(mode) => mode.update(player_count, now),
            None => false,
        }
    }
}

/// UDP front end of [`ServerState`]
pub struct Server {
    socket: Arc<UdpSocket>,
    state: ServerState,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);
        info!(
            "Hosting {} as a {} server",
            config.maps.join(", "),
            config.server_type
        );

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            state: ServerState::new(config),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(self.socket.local_addr()?)
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        let result = match serialize(packet) {
            Ok(data) => self.socket.send_to(&data, addr).await.map(|_| ()),
            Err(e) => {
                error!("Failed to serialize {:?}: {}", packet, e);
                return;
            }
        };
        if let Err(e) = result {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    /// Main server loop. Returns when the game mode asks for a shutdown or
    /// the receiver task goes away.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();

        let mut update_interval = interval(GAME_MODE_UPDATE_INTERVAL);
        // Skip the first tick since it fires immediately
        update_interval.tick().await;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            debug!("Received {:?} from {}", packet, addr);
                            let responses = self.state.handle_packet(packet, addr, Instant::now());
                            for (packet, addr) in responses {
                                self.send_packet(&packet, addr).await;
                            }
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = update_interval.tick() => {
                    let now = Instant::now();
                    for client_id in self.state.check_timeouts(now) {
                        info!("Client {} timed out", client_id);
                    }

                    if self.state.update_game_mode(now) {
                        info!("Game mode requested shutdown");
                        break;
                    }
                },
            }
        }

        Ok(())
    }
}
