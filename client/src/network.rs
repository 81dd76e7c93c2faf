use crate::headless::HeadlessHost;
use crate::loader::{LoaderEvent, MapLoader};
use crate::overlay::{GameClock, OverlayConfig};
use crate::portal::Portal;
use crate::services::{NetworkLayer, PeerState};
use crate::transition::TransitionConfig;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, ServerType, CLIENT_VERSION, STARTING_MAP};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Client side of the server connection.
///
/// Connection management packets update the peer state as soon as they
/// arrive. Everything else waits in the inbound queue, which is only drained
/// while the message queue is running.
#[derive(Debug)]
pub struct Connection {
    peer: PeerState,
    client_id: Option<u32>,
    queue_running: bool,
    inbox: VecDeque<Packet>,
    outbox: Vec<Packet>,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            peer: PeerState::Disconnected,
            client_id: None,
            queue_running: true,
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        }
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub fn connect(&mut self, current_map: Option<String>) {
        info!("Connecting to server...");
        self.peer = PeerState::Connecting;
        self.outbox.push(Packet::Connect {
            client_version: CLIENT_VERSION,
            current_map,
        });
    }

    /// Forgets the connection without waiting for the server.
    pub fn drop_connection(&mut self) {
        if self.peer != PeerState::Disconnected {
            warn!("Dropping connection in state {:?}", self.peer);
        }
        self.peer = PeerState::Disconnected;
        self.client_id = None;
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                self.peer = PeerState::Connected;
            }
            Packet::Disconnected { reason } => {
                info!("Disconnected: {}", reason);
                self.client_id = None;
                self.peer = PeerState::Disconnected;
            }
            other => self.inbox.push_back(other),
        }
    }

    pub fn next_message(&mut self) -> Option<Packet> {
        if !self.queue_running {
            return None;
        }
        self.inbox.pop_front()
    }

    pub fn queued_messages(&self) -> usize {
        self.inbox.len()
    }

    pub fn drain_outbox(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbox)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkLayer for Connection {
    fn disconnect(&mut self) {
        match self.peer {
            PeerState::Connected | PeerState::Connecting => {
                self.outbox.push(Packet::Disconnect);
                self.peer = PeerState::Disconnecting;
            }
            PeerState::Disconnecting | PeerState::Disconnected => {}
        }
    }

    fn peer_state(&self) -> PeerState {
        self.peer
    }

    fn set_message_queue_running(&mut self, running: bool) {
        self.queue_running = running;
    }

    fn is_message_queue_running(&self) -> bool {
        self.queue_running
    }

    fn send(&mut self, packet: Packet) {
        self.outbox.push(packet);
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub transition: TransitionConfig,
    pub overlay: OverlayConfig,
    pub tick: Duration,
    /// Polls a headless map download takes.
    pub download_polls: u32,
    /// Map to load before contacting the server.
    pub start_map: Option<String>,
    /// Map to request through a portal once the first map is loaded.
    pub portal: Option<String>,
    /// Stop after the last expected map load.
    pub once: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            transition: TransitionConfig::default(),
            overlay: OverlayConfig::default(),
            tick: Duration::from_millis(16),
            download_polls: 30,
            start_map: None,
            portal: None,
            once: false,
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,

    host: HeadlessHost<Connection>,
    loader: MapLoader,
    clock: GameClock,
    portal: Option<Portal>,
    start_map: Option<String>,

    tick: Duration,
    once: bool,
    finished: bool,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        settings: ClientSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        let mut host = HeadlessHost::with_default_catalog(Connection::new());
        host.maps.set_download_polls(settings.download_polls);

        Ok(Client {
            socket,
            server_addr,
            host,
            loader: MapLoader::new(settings.transition, settings.overlay),
            clock: GameClock::new(),
            portal: settings
                .portal
                .map(|map| Portal::new(map, ServerType::Arena)),
            start_map: settings.start_map,
            tick: settings.tick,
            once: settings.once,
            finished: false,
        })
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        for packet in self.host.network.drain_outbox() {
            debug!("Sending {:?}", packet);
            self.send_packet(&packet).await?;
        }
        Ok(())
    }

    fn handle_message(&mut self, packet: Packet) {
        match packet {
            Packet::ChangeMap {
                map_name,
                server_type,
            } => {
                info!("Server requested map change to '{}' ({})", map_name, server_type);
                self.loader.set_pvp(server_type.is_pvp());
                if let Err(e) =
                    self.loader
                        .secure_load_level(&mut self.host, &map_name, None, Instant::now())
                {
                    warn!("Ignoring map change: {}", e);
                }
            }
            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    fn handle_loader_event(&mut self, event: LoaderEvent) -> Result<(), Box<dyn std::error::Error>> {
        match event {
            LoaderEvent::MapLoaded { map_name } => {
                info!("Entered '{}'", map_name);
                self.loader.hide(&mut self.clock);
                self.host.network.connect(Some(map_name));

                if self.once && self.portal.as_ref().map_or(true, |p| !p.is_enabled()) {
                    self.finished = true;
                }
            }
            LoaderEvent::MapLoadFailed { map_name, error } => {
                error!("Failed to load '{}': {}", map_name, error);
                self.host.network.drop_connection();

                if map_name == STARTING_MAP {
                    return Err(error.into());
                }

                info!("Falling back to {}", STARTING_MAP);
                self.loader.set_pvp(false);
                self.loader
                    .secure_load_level(&mut self.host, STARTING_MAP, None, Instant::now())?;
            }
        }
        Ok(())
    }

    fn try_portal(&mut self) {
        let ready = self.host.network.peer_state() == PeerState::Connected
            && self.loader.runtime().map_name.is_some()
            && !self.loader.is_busy();

        if let Some(portal) = self.portal.as_mut().filter(|_| ready) {
            portal.on_action(&mut self.host.network, &mut self.loader);
        }
    }

    async fn on_tick(&mut self, dt: f32) -> Result<(), Box<dyn std::error::Error>> {
        while let Some(packet) = self.host.network.next_message() {
            self.handle_message(packet);
        }

        let event = self
            .loader
            .update(&mut self.host, &mut self.clock, dt, Instant::now());
        if let Some(event) = event {
            self.handle_loader_event(event)?;
        }

        self.try_portal();
        self.flush().await
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        match self.start_map.take() {
            Some(map) => {
                self.loader
                    .secure_load_level(&mut self.host, &map, None, Instant::now())?;
            }
            None => self.host.network.connect(None),
        }
        self.flush().await?;

        let mut tick_interval = interval(self.tick);
        let dt = self.tick.as_secs_f32();

        let mut buffer = [0u8; 2048];

        while !self.finished {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                                self.host.network.handle_packet(packet);
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    self.on_tick(dt).await?;
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down");
                    break;
                },
            }
        }

        if self.host.network.peer_state() == PeerState::Connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
