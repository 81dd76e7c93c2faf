//! Portals move the player to another map on use

use crate::loader::MapLoader;
use crate::services::NetworkLayer;
use log::{debug, info};
use shared::{Packet, ServerType};

#[derive(Debug, Clone)]
pub struct Portal {
    map_name: String,
    server_type: ServerType,
    enabled: bool,
}

impl Portal {
    pub fn new(map_name: impl Into<String>, server_type: ServerType) -> Self {
        Self {
            map_name: map_name.into(),
            server_type,
            enabled: true,
        }
    }

    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    pub fn server_type(&self) -> ServerType {
        self.server_type
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn reset(&mut self) {
        self.enabled = true;
    }

    /// Requests the map change from the server and covers the screen while
    /// the answer is on its way. A portal works once; returns whether it
    /// fired.
    pub fn on_action(&mut self, network: &mut dyn NetworkLayer, loader: &mut MapLoader) -> bool {
        if !self.enabled {
            debug!("Portal to '{}' already used", self.map_name);
            return false;
        }

        let target = self.map_name.clone();
        info!("Activating portal to '{}' ({})", target, self.server_type);

        network.send(Packet::ActivatePortal {
            from_map: loader.runtime().map_name.clone(),
            to_map: target.clone(),
            server_type: self.server_type,
        });

        self.enabled = false;
        loader.show_loading_screen(format!("Teleporting to: {}", target));
        true
    }
}
