//! Inbound message gating while a map is being swapped

use crate::services::NetworkLayer;
use log::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionRole {
    #[default]
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Running,
    Suspended,
}

/// Stops delivery of queued inbound messages while the scene they target is
/// being replaced. Only the client role is gated; a server's message queue
/// is left untouched.
#[derive(Debug, Clone)]
pub struct SessionGate {
    role: SessionRole,
    state: GateState,
}

impl SessionGate {
    pub fn new(role: SessionRole) -> Self {
        Self {
            role,
            state: GateState::Running,
        }
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn suspend(&mut self, network: &mut dyn NetworkLayer) {
        if self.role != SessionRole::Client {
            debug!("Server role, message queue left running");
            return;
        }

        network.set_message_queue_running(false);
        self.state = GateState::Suspended;
        info!("Inbound message queue suspended");
    }

    pub fn resume(&mut self, network: &mut dyn NetworkLayer) {
        if self.role != SessionRole::Client {
            return;
        }

        network.set_message_queue_running(true);
        self.state = GateState::Running;
        info!("Inbound message queue resumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessNetwork;

    #[test]
    fn test_client_gate_toggles_queue() {
        let mut network = HeadlessNetwork::connected();
        let mut gate = SessionGate::new(SessionRole::Client);

        gate.suspend(&mut network);
        assert_eq!(gate.state(), GateState::Suspended);
        assert!(!network.is_message_queue_running());

        gate.resume(&mut network);
        assert_eq!(gate.state(), GateState::Running);
        assert!(network.is_message_queue_running());
    }

    #[test]
    fn test_server_gate_leaves_queue_alone() {
        let mut network = HeadlessNetwork::connected();
        let mut gate = SessionGate::new(SessionRole::Server);

        gate.suspend(&mut network);
        assert_eq!(gate.state(), GateState::Running);
        assert!(network.is_message_queue_running());
        assert_eq!(network.queue_toggles(), 0);

        gate.resume(&mut network);
        assert_eq!(network.queue_toggles(), 0);
    }
}
