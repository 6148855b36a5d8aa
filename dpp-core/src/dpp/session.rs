use crate::dpp::request::Transport;

/// A bootstrap key known to this agent, local or peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapIdentity {
    /// Daemon-side id. `None` for a peer URI not yet handed to the daemon.
    pub handle: Option<u32>,
    pub curve: String,
    pub transport: Transport,
    pub uri: String,
}

impl BootstrapIdentity {
    pub fn peer(uri: String) -> Self {
        Self {
            handle: None,
            curve: String::new(),
            transport: Transport::Qr,
            uri,
        }
    }
}

/// State that outlives a single command.
///
/// The Configurator id lives for the whole process. The bootstrap
/// identities and the network id are replaced whenever a later command
/// produces new ones.
#[derive(Debug, Default)]
pub struct Session {
    pub configurator_id: Option<u32>,
    /// Network profile added by the last successful enrollment, used by
    /// reconfiguration.
    pub network_id: Option<u32>,
    pub local: Option<BootstrapIdentity>,
    pub peer: Option<BootstrapIdentity>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the peer URI. Any daemon handle parsed from the previous one
    /// is dropped with it.
    pub fn set_peer(&mut self, uri: String) {
        if self.peer.as_ref().is_some_and(|p| p.uri != uri) {
            tracing::debug!("Replacing peer bootstrap URI");
        }
        self.peer = Some(BootstrapIdentity::peer(uri));
    }

    pub fn local_handle(&self) -> Option<u32> {
        self.local.as_ref().and_then(|l| l.handle)
    }
}
