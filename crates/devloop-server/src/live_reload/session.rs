//! Browser session registry.
//!
//! Each control-channel socket is a [`Connection`]. A connection becomes a
//! [`Session`] once the browser registers with its self-assigned id. The
//! boss is whichever session connects from the configured boss address;
//! every other session is a remote.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Name reported to the boss when no remote sessions exist.
pub(crate) const NO_REMOTES: &str = "No remote connections.";

/// Write side of one control-channel socket.
#[derive(Clone, Debug)]
pub(crate) struct Connection {
    /// Server-assigned connection id.
    pub(crate) id: Uuid,
    /// Peer address.
    pub(crate) remote_addr: IpAddr,
    sender: UnboundedSender<String>,
}

impl Connection {
    pub(crate) fn new(remote_addr: IpAddr, sender: UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_addr,
            sender,
        }
    }

    /// Whether the socket task is still reading from this connection.
    pub(crate) fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Queue a text frame. Returns `false` if the socket is gone.
    pub(crate) fn send(&self, text: String) -> bool {
        self.sender.send(text).is_ok()
    }
}

/// A registered browser.
#[derive(Clone, Debug)]
pub(crate) struct Session {
    /// Browser-assigned id.
    pub(crate) id: String,
    pub(crate) connection: Connection,
}

/// Entry in the browser list sent to the boss.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct BrowserEntry {
    pub(crate) name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) jsid: Option<String>,
}

/// Check whether `addr` belongs to the boss.
///
/// The pattern is matched as a plain substring of the textual address.
pub(crate) fn is_boss_address(addr: IpAddr, pattern: &str) -> bool {
    addr.to_string().contains(pattern)
}

/// Registered sessions keyed by browser id.
#[derive(Debug)]
pub(crate) struct SessionRegistry {
    sessions: BTreeMap<String, Session>,
    boss_pattern: String,
}

impl SessionRegistry {
    pub(crate) fn new(boss_pattern: String) -> Self {
        Self {
            sessions: BTreeMap::new(),
            boss_pattern,
        }
    }

    /// Register `id` on `connection`, replacing any previous session with the same id.
    pub(crate) fn register(&mut self, id: String, connection: Connection) {
        tracing::info!(
            jsid = %id,
            remote = %connection.remote_addr,
            boss = self.is_boss(&connection),
            "Browser registered"
        );
        self.sessions.insert(id.clone(), Session { id, connection });
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Remove every session carried by `connection`.
    ///
    /// A session whose id was re-registered on a newer socket is left alone.
    pub(crate) fn remove_connection(&mut self, connection: Uuid) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.connection.id != connection);
        before - self.sessions.len()
    }

    pub(crate) fn is_boss(&self, connection: &Connection) -> bool {
        is_boss_address(connection.remote_addr, &self.boss_pattern)
    }

    /// Open remote sessions for the boss's browser list.
    ///
    /// Never empty: with no remotes the list holds a single placeholder entry.
    pub(crate) fn list_remotes(&self) -> Vec<BrowserEntry> {
        let remotes: Vec<BrowserEntry> = self
            .sessions
            .values()
            .filter(|s| s.connection.is_open() && !self.is_boss(&s.connection))
            .map(|s| BrowserEntry {
                name: s.connection.remote_addr.to_string(),
                jsid: Some(s.id.clone()),
            })
            .collect();

        if remotes.is_empty() {
            vec![BrowserEntry {
                name: NO_REMOTES.to_owned(),
                jsid: None,
            }]
        } else {
            remotes
        }
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub(crate) fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&Session) -> bool) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| keep(session));
        before - self.sessions.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}
