//! Command fan-out to registered sessions.

use super::protocol::ServerCommand;
use super::session::SessionRegistry;

/// Recipients of a broadcast.
///
/// A session receives the command if it matches any requested class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Target {
    pub(crate) boss: bool,
    pub(crate) remotes: bool,
    pub(crate) browser: Option<String>,
}

impl Target {
    pub(crate) fn boss() -> Self {
        Self {
            boss: true,
            ..Self::default()
        }
    }

    pub(crate) fn remotes() -> Self {
        Self {
            remotes: true,
            ..Self::default()
        }
    }

    pub(crate) fn everyone() -> Self {
        Self {
            boss: true,
            remotes: true,
            browser: None,
        }
    }

    pub(crate) fn browser(id: impl Into<String>) -> Self {
        Self {
            browser: Some(id.into()),
            ..Self::default()
        }
    }
}

/// Result of one broadcast pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Delivery {
    pub(crate) delivered: usize,
    pub(crate) pruned: usize,
}

/// Send `command` to every open session matching `target`.
///
/// Sessions found closed during the pass are removed from the registry.
pub(crate) fn broadcast(
    registry: &mut SessionRegistry,
    command: &ServerCommand,
    target: &Target,
) -> Delivery {
    let frame = command.to_frame();
    let mut delivered = 0;

    let mut selected = Vec::new();
    for session in registry.sessions() {
        let boss = registry.is_boss(&session.connection);
        let wanted = (target.boss && boss)
            || (target.remotes && !boss)
            || target.browser.as_deref() == Some(session.id.as_str());
        if wanted {
            selected.push(session.id.clone());
        }
    }

    let pruned = registry.retain(|session| {
        if !session.connection.is_open() {
            return false;
        }
        if selected.contains(&session.id) {
            if !session.connection.send(frame.clone()) {
                return false;
            }
            delivered += 1;
        }
        true
    });

    tracing::debug!(
        command = %frame,
        delivered,
        pruned,
        "Broadcast command"
    );
    Delivery { delivered, pruned }
}
