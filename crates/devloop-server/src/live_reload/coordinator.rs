//! Live reload coordinator.
//!
//! The coordinator is the single owner of the tree watcher, the debounced
//! triggers, the build runner and the session registry. Filesystem events,
//! socket events, page visits and trigger fires all arrive over one ordered
//! channel and are handled to completion one at a time.
//!
//! # Pipelines
//!
//! ```text
//! modify ─────► refresh trigger ─► [build] ─► reload ─► boss + remotes
//! structural ─► rescan trigger ──► rebuild ─► refresh trigger
//! boss visit ─► navigate trigger ─► navigate ─► remotes
//! register / close ─► browser list ─► boss
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devloop_watch::{ChangeKind, RebuildSummary, TreeWatcher, WatchBackend, WatchEvent};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use super::broadcaster::{Delivery, Target, broadcast};
use super::build::{BuildOutcome, BuildRunner, SharedOutcome};
use super::protocol::{ClientMessage, ServerCommand};
use super::session::{Connection, SessionRegistry};
use super::trigger::DebouncedTrigger;
use crate::error::ServerError;

/// Which trigger fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TriggerKind {
    Refresh,
    Navigate,
    Rescan,
}

/// Input to the coordinator.
#[derive(Debug)]
pub(crate) enum Event {
    /// A tracked file's content changed.
    FileModified(PathBuf),
    /// A path below the root was created, removed or renamed.
    StructuralChange(PathBuf),
    /// A browser announced its id on a connection.
    SessionRegistered { jsid: String, connection: Connection },
    /// A browser sent a control message.
    SessionMessage {
        connection: Uuid,
        message: ClientMessage,
    },
    /// A control socket closed.
    SessionClosed { connection: Uuid },
    /// The boss loaded an HTML page.
    PageVisited { url: String },
    /// A debounced trigger elapsed.
    TriggerFired { trigger: TriggerKind, generation: u64 },
    /// Stop processing.
    Shutdown,
}

impl From<WatchEvent> for Event {
    fn from(event: WatchEvent) -> Self {
        match event.kind {
            ChangeKind::Modified => Self::FileModified(event.path),
            ChangeKind::Structural => Self::StructuralChange(event.path),
        }
    }
}

/// Coordinator timing and behavior.
#[derive(Clone, Debug)]
pub(crate) struct CoordinatorSettings {
    /// Minimum spacing between refreshes and between navigations.
    pub(crate) delay: Duration,
    /// Settle window after the latest event.
    pub(crate) jitter: Duration,
    /// Substring identifying the boss address.
    pub(crate) boss_address: String,
    /// Command run before each refresh.
    pub(crate) build_command: Option<String>,
}

/// Cloneable entry point used by the HTTP layer and socket tasks.
#[derive(Clone, Debug)]
pub(crate) struct CoordinatorHandle {
    tx: UnboundedSender<Event>,
    outcome: SharedOutcome,
}

impl CoordinatorHandle {
    /// Deliver an event. Returns `false` once the coordinator has stopped.
    pub(crate) fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    pub(crate) fn page_visited(&self, url: String) {
        self.send(Event::PageVisited { url });
    }

    pub(crate) fn build_outcome(&self) -> BuildOutcome {
        self.outcome.get()
    }

    pub(crate) fn is_build_failed(&self) -> bool {
        self.outcome.is_failed()
    }

    pub(crate) fn shutdown(&self) {
        self.send(Event::Shutdown);
    }

    /// Handle not attached to a running coordinator.
    #[cfg(test)]
    pub(crate) fn detached(outcome: SharedOutcome) -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = channel();
        (Self { tx, outcome }, rx)
    }
}

/// Event loop owning all live reload state.
pub(crate) struct Coordinator<B: WatchBackend + 'static> {
    tx: UnboundedSender<Event>,
    events: UnboundedReceiver<Event>,
    watcher: Arc<Mutex<TreeWatcher<B>>>,
    refresh: DebouncedTrigger<Event>,
    navigate: DebouncedTrigger<Event>,
    rescan: DebouncedTrigger<Event>,
    build: Option<BuildRunner>,
    outcome: SharedOutcome,
    sessions: SessionRegistry,
    most_recently_visited: Option<String>,
}

/// Create the coordinator's event channel.
///
/// The sender is needed before the coordinator exists, to feed the watch
/// backend's callback.
pub(crate) fn channel() -> (UnboundedSender<Event>, UnboundedReceiver<Event>) {
    mpsc::unbounded_channel()
}

impl<B: WatchBackend + 'static> Coordinator<B> {
    pub(crate) fn new(
        watcher: TreeWatcher<B>,
        settings: CoordinatorSettings,
        tx: UnboundedSender<Event>,
        events: UnboundedReceiver<Event>,
    ) -> Self {
        let outcome = SharedOutcome::default();
        let build = settings
            .build_command
            .map(|command| BuildRunner::new(command, outcome.clone()));

        Self {
            refresh: DebouncedTrigger::new(settings.delay, settings.jitter, tx.clone(), |generation| {
                Event::TriggerFired {
                    trigger: TriggerKind::Refresh,
                    generation,
                }
            }),
            navigate: DebouncedTrigger::new(settings.delay, settings.jitter, tx.clone(), |generation| {
                Event::TriggerFired {
                    trigger: TriggerKind::Navigate,
                    generation,
                }
            }),
            rescan: DebouncedTrigger::new(settings.jitter, settings.jitter, tx.clone(), |generation| {
                Event::TriggerFired {
                    trigger: TriggerKind::Rescan,
                    generation,
                }
            }),
            tx,
            events,
            watcher: Arc::new(Mutex::new(watcher)),
            build,
            outcome,
            sessions: SessionRegistry::new(settings.boss_address),
            most_recently_visited: None,
        }
    }

    pub(crate) fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            tx: self.tx.clone(),
            outcome: self.outcome.clone(),
        }
    }

    /// Perform the initial scan.
    pub(crate) async fn initialize(&self) -> Result<RebuildSummary, ServerError> {
        self.rebuild_watches().await
    }

    /// Process events until shutdown or a fatal error.
    ///
    /// Triggers are cancelled and every watch handle is released on exit.
    pub(crate) async fn run(mut self) -> Result<(), ServerError> {
        let result = loop {
            match self.step().await {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stop();
        result
    }

    /// Wait for and handle one event. Returns `false` on shutdown.
    pub(crate) async fn step(&mut self) -> Result<bool, ServerError> {
        match self.events.recv().await {
            Some(Event::Shutdown) | None => Ok(false),
            Some(event) => {
                self.dispatch(event).await?;
                Ok(true)
            }
        }
    }

    pub(crate) async fn dispatch(&mut self, event: Event) -> Result<(), ServerError> {
        match event {
            Event::FileModified(path) => {
                tracing::debug!(path = %path.display(), "File modified");
                self.refresh.schedule();
            }
            Event::StructuralChange(path) => {
                tracing::debug!(path = %path.display(), "Tree changed");
                self.rescan.schedule();
            }
            Event::SessionRegistered { jsid, connection } => {
                self.sessions.register(jsid, connection);
                self.send_browser_list();
            }
            Event::SessionMessage {
                connection,
                message,
            } => self.handle_message(connection, message),
            Event::SessionClosed { connection } => {
                if self.sessions.remove_connection(connection) > 0 {
                    tracing::info!(
                        connection = %connection,
                        remaining = self.sessions.len(),
                        "Browser disconnected"
                    );
                    self.send_browser_list();
                }
            }
            Event::PageVisited { url } => {
                tracing::debug!(url = %url, "Boss visited page");
                self.most_recently_visited = Some(url);
                self.navigate.schedule();
            }
            Event::TriggerFired {
                trigger,
                generation,
            } => self.handle_fire(trigger, generation).await?,
            Event::Shutdown => {}
        }
        Ok(())
    }

    fn handle_message(&mut self, connection: Uuid, message: ClientMessage) {
        match message {
            ClientMessage::Register { jsid } => {
                // Same socket announcing a new id
                let known = self
                    .sessions
                    .sessions()
                    .find(|s| s.connection.id == connection)
                    .map(|s| (s.id.clone(), s.connection.clone()));
                if let Some((old_id, conn)) = known {
                    self.sessions.remove(&old_id);
                    self.sessions.register(jsid, conn);
                    self.send_browser_list();
                }
            }
            ClientMessage::JsConsole { jsid } => {
                if self.sessions.get(&jsid).is_none() {
                    tracing::warn!(jsid = %jsid, "Console requested for unknown browser");
                    return;
                }
                let command = ServerCommand::JsConsole { jsid: jsid.clone() };
                self.deliver(&command, &Target::browser(jsid));
            }
            ClientMessage::Unknown { action } => {
                tracing::warn!(action = %action, "Ignoring unknown control action");
            }
        }
    }

    async fn handle_fire(&mut self, trigger: TriggerKind, generation: u64) -> Result<(), ServerError> {
        match trigger {
            TriggerKind::Refresh if self.refresh.fired(generation) => self.refresh_now().await?,
            TriggerKind::Navigate if self.navigate.fired(generation) => {
                if let Some(url) = self.most_recently_visited.take() {
                    self.deliver(&ServerCommand::Navigate { url }, &Target::remotes());
                }
            }
            TriggerKind::Rescan if self.rescan.fired(generation) => {
                self.rebuild_watches().await?;
                self.refresh.schedule();
            }
            _ => tracing::trace!(?trigger, generation, "Dropped stale trigger fire"),
        }
        Ok(())
    }

    /// Run the build, if any, then reload every browser.
    async fn refresh_now(&mut self) -> Result<(), ServerError> {
        if let Some(build) = &self.build {
            self.watcher.lock().unwrap().close_all();
            let outcome = build.run().await;
            if outcome.is_failed() {
                tracing::warn!(command = %build.command(), "Reloading with build failure page");
            }
            self.rebuild_watches().await?;
        }

        let delivery = self.deliver(&ServerCommand::Reload, &Target::everyone());
        tracing::info!(browsers = delivery.delivered, "Reloaded browsers");
        Ok(())
    }

    /// Broadcast, then tell the boss if dead sessions were dropped.
    fn deliver(&mut self, command: &ServerCommand, target: &Target) -> Delivery {
        let delivery = broadcast(&mut self.sessions, command, target);
        if delivery.pruned > 0 {
            self.send_browser_list();
        }
        delivery
    }

    fn send_browser_list(&mut self) {
        // Each pass that prunes shrinks the registry, so this terminates
        loop {
            let command = ServerCommand::Browsers {
                browser_list: self.sessions.list_remotes(),
            };
            if broadcast(&mut self.sessions, &command, &Target::boss()).pruned == 0 {
                break;
            }
        }
    }

    async fn rebuild_watches(&self) -> Result<RebuildSummary, ServerError> {
        let watcher = Arc::clone(&self.watcher);
        let summary = tokio::task::spawn_blocking(move || {
            let mut watcher = watcher.lock().unwrap();
            watcher.rebuild()
        })
        .await??;
        Ok(summary)
    }

    fn stop(&mut self) {
        self.refresh.cancel();
        self.navigate.cancel();
        self.rescan.cancel();
        self.watcher.lock().unwrap().close_all();
        tracing::info!("Live reload stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_reload::session::NO_REMOTES;
    use crate::live_reload::session::tests::{BOSS, connection};
    use devloop_watch::{MockBackend, PathFilter, WatchOptions};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tokio::time::Instant;

    const DELAY: Duration = Duration::from_millis(200);
    const JITTER: Duration = Duration::from_millis(20);

    struct Fixture {
        coordinator: Coordinator<MockBackend>,
        observer: MockBackend,
        dir: TempDir,
    }

    async fn fixture(build_command: Option<&str>) -> Fixture {
        fixture_with(MockBackend::new(), build_command).await
    }

    async fn fixture_with(backend: MockBackend, build_command: Option<&str>) -> Fixture {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "<html></html>").unwrap();

        let root = dir.path().to_path_buf();
        let filter = PathFilter::new(root.clone(), vec!["html".to_owned()], Vec::new());
        let observer = backend.clone();
        let watcher = TreeWatcher::new(
            backend,
            WatchOptions {
                root,
                max_depth: 3,
                filter,
            },
        );
        let settings = CoordinatorSettings {
            delay: DELAY,
            jitter: JITTER,
            boss_address: BOSS.to_owned(),
            build_command: build_command.map(str::to_owned),
        };
        let (tx, rx) = channel();

        Fixture {
            coordinator: Coordinator::new(watcher, settings, tx, rx),
            observer,
            dir,
        }
    }

    async fn step(coordinator: &mut Coordinator<MockBackend>) {
        let more = tokio::time::timeout(Duration::from_secs(5), coordinator.step())
            .await
            .expect("no event within timeout")
            .unwrap();
        assert!(more);
    }

    fn frames(rx: &mut UnboundedReceiver<String>) -> Vec<Value> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|text| serde_json::from_str(&text).unwrap())
            .collect()
    }

    async fn register(
        coordinator: &mut Coordinator<MockBackend>,
        jsid: &str,
        addr: &str,
    ) -> (Connection, UnboundedReceiver<String>) {
        let (conn, rx) = connection(addr);
        coordinator
            .dispatch(Event::SessionRegistered {
                jsid: jsid.to_owned(),
                connection: conn.clone(),
            })
            .await
            .unwrap();
        (conn, rx)
    }

    fn watched(observer: &MockBackend, dir: &Path, name: &str) -> bool {
        observer.watched().contains(&dir.join(name))
    }

    #[tokio::test]
    async fn test_modify_burst_reloads_everyone_once() {
        let mut f = fixture(None).await;
        f.coordinator.initialize().await.unwrap();
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        let (_phone, mut phone_rx) = register(&mut f.coordinator, "phone", "10.0.0.2").await;
        frames(&mut boss_rx);

        let start = Instant::now();
        let path = f.dir.path().join("a.html");
        for _ in 0..3 {
            f.coordinator
                .dispatch(Event::FileModified(path.clone()))
                .await
                .unwrap();
        }
        step(&mut f.coordinator).await;

        assert!(start.elapsed() < DELAY + JITTER);
        assert_eq!(frames(&mut boss_rx), vec![json!({"action": "reload"})]);
        assert_eq!(frames(&mut phone_rx), vec![json!({"action": "reload"})]);
        assert!(!f.coordinator.refresh.is_pending());
    }

    #[tokio::test]
    async fn test_spaced_modifications_reload_each_time() {
        let mut f = fixture(None).await;
        f.coordinator.initialize().await.unwrap();
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        frames(&mut boss_rx);
        let path = f.dir.path().join("a.html");

        for _ in 0..2 {
            f.coordinator
                .dispatch(Event::FileModified(path.clone()))
                .await
                .unwrap();
            step(&mut f.coordinator).await;
            tokio::time::sleep(DELAY + JITTER).await;
        }

        assert_eq!(frames(&mut boss_rx).len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_build_still_reloads() {
        let mut f = fixture(Some("echo broken >&2; exit 1")).await;
        f.coordinator.initialize().await.unwrap();
        let handle = f.coordinator.handle();
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        frames(&mut boss_rx);

        f.coordinator
            .dispatch(Event::FileModified(f.dir.path().join("a.html")))
            .await
            .unwrap();
        step(&mut f.coordinator).await;

        assert!(handle.is_build_failed());
        let BuildOutcome::Failed { output, .. } = handle.build_outcome() else {
            panic!("expected failed build");
        };
        assert!(output.contains("broken"));
        assert_eq!(frames(&mut boss_rx), vec![json!({"action": "reload"})]);
        assert!(watched(&f.observer, f.dir.path(), "a.html"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_build_closes_watches_while_running() {
        let mut f = fixture(Some("true")).await;
        f.coordinator.initialize().await.unwrap();
        let opened = f.observer.open_count();

        f.coordinator
            .dispatch(Event::FileModified(f.dir.path().join("a.html")))
            .await
            .unwrap();
        step(&mut f.coordinator).await;

        assert_eq!(f.observer.close_count(), opened);
        assert_eq!(f.observer.open_count(), opened * 2);
        assert!(!f.coordinator.handle().is_build_failed());
    }

    #[tokio::test]
    async fn test_boss_visit_navigates_remotes_only() {
        let mut f = fixture(None).await;
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        let (_phone, mut phone_rx) = register(&mut f.coordinator, "phone", "10.0.0.2").await;
        frames(&mut boss_rx);

        f.coordinator
            .dispatch(Event::PageVisited {
                url: "/index.html".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(
            f.coordinator.most_recently_visited.as_deref(),
            Some("/index.html")
        );
        step(&mut f.coordinator).await;

        assert_eq!(
            frames(&mut phone_rx),
            vec![json!({"action": "navigate", "url": "/index.html"})]
        );
        assert!(frames(&mut boss_rx).is_empty());
        assert_eq!(f.coordinator.most_recently_visited, None);
    }

    #[tokio::test]
    async fn test_js_console_reaches_only_target() {
        let mut f = fixture(None).await;
        let (boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        let (_phone, mut phone_rx) = register(&mut f.coordinator, "phone", "10.0.0.2").await;
        let (_tablet, mut tablet_rx) = register(&mut f.coordinator, "tablet", "10.0.0.3").await;
        frames(&mut boss_rx);

        f.coordinator
            .dispatch(Event::SessionMessage {
                connection: boss.id,
                message: ClientMessage::JsConsole {
                    jsid: "tablet".to_owned(),
                },
            })
            .await
            .unwrap();

        assert_eq!(
            frames(&mut tablet_rx),
            vec![json!({"action": "jsConsole", "jsid": "tablet"})]
        );
        assert!(frames(&mut phone_rx).is_empty());
        assert!(frames(&mut boss_rx).is_empty());
    }

    #[tokio::test]
    async fn test_boss_alone_gets_placeholder_list() {
        let mut f = fixture(None).await;

        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;

        assert_eq!(
            frames(&mut boss_rx),
            vec![json!({"action": "browsers", "browserList": [{"name": NO_REMOTES}]})]
        );
    }

    #[tokio::test]
    async fn test_remote_register_and_close_update_boss_list() {
        let mut f = fixture(None).await;
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        let (phone, phone_rx) = register(&mut f.coordinator, "phone", "10.0.0.2").await;

        drop(phone_rx);
        f.coordinator
            .dispatch(Event::SessionClosed {
                connection: phone.id,
            })
            .await
            .unwrap();

        assert_eq!(
            frames(&mut boss_rx),
            vec![
                json!({"action": "browsers", "browserList": [{"name": NO_REMOTES}]}),
                json!({"action": "browsers", "browserList": [{"name": "10.0.0.2", "jsid": "phone"}]}),
                json!({"action": "browsers", "browserList": [{"name": NO_REMOTES}]}),
            ]
        );
    }

    #[tokio::test]
    async fn test_reload_pruning_dead_remote_updates_boss_list() {
        let mut f = fixture(None).await;
        f.coordinator.initialize().await.unwrap();
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        let (phone, phone_rx) = register(&mut f.coordinator, "phone", "10.0.0.2").await;
        frames(&mut boss_rx);

        drop(phone_rx);
        f.coordinator
            .dispatch(Event::FileModified(f.dir.path().join("a.html")))
            .await
            .unwrap();
        step(&mut f.coordinator).await;
        f.coordinator
            .dispatch(Event::SessionClosed {
                connection: phone.id,
            })
            .await
            .unwrap();

        assert_eq!(
            frames(&mut boss_rx),
            vec![
                json!({"action": "reload"}),
                json!({"action": "browsers", "browserList": [{"name": NO_REMOTES}]}),
            ]
        );
        assert_eq!(f.coordinator.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_navigate_pruning_dead_remote_updates_boss_list() {
        let mut f = fixture(None).await;
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        let (_phone, phone_rx) = register(&mut f.coordinator, "phone", "10.0.0.2").await;
        let (_tablet, mut tablet_rx) = register(&mut f.coordinator, "tablet", "10.0.0.3").await;
        frames(&mut boss_rx);

        drop(phone_rx);
        f.coordinator
            .dispatch(Event::PageVisited {
                url: "/about.html".to_owned(),
            })
            .await
            .unwrap();
        step(&mut f.coordinator).await;

        assert_eq!(
            frames(&mut tablet_rx),
            vec![json!({"action": "navigate", "url": "/about.html"})]
        );
        assert_eq!(
            frames(&mut boss_rx),
            vec![json!({"action": "browsers", "browserList": [{"name": "10.0.0.3", "jsid": "tablet"}]})]
        );
    }

    #[tokio::test]
    async fn test_structural_change_rebuilds_before_refresh() {
        let mut f = fixture(None).await;
        f.coordinator.initialize().await.unwrap();
        let (_boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        frames(&mut boss_rx);

        let created = f.dir.path().join("b.html");
        fs::write(&created, "<html></html>").unwrap();
        assert!(!watched(&f.observer, f.dir.path(), "b.html"));

        f.coordinator
            .dispatch(Event::StructuralChange(created))
            .await
            .unwrap();
        step(&mut f.coordinator).await;

        assert!(watched(&f.observer, f.dir.path(), "b.html"));
        assert!(frames(&mut boss_rx).is_empty());
        assert!(f.coordinator.refresh.is_pending());

        step(&mut f.coordinator).await;

        assert_eq!(frames(&mut boss_rx), vec![json!({"action": "reload"})]);
    }

    #[tokio::test]
    async fn test_unknown_action_is_ignored() {
        let mut f = fixture(None).await;
        let (boss, mut boss_rx) = register(&mut f.coordinator, "boss", "127.0.0.1").await;
        frames(&mut boss_rx);

        f.coordinator
            .dispatch(Event::SessionMessage {
                connection: boss.id,
                message: ClientMessage::Unknown {
                    action: "dance".to_owned(),
                },
            })
            .await
            .unwrap();

        assert!(frames(&mut boss_rx).is_empty());
        assert_eq!(f.coordinator.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_reregister_on_same_socket_renames_session() {
        let mut f = fixture(None).await;
        let (phone, _phone_rx) = register(&mut f.coordinator, "old", "10.0.0.2").await;

        f.coordinator
            .dispatch(Event::SessionMessage {
                connection: phone.id,
                message: ClientMessage::Register {
                    jsid: "new".to_owned(),
                },
            })
            .await
            .unwrap();

        assert!(f.coordinator.sessions.get("old").is_none());
        assert!(f.coordinator.sessions.get("new").is_some());
    }

    #[tokio::test]
    async fn test_handle_exhaustion_is_fatal() {
        let mut f = fixture_with(MockBackend::new().with_limit(1), None).await;
        fs::create_dir(f.dir.path().join("sub")).unwrap();

        let err = f.coordinator.initialize().await.unwrap_err();

        assert!(matches!(
            err,
            ServerError::Watch(devloop_watch::WatchError::TooManyWatches { .. })
        ));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_and_releases_watches() {
        let f = fixture(None).await;
        f.coordinator.initialize().await.unwrap();
        let handle = f.coordinator.handle();
        assert!(!f.observer.watched().is_empty());

        handle.shutdown();
        f.coordinator.run().await.unwrap();

        assert!(f.observer.watched().is_empty());
        assert!(!handle.send(Event::Shutdown));
    }

    #[test]
    fn test_watch_events_map_to_coordinator_events() {
        let modified = Event::from(WatchEvent {
            path: PathBuf::from("/a.html"),
            kind: ChangeKind::Modified,
        });
        let structural = Event::from(WatchEvent {
            path: PathBuf::from("/sub"),
            kind: ChangeKind::Structural,
        });

        assert!(matches!(modified, Event::FileModified(_)));
        assert!(matches!(structural, Event::StructuralChange(_)));
    }
}
