//! Studio state — owns the session, the command engine and the transport.
//!
//! `Studio` is the single place where host effects queued by the session
//! are turned into transport calls and catalog toggles.

use serde_json::Value;
use uuid::Uuid;

use scenelink_bridge::outbound::scene_patch_for_effect;
use scenelink_bridge::{route_transport_events, Connector, SessionTransport, TransportConfig, TransportInput};
use scenelink_core::capabilities::{default_catalog, AppCatalog};
use scenelink_core::commands::AppCommand;
use scenelink_core::config::RuntimeConfig;
use scenelink_core::engine::{CommandEnvelope, CommandOptions, DispatchResult};
use scenelink_core::error::RegistryError;
use scenelink_core::session::{HostEffect, SceneSession};
use scenelink_core::AppEngine;

/// Envelope source for commands typed into the console.
pub const CONSOLE_SOURCE: &str = "ui.console";

pub struct Studio<C: Connector> {
    engine: AppEngine,
    catalog: AppCatalog,
    session: SceneSession,
    transport: SessionTransport<C>,
}

impl<C: Connector> Studio<C> {
    pub fn new(config: RuntimeConfig, connector: C) -> Result<Self, RegistryError> {
        let catalog = default_catalog(&config)?;
        let mut engine = AppEngine::new();
        catalog.install_defaults(engine.registry_mut());

        let mut session = SceneSession::new(config.clone());
        session.record_capability_policy(&catalog.statuses(engine.registry()));

        let transport = SessionTransport::new(connector, TransportConfig::from(&config));
        Ok(Self {
            engine,
            catalog,
            session,
            transport,
        })
    }

    /// Open the bridge connection if enabled.
    pub fn start(&mut self) {
        self.transport.start();
        self.sync_transport();
    }

    pub fn session(&self) -> &SceneSession {
        &self.session
    }

    pub fn transport(&self) -> &SessionTransport<C> {
        &self.transport
    }

    pub async fn next_input(&mut self) -> Option<TransportInput> {
        self.transport.next_input().await
    }

    pub fn handle_input(&mut self, input: TransportInput) {
        self.transport.handle_input(input);
        self.sync_transport();
    }

    /// Dispatch a console command and carry out the effects it queued.
    pub fn dispatch(&mut self, command: AppCommand) -> DispatchResult<AppCommand, Value> {
        let options = CommandOptions::from_source(CONSOLE_SOURCE).with_correlation(Uuid::new_v4().to_string());
        let envelope = CommandEnvelope::new(command, options);
        self.session.record_command(&envelope);

        let result = self.engine.dispatch_envelope(envelope, &mut self.session);
        self.run_effects();
        result
    }

    /// Disable the transport and drop local history.
    pub fn shutdown(&mut self) {
        self.transport.set_enabled(false);
        self.sync_transport();
        self.session.clear_history();
        log::info!("studio shut down");
    }

    /// One-line summary for the console.
    pub fn status_line(&self) -> String {
        let state = self.session.state();
        format!(
            "{} [{}] scene:{} rev:{} seq:{} placements:{} deferred:{} hold:{}{} edit:{} undo:{}",
            self.transport.status().as_str(),
            self.transport.url(),
            state.scene_id,
            state.revision,
            state.sequence,
            state.placements.len(),
            state.deferred.len(),
            if state.hold.enabled { "on" } else { "off" },
            if state.hold.pending_confirm { " (confirm)" } else { "" },
            if state.edit_enabled { "on" } else { "off" },
            self.session.history().undo_depth(),
        )
    }

    fn run_effects(&mut self) {
        for effect in self.session.take_effects() {
            match effect {
                HostEffect::Publish(effect) => {
                    if let Some(payload) = scene_patch_for_effect(&effect) {
                        self.transport.send_payload(payload);
                    }
                }
                HostEffect::SetBridgeEnabled(enabled) => self.transport.set_enabled(enabled),
                HostEffect::SetBridgeUrl(url) => self.transport.set_url(&url),
                HostEffect::SubscribeScene(scene_id) => self.transport.set_scene_id(&scene_id),
                HostEffect::SetCapabilityEnabled { capability_id, enabled } => {
                    let outcome = self
                        .catalog
                        .set_enabled(self.engine.registry_mut(), &capability_id, enabled);
                    self.session.record_capability_toggle(&capability_id, enabled, outcome);
                }
            }
        }
        self.sync_transport();
    }

    fn sync_transport(&mut self) {
        let events = self.transport.drain_events();
        if !events.is_empty() {
            route_transport_events(&mut self.session, events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenelink_bridge::{SocketEvent, SocketHandle, SocketId, TransportError};
    use scenelink_core::capabilities::{STATS_ID, STATS_SNAPSHOT_EVENT};
    use scenelink_core::commands::SceneCommand;
    use scenelink_core::scene::Placement;
    use scenelink_core::state::SessionStatus;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    #[derive(Clone, Default)]
    struct LoopbackConnector {
        sockets: Arc<Mutex<Vec<(SocketId, mpsc::UnboundedSender<TransportInput>, mpsc::UnboundedReceiver<String>)>>>,
    }

    impl LoopbackConnector {
        fn open_last(&self) {
            let sockets = self.sockets.lock().unwrap();
            let (id, inputs, _) = sockets.last().unwrap();
            inputs
                .send(TransportInput::Socket {
                    socket: *id,
                    event: SocketEvent::Opened,
                })
                .unwrap();
        }

        fn sent(&self) -> Vec<Value> {
            let mut sockets = self.sockets.lock().unwrap();
            let mut frames = Vec::new();
            for (_, _, outbound) in sockets.iter_mut() {
                while let Ok(text) = outbound.try_recv() {
                    frames.push(serde_json::from_str(&text).unwrap());
                }
            }
            frames
        }
    }

    impl Connector for LoopbackConnector {
        fn open(
            &self,
            _url: &str,
            socket: SocketId,
            inputs: mpsc::UnboundedSender<TransportInput>,
        ) -> Result<SocketHandle, TransportError> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.sockets.lock().unwrap().push((socket, inputs, rx));
            Ok(SocketHandle::new(tx, None))
        }
    }

    fn studio(config: RuntimeConfig) -> (Studio<LoopbackConnector>, LoopbackConnector) {
        let connector = LoopbackConnector::default();
        (Studio::new(config, connector.clone()).unwrap(), connector)
    }

    async fn connect(studio: &mut Studio<LoopbackConnector>, connector: &LoopbackConnector) {
        studio.start();
        connector.open_last();
        let input = studio.next_input().await.unwrap();
        studio.handle_input(input);
    }

    fn place(id: &str) -> AppCommand {
        AppCommand::RunSceneCommand {
            command: SceneCommand::UpsertPlacement {
                placement: Placement::new(id, "chair", [0.0, 0.0]),
            },
        }
    }

    #[test]
    fn test_startup_records_policy() {
        let (studio, _) = studio(RuntimeConfig::default());
        let policy = studio.session().events().last_of_kind("engine_capability_policy").unwrap();
        assert_eq!(policy.summary, "cap profile=dev");
    }

    #[test]
    fn test_stats_request_is_intercepted() {
        let (mut studio, _) = studio(RuntimeConfig::default());
        studio.dispatch(place("a"));
        let result = studio.dispatch(AppCommand::RequestEngineStats);
        assert!(!result.dispatched_to_port);
        assert_eq!(result.envelope.source, CONSOLE_SOURCE);
        assert!(result.envelope.correlation_id.is_some());
        assert!(result.emitted_events.iter().any(|event| event.kind == STATS_SNAPSHOT_EVENT));
    }

    #[test]
    fn test_disabled_capability_falls_through() {
        let (mut studio, _) = studio(RuntimeConfig::default());
        studio.dispatch(AppCommand::SetEngineCapabilityEnabled {
            capability_id: STATS_ID.into(),
            enabled: false,
        });
        assert!(studio
            .session()
            .events()
            .last_of_kind("engine_capability_toggle")
            .is_some());

        let result = studio.dispatch(AppCommand::RequestEngineStats);
        assert!(result.dispatched_to_port);
        assert!(studio.session().events().last_of_kind("engine_stats_unavailable").is_some());
    }

    #[tokio::test]
    async fn test_local_edit_published_when_connected() {
        let config = RuntimeConfig {
            publish_local_edits: true,
            ..RuntimeConfig::default()
        };
        let (mut studio, connector) = studio(config);
        connect(&mut studio, &connector).await;
        assert_eq!(studio.transport().status(), SessionStatus::Connected);

        studio.dispatch(place("a"));
        let frames = connector.sent();
        assert_eq!(frames[0]["kind"], "scene_subscribe");
        assert_eq!(frames[1]["kind"], "scene_patch");
        assert_eq!(frames[1]["patch"]["upserts"][0]["id"], "a");
        assert_eq!(frames[1]["source"], CONSOLE_SOURCE);

        let logged = studio.session().events().last_of_kind("scene_patch").unwrap();
        assert!(logged.summary.starts_with("out "));
    }

    #[tokio::test]
    async fn test_scene_change_resubscribes() {
        let (mut studio, connector) = studio(RuntimeConfig::default());
        connect(&mut studio, &connector).await;
        connector.sent();

        studio.dispatch(AppCommand::SetSceneId {
            scene_id: "lobby".into(),
        });
        assert_eq!(studio.transport().scene_id(), "lobby");
        assert_eq!(connector.sent()[0]["sceneId"], "lobby");
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_and_clears_history() {
        let (mut studio, connector) = studio(RuntimeConfig::default());
        connect(&mut studio, &connector).await;
        studio.dispatch(place("a"));
        assert_eq!(studio.session().history().undo_depth(), 1);

        studio.shutdown();
        assert_eq!(studio.transport().status(), SessionStatus::Disconnected);
        assert!(!studio.transport().is_enabled());
        assert_eq!(studio.session().state().bridge.status, SessionStatus::Disconnected);
        assert_eq!(studio.session().history().undo_depth(), 0);
        assert!(studio.status_line().starts_with("disconnected"));
    }
}
