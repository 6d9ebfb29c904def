//! Session transport: one socket, a connect/reconnect state machine and the
//! scene-subscribe handshake.
//!
//! The transport never touches the network directly. A [`Connector`] opens
//! sockets whose tasks report back as [`TransportInput`]s on a channel the
//! transport owns; the host pulls them with [`SessionTransport::next_input`]
//! and feeds them to [`SessionTransport::handle_input`] one at a time.
//! Observable effects accumulate as [`TransportEvent`]s until drained.
//!
//! ```text
//! disconnected ──connect──► connecting ──Opened──► connected
//!      ▲                        │                      │
//!      └──────── Closed ◄───────┴──────────────────────┘
//!                  │ (enabled)
//!                  └──► reconnect timer ──ReconnectDue──► connect
//! ```

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use scenelink_core::config::RuntimeConfig;
use scenelink_core::state::{SessionStatus, DEFAULT_SCENE_ID};

use crate::connector::{Connector, SocketHandle, TransportError};
use crate::outbound;
use crate::protocol::decode_frame;

/// Identity of one socket instance. Never reused.
pub type SocketId = u64;

pub const SOCKET_ERROR: &str = "bridge socket error";

/// What a socket task reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed,
}

/// Everything the transport reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportInput {
    Socket { socket: SocketId, event: SocketEvent },
    ReconnectDue { token: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Connecting { url: String },
    Connected { url: String },
    Disconnected { url: String, will_reconnect: bool },
    ReconnectScheduled { delay: Duration },
    SocketCreateError { url: String, error: String },
    SocketError { error: String },
    InboundJsonInvalid { error: String },
    SceneSubscribe { scene_id: String, sent: bool },
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "bridge_connecting",
            Self::Connected { .. } => "bridge_connected",
            Self::Disconnected { .. } => "bridge_disconnected",
            Self::ReconnectScheduled { .. } => "bridge_reconnect_scheduled",
            Self::SocketCreateError { .. } => "bridge_socket_create_error",
            Self::SocketError { .. } => "bridge_socket_error",
            Self::InboundJsonInvalid { .. } => "bridge_inbound_json_invalid",
            Self::SceneSubscribe { .. } => "scene_subscribe",
        }
    }
}

/// Effects produced while handling inputs and calls.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Status(SessionStatus),
    Error(Option<String>),
    Lifecycle(LifecycleEvent),
    Inbound(Value),
    Outbound { payload: Value, sent: bool },
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub enabled: bool,
    pub scene_id: String,
    pub reconnect_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for TransportConfig {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            url: config.bridge_url.trim().to_string(),
            enabled: config.bridge_enabled,
            scene_id: normalize_scene_id(&config.scene_id),
            reconnect_delay: config.reconnect_delay,
        }
    }
}

fn normalize_scene_id(scene_id: &str) -> String {
    let trimmed = scene_id.trim();
    if trimmed.is_empty() {
        DEFAULT_SCENE_ID.to_string()
    } else {
        trimmed.to_string()
    }
}

struct ActiveSocket {
    id: SocketId,
    handle: SocketHandle,
}

struct ReconnectTimer {
    token: u64,
    task: JoinHandle<()>,
}

pub struct SessionTransport<C: Connector> {
    connector: C,
    url: String,
    enabled: bool,
    scene_id: String,
    reconnect_delay: Duration,
    status: SessionStatus,
    error: Option<String>,
    socket: Option<ActiveSocket>,
    subscribed_scene_id: Option<String>,
    next_socket_id: SocketId,
    reconnect: Option<ReconnectTimer>,
    next_token: u64,
    inputs_tx: mpsc::UnboundedSender<TransportInput>,
    inputs_rx: mpsc::UnboundedReceiver<TransportInput>,
    events: Vec<TransportEvent>,
}

impl<C: Connector> SessionTransport<C> {
    /// Build a disconnected transport. Call [`Self::start`] to honour the
    /// configured `enabled` flag.
    pub fn new(connector: C, config: TransportConfig) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            url: config.url,
            enabled: config.enabled,
            scene_id: config.scene_id,
            reconnect_delay: config.reconnect_delay,
            status: SessionStatus::Disconnected,
            error: None,
            socket: None,
            subscribed_scene_id: None,
            next_socket_id: 0,
            reconnect: None,
            next_token: 0,
            inputs_tx,
            inputs_rx,
            events: Vec::new(),
        }
    }

    /// Connect if enabled.
    pub fn start(&mut self) {
        if self.enabled {
            self.connect();
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.reconnect.is_some()
    }

    /// Wait for the next socket or timer input.
    pub async fn next_input(&mut self) -> Option<TransportInput> {
        self.inputs_rx.recv().await
    }

    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.enabled = true;
            if self.status == SessionStatus::Disconnected {
                self.connect();
            }
            return;
        }

        self.enabled = false;
        self.clear_reconnect();
        self.teardown_socket();
        self.set_status(SessionStatus::Disconnected);
    }

    /// Switch URLs. While enabled the current socket is dropped and a new
    /// one opened right away.
    pub fn set_url(&mut self, url: &str) {
        let url = url.trim();
        if self.url == url {
            return;
        }
        self.url = url.to_string();
        if !self.enabled {
            return;
        }
        self.clear_reconnect();
        self.teardown_socket();
        self.set_status(SessionStatus::Disconnected);
        self.connect();
    }

    pub fn set_scene_id(&mut self, scene_id: &str) {
        let scene_id = normalize_scene_id(scene_id);
        if self.scene_id == scene_id {
            return;
        }
        self.scene_id = scene_id;
        self.ensure_subscribed();
    }

    /// Send a JSON payload on the open socket. Records an `Outbound` event
    /// either way and returns whether the socket accepted it.
    pub fn send_payload(&mut self, payload: Value) -> bool {
        let sent = match (&self.socket, self.status) {
            (Some(active), SessionStatus::Connected) => active.handle.send(payload.to_string()).is_ok(),
            _ => false,
        };
        if !sent {
            log::debug!("bridge payload dropped, status {}", self.status.as_str());
        }
        self.events.push(TransportEvent::Outbound { payload, sent });
        sent
    }

    pub fn handle_input(&mut self, input: TransportInput) {
        match input {
            TransportInput::ReconnectDue { token } => {
                if self.reconnect.as_ref().map(|timer| timer.token) != Some(token) {
                    return;
                }
                self.reconnect = None;
                self.connect();
            }
            TransportInput::Socket { socket, event } => {
                if self.socket.as_ref().map(|active| active.id) != Some(socket) {
                    log::debug!("ignoring {event:?} from stale socket {socket}");
                    return;
                }
                self.handle_socket_event(event);
            }
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Opened => {
                log::info!("bridge connected to {}", self.url);
                self.set_status(SessionStatus::Connected);
                self.set_error(None);
                self.push_lifecycle(LifecycleEvent::Connected { url: self.url.clone() });
                self.subscribed_scene_id = None;
                self.ensure_subscribed();
            }
            SocketEvent::Frame(text) => match decode_frame(&text) {
                Ok(value) => self.events.push(TransportEvent::Inbound(value)),
                Err(err) => {
                    log::warn!("bridge frame dropped: {err}");
                    self.push_lifecycle(LifecycleEvent::InboundJsonInvalid { error: err.to_string() });
                }
            },
            SocketEvent::Error(error) => {
                log::warn!("bridge socket error: {error}");
                self.set_error(Some(SOCKET_ERROR.to_string()));
                self.push_lifecycle(LifecycleEvent::SocketError { error });
            }
            SocketEvent::Closed => {
                log::info!("bridge disconnected from {}", self.url);
                self.socket = None;
                self.subscribed_scene_id = None;
                self.set_status(SessionStatus::Disconnected);
                self.push_lifecycle(LifecycleEvent::Disconnected {
                    url: self.url.clone(),
                    will_reconnect: self.enabled,
                });
                self.schedule_reconnect();
            }
        }
    }

    fn connect(&mut self) {
        if !self.enabled || self.socket.is_some() {
            return;
        }
        self.clear_reconnect();

        if self.url.is_empty() {
            self.set_error(Some(TransportError::EmptyUrl.to_string()));
            self.set_status(SessionStatus::Disconnected);
            return;
        }

        self.set_status(SessionStatus::Connecting);
        self.push_lifecycle(LifecycleEvent::Connecting { url: self.url.clone() });

        self.next_socket_id += 1;
        let id = self.next_socket_id;
        match self.connector.open(&self.url, id, self.inputs_tx.clone()) {
            Ok(handle) => {
                self.socket = Some(ActiveSocket { id, handle });
                self.subscribed_scene_id = None;
            }
            Err(err) => {
                log::error!("bridge socket create failed for {}: {err}", self.url);
                self.push_lifecycle(LifecycleEvent::SocketCreateError {
                    url: self.url.clone(),
                    error: err.to_string(),
                });
                self.set_error(Some(err.to_string()));
                self.set_status(SessionStatus::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.enabled || self.reconnect.is_some() {
            return;
        }
        self.next_token += 1;
        let token = self.next_token;
        let delay = self.reconnect_delay;
        let inputs = self.inputs_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(TransportInput::ReconnectDue { token });
        });
        self.reconnect = Some(ReconnectTimer { token, task });
        self.push_lifecycle(LifecycleEvent::ReconnectScheduled { delay });
    }

    fn clear_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.task.abort();
        }
    }

    fn teardown_socket(&mut self) {
        if let Some(active) = self.socket.take() {
            log::debug!("closing bridge socket {}", active.id);
            active.handle.close();
        }
        self.subscribed_scene_id = None;
    }

    fn ensure_subscribed(&mut self) {
        if self.status != SessionStatus::Connected {
            return;
        }
        if self.subscribed_scene_id.as_deref() == Some(self.scene_id.as_str()) {
            return;
        }
        let scene_id = self.scene_id.clone();
        let sent = self.send_payload(outbound::scene_subscribe(&scene_id));
        if sent {
            self.subscribed_scene_id = Some(scene_id.clone());
        }
        self.push_lifecycle(LifecycleEvent::SceneSubscribe { scene_id, sent });
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status != status {
            self.status = status;
            self.events.push(TransportEvent::Status(status));
        }
    }

    fn set_error(&mut self, error: Option<String>) {
        if self.error != error {
            self.error = error.clone();
            self.events.push(TransportEvent::Error(error));
        }
    }

    fn push_lifecycle(&mut self, event: LifecycleEvent) {
        self.events.push(TransportEvent::Lifecycle(event));
    }
}

impl<C: Connector> Drop for SessionTransport<C> {
    fn drop(&mut self) {
        self.clear_reconnect();
        self.teardown_socket();
    }
}

impl<C: Connector> std::fmt::Debug for SessionTransport<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTransport")
            .field("url", &self.url)
            .field("enabled", &self.enabled)
            .field("status", &self.status)
            .field("scene_id", &self.scene_id)
            .field("socket", &self.socket.as_ref().map(|active| active.id))
            .field("subscribed_scene_id", &self.subscribed_scene_id)
            .finish()
    }
}
