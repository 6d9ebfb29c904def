//! # scenelink-bridge — Websocket session transport for scenelink
//!
//! Keeps one socket to the scene bridge alive, subscribes to the current
//! scene and turns inbound traffic into [`SceneSession`] updates.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  TransportInput   ┌──────────────────┐
//! │ socket task │ ────────────────► │ SessionTransport │
//! │ (Connector) │ ◄──────────────── │  state machine   │
//! └─────────────┘   outbound text   └────────┬─────────┘
//!                                            │ TransportEvent
//!                                            ▼
//!                                   ┌──────────────────┐
//!                                   │ adapter          │
//!                                   │  parse_inbound   │
//!                                   │  BridgeAction    │──► SceneSession
//!                                   └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — inbound frame decoding and classification
//! - [`outbound`] — `scene_subscribe` / `scene_patch` builders
//! - [`connector`] — socket construction (`tokio-tungstenite`)
//! - [`transport`] — connect/reconnect state machine
//! - [`adapter`] — inbound messages and transport events → session state
//!
//! ## Performance Targets
//!
//! | Metric | Target |
//! |--------|--------|
//! | Reconnect after close | configured delay (1200ms default) |
//! | Inbound frame → session update | one event-loop turn |
//!
//! [`SceneSession`]: scenelink_core::SceneSession

pub mod adapter;
pub mod connector;
pub mod outbound;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use adapter::{apply_actions, map_inbound_to_actions, route_transport_events, BridgeAction, BridgeStatePort};
pub use connector::{Connector, SocketHandle, TransportError, WsConnector};
pub use protocol::{decode_frame, parse_inbound, InboundMessage, InvalidReason, ProtocolError};
pub use transport::{
    LifecycleEvent, SessionTransport, SocketEvent, SocketId, TransportConfig, TransportEvent, TransportInput,
};
