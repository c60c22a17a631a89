//! Exchange transport.
//!
//! # Responsibilities
//! - Define the transport error type shared by the pool and the breakers
//! - Provide a WebSocket implementation of the pool's connection capabilities

pub mod error;
pub mod websocket;

pub use error::ConnectorError;
pub use websocket::{PingProbe, WsConnection, WsConnector};
