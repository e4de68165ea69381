//! Client-facing transport
//!
//! One WebSocket per client channel; JSON text frames in both directions.

mod websocket;

pub use websocket::{router, serve};
