//! `WebSocket` connection state, liveness and the per-connection session loop.

pub mod connection;
pub mod heartbeat;
pub mod session;
