//! # duel-server
//!
//! Axum HTTP + `WebSocket` front end for the duel hub.
//!
//! - `WebSocket` gateway: authentication, per-connection read loop, ping/deadline liveness
//! - Command bus and the single dispatcher that applies commands to hub state
//! - Broadcaster for outbound frames, presence worker, error sink
//! - HTTP endpoints: health check, joinable rooms
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod hub;
pub mod presence;
pub mod rooms;
pub mod server;
pub mod shutdown;
pub mod websocket;
