//! `/health` endpoint.

use std::time::Instant;

use duel_core::HubStats;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    pub uptime_secs: u64,
    /// Open `WebSocket` connections.
    pub connections: usize,
    /// Registered sessions.
    pub sessions: usize,
    pub rooms: usize,
    pub waiting: usize,
}

pub fn health_check(start_time: Instant, connections: usize, stats: HubStats) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions: stats.sessions,
        rooms: stats.rooms,
        waiting: stats.waiting,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), 0, HubStats::default());
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, 0, HubStats::default());
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn counts_are_copied() {
        let stats = HubStats {
            sessions: 4,
            rooms: 2,
            waiting: 1,
            joinable: 0,
        };
        let json = serde_json::to_value(health_check(Instant::now(), 5, stats)).unwrap();
        assert_eq!(json["connections"], 5);
        assert_eq!(json["sessions"], 4);
        assert_eq!(json["rooms"], 2);
        assert_eq!(json["waiting"], 1);
    }
}
