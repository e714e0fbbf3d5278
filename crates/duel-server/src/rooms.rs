//! `/api/user/rooms`: the joinable-rooms snapshot.

use axum::Json;
use axum::extract::State;
use duel_core::RoomInfo;
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

/// GET|POST /api/user/rooms
pub async fn list_rooms(State(state): State<AppState>) -> Json<RoomsResponse> {
    Json(RoomsResponse {
        rooms: state.hub.spare_rooms(),
    })
}
