use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::websocket::handler::handle_socket;
use crate::AppState;

pub fn create_router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new().route("/:event_id", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(event_id): Path<i64>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, event_id))
}
