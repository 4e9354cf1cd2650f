use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::net::TcpListener;
use tracing::info;

use super::protocol::Dispatcher;

async fn handler(State(dispatcher): State<Arc<Dispatcher>>, body: String) -> Response {
    match dispatcher.handle_message(&body).await {
        Some(reply) => ([(header::CONTENT_TYPE, "application/json")], reply).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

pub fn routes(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/", post(handler))
        .with_state(Arc::new(dispatcher))
}

/// Serve one message per `POST /` until the process is stopped.
pub async fn serve(dispatcher: Dispatcher, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(message = "Serving on HTTP", addr = %listener.local_addr()?);
    axum::serve(listener, routes(dispatcher)).await
}
