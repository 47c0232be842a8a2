//! Inbound push notifications from the bank.

use axum::{
    body::Bytes,
    debug_handler,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use color_eyre::{eyre::Context, Result};
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::model::StatementEvent;

pub const PATH: &str = "/web_hook";
const OK: &str = "Ok!";
const NOT_OK: &str = "Not Ok!";

#[derive(Clone)]
struct AxumState {
    queue: mpsc::Sender<StatementEvent>,
}

pub fn routes(queue: mpsc::Sender<StatementEvent>) -> Router {
    Router::new()
        .route(PATH, get(handle_push).post(handle_push))
        .with_state(AxumState { queue })
}

/// Serves [`routes`] on `listener` until `cnx` is cancelled.
pub async fn serve(
    listener: TcpListener,
    queue: mpsc::Sender<StatementEvent>,
    cnx: CancellationToken,
) -> Result<()> {
    let listen_address = listener.local_addr().context("listen address")?;
    info!(%listen_address, "Awaiting push notifications");

    axum::serve(listener, routes(queue))
        .with_graceful_shutdown(cnx.cancelled_owned())
        .await
        .context("Running webhook listener")?;
    Ok(())
}

#[instrument(skip_all, fields(%method))]
#[debug_handler]
async fn handle_push(State(state): State<AxumState>, method: Method, body: Bytes) -> Response {
    debug!(body = %String::from_utf8_lossy(&body), "push");

    // the bank checks the url with an empty GET when it is registered
    if method == Method::GET && body.is_empty() {
        return (StatusCode::OK, OK).into_response();
    }

    let event = match serde_json::from_slice::<StatementEvent>(&body) {
        Ok(event) => event,
        Err(err) => {
            warn!(%err, "undecodable push body");
            return (StatusCode::OK, NOT_OK).into_response();
        }
    };

    // waits for room in the queue when the consumer falls behind
    if state.queue.send(event).await.is_err() {
        error!("notification queue closed");
        return (StatusCode::SERVICE_UNAVAILABLE, NOT_OK).into_response();
    }

    (StatusCode::OK, OK).into_response()
}
