//! HTTP server for the query gateway

use super::api::{handle_api, ApiState};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Server};
use std::future::Future;
use std::net::SocketAddr;

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    state: ApiState,
    shutdown: impl Future<Output = ()>,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_| {
        let state = state.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                handle_api(req, state.clone())
            }))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    tracing::info!("Lens gateway listening on {}", server.local_addr());
    server.with_graceful_shutdown(shutdown).await
}
