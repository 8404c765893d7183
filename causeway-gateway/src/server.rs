//! The TCP accept loop.
//!
//! Serves a [`Router`] over HTTP/1.1 and HTTP/2 on one listener via the
//! auto-negotiating connection driver. Each connection owns a cancellation
//! pair: its signal is handed to every request served on it, and the
//! handle fires when the connection driver finishes, so request contexts
//! observe a broken transport. The router's own drop guard covers the
//! other teardown path, where the driver drops an in-flight request
//! future directly. Closing the listener (dropping the server) is
//! sufficient to retire the gateway.

use std::io;
use std::net::SocketAddr;

use causeway::cancellation;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::router::Router;

pub struct Server {
    listener: TcpListener,
    router: Router,
}

impl Server {
    /// Bind the listener; the gateway serves once [`serve`](Self::serve)
    /// is awaited.
    pub async fn bind(addr: SocketAddr, router: Router) -> io::Result<Server> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Server { listener, router })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped.
    pub async fn serve(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let router = self.router.clone();
            tokio::spawn(async move {
                let (handle, signal) = cancellation();
                let service = service_fn(move |req| {
                    let router = router.clone();
                    let signal = signal.clone();
                    async move {
                        Ok::<_, std::convert::Infallible>(
                            router.call_with_cancellation(req, Some(signal)).await,
                        )
                    }
                });
                let result = auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
                // The transport is gone; anything still running on this
                // connection observes cancellation.
                handle.cancel();
                match result {
                    Ok(()) => debug!(%peer, "connection closed"),
                    Err(error) => warn!(%peer, %error, "connection error"),
                }
            });
        }
    }
}
