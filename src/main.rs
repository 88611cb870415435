#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else)]

use crate::{config::RuntimeConfiguration, routes::escola_router, state::EscolaState};
use tokio::{net::TcpListener, signal};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[macro_use]
extern crate tracing;

mod config;
mod data;
mod error;
mod routes;
mod serializer;
mod state;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("signal received, starting graceful shutdown");
}

/// Serves until `shutdown` resolves and every in-flight request has drained, and only then closes
/// the store.
async fn serve(
    listener: TcpListener,
    state: EscolaState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, escola_router(state.clone()))
        .with_graceful_shutdown(shutdown)
        .await?;

    state.sensible_shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .expect("unable to set tracing subscriber");

    info!("`tracing` online");

    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            info!("No .env file found, using the process environment");
        } else {
            error!(?e, "Unable to load .env file");
        }
    }

    let config = RuntimeConfiguration::new().expect("unable to create config");
    let state = EscolaState::new(config.clone())
        .await
        .expect("unable to create state");

    let server_ip = config.server_ip();
    let listener = TcpListener::bind(server_ip)
        .await
        .expect("unable to listen on server ip");

    info!(?server_ip, "Listening");
    serve(listener, state, shutdown_signal())
        .await
        .expect("unable to serve app");
    info!("Shut down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{
            StudentStore,
            memory::MemoryStudentStore,
            student::{Student, StudentFields, StudentQuery},
        },
        error::{EscolaError, EscolaResult},
    };
    use async_trait::async_trait;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
        sync::{Notify, oneshot},
    };

    /// Behaves like a pool: lookups fail once closed. Lookups also pause, so a request can still be
    /// running when the shutdown signal arrives.
    #[derive(Debug, Default)]
    struct SlowStore {
        inner: MemoryStudentStore,
        closed: AtomicBool,
        lookup_started: Notify,
    }

    #[async_trait]
    impl StudentStore for SlowStore {
        async fn list(&self, query: &StudentQuery) -> EscolaResult<(u64, Vec<Student>)> {
            self.inner.list(query).await
        }

        async fn get(&self, id: i64) -> EscolaResult<Option<Student>> {
            self.lookup_started.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(EscolaError::MakeQuery {
                    source: sqlx::Error::PoolClosed,
                });
            }
            self.inner.get(id).await
        }

        async fn insert(&self, fields: StudentFields) -> EscolaResult<Student> {
            self.inner.insert(fields).await
        }

        async fn update(&self, id: i64, fields: StudentFields) -> EscolaResult<Option<Student>> {
            self.inner.update(id, fields).await
        }

        async fn remove(&self, id: i64) -> EscolaResult<bool> {
            self.inner.remove(id).await
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn store_closes_only_after_in_flight_requests_finish() {
        let store = Arc::new(SlowStore::default());
        let state = EscolaState::with_store(store.clone(), RuntimeConfiguration::in_memory(None));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("unable to bind test listener");
        let addr = listener.local_addr().expect("listener has no address");

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve(listener, state, async move {
            let _ = stop_rx.await;
        }));

        let mut stream = TcpStream::connect(addr).await.expect("unable to connect");
        stream
            .write_all(b"GET /students/1/ HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .expect("unable to send request");

        store.lookup_started.notified().await;
        stop_tx.send(()).expect("server stopped early");

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .expect("unable to read response");
        assert!(response.starts_with("HTTP/1.1 404"), "{response}");

        server
            .await
            .expect("server task panicked")
            .expect("server failed");
        assert!(store.closed.load(Ordering::SeqCst));
    }
}
