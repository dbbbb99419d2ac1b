//! Backoff-governed accept loop.
//!
//! ```text
//! loop:
//!     [admission permit, if max_concurrent_streams > 0]
//!     accept
//!         Ok         → reset backoff, dispatch, continue
//!         temporary  → sleep 5ms, 10ms, ... capped at 1s, retry
//!         permanent  → return the error
//!     shutdown signal at any suspension point → return Ok
//! ```

use tokio::sync::OwnedSemaphorePermit;

use crate::handler::ConnectionHandler;
use crate::net::classify::{error_class, is_temporary};
use crate::net::{Listener, ListenerId};
use crate::observability::metrics;
use crate::resilience::AcceptBackoff;
use crate::server::{ServeError, Shared};

impl<H> Shared<H> {
    pub(crate) async fn accept_loop<L>(&self, listener: &L, id: ListenerId) -> Result<(), ServeError>
    where
        L: Listener,
        H: ConnectionHandler<L::Conn>,
    {
        let mut shutdown = self.shutdown.subscribe();
        let mut backoff = AcceptBackoff::new();

        loop {
            let permit: Option<OwnedSemaphorePermit> = match &self.admission {
                Some(semaphore) => {
                    let semaphore = semaphore.clone();
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Ok(()),
                        permit = semaphore.acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            // Never closed while the server is alive.
                            Err(_) => return Ok(()),
                        },
                    }
                }
                None => None,
            };

            let accepted = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                res = listener.accept() => res,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    backoff.reset();
                    metrics::record_accept();
                    self.dispatch(id, stream, peer_addr, permit);
                }
                Err(err) if is_temporary(&err) => {
                    let delay = backoff.next_delay();
                    metrics::record_accept_error(error_class(&err));
                    tracing::warn!(
                        listener = %id,
                        error = %err,
                        delay = ?delay,
                        attempt = backoff.failures(),
                        "Accept error; retrying"
                    );

                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    metrics::record_accept_error(error_class(&err));
                    return Err(ServeError::Accept(err));
                }
            }
        }
    }
}
