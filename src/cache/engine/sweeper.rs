//! Background maintenance worker
//!
//! A dedicated named thread drives the expiration and underused sweeps on a
//! fixed tick. The worker holds only a weak handle to the engine: once the
//! last engine handle drops, the next tick observes the dead upgrade and the
//! thread exits on its own.

use std::sync::Weak;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use log::{debug, error};

use crate::cache::types::CacheOperationError;

use super::EngineInner;

/// Handle to the running maintenance thread
#[derive(Debug)]
pub(crate) struct SweeperHandle {
    shutdown_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Spawn the maintenance worker
    pub(crate) fn spawn<V: Send + Sync + 'static>(
        engine: Weak<EngineInner<V>>,
        interval_ms: u64,
    ) -> Result<Self, CacheOperationError> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let ticker = tick(Duration::from_millis(interval_ms));

        let handle = thread::Builder::new()
            .name("fleetcache-sweeper".to_string())
            .spawn(move || {
                debug!("maintenance worker started, interval {}ms", interval_ms);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            let Some(engine) = engine.upgrade() else {
                                break;
                            };
                            engine.run_sweep();
                        }
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                debug!("maintenance worker stopped");
            })
            .map_err(|io_error| {
                CacheOperationError::invalid_state(format!(
                    "failed to spawn maintenance worker: {}",
                    io_error
                ))
            })?;

        Ok(Self {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Signal the worker and wait for it to exit
    pub(crate) fn stop(mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("maintenance worker panicked during shutdown");
            }
        }
    }
}
