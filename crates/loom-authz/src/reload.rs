// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic policy reload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::synced::Inner;

/// A running reload task.
///
/// The task only holds a [`Weak`] reference to the enforcer state, so it never keeps an
/// enforcer alive and exits on its own once the last handle is dropped.
pub(crate) struct ReloadHandle {
	interval: Duration,
	stopped: Arc<AtomicBool>,
	shutdown_tx: broadcast::Sender<()>,
	handle: JoinHandle<()>,
}

impl ReloadHandle {
	pub(crate) fn spawn(inner: Weak<Inner>, interval: Duration) -> Self {
		let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
		let stopped = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&stopped);

		let handle = tokio::spawn(async move {
			info!(interval = ?interval, "policy auto-reload started");
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {}
					_ = shutdown_rx.recv() => {
						info!("policy auto-reload shutting down");
						break;
					}
				}

				let Some(inner) = inner.upgrade() else {
					debug!("enforcer dropped, stopping policy auto-reload");
					break;
				};

				match inner.reload(|| flag.load(Ordering::Acquire)).await {
					Ok(true) => {}
					Ok(false) => {
						debug!("policy auto-reload stopped before swap");
						break;
					}
					Err(e) => {
						warn!(error = %e, "policy auto-reload failed, keeping current policy");
					}
				}
			}
		});

		Self {
			interval,
			stopped,
			shutdown_tx,
			handle,
		}
	}

	pub(crate) fn interval(&self) -> Duration {
		self.interval
	}

	pub(crate) fn is_running(&self) -> bool {
		!self.handle.is_finished()
	}

	/// Signals the task and waits for it to exit. A reload already in flight finishes
	/// loading but does not install its result.
	pub(crate) async fn stop(self) {
		self.stopped.store(true, Ordering::Release);
		let _ = self.shutdown_tx.send(());
		if let Err(e) = self.handle.await {
			if !e.is_cancelled() {
				warn!(error = %e, "policy auto-reload task ended abnormally");
			}
		}
	}
}
