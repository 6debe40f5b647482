//! Interrupt handling for the artifact directory.
//!
//! A background task waits for an interrupt and raises a [`Cancel`] signal.
//! Running work observes it, kills and reaps the process it is waiting on,
//! and returns. Only then does the main flow remove the directory, so
//! nothing can write into it after removal and it is removed exactly once.

use std::future::Future;
use std::process::ExitStatus;

use camino::Utf8Path;
use color_eyre::eyre::{eyre, Context};
use color_eyre::Result;
use tokio::process::Child;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Message of the error returned by interrupted runs.
pub(crate) const INTERRUPTED: &str = "Interrupted";

/// How the interrupt task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Stopped by the main flow.
    Stopped,
    /// An interrupt arrived and cancellation was raised.
    Interrupted,
}

/// A future resolving on the next SIGINT, or never if `enabled` is false.
///
/// The handler is registered before this returns, so an interrupt arriving
/// before the future is first polled is not lost. When disabled, Ctrl-C
/// keeps its default behaviour.
pub(crate) fn sigint(enabled: bool) -> Result<impl Future<Output = ()> + Send + 'static> {
    let sigint = enabled
        .then(|| signal(SignalKind::interrupt()))
        .transpose()
        .context("Installing interrupt handler")?;
    Ok(async move {
        match sigint {
            Some(mut sigint) => {
                sigint.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    })
}

/// Recursively remove the artifact directory.
pub(crate) fn remove_workdir(dir: &Utf8Path) -> Result<()> {
    info!("Removing {dir}");
    std::fs::remove_dir_all(dir).with_context(|| format!("Removing {dir}"))
}

/// Cancellation raised by the interrupt task, observed by running work.
#[derive(Debug, Clone)]
pub(crate) struct Cancel(watch::Receiver<bool>);

impl Cancel {
    /// A signal that is never raised.
    pub(crate) fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self(rx)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }

    /// Fail if cancellation was raised.
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(eyre!(INTERRUPTED));
        }
        Ok(())
    }

    /// Resolves once cancellation is raised.
    pub(crate) async fn cancelled(&self) {
        let mut rx = self.0.clone();
        // Only fails once the sender is gone, after which nothing can cancel
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for `child` to exit. On cancellation it is killed and reaped first.
pub(crate) async fn wait_child(child: &mut Child, cancel: &Cancel) -> Result<ExitStatus> {
    let status = tokio::select! {
        r = child.wait() => Some(r),
        _ = cancel.cancelled() => None,
    };
    match status {
        Some(r) => Ok(r?),
        None => {
            debug!("Killing pid {:?}", child.id());
            child.kill().await.context("Killing child process")?;
            Err(eyre!(INTERRUPTED))
        }
    }
}

#[derive(Debug)]
pub(crate) struct InterruptCleanup {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Outcome>,
}

impl InterruptCleanup {
    /// Spawn the task raising the returned [`Cancel`] once `interrupt`
    /// resolves.
    pub(crate) fn spawn<F>(interrupt: F) -> (Self, Cancel)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (stop, stop_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = interrupt => {
                    info!("Interrupted, stopping");
                    cancel_tx.send_replace(true);
                    Outcome::Interrupted
                }
                _ = stop_rx => Outcome::Stopped,
            }
        });
        (Self { stop, task }, Cancel(cancel_rx))
    }

    /// Stop the task and wait for it to exit.
    pub(crate) async fn finish(self) -> Result<Outcome> {
        let Self { stop, task } = self;
        // The task may have exited already
        let _ = stop.send(());
        task.await.context("Joining interrupt handler")
    }
}
