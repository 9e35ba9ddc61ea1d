//! File system watcher for the configured library roots.
//!
//! Uses the `notify` crate to watch each root recursively. Raw events are
//! not surfaced individually: any create/modify/remove/rename (re)starts a
//! single countdown, and one `ChangesDetected` signal fires when the
//! countdown elapses with no further event. A burst of many events
//! collapses to one signal, and an unconsumed pending signal absorbs
//! further bursts (capacity-1 channel).

use std::path::PathBuf;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Quiet period after the last raw event before the signal fires.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(5);

/// Watches library roots and emits debounced change signals.
///
/// Dropping the watcher stops watching and ends the signal stream.
pub struct LibraryWatcher {
    window: Duration,
    // Kept alive for the lifetime of the watcher; None until initialized.
    inner: Option<RecommendedWatcher>,
}

impl LibraryWatcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: None,
        }
    }

    /// Start watching the given roots recursively.
    ///
    /// Must be called exactly once; a second call fails with
    /// [`Error::AlreadyInitialized`]. Roots that do not exist are skipped
    /// silently - a later sync pass re-checks existence. Requires a tokio
    /// runtime (spawns the debounce task).
    ///
    /// Returns the receiver for the debounced change signal.
    pub fn initialize(&mut self, roots: &[PathBuf]) -> Result<mpsc::Receiver<()>> {
        if self.inner.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    if is_change(&event.kind) {
                        let _ = raw_tx.send(());
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "sync::watcher", error = %e, "Watch error");
                }
            }
        })
        .map_err(|e| Error::Watch(e.to_string()))?;

        for root in roots {
            if !root.is_dir() {
                tracing::debug!(target: "sync::watcher", path = %root.display(), "Root missing, not watching");
                continue;
            }
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::Watch(e.to_string()))?;
            tracing::info!(target: "sync::watcher", path = %root.display(), "Watching directory");
        }

        let (signal_tx, signal_rx) = mpsc::channel(1);
        tokio::spawn(debounce_loop(raw_rx, signal_tx, self.window));

        self.inner = Some(watcher);
        Ok(signal_rx)
    }
}

/// Event kinds that count as library changes. Access events are noise.
fn is_change(kind: &notify::EventKind) -> bool {
    use notify::EventKind::*;
    matches!(kind, Create(_) | Modify(_) | Remove(_) | Any | Other)
}

/// Collapse raw events into one signal per quiet period.
///
/// Waits for a first event, then restarts the countdown on every further
/// event; when the window elapses quietly, emits exactly one signal.
/// `try_send` on a capacity-1 channel means a signal the consumer has not
/// picked up yet absorbs the next burst instead of queueing another.
async fn debounce_loop(
    mut raw: mpsc::UnboundedReceiver<()>,
    signal: mpsc::Sender<()>,
    window: Duration,
) {
    loop {
        if raw.recv().await.is_none() {
            return;
        }
        loop {
            match tokio::time::timeout(window, raw.recv()).await {
                // Another event inside the window: restart the countdown
                Ok(Some(())) => continue,
                // Watcher dropped mid-burst: deliver what we saw, then stop
                Ok(None) => {
                    let _ = signal.try_send(());
                    return;
                }
                // Quiet period elapsed
                Err(_) => break,
            }
        }
        tracing::debug!(target: "sync::watcher", "Changes detected");
        let _ = signal.try_send(());
    }
}
