use std::fmt::Debug;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::analytics::AnalyticsSessionManager;

/// Anything that can tell us what URL the user is looking at.
pub trait LocationNotifier: Send + Sync + Debug {
    /// A receiver whose current value is the visible href.
    fn subscribe(&self) -> watch::Receiver<String>;
}

/// A notifier driven by explicit `navigate` calls.
#[derive(Debug, Clone)]
pub struct Navigator {
    href: Arc<watch::Sender<String>>,
}

impl Navigator {
    pub fn new(initial: impl Into<String>) -> Self {
        let (href, _) = watch::channel(initial.into());
        Self {
            href: Arc::new(href),
        }
    }

    pub fn navigate(&self, href: impl Into<String>) {
        self.href.send_replace(href.into());
    }

    pub fn href(&self) -> String {
        self.href.borrow().clone()
    }
}

impl LocationNotifier for Navigator {
    fn subscribe(&self) -> watch::Receiver<String> {
        self.href.subscribe()
    }
}

/// The href with its `#fragment` removed, otherwise untouched. Fragments only
/// matter to the page itself and never count as navigation.
pub fn strip_fragment(href: &str) -> String {
    href.split_once('#').map_or(href, |(base, _)| base).to_string()
}

/// Emits a page view on the current analytics session whenever the visible
/// URL changes. Only the first `register` call does anything.
#[derive(Debug, Default)]
pub struct LocationWatcher {
    registered: OnceCell<()>,
    cancel: CancellationToken,
}

impl LocationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts observing `notifier` once `ready` turns true. The href at
    /// registration is the baseline, so navigation that happens before ready
    /// is reported as soon as observing starts.
    pub fn register(
        &self,
        notifier: &dyn LocationNotifier,
        ready: watch::Receiver<bool>,
        sessions: Arc<AnalyticsSessionManager>,
    ) -> Option<JoinHandle<()>> {
        if self.registered.set(()).is_err() {
            debug!("location watcher already registered");
            return None;
        }

        let mut hrefs = notifier.subscribe();
        let mut last = strip_fragment(&hrefs.borrow_and_update());
        let cancel = self.cancel.clone();

        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                ok = wait_ready(ready) => if !ok {
                    warn!("application ready signal dropped; not observing location");
                    return;
                },
            }
            debug!(href = %last, "observing location changes");

            let current = strip_fragment(&hrefs.borrow_and_update());
            if current != last {
                last = current;
                sessions.page_view(&last);
            }

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = hrefs.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let href = strip_fragment(&hrefs.borrow_and_update());
                        if href != last {
                            last = href;
                            sessions.page_view(&last);
                        }
                    }
                }
            }
            debug!("location watcher stopped");
        }))
    }

    pub fn is_registered(&self) -> bool {
        self.registered.get().is_some()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

async fn wait_ready(mut ready: watch::Receiver<bool>) -> bool {
    while !*ready.borrow_and_update() {
        if ready.changed().await.is_err() {
            return false;
        }
    }
    true
}
