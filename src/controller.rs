//! The help drawer's single active-topic slot.
//!
//! States are `Closed` (slot empty) and `Open(id)`. Every `activate` takes a
//! request token before it starts resolving; when the resolution finishes the
//! result is only committed if no newer `activate` or `close` has been issued
//! in the meantime. The newest request wins, not the slowest one.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use module_sdk::ComponentRef;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ShellError;
use crate::loader::RemoteModuleLoader;
use crate::logger::ShellMetrics;
use crate::topics::{TopicId, TopicRegistry};

#[derive(Clone)]
pub struct ActiveTopic {
    pub id: TopicId,
    pub component: ComponentRef,
}

impl fmt::Debug for ActiveTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTopic")
            .field("id", &self.id)
            .field("title", &self.component.title())
            .finish()
    }
}

/// What an `activate` call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The topic is now the open one.
    Opened,
    /// Unknown or disabled topic; nothing changed.
    Ignored,
    /// A newer `activate`/`close` arrived while this one was resolving.
    Superseded,
}

impl Activation {
    fn as_str(&self) -> &'static str {
        match self {
            Activation::Opened => "opened",
            Activation::Ignored => "ignored",
            Activation::Superseded => "superseded",
        }
    }
}

#[derive(Debug)]
pub struct ActiveTopicController {
    registry: Arc<TopicRegistry>,
    loader: Arc<RemoteModuleLoader>,
    slot: watch::Sender<Option<ActiveTopic>>,
    latest: AtomicU64,
    metrics: ShellMetrics,
}

impl ActiveTopicController {
    pub fn new(
        registry: Arc<TopicRegistry>,
        loader: Arc<RemoteModuleLoader>,
        metrics: ShellMetrics,
    ) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            registry,
            loader,
            slot,
            latest: AtomicU64::new(0),
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    /// Make `id` the open topic, replacing whatever was open.
    ///
    /// Disabled or unknown ids are ignored. Resolution errors are returned and
    /// leave the previous state in place.
    pub async fn activate(&self, id: &str) -> Result<Activation, ShellError> {
        if !self.registry.is_enabled(id) {
            debug!(topic = %id, "ignoring activation of unknown or disabled topic");
            self.metrics.activation(Activation::Ignored.as_str());
            return Ok(Activation::Ignored);
        }

        let token = self.next_token();
        let Some(module) = self.registry.module_ref(id) else {
            self.metrics.activation("failed");
            return Err(ShellError::module_not_found("<unregistered>", id));
        };

        let component = match self.loader.resolve(&module.namespace, &module.export).await {
            Ok(component) => component,
            Err(err) => {
                warn!(topic = %id, error = %err, "help topic activation rejected");
                self.metrics.activation("failed");
                return Err(err);
            }
        };

        let committed = self.slot.send_if_modified(|slot| {
            if self.latest.load(Ordering::SeqCst) != token {
                return false;
            }
            *slot = Some(ActiveTopic {
                id: id.to_string(),
                component,
            });
            true
        });

        let outcome = if committed {
            info!(target: "activation", topic = %id, namespace = %module.namespace, "help topic opened");
            Activation::Opened
        } else {
            debug!(topic = %id, token, "discarding superseded activation");
            Activation::Superseded
        };
        self.metrics.activation(outcome.as_str());
        Ok(outcome)
    }

    /// Close the open topic. Returns whether anything was open. Pending
    /// activations are invalidated either way.
    pub fn close(&self) -> bool {
        self.next_token();
        let closed = self.slot.send_if_modified(|slot| slot.take().is_some());
        if closed {
            info!(target: "activation", "help topic closed");
        }
        closed
    }

    pub fn current_topic(&self) -> Option<ActiveTopic> {
        self.slot.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Change feed for the drawer. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<Option<ActiveTopic>> {
        self.slot.subscribe()
    }

    fn next_token(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory_cache::ModuleFactoryCache;
    use crate::loader::StaticFetcher;
    use crate::topics::ModuleRef;
    use module_sdk::{Component, HelpDocument, ModuleExports};
    use std::time::Duration;

    fn doc_exports(names: &[(&str, &str)]) -> ModuleExports {
        let mut exports = ModuleExports::new();
        for (name, title) in names {
            let component: ComponentRef = Arc::new(HelpDocument::new(*name, *title, ""));
            exports.insert(name, Arc::new(move || component.clone()));
        }
        exports
    }

    fn controller() -> (ActiveTopicController, Arc<StaticFetcher>) {
        let fetcher = StaticFetcher::new();
        fetcher.register(
            "HelpTopics",
            doc_exports(&[
                ("topic-a", "Configure components"),
                ("topic-b", "Create a new environment"),
            ]),
        );
        let registry = Arc::new(TopicRegistry::new());
        registry.register("topic-a", ModuleRef::new("HelpTopics", "topic-a"));
        registry.register("topic-b", ModuleRef::new("HelpTopics", "topic-b"));
        registry.register("broken", ModuleRef::new("Missing", "default"));
        registry.register("typo", ModuleRef::new("HelpTopics", "topic-z"));

        let loader = Arc::new(RemoteModuleLoader::new(
            Arc::new(ModuleFactoryCache::default()),
            fetcher.clone(),
            Duration::from_secs(120),
            ShellMetrics::new(),
        ));
        (
            ActiveTopicController::new(registry, loader, ShellMetrics::new()),
            fetcher,
        )
    }

    fn open_id(controller: &ActiveTopicController) -> Option<String> {
        controller.current_topic().map(|t| t.id)
    }

    #[tokio::test]
    async fn switch_and_close_scenario() {
        let (controller, _) = controller();
        controller.registry().enable(["topic-a", "topic-b"]);

        assert_eq!(controller.activate("topic-a").await.unwrap(), Activation::Opened);
        assert_eq!(open_id(&controller).as_deref(), Some("topic-a"));

        assert_eq!(controller.activate("topic-b").await.unwrap(), Activation::Opened);
        let open = controller.current_topic().unwrap();
        assert_eq!(open.id, "topic-b");
        assert_eq!(open.component.title(), "Create a new environment");

        assert!(controller.is_open());
        assert!(controller.close());
        assert!(!controller.is_open());
        assert!(controller.current_topic().is_none());

        assert_eq!(controller.activate("topic-c").await.unwrap(), Activation::Ignored);
        assert!(controller.current_topic().is_none());
    }

    #[tokio::test]
    async fn disabled_topic_leaves_open_topic_alone() {
        let (controller, _) = controller();
        controller.registry().enable(["topic-a"]);
        controller.activate("topic-a").await.unwrap();

        assert_eq!(controller.activate("topic-b").await.unwrap(), Activation::Ignored);
        assert_eq!(open_id(&controller).as_deref(), Some("topic-a"));
    }

    #[tokio::test]
    async fn reactivating_open_topic_is_idempotent() {
        let (controller, fetcher) = controller();
        controller.registry().enable(["topic-a"]);

        controller.activate("topic-a").await.unwrap();
        controller.activate("topic-a").await.unwrap();
        assert_eq!(open_id(&controller).as_deref(), Some("topic-a"));
        assert_eq!(fetcher.load_count(), 1, "second activation is a cache hit");
    }

    #[tokio::test]
    async fn failed_resolution_keeps_prior_state() {
        let (controller, _) = controller();
        controller.registry().enable(["topic-a", "broken", "typo"]);
        controller.activate("topic-a").await.unwrap();

        let err = controller.activate("broken").await.unwrap_err();
        assert!(matches!(err, ShellError::Load { .. }));
        assert_eq!(open_id(&controller).as_deref(), Some("topic-a"));

        let err = controller.activate("typo").await.unwrap_err();
        assert!(matches!(err, ShellError::ModuleNotFound { .. }));
        assert_eq!(open_id(&controller).as_deref(), Some("topic-a"));
    }

    #[tokio::test]
    async fn enabled_topic_without_module_is_rejected() {
        let (controller, _) = controller();
        controller.registry().enable(["orphan"]);
        assert!(controller.activate("orphan").await.is_err());
        assert!(controller.current_topic().is_none());
    }

    #[tokio::test]
    async fn close_when_closed_is_a_noop() {
        let (controller, _) = controller();
        let mut rx = controller.subscribe();
        assert!(!controller.close());
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let (controller, _) = controller();
        controller.registry().enable(["topic-a"]);
        let mut rx = controller.subscribe();

        controller.activate("topic-a").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(|t| t.id.clone()).as_deref(), Some("topic-a"));

        controller.close();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_none());
    }
}
