//! The shell: owns the help-topic slot, the module cache and the analytics
//! session, and is handed to consumers as an `Arc<Shell>`.
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::analytics::{
    AnalyticsBackend, AnalyticsSession, AnalyticsSessionManager, SessionChange, TracingAnalytics,
};
use crate::config::ShellConfig;
use crate::controller::{ActiveTopic, ActiveTopicController, Activation};
use crate::error::ShellError;
use crate::factory_cache::{Clock, ModuleFactoryCache, SystemClock};
use crate::flags::{FeatureFlags, StaticFlags};
use crate::loader::{HttpFetcher, ModuleFetcher, RemoteModuleLoader};
use crate::location::{LocationNotifier, LocationWatcher};
use crate::logger::ShellMetrics;
use crate::topics::{TopicId, TopicRegistry};

pub struct ShellBuilder {
    config: ShellConfig,
    fetcher: Option<Arc<dyn ModuleFetcher>>,
    analytics: Option<Arc<dyn AnalyticsBackend>>,
    flags: Option<Arc<dyn FeatureFlags>>,
    clock: Arc<dyn Clock>,
}

impl ShellBuilder {
    pub fn fetcher(mut self, fetcher: Arc<dyn ModuleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn analytics(mut self, backend: Arc<dyn AnalyticsBackend>) -> Self {
        self.analytics = Some(backend);
        self
    }

    pub fn flags(mut self, flags: Arc<dyn FeatureFlags>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Anything not supplied is derived from the config: modules are fetched
    /// over HTTP, flags come from `feature_flags`, analytics goes to tracing.
    pub fn build(self) -> Result<Arc<Shell>> {
        let config = self.config;
        let metrics = ShellMetrics::new();

        let fetcher: Arc<dyn ModuleFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(
                config.modules.clone(),
                config.request_timeout(),
            )?),
        };
        let backend: Arc<dyn AnalyticsBackend> = match self.analytics {
            Some(backend) => backend,
            None => Arc::new(TracingAnalytics),
        };
        let flags: Arc<dyn FeatureFlags> = match self.flags {
            Some(flags) => flags,
            None => Arc::new(StaticFlags::new(config.feature_flags.clone())),
        };

        let registry = Arc::new(match &config.default_topic_module {
            Some(module) => TopicRegistry::with_default_module(module.clone()),
            None => TopicRegistry::new(),
        });
        for (id, module) in &config.topics {
            registry.register(id, module.clone());
        }

        let cache = Arc::new(ModuleFactoryCache::new(self.clock));
        let loader = Arc::new(RemoteModuleLoader::new(
            cache,
            fetcher,
            config.cache_timeout(),
            metrics.clone(),
        ));
        let topics = ActiveTopicController::new(registry.clone(), loader.clone(), metrics.clone());
        let analytics = Arc::new(AnalyticsSessionManager::new(
            backend,
            config.analytics.keys.clone(),
            config.analytics.rotation,
            metrics,
        ));
        let (ready, _) = watch::channel(false);

        let shell = Shell {
            config,
            registry,
            loader,
            topics,
            analytics,
            flags,
            location: LocationWatcher::new(),
            ready,
        };
        let startup = shell.config.enabled_topics.clone();
        let enabled = shell.enable_topics(&startup);
        info!(topics = enabled.len(), environment = %shell.config.environment, "shell ready");
        Ok(Arc::new(shell))
    }
}

pub struct Shell {
    config: ShellConfig,
    registry: Arc<TopicRegistry>,
    loader: Arc<RemoteModuleLoader>,
    topics: ActiveTopicController,
    analytics: Arc<AnalyticsSessionManager>,
    flags: Arc<dyn FeatureFlags>,
    location: LocationWatcher,
    ready: watch::Sender<bool>,
}

impl Shell {
    pub fn builder(config: ShellConfig) -> ShellBuilder {
        ShellBuilder {
            config,
            fetcher: None,
            analytics: None,
            flags: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn loader(&self) -> &Arc<RemoteModuleLoader> {
        &self.loader
    }

    /// Enables the given topics, skipping the ones whose feature flag is
    /// off. Returns the ids that were enabled.
    pub fn enable_topics<S: AsRef<str>>(&self, ids: &[S]) -> Vec<TopicId> {
        let allowed: Vec<TopicId> = ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| match self.config.topic_flags.get(*id) {
                Some(flag) if !self.flags.is_enabled(flag) => {
                    debug!(topic = %id, %flag, "topic gated off by feature flag");
                    false
                }
                _ => true,
            })
            .map(str::to_string)
            .collect();
        self.registry.enable(&allowed);
        allowed
    }

    pub fn enable_all_topics(&self) {
        self.registry.enable_all();
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.registry.is_enabled(id)
    }

    pub fn enabled_topics(&self) -> Vec<TopicId> {
        self.registry.enabled_topics()
    }

    pub async fn activate(&self, id: &str) -> Result<Activation, ShellError> {
        self.topics.activate(id).await
    }

    pub fn close(&self) -> bool {
        self.topics.close()
    }

    pub fn current_topic(&self) -> Option<ActiveTopic> {
        self.topics.current_topic()
    }

    pub fn subscribe_topic(&self) -> watch::Receiver<Option<ActiveTopic>> {
        self.topics.subscribe()
    }

    /// Called whenever the application module in front of the user changes.
    pub fn set_active_module(&self, module: &str) -> SessionChange {
        self.analytics.ensure(self.config.environment, module)
    }

    pub fn current_session(&self) -> Option<AnalyticsSession> {
        self.analytics.current_session()
    }

    pub fn analytics(&self) -> &Arc<AnalyticsSessionManager> {
        &self.analytics
    }

    /// Starts page-view reporting for `notifier`. Effective once per shell;
    /// a second `Shell` registers its own observer. Observing begins after
    /// `mark_ready`.
    pub fn observe_location(&self, notifier: &dyn LocationNotifier) -> Option<JoinHandle<()>> {
        self.location
            .register(notifier, self.ready.subscribe(), self.analytics.clone())
    }

    /// The application finished loading.
    pub fn mark_ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn shutdown(&self) {
        self.location.shutdown();
        self.topics.close();
        info!("shell shut down");
    }
}
