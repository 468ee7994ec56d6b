//! Resolves `(namespace, export)` pairs to components, going through the
//! factory cache and falling back to the injected fetch capability.
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use dashmap::DashMap;
use module_sdk::{ComponentRef, FetchedModule, HelpDocument, ModuleExports};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ShellError;
use crate::factory_cache::{CachedFactory, ModuleFactoryCache};
use crate::logger::ShellMetrics;

/// Transport used to download a remote module. Timeouts and retries are the
/// implementation's business.
#[async_trait]
pub trait ModuleFetcher: Send + Sync + Debug {
    async fn load(&self, namespace: &str) -> anyhow::Result<FetchedModule>;
}

/// In-process module table. Used for built-in modules and in tests.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    modules: DashMap<String, FetchedModule>,
    loads: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, namespace: &str, module: impl Into<FetchedModule>) {
        self.modules.insert(namespace.to_string(), module.into());
    }

    pub fn unregister(&self, namespace: &str) {
        self.modules.remove(namespace);
    }

    /// How many times `load` has been called.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleFetcher for StaticFetcher {
    async fn load(&self, namespace: &str) -> anyhow::Result<FetchedModule> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.modules
            .get(namespace)
            .map(|m| m.clone())
            .ok_or_else(|| anyhow!("no module registered for namespace `{namespace}`"))
    }
}

/// Body served by a help document bundle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct DocumentBundle {
    #[serde(default)]
    pub documents: Vec<HelpDocument>,
}

impl DocumentBundle {
    /// Every document becomes an export named after the document.
    pub fn into_exports(self) -> ModuleExports {
        let mut exports = ModuleExports::new();
        for doc in self.documents {
            let name = doc.name.clone();
            let component: ComponentRef = Arc::new(doc);
            exports.insert(&name, Arc::new(move || component.clone()));
        }
        exports
    }
}

/// Fetches document bundles over HTTP, one URL per namespace.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    sources: HashMap<String, String>,
}

impl HttpFetcher {
    pub fn new(sources: HashMap<String, String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, sources })
    }
}

#[async_trait]
impl ModuleFetcher for HttpFetcher {
    async fn load(&self, namespace: &str) -> anyhow::Result<FetchedModule> {
        let url = self
            .sources
            .get(namespace)
            .ok_or_else(|| anyhow!("no source configured for namespace `{namespace}`"))?;
        debug!(%namespace, %url, "fetching remote module");
        let bundle: DocumentBundle = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("decoding bundle from {url}"))?;
        Ok(FetchedModule::Exports(bundle.into_exports()))
    }
}

#[derive(Debug)]
pub struct RemoteModuleLoader {
    cache: Arc<ModuleFactoryCache>,
    fetcher: Arc<dyn ModuleFetcher>,
    ttl: Duration,
    metrics: ShellMetrics,
}

impl RemoteModuleLoader {
    pub fn new(
        cache: Arc<ModuleFactoryCache>,
        fetcher: Arc<dyn ModuleFetcher>,
        ttl: Duration,
        metrics: ShellMetrics,
    ) -> Self {
        Self {
            cache,
            fetcher,
            ttl,
            metrics,
        }
    }

    pub fn cache(&self) -> &Arc<ModuleFactoryCache> {
        &self.cache
    }

    /// Returns a component for `export` of `namespace`, fetching the module
    /// only when the cache has no fresh factory for it.
    ///
    /// Concurrent misses for the same namespace are not coalesced; each one
    /// fetches and the last to finish overwrites the cache entry.
    pub async fn resolve(&self, namespace: &str, export: &str) -> Result<ComponentRef, ShellError> {
        let factory = match self.cache.get(namespace) {
            Some(factory) => {
                self.metrics.cache_hit(namespace);
                factory
            }
            None => {
                self.metrics.cache_miss(namespace);
                self.fetch(namespace).await?
            }
        };

        let loader = factory
            .exports
            .get(export)
            .ok_or_else(|| ShellError::module_not_found(namespace, export))?;
        Ok(loader())
    }

    async fn fetch(&self, namespace: &str) -> Result<CachedFactory, ShellError> {
        let fetched = self.fetcher.load(namespace).await.map_err(|err| {
            warn!(%namespace, error = %err, "remote module failed to load");
            self.metrics.load_failed(namespace);
            ShellError::load(namespace, err)
        })?;
        Ok(self.cache.put(namespace, fetched.into_exports(), self.ttl))
    }
}
