//! The shell's one analytics session.
//!
//! A session is created lazily for the first active module and replaced
//! whenever the `(environment, module)` key changes. The replaced client is
//! simply dropped unless `RotationPolicy::Dispose` is configured. Nothing in
//! here ever fails loudly: a broken analytics setup is logged and ignored.
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::logger::ShellMetrics;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, Default,
    EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AnalyticsEnv {
    #[default]
    Dev,
    Prod,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub env: AnalyticsEnv,
    pub module: String,
}

/// Write keys for one environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct EnvKeys {
    /// Used by every module without a key of its own.
    pub fallback: Option<String>,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct WriteKeyTable {
    #[serde(default)]
    pub dev: EnvKeys,
    #[serde(default)]
    pub prod: EnvKeys,
}

impl WriteKeyTable {
    pub fn key_for(&self, env: AnalyticsEnv, module: &str) -> Option<&str> {
        let keys = match env {
            AnalyticsEnv::Dev => &self.dev,
            AnalyticsEnv::Prod => &self.prod,
        };
        keys.modules
            .get(module)
            .or(keys.fallback.as_ref())
            .map(String::as_str)
    }
}

/// What happens to a session's client when the session is replaced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /// Drop the reference and let the client wind down on its own.
    #[default]
    FireAndForget,
    /// Call `AnalyticsClient::dispose` on the replaced client.
    Dispose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub write_key: String,
    /// Only the very first session reports a page view on load.
    pub initial_pageview: bool,
}

pub trait AnalyticsClient: Send + Sync + Debug {
    fn write_key(&self) -> &str;

    fn page(&self, url: &str);

    fn dispose(&self) {}
}

pub type ClientRef = Arc<dyn AnalyticsClient>;

/// Creates clients; stands in for the analytics vendor SDK.
pub trait AnalyticsBackend: Send + Sync + Debug {
    fn load(&self, settings: &SessionSettings) -> Result<ClientRef>;
}

#[derive(Debug, Clone)]
pub struct AnalyticsSession {
    pub key: SessionKey,
    pub client: ClientRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    Created,
    Rotated,
    Unchanged,
    /// No module is active yet.
    Skipped,
    /// No write key, or the backend refused; the previous session stays.
    Failed,
}

#[derive(Debug)]
pub struct AnalyticsSessionManager {
    backend: Arc<dyn AnalyticsBackend>,
    keys: WriteKeyTable,
    policy: RotationPolicy,
    slot: watch::Sender<Option<AnalyticsSession>>,
    metrics: ShellMetrics,
}

impl AnalyticsSessionManager {
    pub fn new(
        backend: Arc<dyn AnalyticsBackend>,
        keys: WriteKeyTable,
        policy: RotationPolicy,
        metrics: ShellMetrics,
    ) -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            backend,
            keys,
            policy,
            slot,
            metrics,
        }
    }

    /// Make sure the live session belongs to `(env, module)`.
    pub fn ensure(&self, env: AnalyticsEnv, module: &str) -> SessionChange {
        if module.is_empty() {
            return SessionChange::Skipped;
        }
        let key = SessionKey {
            env,
            module: module.to_string(),
        };

        let had_session = match self.slot.borrow().as_ref() {
            Some(current) if current.key == key => return SessionChange::Unchanged,
            Some(_) => true,
            None => false,
        };

        let Some(write_key) = self.keys.key_for(env, module) else {
            warn!(%env, %module, "no analytics write key configured; keeping current session");
            return SessionChange::Failed;
        };
        let settings = SessionSettings {
            write_key: write_key.to_string(),
            initial_pageview: !had_session,
        };
        let client = match self.backend.load(&settings) {
            Ok(client) => client,
            Err(err) => {
                warn!(%env, %module, error = %err, "analytics session could not be created");
                return SessionChange::Failed;
            }
        };

        let previous = self.slot.send_replace(Some(AnalyticsSession { key, client }));
        match previous {
            None => {
                info!(target: "analytics", %env, %module, "analytics session created");
                SessionChange::Created
            }
            Some(old) => {
                if self.policy == RotationPolicy::Dispose {
                    old.client.dispose();
                }
                self.metrics.session_rotated();
                info!(
                    target: "analytics",
                    %env,
                    %module,
                    previous = %old.key.module,
                    "analytics session rotated"
                );
                SessionChange::Rotated
            }
        }
    }

    pub fn current_session(&self) -> Option<AnalyticsSession> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AnalyticsSession>> {
        self.slot.subscribe()
    }

    /// Report a page view on the live session, if there is one.
    pub fn page_view(&self, url: &str) {
        match self.current_session() {
            Some(session) => {
                debug!(%url, module = %session.key.module, "page view");
                session.client.page(url);
            }
            None => debug!(%url, "page view without an analytics session"),
        }
    }
}

/// Backend that reports through `tracing` events with target `analytics`.
#[derive(Debug, Default, Clone)]
pub struct TracingAnalytics;

#[derive(Debug)]
pub struct TracingClient {
    write_key: String,
    session_id: Uuid,
}

impl AnalyticsBackend for TracingAnalytics {
    fn load(&self, settings: &SessionSettings) -> Result<ClientRef> {
        let client = TracingClient {
            write_key: settings.write_key.clone(),
            session_id: Uuid::new_v4(),
        };
        if settings.initial_pageview {
            info!(target: "analytics", session = %client.session_id, "initial page view");
        }
        Ok(Arc::new(client))
    }
}

impl AnalyticsClient for TracingClient {
    fn write_key(&self) -> &str {
        &self.write_key
    }

    fn page(&self, url: &str) {
        info!(target: "analytics", session = %self.session_id, %url, "page");
    }

    fn dispose(&self) {
        debug!(session = %self.session_id, "analytics client disposed");
    }
}
