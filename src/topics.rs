use dashmap::DashMap;
use module_sdk::FetchedModule;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type TopicId = String;

/// Where the component for a topic lives.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct ModuleRef {
    pub namespace: String,
    #[serde(default = "default_export")]
    pub export: String,
}

fn default_export() -> String {
    FetchedModule::DEFAULT_EXPORT.to_string()
}

impl ModuleRef {
    pub fn new(namespace: impl Into<String>, export: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            export: export.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEntry {
    pub id: TopicId,
    pub enabled: bool,
    pub module: Option<ModuleRef>,
}

/// Which topics exist, which of them may be opened, and where each one's
/// component comes from.
///
/// Everything here is permissive: topic sets are declared by modules that are
/// deployed independently, so unknown and duplicate ids are never errors.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    entries: DashMap<TopicId, TopicEntry>,
    default_module: Option<ModuleRef>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Topics with no registered module fall back to `module`.
    pub fn with_default_module(module: ModuleRef) -> Self {
        Self {
            entries: DashMap::new(),
            default_module: Some(module),
        }
    }

    /// Records the manifest lookup for `id` without touching its enabled flag.
    pub fn register(&self, id: &str, module: ModuleRef) {
        self.entries
            .entry(id.to_string())
            .and_modify(|entry| entry.module = Some(module.clone()))
            .or_insert_with(|| TopicEntry {
                id: id.to_string(),
                enabled: false,
                module: Some(module),
            });
    }

    pub fn enable<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            let id = id.as_ref();
            self.entries
                .entry(id.to_string())
                .and_modify(|entry| entry.enabled = true)
                .or_insert_with(|| TopicEntry {
                    id: id.to_string(),
                    enabled: true,
                    module: None,
                });
            debug!(topic = %id, "help topic enabled");
        }
    }

    pub fn enable_all(&self) {
        for mut entry in self.entries.iter_mut() {
            entry.enabled = true;
        }
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|entry| entry.enabled)
    }

    pub fn exists(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn module_ref(&self, id: &str) -> Option<ModuleRef> {
        self.entries
            .get(id)
            .and_then(|entry| entry.module.clone())
            .or_else(|| self.default_module.clone())
    }

    /// Enabled topic ids, sorted; this is what the drawer's topic menu lists.
    pub fn enabled_topics(&self) -> Vec<TopicId> {
        let mut ids: Vec<TopicId> = self
            .entries
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
