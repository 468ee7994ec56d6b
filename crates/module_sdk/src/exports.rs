use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::component::ComponentRef;

/// Produces a fresh component for one export of a module.
pub type ExportLoader = Arc<dyn Fn() -> ComponentRef + Send + Sync>;

/// Remote containers publish their exports as `./Name`; the shell looks them
/// up as `Name`. Both spellings resolve to the same key.
pub fn normalize_export_name(name: &str) -> &str {
    name.strip_prefix("./").unwrap_or(name)
}

/// The export table of one loaded module, keyed by normalized export name.
#[derive(Clone, Default)]
pub struct ModuleExports {
    loaders: HashMap<String, ExportLoader>,
}

impl ModuleExports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, loader: ExportLoader) -> Self {
        self.insert(name, loader);
        self
    }

    pub fn insert(&mut self, name: &str, loader: ExportLoader) {
        self.loaders
            .insert(normalize_export_name(name).to_string(), loader);
    }

    pub fn get(&self, name: &str) -> Option<&ExportLoader> {
        self.loaders.get(normalize_export_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaders.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleExports")
            .field("exports", &self.names())
            .finish()
    }
}

/// The shapes a fetch capability may hand back for a namespace.
#[derive(Clone, Debug)]
pub enum FetchedModule {
    /// A bare component, exposed as the `default` export.
    Component(ComponentRef),
    /// A full export table.
    Exports(ModuleExports),
}

impl FetchedModule {
    pub const DEFAULT_EXPORT: &'static str = "default";

    pub fn into_exports(self) -> ModuleExports {
        match self {
            FetchedModule::Component(component) => ModuleExports::new().with(
                Self::DEFAULT_EXPORT,
                Arc::new(move || component.clone()),
            ),
            FetchedModule::Exports(exports) => exports,
        }
    }
}

impl From<ModuleExports> for FetchedModule {
    fn from(exports: ModuleExports) -> Self {
        FetchedModule::Exports(exports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, HelpDocument};

    fn doc(title: &str) -> ComponentRef {
        Arc::new(HelpDocument::new(title, title, ""))
    }

    #[test]
    fn container_style_names_are_normalized() {
        let a = doc("TestApp");
        let exports = ModuleExports::new().with("./TestApp", Arc::new(move || a.clone()));

        assert!(exports.contains("TestApp"));
        assert!(exports.contains("./TestApp"));
        assert_eq!(exports.names(), vec!["TestApp".to_string()]);
    }

    #[test]
    fn bare_component_becomes_default_export() {
        let exports = FetchedModule::Component(doc("Configure components")).into_exports();
        let loader = exports.get("default").expect("default export");
        assert_eq!(loader().title(), "Configure components");
        assert_eq!(exports.len(), 1);
    }
}
