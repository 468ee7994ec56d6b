use std::collections::HashMap;
use std::fmt::Debug;

/// The feature-flag service, as far as the shell is concerned.
pub trait FeatureFlags: Send + Sync + Debug {
    fn is_enabled(&self, flag: &str) -> bool;
}

/// Flags read from configuration. Unknown flags are off.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    flags: HashMap<String, bool>,
}

impl StaticFlags {
    pub fn new(flags: HashMap<String, bool>) -> Self {
        Self { flags }
    }
}

impl FeatureFlags for StaticFlags {
    fn is_enabled(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flags_are_off() {
        let flags = StaticFlags::new(HashMap::from([
            ("platform.chrome.help-topics".to_string(), true),
            ("platform.chrome.beta".to_string(), false),
        ]));
        assert!(flags.is_enabled("platform.chrome.help-topics"));
        assert!(!flags.is_enabled("platform.chrome.beta"));
        assert!(!flags.is_enabled("never-heard-of-it"));
    }
}
