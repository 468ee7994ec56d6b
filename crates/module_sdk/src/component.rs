use std::fmt::Debug;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Something the shell can put in front of the user. The shell never looks
/// inside a component; it only stores it and hands it to the rendering layer.
pub trait Component: Send + Sync + Debug {
    /// Short human readable title (the drawer header).
    fn title(&self) -> &str;

    /// Produce the rendered body.
    fn render(&self) -> String;
}

pub type ComponentRef = Arc<dyn Component>;

/// A help document served by a remote module bundle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct HelpDocument {
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub links: Vec<String>,
}

impl HelpDocument {
    pub fn new(name: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            content: content.into(),
            links: vec![],
        }
    }
}

impl Component for HelpDocument {
    fn title(&self) -> &str {
        &self.title
    }

    fn render(&self) -> String {
        if self.links.is_empty() {
            format!("# {}\n\n{}", self.title, self.content)
        } else {
            let links = self
                .links
                .iter()
                .map(|l| format!("- {l}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("# {}\n\n{}\n\n{}", self.title, self.content, links)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_title_and_links() {
        let mut doc = HelpDocument::new("create-environment", "Create a new environment", "Pick a name.");
        assert_eq!(doc.render(), "# Create a new environment\n\nPick a name.");

        doc.links.push("https://example.com/docs".into());
        assert!(doc.render().ends_with("- https://example.com/docs"));
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let doc: HelpDocument =
            serde_json::from_str(r#"{"name":"a","title":"Configure components"}"#).unwrap();
        assert_eq!(doc.content, "");
        assert!(doc.links.is_empty());
    }
}
