//! Line-oriented driver used by `chrome-shell run`: one command per line on
//! stdin, one response per line on stdout.
use std::str::FromStr;

use anyhow::{Result, bail};

use crate::controller::Activation;
use crate::location::Navigator;
use crate::shell::Shell;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enable(Vec<String>),
    EnableAll,
    Open(String),
    Close,
    Module(String),
    Navigate(String),
    Status,
    Topics,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let rest: Vec<String> = words.map(str::to_string).collect();
        let single = |what: &str| -> Result<String> {
            match rest.as_slice() {
                [one] => Ok(one.clone()),
                _ => bail!("`{verb}` takes exactly one {what}"),
            }
        };

        let command = match verb {
            "enable" if rest.is_empty() => bail!("`enable` needs at least one topic"),
            "enable" => Command::Enable(rest.clone()),
            "enable-all" => Command::EnableAll,
            "open" => Command::Open(single("topic")?),
            "close" => Command::Close,
            "module" => Command::Module(single("module id")?),
            "navigate" => Command::Navigate(single("url")?),
            "status" => Command::Status,
            "topics" => Command::Topics,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command `{other}`"),
        };
        Ok(command)
    }
}

/// Runs one command and returns the text to print.
pub async fn execute(shell: &Shell, navigator: &Navigator, command: Command) -> String {
    match command {
        Command::Enable(ids) => {
            let enabled = shell.enable_topics(&ids);
            format!("enabled: {}", enabled.join(", "))
        }
        Command::EnableAll => {
            shell.enable_all_topics();
            format!("enabled: {}", shell.enabled_topics().join(", "))
        }
        Command::Open(id) => match shell.activate(&id).await {
            Ok(Activation::Opened) => match shell.current_topic() {
                Some(topic) => topic.component.render(),
                None => format!("{id} opened"),
            },
            Ok(Activation::Ignored) => format!("{id} is not enabled"),
            Ok(Activation::Superseded) => format!("{id} was superseded"),
            Err(err) => format!("error: {err}"),
        },
        Command::Close => {
            if shell.close() {
                "closed".to_string()
            } else {
                "nothing open".to_string()
            }
        }
        Command::Module(module) => format!("{:?}", shell.set_active_module(&module)),
        Command::Navigate(url) => {
            navigator.navigate(url);
            format!("at {}", navigator.href())
        }
        Command::Status => {
            let topic = shell
                .current_topic()
                .map(|t| t.id)
                .unwrap_or_else(|| "-".to_string());
            let session = shell
                .current_session()
                .map(|s| format!("{}/{}", s.key.env, s.key.module))
                .unwrap_or_else(|| "-".to_string());
            format!(
                "topic: {topic} | session: {session} | cached modules: {}",
                shell.loader().cache().len()
            )
        }
        Command::Topics => shell.enabled_topics().join("\n"),
        Command::Quit => "bye".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsEnv, EnvKeys};
    use crate::config::ShellConfig;
    use crate::loader::StaticFetcher;
    use crate::topics::ModuleRef;
    use module_sdk::{ComponentRef, HelpDocument, ModuleExports};
    use std::sync::Arc;

    #[test]
    fn parses_commands() {
        assert_eq!(
            "enable a b".parse::<Command>().unwrap(),
            Command::Enable(vec!["a".into(), "b".into()])
        );
        assert_eq!("open  a ".parse::<Command>().unwrap(), Command::Open("a".into()));
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
        assert!("open".parse::<Command>().is_err());
        assert!("open a b".parse::<Command>().is_err());
        assert!("enable".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert!("   ".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn drives_the_shell() {
        let fetcher = StaticFetcher::new();
        let doc: ComponentRef = Arc::new(HelpDocument::new("a", "Configure components", "Steps."));
        fetcher.register("HelpTopics", ModuleExports::new().with("a", Arc::new(move || doc.clone())));

        let mut config = ShellConfig::default();
        config.topics.insert("a".into(), ModuleRef::new("HelpTopics", "a"));
        config.analytics.keys.dev = EnvKeys {
            fallback: Some("dev-key".into()),
            ..Default::default()
        };
        let shell = Shell::builder(config).fetcher(fetcher).build().unwrap();
        let nav = Navigator::new("https://console.example.com/");

        assert_eq!(execute(&shell, &nav, Command::Open("a".into())).await, "a is not enabled");
        assert_eq!(execute(&shell, &nav, Command::Enable(vec!["a".into()])).await, "enabled: a");
        assert!(execute(&shell, &nav, Command::Open("a".into())).await.starts_with("# Configure components"));
        assert_eq!(execute(&shell, &nav, Command::Module("openshift".into())).await, "Created");

        let status = execute(&shell, &nav, Command::Status).await;
        assert_eq!(status, "topic: a | session: dev/openshift | cached modules: 1");
        assert_eq!(shell.config().environment, AnalyticsEnv::Dev);

        assert_eq!(execute(&shell, &nav, Command::Close).await, "closed");
        assert_eq!(execute(&shell, &nav, Command::Close).await, "nothing open");
    }
}
