use std::{
    env,
    path::{Path, PathBuf},
    process,
};

use anyhow::bail;
use chrome_shell::{
    Shell,
    config::ShellConfig,
    console::{Command, execute},
    location::Navigator,
    logger::init_tracing,
    schema::write_schema,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    name = "chrome-shell",
    about = "Application shell: help topics, remote modules and analytics sessions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the shell and drive it from stdin
    Run(RunArgs),

    /// Validate the configuration and exit
    Check(ConfigArgs),

    /// Emit JSON-Schema for the config and document bundles into `<root>/schemas`
    Schema,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Config file, relative to the root directory
    #[arg(long, default_value = "shell.yaml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// URL the navigator starts at
    #[arg(long, default_value = "https://console.example.com/")]
    start_url: String,
}

/// Resolve the shell root directory from the environment or use default.
pub fn resolve_root_dir() -> PathBuf {
    if let Ok(path) = env::var("CHROME_SHELL_ROOT") {
        PathBuf::from(path)
    } else {
        PathBuf::from(".")
    }
}

fn load_config(root: &Path, args: &ConfigArgs) -> anyhow::Result<ShellConfig> {
    let mut config = ShellConfig::load(&root.join(&args.config))?;
    config.apply_env(&root.join(".env"))?;
    Ok(config)
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = resolve_root_dir();
    match cli.command.unwrap_or(Commands::Run(RunArgs {
        config: ConfigArgs {
            config: PathBuf::from("shell.yaml"),
        },
        start_url: "https://console.example.com/".to_string(),
    })) {
        Commands::Run(args) => run(root, args).await,
        Commands::Check(args) => {
            let config = load_config(&root, &args)?;
            let problems = config.validate();
            if problems.is_empty() {
                println!("✅ Configuration is valid.");
                return Ok(());
            }
            for problem in &problems {
                println!("- {problem}");
            }
            bail!("{} configuration problem(s)", problems.len());
        }
        Commands::Schema => {
            let out_dir = root.join("schemas");
            write_schema(&out_dir)?;
            println!("Schemas written to {}", out_dir.display());
            Ok(())
        }
    }
}

async fn run(root: PathBuf, args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&root, &args.config)?;
    let telemetry = init_tracing(&root, &config.logging)?;

    for problem in config.validate() {
        tracing::warn!("config: {problem}");
    }

    let shell = match Shell::builder(config).build() {
        Ok(shell) => shell,
        Err(err) => {
            error!("Failed to start shell: {err:#}");
            telemetry.shutdown();
            process::exit(1);
        }
    };

    let navigator = Navigator::new(args.start_url);
    shell.observe_location(&navigator);
    shell.mark_ready();

    info!("shell running; reading commands from stdin");
    println!("chrome-shell running; type `quit` or press Ctrl-C to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => println!("{}", execute(&shell, &navigator, command).await),
                    Err(err) => println!("error: {err}"),
                }
            }
        }
    }

    println!("Shutting down…");
    shell.shutdown();
    telemetry.shutdown();
    println!("Goodbye!");
    Ok(())
}
