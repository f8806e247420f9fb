//! ouroboros CLI: an interactive personal assistant.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use ouroboros::agent::OuroborosAgent;
use ouroboros::config::OuroborosConfig;
use ouroboros::speech::{OpenAITranscriber, Transcriber};
use ouroboros::ProviderKind;

#[derive(Parser)]
#[command(name = "ouroboros", version, about = "Personal-assistant agent")]
struct Cli {
    /// Configuration file (defaults to <data dir>/config.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for memory, thoughts, skills, speech and history.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// LLM provider: ollama, openai, deepseek, or a custom name.
    #[arg(long, global = true)]
    provider: Option<ProviderKind>,

    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of the chat provider.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[arg(long, global = true)]
    persona: Option<String>,

    /// Speak replies aloud.
    #[arg(long, global = true)]
    voice: bool,

    /// Start with push mode on.
    #[arg(long, global = true)]
    push: bool,

    /// Start with background thinking on.
    #[arg(long, global = true)]
    think: bool,

    /// Verbose logging.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive session (the default).
    Chat,

    /// Ask one question and print the answer.
    Ask {
        /// The question.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Run one command line, pipes included, and print the reply.
    Run {
        #[arg(required = true, num_args = 1..)]
        line: Vec<String>,
    },

    /// Transcribe an audio file.
    Transcribe {
        file: PathBuf,
    },

    /// Print the effective configuration as TOML.
    Config,
}

impl Cli {
    fn load_config(&self) -> Result<OuroborosConfig> {
        let mut config =
            OuroborosConfig::load(self.config.as_deref()).context("loading configuration")?;

        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(provider) = &self.provider {
            if *provider != config.provider {
                config.provider = provider.clone();
                config.api_key = provider
                    .api_key_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|key| !key.trim().is_empty());
            }
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(persona) = &self.persona {
            config.persona = persona.clone();
        }
        config.voice.enabled |= self.voice;
        config.autonomy.push_mode |= self.push;
        config.autonomy.thinking |= self.think;
        config.debug |= self.debug;

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "ouroboros=debug,info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_tracing(config.debug);

    match &cli.command {
        None | Some(Commands::Chat) => repl(config).await,
        Some(Commands::Ask { question }) => {
            one_shot(config, &format!("ask {}", question.join(" "))).await
        }
        Some(Commands::Run { line }) => one_shot(config, &line.join(" ")).await,
        Some(Commands::Transcribe { file }) => transcribe(&config, file).await,
        Some(Commands::Config) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn repl(config: OuroborosConfig) -> Result<()> {
    let mut agent = OuroborosAgent::initialize(config).await?;
    let prompt = format!("{}> ", agent.persona().name);

    println!("Ouroboros ready. Type `help` for commands, `exit` to quit.");
    for status in agent.subsystems() {
        println!("  {status}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{prompt}");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let reply = agent.process(&line).await;
        if !reply.text.is_empty() {
            println!("{}", reply.text);
        }
        if reply.exit {
            break;
        }
    }

    agent.shutdown().await;
    Ok(())
}

async fn one_shot(config: OuroborosConfig, line: &str) -> Result<()> {
    let mut agent = OuroborosAgent::initialize(config).await?;
    let reply = agent.process(line).await;
    println!("{}", reply.text);
    agent.shutdown().await;
    Ok(())
}

async fn transcribe(config: &OuroborosConfig, file: &Path) -> Result<()> {
    let voice = &config.voice;
    let transcriber = OpenAITranscriber::new(&voice.endpoint, voice.api_key.clone(), &voice.stt_model);
    let text = transcriber
        .transcribe_file(file)
        .await
        .with_context(|| format!("transcribing {}", file.display()))?;
    println!("{text}");
    Ok(())
}
