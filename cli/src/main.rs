//! `tobi`: terminal front end for the streaming chat client.

mod repl;
mod session;

use std::io::Write;

use clap::{Parser, Subcommand};
use client::config::{ClientConfig, ConfigError};
use client::state::chat::DispatchError;
use client::state::stream::StreamCompletion;
use frames::{MessageEntry, Sender, Source};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::repl::{ReplCommand, parse_line};
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("no endpoint configured; pass --endpoint or set TOBI_WS_URL")]
    MissingEndpoint,
    #[error("websocket connect failed: {0}")]
    WsConnect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket closed")]
    WsClosed,
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no answer to rate yet")]
    NothingToRate,
    #[error("assistant error: {0}")]
    Answer(String),
}

#[derive(Parser, Debug)]
#[command(name = "tobi", about = "Streaming chat client for the research assistant")]
struct Cli {
    #[arg(long, env = "TOBI_WS_URL")]
    endpoint: Option<String>,

    #[arg(long, env = "TOBI_ROLE")]
    role: Option<String>,

    #[arg(long, help = "Per-request timeout in seconds; 0 disables")]
    timeout_secs: Option<u64>,

    #[arg(long, default_value_t = false, help = "Send prompts without conversation history")]
    no_history: bool,

    #[arg(long, default_value_t = false, help = "Leave citations off committed answers")]
    no_sources: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one prompt and stream the answer to stdout.
    Ask {
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Interactive conversation.
    Chat,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig, CliError> {
        let mut config = ClientConfig::from_env()?;
        if let Some(endpoint) = self.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            config.endpoint = Some(endpoint.to_owned());
        }
        if let Some(role) = &self.role {
            config.role.clone_from(role);
        }
        if let Some(secs) = self.timeout_secs {
            config.request_timeout_secs = secs;
        }
        if self.no_history {
            config.send_history = false;
        }
        if self.no_sources {
            config.display_sources = false;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;

    match cli.command {
        Command::Ask { prompt } => run_ask(config, &prompt.join(" ")).await,
        Command::Chat => run_chat(config).await,
    }
}

async fn run_ask(config: ClientConfig, prompt: &str) -> Result<(), CliError> {
    let mut session = Session::connect(config).await?;
    let completion = session.ask(prompt, print_text).await?;
    finish_answer(&completion);
    session.close().await;

    if completion.is_error {
        return Err(CliError::Answer(completion.committed_text().to_owned()));
    }
    Ok(())
}

async fn run_chat(config: ClientConfig) -> Result<(), CliError> {
    let mut session = Session::connect(config.clone()).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("connected; /help for commands");

    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Prompt(prompt) => {
                session.pump_ready();
                session.settle().await;
                if session.chat().connection_state().is_terminal() {
                    eprintln!("connection lost; reconnecting");
                    session = Session::connect(config.clone()).await?;
                }
                match session.ask(prompt, print_text).await {
                    Ok(completion) => finish_answer(&completion),
                    Err(error) => eprintln!("error: {error}"),
                }
            }
            ReplCommand::Rate { rating, reason } => match session.rate_last(rating, reason).await {
                Ok(()) => eprintln!("feedback sent"),
                Err(error) => eprintln!("error: {error}"),
            },
            ReplCommand::Role(role) => {
                session.set_role(role);
                eprintln!("role: {role}");
            }
            ReplCommand::History => print_history(session.chat().history().iter()),
            ReplCommand::Help => eprintln!("{}", repl::HELP),
            ReplCommand::Unknown(line) => eprintln!("unknown command: {line}"),
            ReplCommand::Quit => break,
        }
    }

    session.close().await;
    Ok(())
}

fn print_text(text: &str) {
    print!("{text}");
    if let Err(error) = std::io::stdout().flush() {
        warn!(%error, "stdout flush failed");
    }
}

fn finish_answer(completion: &StreamCompletion) {
    if !completion.final_text.is_empty() {
        println!();
    }
    if completion.is_error {
        eprintln!("error: {}", completion.committed_text());
    }
    print_sources(&completion.sources);
}

fn print_sources(sources: &[Source]) {
    for (n, source) in sources.iter().enumerate() {
        match source.page {
            Some(page) => println!("[{}] {} (page {page})", n + 1, source.url),
            None => println!("[{}] {}", n + 1, source.url),
        }
    }
}

fn print_history<'a>(entries: impl Iterator<Item = &'a MessageEntry>) {
    for entry in entries {
        let who = match entry.sender {
            Sender::User => "you",
            Sender::Bot => "bot",
        };
        println!("{who}> {}", entry.text);
    }
}
