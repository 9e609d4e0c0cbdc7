//! The interactive terminal client of `turnstile`.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;
use turnstile::SessionBuilder;
use turnstile::config::Config;
use turnstile::core::TranscriptSource;
use turnstile::rag::{Embedder, OpenAIEmbedder};
use turnstile_openai_model::{OpenAIConfigBuilder, OpenAIProvider};

const BAR_CHAR: &str = "▎";
const MAX_TOOL_OUTPUT: usize = 160;

/// Chat with an agent that can use MCP tools, skills and your documents.
#[derive(Parser)]
#[command(version)]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let mut openai_config = OpenAIConfigBuilder::from_env()
        .context("OPENAI_API_KEY environment variable is not set")?;
    if let Some(model) = &config.model {
        openai_config = openai_config.with_model(model);
    }
    let openai_config = openai_config.build();
    let embedder: Arc<dyn Embedder> =
        Arc::new(OpenAIEmbedder::new(&openai_config));
    let model_provider = OpenAIProvider::new(openai_config);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut session = SessionBuilder::with_model_provider(model_provider)
        .with_system_prompt(
            include_str!("./system_prompt.md")
                .replace("{{HOST_OS}}", host_os()),
        )
        .on_transcript(move |transcript, source| {
            event_tx.send((transcript.to_owned(), source)).ok();
        })
        .with_config(&config, Some(embedder))
        .await?
        .build()
        .await;

    for name in session.unavailable_providers() {
        let bar = BAR_CHAR.bright_yellow();
        println!("{bar}⚠️  Tool provider {name} is unavailable");
    }
    info!("{} tools available", session.tool_definitions().len());

    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")?
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let mut stdin = BufReader::new(io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = match stdin.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!("error reading input: {err}");
                break;
            }
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            _ => {}
        }

        let mut printer = Printer::new(&progress_style);
        let send = session.send_message(line);
        tokio::pin!(send);

        let result = loop {
            select! {
                result = &mut send => break result,
                Some((transcript, source)) = event_rx.recv() => {
                    printer.print(&transcript, source);
                }
                _ = sleep(Duration::from_millis(100)) => printer.tick(),
            }
        };
        while let Ok((transcript, source)) = event_rx.try_recv() {
            printer.print(&transcript, source);
        }
        printer.finish();

        if let Err(err) = result {
            let bar = BAR_CHAR.bright_red();
            println!("{bar}❌ {}", err.to_string().bright_red());
        }
        println!();
    }

    session.end_session().await;
    Ok(())
}

/// Shows a spinner until the first transcript arrives, then streams the
/// assistant text and tool activity.
struct Printer {
    progress_bar: Option<ProgressBar>,
    streaming: bool,
}

impl Printer {
    fn new(style: &ProgressStyle) -> Self {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(style.clone());
        progress_bar.set_message("🤔 Thinking...");
        Self {
            progress_bar: Some(progress_bar),
            streaming: false,
        }
    }

    fn tick(&self) {
        if let Some(progress_bar) = &self.progress_bar {
            progress_bar.inc(1);
        }
    }

    fn print(&mut self, transcript: &str, source: TranscriptSource) {
        // Finish the progress bar before printing anything else.
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }

        match source {
            TranscriptSource::Assistant => {
                if !self.streaming {
                    print!("{}🤖 ", BAR_CHAR.bright_cyan());
                    self.streaming = true;
                }
                print!("{}", transcript.bright_white());
                std::io::stdout().flush().ok();
            }
            TranscriptSource::Tool => {
                self.end_line();
                println!(
                    "{}🔧 {}",
                    BAR_CHAR.bright_yellow(),
                    shorten(transcript, MAX_TOOL_OUTPUT).dimmed()
                );
            }
            TranscriptSource::User => {}
        }
    }

    fn end_line(&mut self) {
        if self.streaming {
            println!();
            self.streaming = false;
        }
    }

    fn finish(&mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
        self.end_line();
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    let text = text.trim_end();
    let line = text.lines().next().unwrap_or_default();
    match line.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None if line.len() < text.len() => format!("{line}…"),
        None => line.to_owned(),
    }
}

#[inline]
fn host_os() -> &'static str {
    let os = std::env::consts::OS;
    match os {
        "linux" => "Linux",
        "macos" => "macOS",
        "windows" => "Windows",
        _ => "some other OS",
    }
}
