use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use wordvoice::{Accent, AppConfig, CoreState, SpeakOutcome};

const USAGE: &str = "Usage: wordvoice [--config <file>] <command>

Commands:
  speak <text...> [--accent us|uk|au]   Speak a word or phrase
  listen [--accent us|uk|au]            Speak each line read from stdin; 'stop' silences
  stats                                 Print cache statistics
  clean                                 Remove expired and excess cache entries
  clear                                 Empty both cache tiers";

enum Command {
    Speak { text: String, accent: Option<Accent> },
    Listen { accent: Option<Accent> },
    Stats,
    Clean,
    Clear,
}

struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_accent(value: Option<String>) -> anyhow::Result<Accent> {
    let value = value.ok_or_else(|| anyhow!("--accent requires a value (us, uk or au)"))?;
    value.parse::<Accent>().map_err(|e| anyhow!(e))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Cli> {
    let mut config_path = None;
    let mut accent = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                config_path = Some(PathBuf::from(path));
            }
            "-a" | "--accent" => accent = Some(parse_accent(args.next())?),
            "-h" | "--help" => anyhow::bail!("{USAGE}"),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("speak") => {
            let text = positional.collect::<Vec<_>>().join(" ");
            if text.trim().is_empty() {
                anyhow::bail!("'speak' needs some text\n\n{USAGE}");
            }
            Command::Speak { text, accent }
        }
        Some(name) => {
            if let Some(extra) = positional.next() {
                anyhow::bail!("Unexpected argument '{extra}' after '{name}'");
            }
            match name {
                "listen" => Command::Listen { accent },
                "stats" => Command::Stats,
                "clean" => Command::Clean,
                "clear" => Command::Clear,
                other => anyhow::bail!("Unknown command '{other}'\n\n{USAGE}"),
            }
        }
        None => anyhow::bail!("{USAGE}"),
    };

    Ok(Cli {
        config_path,
        command,
    })
}

fn report(outcome: &SpeakOutcome) {
    match outcome {
        SpeakOutcome::PlayedFromCache => println!("played from cache"),
        SpeakOutcome::PlayedSynthesized { backend } => println!("synthesized by {backend}"),
        SpeakOutcome::SpokenByFallback { backend } => println!("spoken by {backend}"),
        SpeakOutcome::Preempted => println!("preempted"),
        SpeakOutcome::Skipped => println!("skipped (autoplay disabled)"),
    }
}

/// Speaks each line of `input`, then waits for the last one to finish.
async fn listen<R>(state: Arc<CoreState>, input: R, accent: Option<Accent>) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let settings = state.config.speech_settings();
    let mut lines = input.lines();
    let mut last: Option<JoinHandle<()>> = None;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("stop") {
            state.coordinator.stop();
            continue;
        }

        // Each line preempts the previous one; results are reported as they land.
        let coordinator = state.coordinator.clone();
        last = Some(tokio::spawn(async move {
            let result = match accent {
                Some(accent) => coordinator.speak(&line, accent).await,
                None => coordinator.speak_autoplay(&line, &settings).await,
            };
            match result {
                Ok(outcome) => report(&outcome),
                Err(e) => eprintln!("'{line}': {e}"),
            }
        }));
    }

    if let Some(last) = last {
        last.await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args();
    let _ = args.next();
    let cli = parse_args(args)?;

    let config = match &cli.config_path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::from_env(),
    }
    .map_err(|e| anyhow!(e.to_string()))?;

    let state = CoreState::build(&config).await?;

    let result = match cli.command {
        Command::Speak { text, accent } => {
            let accent = accent.unwrap_or(config.default_accent);
            state
                .coordinator
                .speak(&text, accent)
                .await
                .map(|outcome| report(&outcome))
                .map_err(anyhow::Error::from)
        }
        Command::Listen { accent } => {
            listen(state.clone(), BufReader::new(tokio::io::stdin()), accent).await
        }
        Command::Stats => {
            let stats = state.coordinator.stats();
            let summary = serde_json::json!({
                "hits": stats.hits,
                "misses": stats.misses,
                "hit_rate": stats.hit_rate,
                "ephemeral_size": stats.ephemeral_size,
                "durable_entries": state.cache.entry_count().await,
                "durable_backend": state.cache.backend_type(),
                "backends": &state.backends,
                "http": state.req_manager.metrics().summary(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Clean => {
            let report = state.coordinator.run_maintenance().await;
            println!(
                "removed {} expired and {} excess entries",
                report.expired, report.evicted
            );
            Ok(())
        }
        Command::Clear => {
            state.coordinator.clear_cache().await;
            println!("cache cleared");
            Ok(())
        }
    };

    state.shutdown().await;
    result
}
