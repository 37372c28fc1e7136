use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tuneconf::{ConfigSources, TunesmithConfig};
use tunesmith::{telemetry, Composer, ComposerSettings, OpenAiProvider};

/// Tunesmith - turn a text prompt into a multi-part MIDI song
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to load instead of ./tunesmith.toml
    #[arg(long, global = true, env = "TUNESMITH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a song with the language model (default)
    Compose {
        /// Song description; read from the console when omitted
        #[arg(short, long)]
        prompt: Option<String>,

        /// MIDI file to write
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Chat model name
        #[arg(long)]
        model: Option<String>,

        /// Seed for velocity shaping and humanization
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Convert a local ABC file to MIDI without calling the model
    Render {
        /// ABC file to read
        file: PathBuf,

        /// MIDI file to write (defaults to the input with a .mid extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = TunesmithConfig::load_with_sources(cli.config.as_deref())
        .context("Failed to load configuration")?;

    telemetry::init(&config.telemetry.log_level).context("Failed to initialize logging")?;

    let command = cli.command.unwrap_or(Commands::Compose {
        prompt: None,
        output: None,
        model: None,
        seed: None,
    });

    match command {
        Commands::Compose {
            prompt,
            output,
            model,
            seed,
        } => compose(config, prompt, output, model, seed).await,
        Commands::Render { file, output } => render(&config, &file, output).await,
        Commands::Config => show_config(&config, &sources),
    }
}

async fn compose(
    mut config: TunesmithConfig,
    prompt: Option<String>,
    output: Option<PathBuf>,
    model: Option<String>,
    seed: Option<u64>,
) -> Result<()> {
    if let Some(model) = model {
        config.llm.model = model;
    }
    if seed.is_some() {
        config.generation.seed = seed;
    }

    let provider = match OpenAiProvider::new(&config.llm) {
        Ok(provider) => provider,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e).context("Cannot reach the language model");
        }
    };
    tracing::debug!(model = provider.model(), api_base = %config.llm.api_base, "Using chat model");

    let prompt = match prompt {
        Some(prompt) => prompt,
        None => read_prompt().await?,
    };
    if prompt.trim().is_empty() {
        tracing::error!("No prompt provided. Exiting.");
        return Ok(());
    }

    let mut composer = Composer::new(provider, ComposerSettings::from_config(&config));
    let song = composer
        .create_song(prompt.trim())
        .await
        .context("Failed to generate song - no valid content")?;

    let midi_path = output.unwrap_or_else(|| config.output.midi_path.clone());
    song.write(&midi_path)
        .with_context(|| format!("Error writing MIDI file {}", midi_path.display()))?;

    tracing::info!(
        parts = song.parts.len(),
        notes = song.note_count(),
        "MIDI file '{}' generated successfully!",
        midi_path.display()
    );
    Ok(())
}

async fn read_prompt() -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(b"Enter a prompt to generate your song: ")
        .await
        .context("Failed to write prompt")?;
    stdout.flush().await.context("Failed to write prompt")?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read prompt")?;
    Ok(line)
}

async fn render(config: &TunesmithConfig, file: &Path, output: Option<PathBuf>) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let parsed = abc::parse(&text);
    for diagnostic in &parsed.diagnostics {
        match diagnostic.severity {
            abc::Severity::Error => tracing::error!("{}: {}", file.display(), diagnostic),
            abc::Severity::Warning => tracing::warn!("{}: {}", file.display(), diagnostic),
            abc::Severity::Info => tracing::info!("{}: {}", file.display(), diagnostic),
        }
    }

    let options = abc::RenderOptions {
        ticks_per_quarter: config.output.ticks_per_quarter,
        ..Default::default()
    };
    let bytes = abc::to_midi(&parsed.value, &options).context("Failed to encode MIDI")?;

    let midi_path = output.unwrap_or_else(|| file.with_extension("mid"));
    tokio::fs::write(&midi_path, bytes)
        .await
        .with_context(|| format!("Error writing MIDI file {}", midi_path.display()))?;

    tracing::info!(
        notes = parsed.value.note_count(),
        "MIDI file '{}' generated successfully!",
        midi_path.display()
    );
    Ok(())
}

fn show_config(config: &TunesmithConfig, sources: &ConfigSources) -> Result<()> {
    println!("# Files loaded (in order):");
    if sources.files.is_empty() {
        println!("#   (none)");
    }
    for path in &sources.files {
        println!("#   {}", path.display());
    }
    if !sources.env_overrides.is_empty() {
        println!("# Environment overrides: {}", sources.env_overrides.join(", "));
    }
    println!();
    print!("{}", config.to_toml().context("Failed to render configuration")?);
    Ok(())
}
