//! Tunesmith - text prompt to multi-part MIDI
//!
//! A free-text description goes to a chat model three ways: once for song
//! parameters (tempo, key, form, progression), once for an instrument
//! arrangement, and once per instrument for ABC notation. The notation is
//! cleaned, parsed and interpreted with the `abc` crate, shaped to follow the
//! song form, and written as one Standard MIDI File.
//!
//! # Example
//!
//! ```rust,no_run
//! use tunesmith::{Composer, ComposerSettings, OpenAiProvider};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = tuneconf::TunesmithConfig::load(None)?;
//! let provider = OpenAiProvider::new(&config.llm)?;
//! let mut composer = Composer::new(provider, ComposerSettings::from_config(&config));
//! let song = composer.create_song("a rainy-day lo-fi groove").await?;
//! song.write(&config.output.midi_path)?;
//! # Ok(())
//! # }
//! ```

pub mod arrange;
pub mod error;
pub mod instruments;
pub mod llm;
pub mod notation;
pub mod params;
pub mod prompts;
pub mod song;
pub mod telemetry;

pub use error::{ComposeError, LlmError, PartError, SongError};
pub use instruments::{determine_instruments, Instrument, InstrumentGroup, InstrumentPlan, PlannedInstrument};
pub use llm::{ChatModel, ChatRequest, OpenAiProvider, Sampling};
pub use params::{determine_parameters, MusicalParameters};
pub use song::{Composer, ComposerSettings, Part, Song};
