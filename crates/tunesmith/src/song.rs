//! The composition pipeline: parameters, arrangement, one notation request
//! per part, then a multi-track MIDI file.

use std::path::Path;

use abc::{Key, Meter, NoteEvent, Performance, RenderOptions, SmfHeader, TempoChange, TrackSpec};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tuneconf::TunesmithConfig;

use crate::arrange;
use crate::error::{ComposeError, PartError, SongError};
use crate::instruments::{determine_instruments, Instrument, PlannedInstrument};
use crate::llm::{ChatModel, ChatRequest, Sampling};
use crate::notation;
use crate::params::{determine_parameters, MusicalParameters};
use crate::prompts;

/// Knobs that shape generation but not the prompts themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposerSettings {
    pub notation_max_tokens: u32,
    pub ticks_per_quarter: u16,
    pub humanize: bool,
    pub seed: Option<u64>,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            notation_max_tokens: 1000,
            ticks_per_quarter: 480,
            humanize: true,
            seed: None,
        }
    }
}

impl ComposerSettings {
    pub fn from_config(config: &TunesmithConfig) -> Self {
        Self {
            notation_max_tokens: config.llm.notation_max_tokens,
            ticks_per_quarter: config.output.ticks_per_quarter,
            humanize: config.generation.humanize,
            seed: config.generation.seed,
        }
    }
}

/// One instrument's finished material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub group: String,
    /// Name as requested by the arrangement
    pub name: String,
    pub instrument: Instrument,
    /// 0-based MIDI channel
    pub channel: u8,
    pub notes: Vec<NoteEvent>,
    pub rests: usize,
    pub measures: usize,
}

impl Part {
    /// Collapse every interpreted voice into a single part.
    pub fn from_performance(group: &str, planned: &PlannedInstrument, performance: &Performance) -> Self {
        let mut notes: Vec<NoteEvent> = performance
            .voices
            .iter()
            .flat_map(|v| v.notes.iter().copied())
            .collect();
        notes.sort_by_key(|n| (n.start, n.pitch));

        Self {
            group: group.to_string(),
            name: planned.name.clone(),
            instrument: planned.instrument,
            channel: planned.channel,
            notes,
            rests: performance.voices.iter().map(|v| v.rests).sum(),
            measures: performance.voices.iter().map(|v| v.measures).max().unwrap_or(0),
        }
    }

    /// A part is worth keeping when it holds at least one note or rest.
    pub fn is_valid(&self) -> bool {
        !self.notes.is_empty() || self.rests > 0
    }
}

/// A complete arrangement ready to encode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub parameters: MusicalParameters,
    pub ticks_per_quarter: u16,
    pub meter: (u8, u8),
    pub key_fifths: i8,
    pub minor: bool,
    pub parts: Vec<Part>,
}

impl Song {
    /// Assemble a song, resolving the time signature and key from the
    /// parameters. Unreadable values fall back to 4/4 and C major.
    pub fn new(parameters: MusicalParameters, ticks_per_quarter: u16, parts: Vec<Part>) -> Self {
        let meter = Meter::parse(&parameters.time_signature).unwrap_or_else(|| {
            tracing::warn!(time_signature = %parameters.time_signature, "Unreadable time signature, using 4/4");
            Meter::default()
        });
        let key = Key::parse(&parameters.key).unwrap_or_else(|| {
            tracing::warn!(key = %parameters.key, "Unreadable key, using C major");
            Key::default()
        });

        Self {
            ticks_per_quarter,
            meter: meter.fraction(),
            key_fifths: key.fifths(),
            minor: key.is_minor(),
            parameters,
            parts,
        }
    }

    pub fn note_count(&self) -> usize {
        self.parts.iter().map(|p| p.notes.len()).sum()
    }

    /// Encode as SMF format 1: a conductor track plus one track per part.
    pub fn to_midi(&self) -> Result<Vec<u8>, abc::MidiError> {
        let header = SmfHeader {
            ticks_per_quarter: self.ticks_per_quarter,
            tempo_map: vec![TempoChange {
                tick: 0,
                bpm: self.parameters.tempo,
            }],
            meter: self.meter,
            key_fifths: self.key_fifths,
            minor: self.minor,
            title: None,
        };
        let tracks: Vec<TrackSpec<'_>> = self
            .parts
            .iter()
            .map(|part| TrackSpec {
                name: &part.name,
                channel: part.channel,
                program: part.instrument.program(),
                notes: &part.notes,
            })
            .collect();
        abc::write_smf(&header, &tracks)
    }

    pub fn write(&self, path: &Path) -> Result<(), SongError> {
        let bytes = self.to_midi()?;
        std::fs::write(path, bytes).map_err(|source| SongError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Drives the model through a whole song.
pub struct Composer<M> {
    model: M,
    settings: ComposerSettings,
    rng: StdRng,
}

impl<M: ChatModel> Composer<M> {
    pub fn new(model: M, settings: ComposerSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { model, settings, rng }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Ask for one part's ABC and reject replies that read as prose.
    ///
    /// Returns the reply without any code fence.
    pub async fn generate_notation(
        &self,
        prompt: &str,
        params: &MusicalParameters,
    ) -> Result<String, PartError> {
        let request = ChatRequest {
            system: prompts::notation_system(params),
            user: prompt.to_string(),
            sampling: Sampling::notation(self.settings.notation_max_tokens),
        };
        let reply = self.model.complete(&request).await?;
        let body = notation::strip_code_fences(&reply);

        if notation::looks_like_prose(body) {
            tracing::warn!(reply = %reply, "Model reply contains non-ABC content");
            return Err(PartError::Prose);
        }
        Ok(body.to_string())
    }

    /// Generate, clean, interpret and shape one instrument part.
    #[tracing::instrument(skip(self, planned, params), fields(instrument = %planned.name, channel = planned.channel + 1))]
    pub async fn generate_part(
        &mut self,
        group: &str,
        planned: &PlannedInstrument,
        params: &MusicalParameters,
    ) -> Result<Part, PartError> {
        let prompt = if planned.instrument.is_percussion() {
            prompts::drum_part(params)
        } else {
            prompts::pitched_part(&planned.name, params)
        };

        let abc_text = self.generate_notation(&prompt, params).await?;
        tracing::info!("ABC notation for {}:\n{}", planned.name, abc_text);

        self.render_part(group, planned, &abc_text, params)
    }

    /// Everything after the model call; deterministic apart from the RNG.
    pub fn render_part(
        &mut self,
        group: &str,
        planned: &PlannedInstrument,
        abc_text: &str,
        params: &MusicalParameters,
    ) -> Result<Part, PartError> {
        let percussion = planned.instrument.is_percussion();

        let mut cleaned = notation::clean(&notation::normalize_voice_markers(abc_text));
        if percussion {
            cleaned = notation::remap_drum_letters(&cleaned);
        }

        // Drum letters are fixed pitches; a key signature would bend them.
        let key = if percussion { "C" } else { params.key.as_str() };
        let tune_text =
            notation::rebuild_tune(&cleaned, &params.time_signature, key).ok_or(PartError::NoMusic)?;

        let parsed = abc::parse(&tune_text);
        for diagnostic in &parsed.diagnostics {
            tracing::debug!(%diagnostic, "ABC diagnostic");
        }
        if parsed.has_errors() {
            tracing::warn!(errors = parsed.errors().count(), "ABC parsed with errors");
        }

        let options = RenderOptions {
            ticks_per_quarter: self.settings.ticks_per_quarter,
            default_tempo: params.tempo,
            ..Default::default()
        };
        let performance = abc::interpret(&parsed.value, &options);

        let mut part = Part::from_performance(group, planned, &performance);
        if !part.is_valid() {
            return Err(PartError::NoNotes);
        }

        if percussion {
            arrange::apply_percussion(&mut part.notes);
        }
        arrange::shape_velocities(&mut part.notes, params, &mut self.rng);
        if self.settings.humanize {
            arrange::humanize(&mut part.notes, self.settings.ticks_per_quarter, &mut self.rng);
        }
        Ok(part)
    }

    /// Run the whole pipeline for a prompt.
    ///
    /// Parts that fail are logged and skipped; the song fails only when no
    /// part survives.
    #[tracing::instrument(skip_all)]
    pub async fn create_song(&mut self, prompt: &str) -> Result<Song, ComposeError> {
        let params = determine_parameters(&self.model, prompt).await;
        tracing::info!("Selected musical parameters:");
        for (name, value) in params.summary() {
            tracing::info!("{}: {}", name, value);
        }

        let plan = determine_instruments(&self.model, prompt).await;
        let selected: Vec<String> = plan
            .iter()
            .map(|(group, p)| format!("{}/{}@{}", group, p.name, p.channel + 1))
            .collect();
        tracing::info!(instruments = ?selected, "Selected instruments");

        let mut parts = Vec::new();
        for (group, planned) in plan.iter() {
            tracing::info!(
                "Generating {} part ({} group) on channel {}...",
                planned.name,
                group,
                planned.channel + 1
            );
            match self.generate_part(group, planned, &params).await {
                Ok(part) => parts.push(part),
                Err(e) => tracing::warn!(instrument = %planned.name, error = %e, "Skipping part"),
            }
        }

        if parts.is_empty() {
            tracing::error!("No valid parts were generated!");
            return Err(ComposeError::NoValidParts);
        }

        Ok(Song::new(params, self.settings.ticks_per_quarter, parts))
    }
}
