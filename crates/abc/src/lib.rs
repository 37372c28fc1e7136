//! ABC notation parser and MIDI renderer.
//!
//! Parsing is generous: [`parse`] always returns a [`Tune`] together with the
//! diagnostics gathered while reading it. [`interpret`] turns a tune into
//! timed notes and [`midi::write_smf`] encodes them as a Standard MIDI File.
//!
//! # Example
//!
//! ```
//! use abc::{parse, to_midi, RenderOptions};
//!
//! let abc = "X:1\nT:Test Tune\nM:4/4\nL:1/8\nK:G\nGABc dedB|cBAG D2D2|\n";
//!
//! let parsed = parse(abc);
//! assert!(!parsed.has_errors());
//! let bytes = to_midi(&parsed.value, &RenderOptions::default()).unwrap();
//! assert_eq!(&bytes[0..4], b"MThd");
//! ```

pub mod ast;
pub mod diagnostics;
pub mod interpret;
pub mod midi;
pub mod parser;

pub use ast::*;
pub use diagnostics::{Diagnostic, Parsed, Severity};
pub use interpret::{interpret, NoteEvent, Performance, RenderOptions, TempoChange, VoiceTimeline};
pub use midi::{write_smf, MidiError, SmfHeader, TrackSpec, DRUM_CHANNEL};

/// Parse ABC notation into a [`Tune`].
pub fn parse(input: &str) -> Parsed<Tune> {
    parser::parse(input)
}

/// Render a tune to SMF bytes with one track per sounding voice.
///
/// Voices get consecutive channels, skipping the drum channel, and all use the
/// tune's `%%MIDI program` (piano when absent).
pub fn to_midi(tune: &Tune, options: &RenderOptions) -> Result<Vec<u8>, MidiError> {
    let performance = interpret(tune, options);
    let names: Vec<String> = performance
        .voices
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.name
                .clone()
                .or_else(|| v.id.clone())
                .unwrap_or_else(|| format!("Voice {}", i + 1))
        })
        .collect();

    let program = tune.header.midi_program.unwrap_or(0);
    let tracks: Vec<TrackSpec<'_>> = performance
        .voices
        .iter()
        .zip(&names)
        .filter(|(voice, _)| !voice.notes.is_empty())
        .enumerate()
        .map(|(i, (voice, name))| TrackSpec {
            name,
            channel: melodic_channel(i),
            program: Some(program),
            notes: &voice.notes,
        })
        .collect();

    let header = SmfHeader::from_performance(&performance, tune.header.title.as_deref());
    write_smf(&header, &tracks)
}

/// nth non-percussion channel, saturating at 15.
fn melodic_channel(index: usize) -> u8 {
    let channel = if index >= DRUM_CHANNEL as usize { index + 1 } else { index };
    channel.min(15) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_skip_percussion() {
        assert_eq!(melodic_channel(0), 0);
        assert_eq!(melodic_channel(8), 8);
        assert_eq!(melodic_channel(9), 10);
        assert_eq!(melodic_channel(40), 15);
    }
}
