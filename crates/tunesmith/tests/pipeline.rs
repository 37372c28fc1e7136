//! End-to-end pipeline runs against a scripted chat model.

use std::sync::Mutex;

use async_trait::async_trait;
use midly::{MidiMessage, Smf, TrackEventKind};
use pretty_assertions::assert_eq;
use tunesmith::prompts::{INSTRUMENTS_SYSTEM, PARAMETERS_SYSTEM};
use tunesmith::{
    ChatModel, ChatRequest, ComposeError, Composer, ComposerSettings, LlmError, MusicalParameters,
};

/// Answers each stage from a closure and records every request.
struct ScriptedModel<F> {
    respond: F,
    requests: Mutex<Vec<ChatRequest>>,
}

impl<F> ScriptedModel<F>
where
    F: Fn(Stage, &ChatRequest) -> Result<String, LlmError> + Send + Sync,
{
    fn new(respond: F) -> Self {
        Self {
            respond,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Parameters,
    Instruments,
    Notation,
}

#[async_trait]
impl<F> ChatModel for ScriptedModel<F>
where
    F: Fn(Stage, &ChatRequest) -> Result<String, LlmError> + Send + Sync,
{
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let stage = if request.system == PARAMETERS_SYSTEM {
            Stage::Parameters
        } else if request.system == INSTRUMENTS_SYSTEM {
            Stage::Instruments
        } else {
            Stage::Notation
        };
        (self.respond)(stage, request)
    }
}

fn settings() -> ComposerSettings {
    ComposerSettings {
        notation_max_tokens: 800,
        seed: Some(42),
        ..Default::default()
    }
}

const PARAMETERS: &str = r#"```json
{
  "tempo": 100,
  "time_signature": "3/4",
  "key": "G",
  "measures": 64,
  // two halves
  "form": "Verse-Chorus",
  "chord_progression": ["G", "C", "D"],
  "scale": "major",
  "style": "waltz"
}
```"#;

const INSTRUMENTS: &str = r#"{
  "rhythm": [["DrumSet", 10]],
  "harmony": [["Piano", 2]],
  "lead": [["Flute", 3]]
}"#;

const DRUMS: &str = "X:1\nM:3/4\nL:1/8\nK:C\nB2 S2 H2|B2 S2 H2|";
const FLUTE: &str = "```abc\nX:1\nM:3/4\nL:1/8\nK:G\n|:\"G\"G2 A2 B2:|\nd6|\n```";

fn waltz_model() -> ScriptedModel<impl Fn(Stage, &ChatRequest) -> Result<String, LlmError> + Send + Sync> {
    ScriptedModel::new(|stage, request| match stage {
        Stage::Parameters => Ok(PARAMETERS.to_string()),
        Stage::Instruments => Ok(INSTRUMENTS.to_string()),
        Stage::Notation if request.user.contains("drum patterns") => Ok(DRUMS.to_string()),
        Stage::Notation if request.user.contains("Piano") => {
            Ok("Here is a lovely piano part for you!".to_string())
        }
        Stage::Notation => Ok(FLUTE.to_string()),
    })
}

#[tokio::test]
async fn full_song_from_scripted_model() {
    let mut composer = Composer::new(waltz_model(), settings());
    let song = composer.create_song("a gentle waltz").await.unwrap();

    assert_eq!(song.parameters.tempo, 100);
    assert_eq!(song.parameters.style, "waltz");
    assert_eq!(song.meter, (3, 4));
    assert_eq!(song.key_fifths, 1);

    // the piano answered in prose and was dropped
    let names: Vec<&str> = song.parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["DrumSet", "Flute"]);

    let drums = &song.parts[0];
    assert_eq!(drums.channel, 9);
    let drum_keys: Vec<u8> = drums.notes.iter().map(|n| n.pitch).collect();
    assert_eq!(drum_keys, vec![36, 38, 42, 36, 38, 42]);

    let flute = &song.parts[1];
    assert_eq!(flute.channel, 2);
    let flute_pitches: Vec<u8> = flute.notes.iter().map(|n| n.pitch).collect();
    assert_eq!(flute_pitches, vec![67, 69, 71, 67, 69, 71, 74]);

    // everything sits in the verse half of the form
    for note in song.parts.iter().flat_map(|p| &p.notes) {
        assert!((60..=75).contains(&note.velocity), "velocity {}", note.velocity);
    }
}

#[tokio::test]
async fn requests_carry_stage_sampling() {
    let mut composer = Composer::new(waltz_model(), settings());
    composer.create_song("a gentle waltz").await.unwrap();

    let requests = composer.model().requests();
    assert_eq!(requests.len(), 5);
    assert!(requests.iter().all(|r| r.user.contains("waltz")));

    assert_eq!(requests[0].sampling.max_tokens, 500);
    assert_eq!(requests[0].sampling.temperature, 0.5);
    assert_eq!(requests[1].system, INSTRUMENTS_SYSTEM);

    let notation = &requests[2];
    assert_eq!(notation.sampling.max_tokens, 800);
    assert_eq!(notation.sampling.temperature, 0.7);
    assert!(notation.system.contains("Exactly 64 measures"));
    assert!(notation.system.contains("Time signature: 3/4"));
    assert!(notation.user.contains("Only use the notes B, S, H, O, C and R"));
    assert!(requests[4].user.starts_with("Write 64 measures of a Flute part"));
}

#[tokio::test]
async fn midi_output_has_one_track_per_part() {
    let mut composer = Composer::new(waltz_model(), settings());
    let song = composer.create_song("a gentle waltz").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("generated_song.mid");
    song.write(&path).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 3);

    let drum_channels: Vec<u8> = smf.tracks[1]
        .iter()
        .filter_map(|e| match e.kind {
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { .. },
            } => Some(channel.as_int()),
            _ => None,
        })
        .collect();
    assert_eq!(drum_channels, vec![9; 6]);

    let flute_program = smf.tracks[2].iter().find_map(|e| match e.kind {
        TrackEventKind::Midi {
            message: MidiMessage::ProgramChange { program },
            ..
        } => Some(program.as_int()),
        _ => None,
    });
    assert_eq!(flute_program, Some(73));
}

#[tokio::test]
async fn unusable_planning_replies_fall_back_to_defaults() {
    let model = ScriptedModel::new(|stage, _request| match stage {
        Stage::Parameters => Ok("Sorry, I can only write JSON on Tuesdays.".to_string()),
        Stage::Instruments => Err(LlmError::EmptyResponse),
        Stage::Notation => Ok("CDEF|GABc|".to_string()),
    });
    let mut composer = Composer::new(model, settings());
    let song = composer.create_song("anything").await.unwrap();

    assert_eq!(song.parameters, MusicalParameters::default());
    let names: Vec<&str> = song.parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["DrumSet", "ElectricBass", "Piano", "SynthLead", "Violin", "VoiceOohs"]
    );
    assert!(song.parts.iter().all(|p| p.notes.len() == 8));
}

#[tokio::test]
async fn missing_required_group_uses_default_plan() {
    let model = ScriptedModel::new(|stage, _request| match stage {
        Stage::Parameters => Ok(r#"{"tempo": 128}"#.to_string()),
        Stage::Instruments => Ok(r#"{"lead": [["Trumpet", 1]]}"#.to_string()),
        Stage::Notation => Ok("C8|".to_string()),
    });
    let mut composer = Composer::new(model, settings());
    let song = composer.create_song("brass fanfare").await.unwrap();

    assert_eq!(song.parameters.tempo, 128);
    assert_eq!(song.parts.len(), 6);
    assert!(!song.parts.iter().any(|p| p.name == "Trumpet"));
}

#[tokio::test]
async fn no_valid_parts_is_an_error() {
    let model = ScriptedModel::new(|stage, _request| match stage {
        Stage::Parameters | Stage::Instruments => Err(LlmError::EmptyResponse),
        Stage::Notation => Ok("I apologize, but I cannot write music.".to_string()),
    });
    let mut composer = Composer::new(model, settings());
    let err = composer.create_song("anything").await.unwrap_err();
    assert!(matches!(err, ComposeError::NoValidParts));

    // two planning calls plus one per default part
    assert_eq!(composer.model().requests().len(), 8);
}

#[tokio::test]
async fn repeated_bass_notes_never_overlap_in_midi() {
    const BASS: &str = "X:1\nM:4/4\nL:1/8\nK:C\nC,C,C,C, C,C,C,C,|C,C,C,C, C,C,C,C,|";
    for seed in 0..8 {
        let model = ScriptedModel::new(|stage, _request| match stage {
            Stage::Parameters => Ok(r#"{"tempo": 96, "measures": 2}"#.to_string()),
            Stage::Instruments => Ok(INSTRUMENTS.to_string()),
            Stage::Notation => Ok(BASS.to_string()),
        });
        let settings = ComposerSettings {
            seed: Some(seed),
            humanize: true,
            ..settings()
        };
        let mut composer = Composer::new(model, settings);
        let song = composer.create_song("walking bass").await.unwrap();
        let bytes = song.to_midi().unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        for track in &smf.tracks[1..] {
            let mut held = [false; 128];
            for event in track {
                let TrackEventKind::Midi { message, .. } = event.kind else {
                    continue;
                };
                match message {
                    MidiMessage::NoteOn { key, .. } => {
                        let key = key.as_int() as usize;
                        assert!(!held[key], "seed {seed}: key {key} struck while still held");
                        held[key] = true;
                    }
                    MidiMessage::NoteOff { key, .. } => held[key.as_int() as usize] = false,
                    _ => {}
                }
            }
        }
    }
}
