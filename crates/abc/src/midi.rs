//! Standard MIDI File output through `midly`.
//!
//! Files are SMF format 1: track 0 is the conductor (tempo, meter, key) and
//! every further track carries one instrument on one channel.

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use thiserror::Error;

use crate::interpret::{NoteEvent, Performance, TempoChange};

/// GM percussion channel (0-based).
pub const DRUM_CHANNEL: u8 = 9;

const MAX_DELTA: u32 = 0x0FFF_FFFF;
/// Slowest tempo a 24-bit Set Tempo event holds, about 3.58 bpm
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("failed to encode MIDI data: {0}")]
    Encode(#[from] std::io::Error),
}

/// Conductor track contents.
#[derive(Debug, Clone)]
pub struct SmfHeader {
    pub ticks_per_quarter: u16,
    pub tempo_map: Vec<TempoChange>,
    pub meter: (u8, u8),
    pub key_fifths: i8,
    pub minor: bool,
    pub title: Option<String>,
}

impl SmfHeader {
    pub fn from_performance(performance: &Performance, title: Option<&str>) -> Self {
        SmfHeader {
            ticks_per_quarter: performance.ticks_per_quarter,
            tempo_map: performance.tempo_map.clone(),
            meter: performance.meter,
            key_fifths: performance.key_fifths,
            minor: performance.minor,
            title: title.map(str::to_string),
        }
    }
}

/// One instrument track.
#[derive(Debug, Clone)]
pub struct TrackSpec<'a> {
    pub name: &'a str,
    /// 0-based MIDI channel
    pub channel: u8,
    /// General MIDI program; ignored on the drum channel
    pub program: Option<u8>,
    pub notes: &'a [NoteEvent],
}

// Ordering of events that share a tick: meta first, then program changes,
// then note-offs before note-ons so repeated pitches retrigger cleanly.
const ORDER_META: u8 = 0;
const ORDER_PROGRAM: u8 = 1;
const ORDER_OFF: u8 = 2;
const ORDER_ON: u8 = 3;

type Timed<'a> = (u32, u8, TrackEventKind<'a>);

/// Encode a format 1 file with a conductor track followed by `tracks`.
pub fn write_smf(header: &SmfHeader, tracks: &[TrackSpec<'_>]) -> Result<Vec<u8>, MidiError> {
    let tpq = header.ticks_per_quarter.clamp(1, 0x7FFF);
    let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::new(tpq))));

    smf.tracks.push(conductor_track(header));
    for spec in tracks {
        smf.tracks.push(instrument_track(spec));
    }

    let mut buf = Vec::new();
    smf.write_std(&mut buf)?;
    Ok(buf)
}

fn conductor_track(header: &SmfHeader) -> Track<'_> {
    let mut events: Vec<Timed<'_>> = Vec::new();
    if let Some(title) = &header.title {
        events.push((0, ORDER_META, TrackEventKind::Meta(MetaMessage::TrackName(title.as_bytes()))));
    }

    let (num, den) = header.meter;
    // denominator is stored as a power of two; non-powers fall back to quarters
    let den_pow = if den.is_power_of_two() { den.trailing_zeros() as u8 } else { 2 };
    events.push((
        0,
        ORDER_META,
        TrackEventKind::Meta(MetaMessage::TimeSignature(num, den_pow, 24, 8)),
    ));
    events.push((
        0,
        ORDER_META,
        TrackEventKind::Meta(MetaMessage::KeySignature(header.key_fifths, header.minor)),
    ));
    for change in &header.tempo_map {
        let micros = (60_000_000 / change.bpm.max(1) as u32).min(MAX_TEMPO_MICROS);
        events.push((
            change.tick,
            ORDER_META,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros))),
        ));
    }
    into_track(events)
}

fn instrument_track<'a>(spec: &TrackSpec<'a>) -> Track<'a> {
    let channel = u4::new(spec.channel.min(15));
    let mut events: Vec<Timed<'a>> = vec![(
        0,
        ORDER_META,
        TrackEventKind::Meta(MetaMessage::TrackName(spec.name.as_bytes())),
    )];

    if let Some(program) = spec.program.filter(|_| spec.channel != DRUM_CHANNEL) {
        events.push((
            0,
            ORDER_PROGRAM,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(program.min(127)),
                },
            },
        ));
    }

    for span in key_spans(spec.notes) {
        let key = u7::new(span.key);
        events.push((
            span.start,
            ORDER_ON,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::new(span.velocity.clamp(1, 127)),
                },
            },
        ));
        events.push((
            span.end,
            ORDER_OFF,
            TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key,
                    vel: u7::new(0),
                },
            },
        ));
    }
    into_track(events)
}

struct KeySpan {
    start: u32,
    end: u32,
    key: u8,
    velocity: u8,
}

/// Sounding spans per key. A key struck again while still held is released
/// at the new strike; two strikes on the same tick merge into one.
fn key_spans(notes: &[NoteEvent]) -> Vec<KeySpan> {
    let mut order: Vec<&NoteEvent> = notes.iter().collect();
    order.sort_by_key(|n| (n.start, n.pitch));

    let mut spans: Vec<KeySpan> = Vec::with_capacity(order.len());
    let mut sounding: [Option<usize>; 128] = [None; 128];
    for note in order {
        let key = note.pitch.min(127);
        let end = note.start.saturating_add(note.duration.max(1));
        if let Some(i) = sounding[key as usize] {
            let prev = &mut spans[i];
            if prev.start == note.start {
                prev.end = prev.end.max(end);
                prev.velocity = prev.velocity.max(note.velocity);
                continue;
            }
            prev.end = prev.end.min(note.start);
        }
        sounding[key as usize] = Some(spans.len());
        spans.push(KeySpan {
            start: note.start,
            end,
            key,
            velocity: note.velocity,
        });
    }
    spans
}

/// Sort absolute-time events and convert them to delta times.
fn into_track(mut events: Vec<Timed<'_>>) -> Track<'_> {
    events.sort_by_key(|(tick, order, _)| (*tick, *order));

    let mut last = 0;
    let mut track: Track<'_> = events
        .into_iter()
        .map(|(tick, _, kind)| {
            let delta = tick - last;
            last = tick;
            TrackEvent {
                delta: u28::new(delta.min(MAX_DELTA)),
                kind,
            }
        })
        .collect();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn header() -> SmfHeader {
        SmfHeader {
            ticks_per_quarter: 480,
            tempo_map: vec![TempoChange { tick: 0, bpm: 120 }],
            meter: (6, 8),
            key_fifths: -1,
            minor: true,
            title: Some("Test".into()),
        }
    }

    fn note(start: u32, duration: u32, pitch: u8) -> NoteEvent {
        NoteEvent {
            start,
            duration,
            pitch,
            velocity: 90,
            measure: 0,
            measure_offset: start,
        }
    }

    #[test]
    fn conductor_track_meta() {
        let bytes = write_smf(&header(), &[]).unwrap();
        assert_eq!(&bytes[0..4], b"MThd");

        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 1);

        let metas: Vec<_> = smf.tracks[0]
            .iter()
            .filter_map(|e| match e.kind {
                TrackEventKind::Meta(m) => Some(m),
                _ => None,
            })
            .collect();
        assert!(metas.contains(&MetaMessage::Tempo(u24::new(500_000))));
        assert!(metas.contains(&MetaMessage::TimeSignature(6, 3, 24, 8)));
        assert!(metas.contains(&MetaMessage::KeySignature(-1, true)));
        assert_eq!(metas.last(), Some(&MetaMessage::EndOfTrack));
    }

    #[test]
    fn note_off_precedes_note_on_at_same_tick() {
        let notes = [note(0, 480, 60), note(480, 480, 60)];
        let spec = TrackSpec {
            name: "Piano",
            channel: 1,
            program: Some(0),
            notes: &notes,
        };
        let bytes = write_smf(&header(), &[spec]).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 2);

        let mut tick = 0;
        let mut timeline = Vec::new();
        for event in &smf.tracks[1] {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi { channel, message } = event.kind {
                assert_eq!(channel.as_int(), 1);
                timeline.push((tick, message));
            }
        }
        assert!(matches!(timeline[0], (0, MidiMessage::ProgramChange { .. })));
        assert!(matches!(timeline[1], (0, MidiMessage::NoteOn { .. })));
        assert!(matches!(timeline[2], (480, MidiMessage::NoteOff { .. })));
        assert!(matches!(timeline[3], (480, MidiMessage::NoteOn { .. })));
        assert!(matches!(timeline[4], (960, MidiMessage::NoteOff { .. })));
    }

    #[test]
    fn drum_channel_has_no_program_change() {
        let notes = [note(0, 120, 36)];
        let spec = TrackSpec {
            name: "Drums",
            channel: DRUM_CHANNEL,
            program: Some(0),
            notes: &notes,
        };
        let bytes = write_smf(&header(), &[spec]).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let programs = smf.tracks[1]
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    TrackEventKind::Midi {
                        message: MidiMessage::ProgramChange { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(programs, 0);
    }

    #[test]
    fn tempo_changes_are_placed_in_time() {
        let mut h = header();
        h.tempo_map.push(TempoChange { tick: 1920, bpm: 60 });
        let smf_bytes = write_smf(&h, &[]).unwrap();
        let smf = Smf::parse(&smf_bytes).unwrap();
        let mut tick = 0;
        let mut tempos = Vec::new();
        for e in &smf.tracks[0] {
            tick += e.delta.as_int();
            if let TrackEventKind::Meta(MetaMessage::Tempo(t)) = e.kind {
                tempos.push((tick, t.as_int()));
            }
        }
        assert_eq!(tempos, vec![(0, 500_000), (1920, 1_000_000)]);
    }

    fn key_timeline(track: &Track<'_>) -> Vec<(u32, bool, u8)> {
        let mut tick = 0;
        let mut timeline = Vec::new();
        for event in track {
            tick += event.delta.as_int();
            match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => timeline.push((tick, true, key.as_int())),
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { key, .. },
                    ..
                } => timeline.push((tick, false, key.as_int())),
                _ => {}
            }
        }
        timeline
    }

    #[test]
    fn overlapping_strikes_on_one_key_are_cut_short() {
        let notes = [
            note(0, 300, 48),
            note(240, 240, 48),
            note(240, 120, 52),
            note(480, 60, 48),
            note(480, 240, 48),
        ];
        let spec = TrackSpec {
            name: "Bass",
            channel: 0,
            program: Some(33),
            notes: &notes,
        };
        let bytes = write_smf(&header(), &[spec]).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(
            key_timeline(&smf.tracks[1]),
            vec![
                (0, true, 48),
                (240, false, 48),
                (240, true, 48),
                (240, true, 52),
                (360, false, 52),
                (480, false, 48),
                (480, true, 48),
                (720, false, 48),
            ]
        );
    }

    #[test]
    fn very_slow_tempo_is_clamped() {
        let mut h = header();
        h.tempo_map = vec![TempoChange { tick: 0, bpm: 3 }];
        let bytes = write_smf(&h, &[]).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        let tempo = smf.tracks[0].iter().find_map(|e| match e.kind {
            TrackEventKind::Meta(MetaMessage::Tempo(t)) => Some(t.as_int()),
            _ => None,
        });
        assert_eq!(tempo, Some(MAX_TEMPO_MICROS));
    }
}
