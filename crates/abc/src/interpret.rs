//! Turns a [`Tune`] into timed note events.
//!
//! Each voice is expanded (repeats and endings), then walked with a small
//! state machine that tracks key, bar accidentals, ties and articulation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::{
    Bar, Chord, Decoration, Element, Key, Letter, Note, RestKind, Tune, UnitLength, Voice,
};
use crate::parser::{parse_meter, parse_tempo, parse_unit_length};

/// Middle C, written `C` in ABC.
pub const MIDDLE_C: i16 = 60;

pub const DEFAULT_VELOCITY: u8 = 80;

const ACCENT_BOOST: u8 = 15;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub ticks_per_quarter: u16,
    /// Used when the tune has no Q: field
    pub default_tempo: u16,
    pub default_velocity: u8,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            ticks_per_quarter: 480,
            default_tempo: 120,
            default_velocity: DEFAULT_VELOCITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Absolute start in ticks
    pub start: u32,
    pub duration: u32,
    pub pitch: u8,
    pub velocity: u8,
    /// 0-based measure the note starts in
    pub measure: usize,
    /// Ticks from the start of that measure
    pub measure_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoChange {
    pub tick: u32,
    pub bpm: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceTimeline {
    pub id: Option<String>,
    pub name: Option<String>,
    pub notes: Vec<NoteEvent>,
    /// Rest elements encountered, multi-bar rests counting once
    pub rests: usize,
    /// Measures the voice spans
    pub measures: usize,
    pub end_tick: u32,
}

impl VoiceTimeline {
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.rests == 0
    }
}

/// Everything needed to write a MIDI file for a tune.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub ticks_per_quarter: u16,
    /// Always starts with a change at tick 0
    pub tempo_map: Vec<TempoChange>,
    pub meter: (u8, u8),
    pub key_fifths: i8,
    pub minor: bool,
    pub voices: Vec<VoiceTimeline>,
}

impl Performance {
    pub fn has_content(&self) -> bool {
        self.voices.iter().any(|v| !v.is_empty())
    }

    pub fn note_count(&self) -> usize {
        self.voices.iter().map(|v| v.notes.len()).sum()
    }
}

/// Interpret every voice of the tune.
pub fn interpret(tune: &Tune, options: &RenderOptions) -> Performance {
    let header = &tune.header;
    let bpm = header
        .tempo
        .as_ref()
        .map(|t| t.quarter_bpm())
        .unwrap_or(options.default_tempo);

    let mut tempo_map = vec![TempoChange { tick: 0, bpm }];
    let mut voices = Vec::with_capacity(tune.voices.len());
    for voice in &tune.voices {
        let (timeline, changes) = VoiceState::new(tune, options).render(voice);
        for change in changes {
            match tempo_map.iter_mut().find(|c| c.tick == change.tick) {
                Some(existing) => existing.bpm = change.bpm,
                None => tempo_map.push(change),
            }
        }
        voices.push(timeline);
    }
    tempo_map.sort_by_key(|c| c.tick);

    Performance {
        ticks_per_quarter: options.ticks_per_quarter,
        tempo_map,
        meter: header.meter.fraction(),
        key_fifths: header.key.fifths(),
        minor: header.key.is_minor(),
        voices,
    }
}

/// Ticks of one unit note: `L:1/8` at 480 per quarter is 240.
pub fn unit_ticks(unit: &UnitLength, ticks_per_quarter: u16) -> u32 {
    let ticks = ticks_per_quarter as u64 * 4 * unit.numerator as u64 / unit.denominator.max(1) as u64;
    ticks.max(1) as u32
}

pub fn bar_ticks((num, den): (u8, u8), ticks_per_quarter: u16) -> u32 {
    (ticks_per_quarter as u32 * 4 * num as u32 / den.max(1) as u32).max(1)
}

/// MIDI pitch of a note, before any accidental context is applied.
pub fn base_pitch(letter: Letter, octave: i8) -> i16 {
    MIDDLE_C + 12 * octave as i16 + letter.semitone() as i16
}

/// Expand `|: :|` repeats and numbered endings into a linear element list.
///
/// A repeat end without a matching start repeats from the tune start or from
/// the previous repeat end. On the replay the first ending is skipped.
pub fn expand_repeats(elements: &[Element]) -> Vec<Element> {
    let mut out = Vec::with_capacity(elements.len());
    let mut section_start = 0;
    let mut first_ending: Option<usize> = None;

    for (i, element) in elements.iter().enumerate() {
        match element {
            Element::Bar(Bar::RepeatStart) => {
                section_start = i + 1;
                first_ending = None;
                out.push(element.clone());
            }
            Element::Ending(1) => {
                first_ending.get_or_insert(i);
                out.push(element.clone());
            }
            Element::Bar(Bar::RepeatEnd) | Element::Bar(Bar::RepeatBoth) => {
                out.push(element.clone());
                let replay_end = first_ending.unwrap_or(i);
                out.extend(
                    elements[section_start..replay_end]
                        .iter()
                        .filter(|e| !matches!(e, Element::Ending(_)))
                        .cloned(),
                );
                section_start = i + 1;
                first_ending = None;
            }
            _ => out.push(element.clone()),
        }
    }
    out
}

struct VoiceState {
    ticks_per_quarter: u16,
    unit_ticks: u32,
    bar_ticks: u32,
    signature: [i8; 7],
    /// Accidentals written earlier in the current bar, per letter and octave
    bar_accidentals: HashMap<(Letter, i8), i8>,
    tick: u32,
    measure: usize,
    measure_start: u32,
    velocity: u8,
    accent: bool,
    staccato: bool,
    /// pitch -> index of a note still sounding through a tie
    held: HashMap<u8, usize>,
    notes: Vec<NoteEvent>,
    rests: usize,
    tempo_changes: Vec<TempoChange>,
}

impl VoiceState {
    fn new(tune: &Tune, options: &RenderOptions) -> Self {
        let header = &tune.header;
        let tpq = options.ticks_per_quarter.max(1);
        VoiceState {
            ticks_per_quarter: tpq,
            unit_ticks: unit_ticks(&header.unit_length, tpq),
            bar_ticks: bar_ticks(header.meter.fraction(), tpq),
            signature: header.key.signature(),
            bar_accidentals: HashMap::new(),
            tick: 0,
            measure: 0,
            measure_start: 0,
            velocity: options.default_velocity,
            accent: false,
            staccato: false,
            held: HashMap::new(),
            notes: Vec::new(),
            rests: 0,
            tempo_changes: Vec::new(),
        }
    }

    fn render(mut self, voice: &Voice) -> (VoiceTimeline, Vec<TempoChange>) {
        for element in expand_repeats(&voice.elements) {
            self.element(&element, (1, 1));
        }

        let content = !self.notes.is_empty() || self.rests > 0;
        let measures = match (content, self.tick > self.measure_start) {
            (false, _) => 0,
            (true, true) => self.measure + 1,
            (true, false) => self.measure.max(1),
        };
        let timeline = VoiceTimeline {
            id: voice.id.clone(),
            name: voice.name.clone(),
            notes: self.notes,
            rests: self.rests,
            measures,
            end_tick: self.tick,
        };
        (timeline, self.tempo_changes)
    }

    fn element(&mut self, element: &Element, scale: (u32, u32)) {
        match element {
            Element::Note(note) => {
                let ticks = self.ticks(note.length.scaled(scale.0, scale.1));
                let pitch = self.pitch(note);
                self.release_except(&[pitch]);
                let (velocity, staccato) = self.take_articulation();
                self.sound(pitch, ticks, velocity, staccato, note.tied);
                self.tick = self.tick.saturating_add(ticks);
            }
            Element::Chord(chord) => self.chord(chord, scale),
            Element::Rest(rest) => {
                self.release_except(&[]);
                self.take_articulation();
                self.rests += 1;
                match rest.kind {
                    RestKind::Bars(bars) => {
                        self.close_measure();
                        let ticks = self.bar_ticks.saturating_mul(bars as u32);
                        self.tick = self.tick.saturating_add(ticks);
                        self.measure += bars as usize;
                        self.measure_start = self.tick;
                    }
                    RestKind::Visible | RestKind::Invisible => {
                        let ticks = self.ticks(rest.length.scaled(scale.0, scale.1));
                        self.tick = self.tick.saturating_add(ticks);
                    }
                }
            }
            Element::Tuplet(tuplet) => {
                let inner = (
                    scale.0.saturating_mul(tuplet.q as u32),
                    scale.1.saturating_mul(tuplet.p.max(1) as u32),
                );
                for e in &tuplet.elements {
                    self.element(e, inner);
                }
            }
            Element::Bar(_) => self.close_measure(),
            Element::Decoration(decoration) => match decoration {
                Decoration::Dynamic(d) => self.velocity = d.velocity(),
                Decoration::Accent => self.accent = true,
                Decoration::Staccato => self.staccato = true,
                _ => {}
            },
            Element::InlineField(field) => self.inline_field(field.tag, &field.value),
            Element::Ending(_)
            | Element::GraceNotes(_)
            | Element::ChordSymbol(_)
            | Element::Slur(_)
            | Element::VoiceSwitch(_)
            | Element::Space
            | Element::LineBreak => {}
        }
    }

    fn chord(&mut self, chord: &Chord, scale: (u32, u32)) {
        let ticks = self.ticks(chord.effective_length().scaled(scale.0, scale.1));
        let pitches: Vec<u8> = chord.notes.iter().map(|n| self.pitch(n)).collect();
        self.release_except(&pitches);
        let (velocity, staccato) = self.take_articulation();
        for (note, pitch) in chord.notes.iter().zip(pitches) {
            self.sound(pitch, ticks, velocity, staccato, chord.tied || note.tied);
        }
        self.tick = self.tick.saturating_add(ticks);
    }

    fn ticks(&self, length: crate::ast::Length) -> u32 {
        length.ticks(self.unit_ticks)
    }

    /// Resolve the sounding pitch: explicit accidental, else one earlier in
    /// the bar on the same letter and octave, else the key signature.
    fn pitch(&mut self, note: &Note) -> u8 {
        let slot = (note.letter, note.octave);
        let adjust = match note.accidental {
            Some(acc) => {
                self.bar_accidentals.insert(slot, acc.semitones());
                acc.semitones()
            }
            None => self
                .bar_accidentals
                .get(&slot)
                .copied()
                .unwrap_or(self.signature[note.letter.index()]),
        };
        (base_pitch(note.letter, note.octave) + adjust as i16).clamp(0, 127) as u8
    }

    fn take_articulation(&mut self) -> (u8, bool) {
        let velocity = if self.accent {
            self.velocity.saturating_add(ACCENT_BOOST).min(127)
        } else {
            self.velocity
        };
        let staccato = self.staccato;
        self.accent = false;
        self.staccato = false;
        (velocity, staccato)
    }

    /// Drop held ties that the next event does not continue.
    fn release_except(&mut self, continuing: &[u8]) {
        self.held.retain(|pitch, _| continuing.contains(pitch));
    }

    fn sound(&mut self, pitch: u8, ticks: u32, velocity: u8, staccato: bool, tied: bool) {
        if let Some(index) = self.held.remove(&pitch) {
            let held = &mut self.notes[index];
            held.duration = held.duration.saturating_add(ticks);
            if tied {
                self.held.insert(pitch, index);
            }
            return;
        }

        let duration = if staccato { (ticks / 2).max(1) } else { ticks };
        if duration == 0 {
            return;
        }
        self.notes.push(NoteEvent {
            start: self.tick,
            duration,
            pitch,
            velocity,
            measure: self.measure,
            measure_offset: self.tick - self.measure_start,
        });
        if tied {
            self.held.insert(pitch, self.notes.len() - 1);
        }
    }

    fn close_measure(&mut self) {
        if self.tick > self.measure_start {
            self.measure += 1;
            self.measure_start = self.tick;
        }
        self.bar_accidentals.clear();
    }

    fn inline_field(&mut self, tag: char, value: &str) {
        match tag {
            'M' => {
                if let Some(meter) = parse_meter(value) {
                    self.bar_ticks = bar_ticks(meter.fraction(), self.ticks_per_quarter);
                }
            }
            'L' => {
                if let Some(unit) = parse_unit_length(value) {
                    self.unit_ticks = unit_ticks(&unit, self.ticks_per_quarter);
                }
            }
            'K' => {
                if let Some(key) = Key::parse(value) {
                    self.signature = key.signature();
                    self.bar_accidentals.clear();
                }
            }
            'Q' => {
                if let Some(tempo) = parse_tempo(value) {
                    self.tempo_changes.push(TempoChange {
                        tick: self.tick,
                        bpm: tempo.quarter_bpm(),
                    });
                }
            }
            _ => {}
        }
    }
}
