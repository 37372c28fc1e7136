//! Performance touches applied to interpreted parts: drum mapping, dynamics
//! that follow the song form, and timing humanization.

use std::ops::RangeInclusive;

use abc::NoteEvent;
use rand::Rng;

use crate::params::MusicalParameters;

/// Largest timing nudge, in quarter notes.
pub const HUMANIZE_QUARTERS: f64 = 0.02;

/// GM percussion key for a drum note, chosen by its pitch class.
///
/// Natural letters after remapping: C kick, D snare, E closed hat, F open hat,
/// G crash, A ride, B ride bell. Anything else is the acoustic kick.
pub fn percussion_key(pitch: u8) -> u8 {
    match pitch % 12 {
        0 => 36,
        2 => 38,
        4 => 42,
        5 => 46,
        7 => 49,
        9 => 51,
        11 => 53,
        _ => 35,
    }
}

pub fn apply_percussion(notes: &mut [NoteEvent]) {
    for note in notes {
        note.pitch = percussion_key(note.pitch);
    }
}

/// Velocity range for a form section.
pub fn section_velocity(section: &str) -> RangeInclusive<u8> {
    let section = section.to_lowercase();
    if section.contains("verse") {
        60..=75
    } else if section.contains("chorus") || section.contains("hook") {
        80..=100
    } else if section.contains("bridge") || section.contains("pre-chorus") {
        70..=85
    } else {
        65..=85
    }
}

/// Re-velocity every note from the section its measure falls in.
///
/// The form is spread evenly over `params.measures`; measures past the last
/// section keep the last section's range.
pub fn shape_velocities(notes: &mut [NoteEvent], params: &MusicalParameters, rng: &mut impl Rng) {
    let sections = params.sections();
    let section_len = (params.measures as usize / sections.len()).max(1);
    let ranges: Vec<RangeInclusive<u8>> = sections.iter().map(|s| section_velocity(s)).collect();

    for note in notes {
        let index = (note.measure / section_len).min(ranges.len() - 1);
        note.velocity = rng.gen_range(ranges[index].clone());
    }
}

/// Nudge every note that does not start its measure by up to
/// [`HUMANIZE_QUARTERS`] either way, then shorten any note that would still
/// be sounding when the same pitch strikes again.
pub fn humanize(notes: &mut [NoteEvent], ticks_per_quarter: u16, rng: &mut impl Rng) {
    let max = (ticks_per_quarter as f64 * HUMANIZE_QUARTERS).round() as i64;
    if max == 0 {
        return;
    }
    for note in notes.iter_mut().filter(|n| n.measure_offset > 0) {
        let shifted = note.start as i64 + rng.gen_range(-max..=max);
        note.start = shifted.max(0) as u32;
    }
    trim_repeated_pitches(notes);
}

fn trim_repeated_pitches(notes: &mut [NoteEvent]) {
    let mut order: Vec<usize> = (0..notes.len()).collect();
    order.sort_by_key(|&i| (notes[i].pitch, notes[i].start));
    for pair in order.windows(2) {
        let (prev, next) = (notes[pair[0]], notes[pair[1]]);
        if prev.pitch == next.pitch && next.start > prev.start {
            notes[pair[0]].duration = prev.duration.min(next.start - prev.start);
        }
    }
}
