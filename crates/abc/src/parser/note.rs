//! Notes, chords, rests and quoted text as winnow parsers.
//!
//! Each parser may consume input before failing, so callers probe on a copy
//! of the cursor (see [`attempt`]).

use winnow::combinator::{alt, opt, preceded, repeat};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::ast::{Accidental, Chord, Length, Letter, Note, Rest, RestKind};

/// Run `parser` on a copy of the cursor, committing only on success.
pub(crate) fn attempt<O>(
    input: &mut &str,
    mut parser: impl FnMut(&mut &str) -> ModalResult<O>,
) -> Option<O> {
    let mut probe = *input;
    let value = parser(&mut probe).ok()?;
    *input = probe;
    Some(value)
}

pub(crate) fn accidental(input: &mut &str) -> ModalResult<Accidental> {
    alt((
        "^^".value(Accidental::DoubleSharp),
        "^".value(Accidental::Sharp),
        "__".value(Accidental::DoubleFlat),
        "_".value(Accidental::Flat),
        "=".value(Accidental::Natural),
    ))
    .parse_next(input)
}

/// Letter plus its base octave: uppercase is 0, lowercase is 1.
fn pitch_letter(input: &mut &str) -> ModalResult<(Letter, i8)> {
    any.verify_map(|c: char| {
        let octave = if c.is_ascii_lowercase() { 1 } else { 0 };
        Letter::from_char(c).map(|letter| (letter, octave))
    })
    .parse_next(input)
}

fn octave_marks(input: &mut &str) -> ModalResult<i8> {
    let marks = take_while(0.., ['\'', ',']).parse_next(input)?;
    Ok(marks.chars().map(|c| if c == '\'' { 1 } else { -1 }).sum())
}

/// Decimal digits; values past `u32::MAX` saturate.
pub(crate) fn number(input: &mut &str) -> ModalResult<u32> {
    take_while(1.., |c: char| c.is_ascii_digit())
        .map(|digits: &str| digits.parse::<u32>().unwrap_or(u32::MAX))
        .parse_next(input)
}

/// `2`, `/`, `//`, `3/2`, `/4`; absent means one unit.
pub(crate) fn length(input: &mut &str) -> ModalResult<Length> {
    let num = opt(number).parse_next(input)?.unwrap_or(1);
    let slashes = take_while(0.., '/').parse_next(input)?;
    let den = if slashes.is_empty() {
        1
    } else {
        match opt(number).parse_next(input)? {
            Some(den) => den,
            None => 1u32 << slashes.len().min(6),
        }
    };
    Ok(Length::new(num, den))
}

fn tie(input: &mut &str) -> ModalResult<bool> {
    Ok(opt('-').parse_next(input)?.is_some())
}

pub(crate) fn note(input: &mut &str) -> ModalResult<Note> {
    let accidental = opt(accidental).parse_next(input)?;
    let (letter, base) = pitch_letter(input)?;
    let octave = base + octave_marks(input)?;
    let length = length(input)?;
    let tied = tie(input)?;
    Ok(Note {
        letter,
        octave,
        accidental,
        length,
        tied,
    })
}

/// `[CEG]2`; members may carry their own lengths and ties.
pub(crate) fn chord(input: &mut &str) -> ModalResult<Chord> {
    '['.parse_next(input)?;
    let notes: Vec<Note> = repeat(1.., preceded(take_while(0.., ' '), note)).parse_next(input)?;
    take_while(0.., ' ').parse_next(input)?;
    ']'.parse_next(input)?;
    let length = length(input)?;
    let tied = tie(input)?;
    Ok(Chord {
        notes,
        length,
        tied,
    })
}

/// `z`, `x` with a length, or `Z`/`X` with a bar count.
pub(crate) fn rest(input: &mut &str) -> ModalResult<Rest> {
    let c = one_of(['z', 'x', 'Z', 'X']).parse_next(input)?;
    let rest = match c {
        'z' | 'x' => Rest {
            length: length(input)?,
            kind: if c == 'z' {
                RestKind::Visible
            } else {
                RestKind::Invisible
            },
        },
        _ => {
            let bars = opt(number).parse_next(input)?.unwrap_or(1);
            Rest {
                length: Length::UNIT,
                kind: RestKind::Bars(bars.clamp(1, u16::MAX as u32) as u16),
            }
        }
    };
    Ok(rest)
}

/// Text between double quotes on a single line.
pub(crate) fn quoted(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let text = take_while(0.., |c: char| c != '"' && c != '\n').parse_next(input)?;
    '"'.parse_next(input)?;
    Ok(text.to_string())
}

/// Text between two `delimiter` characters on a single line, e.g. `!trill!`.
pub(crate) fn delimited_name(input: &mut &str, mut delimiter: char) -> ModalResult<String> {
    delimiter.parse_next(input)?;
    let name = take_while(1.., |c: char| c != delimiter && c != '\n').parse_next(input)?;
    delimiter.parse_next(input)?;
    Ok(name.trim().to_string())
}
