//! Header section: everything up to and including the K: line.

use crate::ast::{Field, Header, Meter, Tempo, UnitLength, VoiceDef};
use crate::diagnostics::Diagnostics;

use super::key::parse_key_field;

/// Where the body starts after the header.
pub(crate) struct BodyStart<'a> {
    pub text: &'a str,
    /// 1-based line number of the first body line
    pub line: usize,
}

/// Parse header fields until K: or the first line that is not a field.
pub(crate) fn parse_header<'a>(input: &'a str, diags: &mut Diagnostics) -> (Header, BodyStart<'a>) {
    let mut header = Header::default();
    let mut offset = 0;
    let mut line_no = 1;
    let mut seen_x = false;
    let mut seen_k = false;
    let mut seen_m = false;
    let mut seen_l = false;

    for raw in input.split_inclusive('\n') {
        let line = raw.trim();
        diags.at(line_no, 1);

        if line.is_empty() || line.starts_with('%') {
            if let Some(program) = midi_program_directive(line) {
                header.midi_program = Some(program);
            }
            offset += raw.len();
            line_no += 1;
            continue;
        }

        let Some((tag, value)) = split_field(line) else {
            if !seen_k {
                diags.warning_with_hint(
                    "Music started before the K: field",
                    "End the header with a key line such as K:C",
                );
            }
            break;
        };

        offset += raw.len();
        line_no += 1;

        match tag {
            'X' => {
                seen_x = true;
                header.reference = value.parse().unwrap_or_else(|_| {
                    diags.warning(format!("Invalid X: value '{value}', using 1"));
                    1
                });
            }
            'T' if header.title.is_none() => header.title = Some(value.to_string()),
            'M' => {
                seen_m = true;
                header.meter = parse_meter(value).unwrap_or_else(|| {
                    diags.warning(format!("Invalid meter '{value}', assuming 4/4"));
                    Meter::default()
                });
            }
            'L' => {
                seen_l = true;
                header.unit_length = parse_unit_length(value).unwrap_or_else(|| {
                    diags.warning(format!("Invalid unit length '{value}', assuming 1/8"));
                    UnitLength::default()
                });
            }
            'Q' => match parse_tempo(value) {
                Some(tempo) => header.tempo = Some(tempo),
                None => diags.warning(format!("Invalid tempo '{value}', ignoring")),
            },
            'V' => header.voice_defs.push(parse_voice_def(value)),
            'K' => {
                header.key = parse_key_field(value, diags);
                seen_k = true;
                break;
            }
            _ => header.extra_fields.push(Field {
                tag,
                value: value.to_string(),
            }),
        }
    }

    diags.at(1, 1);
    if !seen_x {
        diags.warning("Missing X: field, assuming X:1");
    }
    if !seen_k {
        diags.warning("Missing K: field, assuming C major");
    }
    if !seen_m {
        diags.warning("Missing M: field, assuming 4/4");
    }
    if !seen_l {
        header.unit_length = infer_unit_length(&header.meter);
        diags.info(format!(
            "No L: field, using L:{}/{}",
            header.unit_length.numerator, header.unit_length.denominator
        ));
    }

    let body = BodyStart {
        text: &input[offset..],
        line: line_no,
    };
    (header, body)
}

/// `T:Title` → `('T', "Title")`. The tag must be a letter followed directly by a colon.
pub(crate) fn split_field(line: &str) -> Option<(char, &str)> {
    let mut chars = line.chars();
    let tag = chars.next().filter(char::is_ascii_alphabetic)?;
    let rest = chars.as_str().strip_prefix(':')?;
    Some((tag, rest.trim()))
}

fn midi_program_directive(line: &str) -> Option<u8> {
    let rest = line.strip_prefix("%%MIDI")?.trim_start();
    let rest = rest.strip_prefix("program")?;
    let mut numbers = rest.split_whitespace().filter_map(|w| w.parse::<u8>().ok());
    let first = numbers.next()?;
    // `%%MIDI program <channel> <program>` carries the program second
    Some(numbers.next().unwrap_or(first).min(127))
}

/// `4/4`, `C`, `C|`, `none`
pub(crate) fn parse_meter(value: &str) -> Option<Meter> {
    match value.trim() {
        "C" => Some(Meter::Common),
        "C|" => Some(Meter::Cut),
        "none" | "free" => Some(Meter::Free),
        other => {
            let (numerator, denominator) = parse_fraction(other)?;
            let numerator = u8::try_from(numerator).ok().filter(|n| *n > 0)?;
            let denominator = u8::try_from(denominator).ok().filter(|d| *d > 0)?;
            Some(Meter::Fraction {
                numerator,
                denominator,
            })
        }
    }
}

pub(crate) fn parse_unit_length(value: &str) -> Option<UnitLength> {
    let (numerator, denominator) = parse_fraction(value.trim())?;
    (numerator > 0 && denominator > 0).then_some(UnitLength {
        numerator,
        denominator,
    })
}

/// `1/4=120`, `120`, `"Allegro" 3/8=60`
pub(crate) fn parse_tempo(value: &str) -> Option<Tempo> {
    let mut rest = value.trim();
    let mut label = None;

    if let Some(after_quote) = rest.strip_prefix('"') {
        let end = after_quote.find('"')?;
        label = Some(after_quote[..end].to_string());
        rest = after_quote[end + 1..].trim();
    }
    // trailing label form: `1/4=120 "Allegro"`
    if let Some(start) = rest.find('"') {
        let tail = rest[start + 1..].trim_end_matches('"');
        label.get_or_insert_with(|| tail.to_string());
        rest = rest[..start].trim();
    }

    let (beat, bpm) = match rest.split_once('=') {
        Some((beat, bpm)) => (parse_fraction(beat.trim())?, bpm.trim()),
        None => ((1, 4), rest),
    };
    let bpm: u16 = bpm.parse().ok().filter(|b| *b > 0)?;
    Some(Tempo { beat, bpm, label })
}

fn parse_fraction(s: &str) -> Option<(u16, u16)> {
    let (num, den) = s.split_once('/')?;
    Some((num.trim().parse().ok()?, den.trim().parse().ok()?))
}

/// Default unit note length when L: is absent.
fn infer_unit_length(meter: &Meter) -> UnitLength {
    let (num, den) = meter.fraction();
    let denominator = if (num as f32 / den as f32) < 0.75 { 16 } else { 8 };
    UnitLength {
        numerator: 1,
        denominator,
    }
}

/// `V:id name="Lead" clef=treble`; `nm=` is accepted as a short form.
fn parse_voice_def(value: &str) -> VoiceDef {
    let id = value.split_whitespace().next().unwrap_or("1").to_string();
    let name = ["name=\"", "nm=\""].iter().find_map(|prefix| {
        let start = value.find(prefix)? + prefix.len();
        let after = &value[start..];
        after.find('"').map(|end| after[..end].to_string())
    });
    VoiceDef { id, name }
}
