//! ABC parser built on winnow.
//!
//! Parsing is generous: it always produces a [`Tune`], and problems found on
//! the way are returned as diagnostics next to it.

mod body;
mod header;
mod key;
mod note;

pub(crate) use header::{parse_meter, parse_tempo, parse_unit_length};

use crate::ast::{Element, Tune, Voice, VoiceDef};
use crate::diagnostics::{Diagnostics, Parsed};

/// Parse a complete tune.
pub fn parse(input: &str) -> Parsed<Tune> {
    let mut diags = Diagnostics::default();

    let (header, body) = header::parse_header(input, &mut diags);
    let elements = body::parse_body(body.text, body.line, &mut diags);
    let voices = split_voices(&header.voice_defs, elements);

    Parsed {
        value: Tune { header, voices },
        diagnostics: diags.finish(),
    }
}

/// Distribute body elements over voices following `V:` switches.
///
/// Voices come out in definition order, followed by voices that only appear
/// in the body. Music before the first switch belongs to the first defined
/// voice, or to an unnamed voice when there are no definitions.
fn split_voices(defs: &[VoiceDef], elements: Vec<Element>) -> Vec<Voice> {
    let mut voices: Vec<Voice> = defs
        .iter()
        .map(|def| Voice {
            id: Some(def.id.clone()),
            name: def.name.clone(),
            elements: Vec::new(),
        })
        .collect();
    if voices.is_empty() {
        voices.push(Voice::default());
    }

    let mut current = 0;
    for element in elements {
        match element {
            Element::VoiceSwitch(id) => {
                current = match voices.iter().position(|v| v.id.as_deref() == Some(id.as_str())) {
                    Some(index) => index,
                    None if voices.len() == 1
                        && voices[0].id.is_none()
                        && !voices[0].elements.iter().any(Element::is_timed) =>
                    {
                        voices[0].id = Some(id);
                        0
                    }
                    None => {
                        voices.push(Voice {
                            id: Some(id),
                            name: None,
                            elements: Vec::new(),
                        });
                        voices.len() - 1
                    }
                };
            }
            other => voices[current].elements.push(other),
        }
    }

    voices
}
