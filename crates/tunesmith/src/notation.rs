//! Cleanup of model-written ABC before it reaches the parser.
//!
//! Replies arrive with code fences, stray voice markers, chord-symbol
//! annotations and half-formed bar lines. These passes reduce them to a tune
//! the `abc` parser reads without surprises.

/// Words that only show up when the model answered in prose.
const PROSE_MARKERS: [&str; 4] = ["sorry", "apologize", "here is", "here are"];

/// Line prefixes passed through [`clean`] untouched.
const DIRECTIVE_PREFIXES: [&str; 7] = ["M:", "L:", "K:", "X:", "T:", "V:", "%%"];

/// Line prefixes dropped when rebuilding the tune body.
const HEADER_PREFIXES: [&str; 6] = ["%", "X:", "M:", "L:", "K:", "V:"];

pub fn looks_like_prose(text: &str) -> bool {
    let lower = text.to_lowercase();
    PROSE_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Remove a surrounding ```` ``` ```` fence (with or without a language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Drop `[V:…]` markers that open a line, keeping whatever follows them.
pub fn normalize_voice_markers(text: &str) -> String {
    text.lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if !trimmed.starts_with("[V:") {
                return line;
            }
            match trimmed.find(']') {
                Some(end) => trimmed[end + 1..].trim_start(),
                None => "",
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Trim lines and make every music line start and end on a bar line.
pub fn clean(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| {
            let line = line.trim();
            if DIRECTIVE_PREFIXES.iter().any(|p| line.starts_with(p)) || !line.contains('|') {
                return line.to_string();
            }
            let mut wrapped = String::with_capacity(line.len() + 2);
            if !line.starts_with('|') {
                wrapped.push('|');
            }
            wrapped.push_str(line);
            if !line.ends_with('|') {
                wrapped.push('|');
            }
            wrapped
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the tune's header with one built from song parameters.
///
/// Body lines keep only their music: header and comment lines go, quoted
/// annotations are cut out, and anything without a bar line is dropped.
/// Returns `None` when no music line survives.
pub fn rebuild_tune(cleaned: &str, time_signature: &str, key: &str) -> Option<String> {
    let body: Vec<String> = cleaned
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !HEADER_PREFIXES.iter().any(|p| line.starts_with(p)))
        .map(|line| {
            line.split('"')
                .step_by(2)
                .collect::<String>()
        })
        .filter(|line| line.contains('|'))
        .collect();

    if body.is_empty() {
        return None;
    }

    let mut tune = format!("X:1\nM:{time_signature}\nL:1/8\nK:{key}\n");
    for line in body {
        tune.push_str(&line);
        tune.push('\n');
    }
    Some(tune)
}

/// Map the drum alphabet onto pitch letters the parser understands.
///
/// B S H O C R become C D E F G A (case kept). Field lines, comments, quoted
/// text, `!…!`/`+…+` decorations and inline `[X:…]` fields are left alone.
pub fn remap_drum_letters(text: &str) -> String {
    text.lines()
        .map(remap_drum_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn remap_drum_line(line: &str) -> String {
    if is_field_line(line) || line.trim_start().starts_with('%') {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    let mut closing: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if let Some(close) = closing {
            out.push(c);
            if c == close {
                closing = None;
            }
            continue;
        }
        match c {
            '%' => {
                out.push(c);
                out.extend(chars.by_ref());
            }
            '"' | '!' | '+' => {
                closing = Some(c);
                out.push(c);
            }
            '[' => {
                out.push(c);
                let mut lookahead = chars.clone();
                if matches!(
                    (lookahead.next(), lookahead.next()),
                    (Some(tag), Some(':')) if tag.is_ascii_alphabetic()
                ) {
                    closing = Some(']');
                }
            }
            _ => out.push(drum_letter(c)),
        }
    }
    out
}

fn drum_letter(c: char) -> char {
    let mapped = match c.to_ascii_uppercase() {
        'B' => 'C',
        'S' => 'D',
        'H' => 'E',
        'O' => 'F',
        'C' => 'G',
        'R' => 'A',
        _ => return c,
    };
    if c.is_ascii_lowercase() {
        mapped.to_ascii_lowercase()
    } else {
        mapped
    }
}

fn is_field_line(line: &str) -> bool {
    let mut chars = line.trim_start().chars();
    matches!((chars.next(), chars.next()), (Some(tag), Some(':')) if tag.is_ascii_alphabetic())
}
