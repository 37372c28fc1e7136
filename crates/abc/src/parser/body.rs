//! Tune body: the music after the K: line.
//!
//! The body is scanned one step at a time. Anything unrecognised is skipped
//! with an error so a single stray character never loses the rest of a line.

use crate::ast::{Bar, Decoration, Element, Field, Length, RestKind, SlurMark, Tuplet};
use crate::diagnostics::Diagnostics;

use super::header::split_field;
use super::note::{attempt, chord, delimited_name, note, number, quoted, rest};

/// Parse the body text; `first_line` is the line number of its first line.
pub(crate) fn parse_body(input: &str, first_line: usize, diags: &mut Diagnostics) -> Vec<Element> {
    let mut cursor = Cursor::new(input, first_line);
    let mut elements = Vec::new();
    let mut rhythm = Rhythm::default();

    while let Some(step) = next_step(&mut cursor, diags) {
        rhythm.apply(step, &mut elements, diags);
    }
    elements
}

struct Cursor<'a> {
    rest: &'a str,
    line: usize,
    line_start: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str, line: usize) -> Self {
        Cursor {
            rest: input,
            line,
            line_start: input,
        }
    }

    fn peek(&self) -> Option<char> {
        self.rest.chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest.chars().nth(1)
    }

    fn bump(&mut self, bytes: usize) {
        self.rest = &self.rest[bytes..];
    }

    fn bump_char(&mut self) {
        if let Some(c) = self.peek() {
            self.bump(c.len_utf8());
        }
    }

    fn newline(&mut self) {
        self.bump(1);
        self.line += 1;
        self.line_start = self.rest;
    }

    /// Move to the end of the line, leaving the newline itself.
    fn skip_line(&mut self) {
        let end = self.rest.find('\n').unwrap_or(self.rest.len());
        self.bump(end);
    }

    fn current_line(&self) -> &'a str {
        let end = self.rest.find('\n').unwrap_or(self.rest.len());
        &self.rest[..end]
    }

    fn column(&self) -> usize {
        self.line_start.len() - self.rest.len() + 1
    }

    fn at_line_start(&self) -> bool {
        self.rest.len() == self.line_start.len()
    }
}

/// One scanner step.
enum Step {
    Element(Element),
    Elements(Vec<Element>),
    /// `>` or `<` run; `dots` is the run length
    Broken { longer_first: bool, dots: usize },
    /// A `-` not attached to a note
    Tie,
    Skip,
}

/// Tracks the last timed element so broken rhythms and loose ties can reach back.
#[derive(Default)]
struct Rhythm {
    last_timed: Option<usize>,
    pending: Option<(u32, u32)>,
}

impl Rhythm {
    fn apply(&mut self, step: Step, list: &mut Vec<Element>, diags: &mut Diagnostics) {
        match step {
            Step::Element(element) => self.push(list, element),
            Step::Elements(elements) => {
                for element in elements {
                    self.push(list, element);
                }
            }
            Step::Broken { longer_first, dots } => {
                let (long, short) = match dots {
                    1 => ((3, 2), (1, 2)),
                    2 => ((7, 4), (1, 4)),
                    _ => ((15, 8), (1, 8)),
                };
                let (first, second) = if longer_first {
                    (long, short)
                } else {
                    (short, long)
                };
                match self.last_timed.and_then(|i| list.get_mut(i)) {
                    Some(previous) => {
                        scale(previous, first);
                        self.pending = Some(second);
                    }
                    None => diags.error("Broken rhythm with no preceding note, ignoring"),
                }
            }
            Step::Tie => match self.last_timed.and_then(|i| list.get_mut(i)) {
                Some(Element::Note(n)) => n.tied = true,
                Some(Element::Chord(c)) => c.tied = true,
                _ => {}
            },
            Step::Skip => {}
        }
    }

    fn push(&mut self, list: &mut Vec<Element>, mut element: Element) {
        if element.is_timed() {
            if let Some(factor) = self.pending.take() {
                scale(&mut element, factor);
            }
            self.last_timed = Some(list.len());
        }
        list.push(element);
    }
}

fn scale(element: &mut Element, (num, den): (u32, u32)) {
    match element {
        Element::Note(n) => n.length = n.length.scaled(num, den),
        Element::Chord(c) => c.length = c.length.scaled(num, den),
        Element::Rest(r) if !matches!(r.kind, RestKind::Bars(_)) => {
            r.length = r.length.scaled(num, den)
        }
        _ => {}
    }
}

fn next_step(cur: &mut Cursor<'_>, diags: &mut Diagnostics) -> Option<Step> {
    let c = cur.peek()?;
    diags.at(cur.line, cur.column());

    if cur.at_line_start() {
        if let Some(step) = field_line(cur) {
            return Some(step);
        }
    }

    let mut step = match c {
        '\n' => {
            cur.newline();
            Step::Element(Element::LineBreak)
        }
        ' ' | '\t' => {
            let trimmed = cur.rest.trim_start_matches([' ', '\t']);
            cur.bump(cur.rest.len() - trimmed.len());
            Step::Element(Element::Space)
        }
        '%' => {
            cur.skip_line();
            Step::Skip
        }
        '|' | ':' => bar(cur, diags),
        '[' => bracket(cur, diags),
        '(' => paren(cur, diags),
        ')' => {
            cur.bump(1);
            Step::Element(Element::Slur(SlurMark::Close))
        }
        '{' => grace_notes(cur, diags),
        '"' => match attempt(&mut cur.rest, quoted) {
            Some(text) => Step::Element(Element::ChordSymbol(text)),
            None => {
                diags.error("Unclosed quote, skipping the rest of the line");
                cur.skip_line();
                Step::Skip
            }
        },
        '!' | '+' => match attempt(&mut cur.rest, |i| delimited_name(i, c)) {
            Some(name) => Step::Element(Element::Decoration(Decoration::from_name(&name))),
            None => {
                diags.error(format!("Unclosed decoration '{c}', ignoring"));
                cur.bump(1);
                Step::Skip
            }
        },
        '>' | '<' => {
            let run = cur.rest.len() - cur.rest.trim_start_matches(c).len();
            cur.bump(run);
            Step::Broken {
                longer_first: c == '>',
                dots: run,
            }
        }
        '-' => {
            cur.bump(1);
            Step::Tie
        }
        '.' | '~' | 'H' | 'T' | 'u' | 'v' | 'L' | 'M' | 'P' | 'S' | 'O' => {
            cur.bump(1);
            Step::Element(Element::Decoration(shorthand_decoration(c)))
        }
        'z' | 'x' | 'Z' | 'X' => match attempt(&mut cur.rest, rest) {
            Some(r) => Step::Element(Element::Rest(r)),
            None => skip_unknown(cur, diags, c),
        },
        '^' | '_' | '=' | 'A'..='G' | 'a'..='g' => match attempt(&mut cur.rest, note) {
            Some(n) => Step::Element(Element::Note(n)),
            None => {
                diags.error(format!("Accidental '{c}' without a note, ignoring"));
                cur.bump(1);
                Step::Skip
            }
        },
        // spacers, backslash continuations, and layout marks carry no sound
        'y' | '`' | '$' | '*' | '\\' | '\r' => {
            cur.bump(1);
            Step::Skip
        }
        _ => skip_unknown(cur, diags, c),
    };
    if let Step::Element(element) = &mut step {
        cap_lengths(element, diags);
    }
    Some(step)
}

/// Clamp written lengths past [`Length::MAX_PART`] so timing stays in range.
fn cap_lengths(element: &mut Element, diags: &mut Diagnostics) {
    let mut capped = false;
    let mut cap = |length: &mut Length| {
        if let Some(smaller) = length.capped() {
            *length = smaller;
            capped = true;
        }
    };
    match element {
        Element::Note(n) => cap(&mut n.length),
        Element::Chord(c) => {
            cap(&mut c.length);
            c.notes.iter_mut().for_each(|n| cap(&mut n.length));
        }
        Element::Rest(r) => cap(&mut r.length),
        _ => {}
    }
    if capped {
        diags.warning(format!(
            "Length over {} units, capping it",
            Length::MAX_PART
        ));
    }
}

fn skip_unknown(cur: &mut Cursor<'_>, diags: &mut Diagnostics, c: char) -> Step {
    diags.error(format!("Skipping unknown character '{c}'"));
    cur.bump_char();
    Step::Skip
}

/// `K:Am`, `V:2`, `w:lyrics` on their own line inside the body.
fn field_line(cur: &mut Cursor<'_>) -> Option<Step> {
    let line = cur.current_line();
    let (tag, value) = split_field(line.trim_end())?;
    if matches!(tag, 'A'..='G' | 'a'..='g') {
        return None;
    }
    let step = match tag {
        'V' => Step::Element(Element::VoiceSwitch(voice_id(value))),
        'w' | 'W' => Step::Skip,
        _ => Step::Element(Element::InlineField(Field {
            tag,
            value: value.to_string(),
        })),
    };
    cur.skip_line();
    Some(step)
}

fn voice_id(value: &str) -> String {
    value.split_whitespace().next().unwrap_or("1").to_string()
}

fn bar(cur: &mut Cursor<'_>, diags: &mut Diagnostics) -> Step {
    static BARS: [(&str, Bar); 8] = [
        (":|]", Bar::RepeatEnd),
        (":||", Bar::RepeatEnd),
        ("::", Bar::RepeatBoth),
        (":|", Bar::RepeatEnd),
        ("|]", Bar::Final),
        ("||", Bar::Double),
        ("|:", Bar::RepeatStart),
        ("|", Bar::Single),
    ];

    let Some((text, bar)) = BARS.iter().find(|(text, _)| cur.rest.starts_with(text)) else {
        diags.error("Stray ':' outside a bar line, ignoring");
        cur.bump(1);
        return Step::Skip;
    };
    cur.bump(text.len());

    let mut elements = vec![Element::Bar(*bar)];
    if let Some(n) = ending_number(cur) {
        elements.push(Element::Ending(n));
    }
    Step::Elements(elements)
}

/// Digits right after a bar or `[`, e.g. `|1` or `[2`. Lists like `1,3` keep the first number.
fn ending_number(cur: &mut Cursor<'_>) -> Option<u8> {
    let n = attempt(&mut cur.rest, number)?;
    let tail = cur
        .rest
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == ',' || c == '-');
    cur.bump(cur.rest.len() - tail.len());
    Some(n.clamp(1, u8::MAX as u32) as u8)
}

fn bracket(cur: &mut Cursor<'_>, diags: &mut Diagnostics) -> Step {
    let second = cur.peek_second();
    let third = cur.rest.chars().nth(2);

    if second.is_some_and(|c| c.is_ascii_alphabetic()) && third == Some(':') {
        let line = cur.current_line();
        let Some(end) = line.find(']') else {
            diags.error("Unclosed inline field, ignoring '['");
            cur.bump(1);
            return Step::Skip;
        };
        let inner = &line[1..end];
        cur.bump(end + 1);
        return match split_field(inner) {
            Some(('V', value)) => Step::Element(Element::VoiceSwitch(voice_id(value))),
            Some((tag, value)) => Step::Element(Element::InlineField(Field {
                tag,
                value: value.to_string(),
            })),
            None => Step::Skip,
        };
    }

    if second.is_some_and(|c| c.is_ascii_digit()) {
        cur.bump(1);
        return match ending_number(cur) {
            Some(n) => Step::Element(Element::Ending(n)),
            None => Step::Skip,
        };
    }

    if second == Some('|') {
        cur.bump(2);
        return Step::Element(Element::Bar(Bar::Heavy));
    }

    match attempt(&mut cur.rest, chord) {
        Some(c) => Step::Element(Element::Chord(c)),
        None => {
            diags.error_with_hint("Unclosed or empty chord, ignoring '['", "Chords look like [CEG]");
            cur.bump(1);
            Step::Skip
        }
    }
}

/// `(3abc` tuplet or `(` slur start.
fn paren(cur: &mut Cursor<'_>, diags: &mut Diagnostics) -> Step {
    if !cur.peek_second().is_some_and(|c| c.is_ascii_digit()) {
        cur.bump(1);
        return Step::Element(Element::Slur(SlurMark::Open));
    }

    cur.bump(1);
    let p = attempt(&mut cur.rest, number).unwrap_or(3).clamp(1, 32) as u8;
    let mut q = None;
    let mut r = None;
    if cur.rest.starts_with(':') {
        cur.bump(1);
        q = attempt(&mut cur.rest, number);
        if cur.rest.starts_with(':') {
            cur.bump(1);
            r = attempt(&mut cur.rest, number);
        }
    }
    let q = q.map(|q| q.clamp(1, 32) as u8).unwrap_or(match p {
        2 | 4 | 8 => 3,
        3 | 6 => 2,
        _ => 2,
    });
    let r = r.map(|r| r as usize).unwrap_or(p as usize);

    let mut inner = Vec::new();
    let mut rhythm = Rhythm::default();
    let mut trailing = Vec::new();
    let mut timed = 0;
    while timed < r {
        match cur.peek() {
            None | Some('\n') => break,
            Some(' ') | Some('\t') => {
                cur.bump(1);
                continue;
            }
            _ => {}
        }
        let Some(step) = next_step(cur, diags) else {
            break;
        };
        match step {
            Step::Element(Element::Bar(b)) => {
                trailing.push(Element::Bar(b));
                break;
            }
            Step::Elements(elements) => {
                trailing = elements;
                break;
            }
            Step::Element(e) => {
                if e.is_timed() {
                    timed += 1;
                }
                rhythm.push(&mut inner, e);
            }
            other => rhythm.apply(other, &mut inner, diags),
        }
    }
    if timed < r {
        diags.warning(format!("Tuplet expected {r} notes but found {timed}"));
    }

    let mut elements = vec![Element::Tuplet(Tuplet {
        p,
        q,
        elements: inner,
    })];
    elements.extend(trailing);
    Step::Elements(elements)
}

/// `{g}` or `{/ga}`; grace notes are kept but take no time.
fn grace_notes(cur: &mut Cursor<'_>, diags: &mut Diagnostics) -> Step {
    cur.bump(1);
    if cur.rest.starts_with('/') {
        cur.bump(1);
    }
    let mut notes = Vec::new();
    loop {
        match cur.peek() {
            Some('}') => {
                cur.bump(1);
                break;
            }
            None | Some('\n') => {
                diags.warning("Unclosed grace notes");
                break;
            }
            _ => match attempt(&mut cur.rest, note) {
                Some(n) => notes.push(n),
                None => cur.bump_char(),
            },
        }
    }
    Step::Element(Element::GraceNotes(notes))
}

fn shorthand_decoration(c: char) -> Decoration {
    match c {
        '.' => Decoration::Staccato,
        '~' => Decoration::Roll,
        'H' => Decoration::Fermata,
        'T' => Decoration::Trill,
        'u' => Decoration::UpBow,
        'v' => Decoration::DownBow,
        'L' => Decoration::Accent,
        'M' | 'P' => Decoration::Mordent,
        'S' => Decoration::Other("segno".to_string()),
        _ => Decoration::Other("coda".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dynamic, Letter};
    use pretty_assertions::assert_eq;

    fn body(text: &str) -> (Vec<Element>, Vec<crate::Diagnostic>) {
        let mut diags = Diagnostics::default();
        let elements = parse_body(text, 1, &mut diags);
        (elements, diags.finish())
    }

    fn audible(elements: &[Element]) -> Vec<&Element> {
        elements
            .iter()
            .filter(|e| !matches!(e, Element::Space | Element::LineBreak))
            .collect()
    }

    #[test]
    fn notes_and_bars() {
        let (elements, diags) = body("CDEF|GABc|]\n");
        assert!(diags.is_empty());
        let bars: Vec<_> = elements
            .iter()
            .filter_map(|e| match e {
                Element::Bar(b) => Some(*b),
                _ => None,
            })
            .collect();
        assert_eq!(bars, vec![Bar::Single, Bar::Final]);
        assert_eq!(elements.iter().filter(|e| matches!(e, Element::Note(_))).count(), 8);
    }

    #[test]
    fn repeat_bars_and_endings() {
        let (elements, _) = body("|:AB|1cd:|2ef|]");
        let kinds = audible(&elements);
        assert_eq!(kinds[0], &Element::Bar(Bar::RepeatStart));
        assert!(kinds.contains(&&Element::Ending(1)));
        assert!(kinds.contains(&&Element::Ending(2)));
        assert!(kinds.contains(&&Element::Bar(Bar::RepeatEnd)));

        let (elements, _) = body("[1 AB :| [2 cd ||");
        assert_eq!(elements[0], Element::Ending(1));
        assert!(elements.contains(&Element::Ending(2)));
        assert!(elements.contains(&Element::Bar(Bar::Double)));
    }

    #[test]
    fn broken_rhythm_is_resolved() {
        let (elements, _) = body("A>B c<d");
        let lengths: Vec<Length> = elements
            .iter()
            .filter_map(|e| match e {
                Element::Note(n) => Some(n.length),
                _ => None,
            })
            .collect();
        assert_eq!(
            lengths,
            vec![
                Length::new(3, 2),
                Length::new(1, 2),
                Length::new(1, 2),
                Length::new(3, 2)
            ]
        );

        let (elements, _) = body("A>>B");
        match (&elements[0], &elements[1]) {
            (Element::Note(a), Element::Note(b)) => {
                assert_eq!(a.length, Length::new(7, 4));
                assert_eq!(b.length, Length::new(1, 4));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn triplet_collects_three_notes() {
        let (elements, diags) = body("(3abc d");
        assert!(diags.is_empty());
        match &elements[0] {
            Element::Tuplet(t) => {
                assert_eq!((t.p, t.q), (3, 2));
                assert_eq!(t.elements.len(), 3);
            }
            other => panic!("expected tuplet, got {other:?}"),
        }
        assert!(matches!(elements.last(), Some(Element::Note(n)) if n.letter == Letter::D));
    }

    #[test]
    fn short_tuplet_warns() {
        let (elements, diags) = body("(3ab|c");
        assert_eq!(diags.len(), 1);
        assert!(elements.contains(&Element::Bar(Bar::Single)));
    }

    #[test]
    fn decorations_and_symbols() {
        let (elements, diags) = body("!ff!\"Am\".C +p+ Le");
        assert!(diags.is_empty());
        let kinds = audible(&elements);
        assert_eq!(kinds[0], &Element::Decoration(Decoration::Dynamic(Dynamic::Ff)));
        assert_eq!(kinds[1], &Element::ChordSymbol("Am".to_string()));
        assert_eq!(kinds[2], &Element::Decoration(Decoration::Staccato));
        assert_eq!(kinds[4], &Element::Decoration(Decoration::Dynamic(Dynamic::P)));
        assert_eq!(kinds[5], &Element::Decoration(Decoration::Accent));
    }

    #[test]
    fn fields_inside_body() {
        let (elements, _) = body("ab\nK:D\n[M:3/4] c\nV:2 clef=bass\nd\nw: la la\n");
        assert!(elements.contains(&Element::InlineField(Field {
            tag: 'K',
            value: "D".into()
        })));
        assert!(elements.contains(&Element::InlineField(Field {
            tag: 'M',
            value: "3/4".into()
        })));
        assert!(elements.contains(&Element::VoiceSwitch("2".into())));
    }

    #[test]
    fn a_note_letter_line_is_music_not_a_field() {
        let (elements, _) = body("A:|\n");
        assert!(matches!(elements[0], Element::Note(_)));
        assert_eq!(elements[1], Element::Bar(Bar::RepeatEnd));
    }

    #[test]
    fn loose_tie_and_chord() {
        let (elements, _) = body("[CEG]2 - [CEG]");
        match &elements[0] {
            Element::Chord(c) => assert!(c.tied),
            other => panic!("expected chord, got {other:?}"),
        }
    }

    #[test]
    fn unknown_characters_are_skipped_with_position() {
        let (elements, diags) = body("C\n  D # E");
        assert_eq!(diags.len(), 1);
        assert_eq!((diags[0].line, diags[0].column), (2, 5));
        assert_eq!(elements.iter().filter(|e| matches!(e, Element::Note(_))).count(), 3);
    }

    #[test]
    fn comments_and_grace_notes() {
        let (elements, diags) = body("{g}A % trailing comment\n{/ab}B");
        assert!(diags.is_empty());
        assert!(matches!(&elements[0], Element::GraceNotes(g) if g.len() == 1));
        assert!(elements.iter().any(|e| matches!(e, Element::GraceNotes(g) if g.len() == 2)));
    }

    #[test]
    fn oversized_lengths_are_capped_with_a_warning() {
        let (elements, diags) = body("C9999999 [C4000000000]2|");
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.severity == crate::Severity::Warning));
        assert_eq!((diags[1].line, diags[1].column), (1, 10));
        match (&elements[0], &elements[2]) {
            (Element::Note(n), Element::Chord(c)) => {
                assert_eq!(n.length, Length::new(Length::MAX_PART, 1));
                assert_eq!(c.notes[0].length, Length::new(Length::MAX_PART, 1));
                assert_eq!(c.length, Length::new(2, 1));
            }
            other => panic!("expected note and chord, got {other:?}"),
        }
    }
}
