//! Syntax tree for ABC tunes.
//!
//! The tree keeps everything the parser recognises, including elements that
//! never sound (chord symbols, slurs, decorations without a following note).

use serde::{Deserialize, Serialize};

/// A parsed tune: header fields plus one element list per voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tune {
    pub header: Header,
    pub voices: Vec<Voice>,
}

impl Default for Tune {
    fn default() -> Self {
        Tune {
            header: Header::default(),
            voices: vec![Voice::default()],
        }
    }
}

impl Tune {
    /// Number of sounding notes across all voices (chord members count individually).
    pub fn note_count(&self) -> usize {
        fn count(elements: &[Element]) -> usize {
            elements
                .iter()
                .map(|e| match e {
                    Element::Note(_) => 1,
                    Element::Chord(c) => c.notes.len(),
                    Element::Tuplet(t) => count(&t.elements),
                    _ => 0,
                })
                .sum()
        }
        self.voices.iter().map(|v| count(&v.elements)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub reference: u32,
    pub title: Option<String>,
    pub key: Key,
    pub meter: Meter,
    pub unit_length: UnitLength,
    pub tempo: Option<Tempo>,
    pub voice_defs: Vec<VoiceDef>,
    /// `%%MIDI program N` directive
    pub midi_program: Option<u8>,
    pub extra_fields: Vec<Field>,
}

impl Default for Header {
    fn default() -> Self {
        Header {
            reference: 1,
            title: None,
            key: Key::default(),
            meter: Meter::default(),
            unit_length: UnitLength::default(),
            tempo: None,
            voice_defs: Vec::new(),
            midi_program: None,
            extra_fields: Vec::new(),
        }
    }
}

/// Natural note letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl Letter {
    pub const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    /// Order in which a key signature adds sharps (reverse for flats).
    pub const SHARP_ORDER: [Letter; 7] = [
        Letter::F,
        Letter::C,
        Letter::G,
        Letter::D,
        Letter::A,
        Letter::E,
        Letter::B,
    ];

    pub fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    /// Semitones above C.
    pub fn semitone(self) -> i8 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    /// Position on the circle of fifths relative to C.
    pub fn fifths(self) -> i8 {
        match self {
            Letter::F => -1,
            Letter::C => 0,
            Letter::G => 1,
            Letter::D => 2,
            Letter::A => 3,
            Letter::E => 4,
            Letter::B => 5,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accidental {
    DoubleFlat,
    Flat,
    Natural,
    Sharp,
    DoubleSharp,
}

impl Accidental {
    pub fn semitones(self) -> i8 {
        match self {
            Accidental::DoubleFlat => -2,
            Accidental::Flat => -1,
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::DoubleSharp => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mode {
    #[default]
    Major,
    Minor,
    Ionian,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Aeolian,
    Locrian,
}

impl Mode {
    /// Accepts full names and any abbreviation down to three letters, plus `m`.
    pub fn parse(word: &str) -> Option<Mode> {
        let word = word.to_ascii_lowercase();
        if word.is_empty() {
            return Some(Mode::Major);
        }
        if word == "m" {
            return Some(Mode::Minor);
        }
        if word.len() < 3 {
            return None;
        }
        let candidates = [
            ("major", Mode::Major),
            ("minor", Mode::Minor),
            ("ionian", Mode::Ionian),
            ("dorian", Mode::Dorian),
            ("phrygian", Mode::Phrygian),
            ("lydian", Mode::Lydian),
            ("mixolydian", Mode::Mixolydian),
            ("aeolian", Mode::Aeolian),
            ("locrian", Mode::Locrian),
        ];
        candidates
            .iter()
            .find(|(name, _)| name.starts_with(word.as_str()))
            .map(|(_, mode)| *mode)
    }

    /// Shift on the circle of fifths relative to the major mode on the same root.
    pub fn fifths_offset(self) -> i8 {
        match self {
            Mode::Lydian => 1,
            Mode::Major | Mode::Ionian => 0,
            Mode::Mixolydian => -1,
            Mode::Dorian => -2,
            Mode::Minor | Mode::Aeolian => -3,
            Mode::Phrygian => -4,
            Mode::Locrian => -5,
        }
    }
}

/// Key signature from the K: field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    pub root: Letter,
    pub accidental: Option<Accidental>,
    pub mode: Mode,
}

impl Default for Key {
    fn default() -> Self {
        Key {
            root: Letter::C,
            accidental: None,
            mode: Mode::Major,
        }
    }
}

impl Key {
    /// Strict parse of a key such as `G`, `F#m`, `Bb`, `D dorian`.
    ///
    /// Returns `None` when the root or the mode word is not recognised.
    /// `none` and the empty string mean C major.
    pub fn parse(text: &str) -> Option<Key> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case("none") {
            return Some(Key::default());
        }

        let mut chars = text.chars();
        let root = Letter::from_char(chars.next()?)?;
        let rest = chars.as_str();

        // Mode words never start with 'b', so a 'b' right after the root is a flat.
        let (accidental, rest) = match rest.chars().next() {
            Some('#') | Some('♯') => (Some(Accidental::Sharp), &rest[rest.chars().next()?.len_utf8()..]),
            Some('b') | Some('♭') => (Some(Accidental::Flat), &rest[rest.chars().next()?.len_utf8()..]),
            _ => (None, rest),
        };

        let mode_word = rest
            .split_whitespace()
            .next()
            .filter(|w| !w.contains('='))
            .unwrap_or("");
        let mode = Mode::parse(mode_word)?;

        Some(Key {
            root,
            accidental,
            mode,
        })
    }

    /// Sharps (positive) or flats (negative) in the signature, within -7..=7.
    pub fn fifths(&self) -> i8 {
        let accidental = match self.accidental {
            Some(Accidental::Sharp) => 7,
            Some(Accidental::Flat) => -7,
            _ => 0,
        };
        (self.root.fifths() + accidental + self.mode.fifths_offset()).clamp(-7, 7)
    }

    pub fn is_minor(&self) -> bool {
        matches!(self.mode, Mode::Minor | Mode::Aeolian)
    }

    /// Semitone adjustment the signature applies to each letter, indexed by [`Letter::index`].
    pub fn signature(&self) -> [i8; 7] {
        let mut adjust = [0i8; 7];
        let fifths = self.fifths();
        let count = fifths.unsigned_abs() as usize;
        if fifths > 0 {
            for letter in Letter::SHARP_ORDER.iter().take(count) {
                adjust[letter.index()] = 1;
            }
        } else {
            for letter in Letter::SHARP_ORDER.iter().rev().take(count) {
                adjust[letter.index()] = -1;
            }
        }
        adjust
    }
}

/// Time signature (M: field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Meter {
    Fraction { numerator: u8, denominator: u8 },
    /// `C`
    Common,
    /// `C|`
    Cut,
    /// `none`
    Free,
}

impl Default for Meter {
    fn default() -> Self {
        Meter::Fraction {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl Meter {
    /// Parse an M: value (`6/8`, `C`, `C|`, `none`).
    pub fn parse(text: &str) -> Option<Meter> {
        crate::parser::parse_meter(text)
    }

    /// (beats, beat unit); free meter is treated as 4/4.
    pub fn fraction(&self) -> (u8, u8) {
        match *self {
            Meter::Fraction {
                numerator,
                denominator,
            } => (numerator, denominator),
            Meter::Common | Meter::Free => (4, 4),
            Meter::Cut => (2, 2),
        }
    }
}

/// Default note length (L: field) as a fraction of a whole note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitLength {
    pub numerator: u16,
    pub denominator: u16,
}

impl Default for UnitLength {
    fn default() -> Self {
        UnitLength {
            numerator: 1,
            denominator: 8,
        }
    }
}

/// Tempo (Q: field).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tempo {
    /// Beat the BPM refers to, as a fraction of a whole note.
    pub beat: (u16, u16),
    pub bpm: u16,
    pub label: Option<String>,
}

impl Tempo {
    /// Tempo expressed in quarter notes per minute.
    pub fn quarter_bpm(&self) -> u16 {
        let (num, den) = self.beat;
        if den == 0 {
            return self.bpm;
        }
        let quarters = self.bpm as u32 * 4 * num as u32 / den as u32;
        quarters.clamp(1, u16::MAX as u32) as u16
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceDef {
    pub id: String,
    pub name: Option<String>,
}

/// Any `X:value` field we keep verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub tag: char,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Voice {
    pub id: Option<String>,
    pub name: Option<String>,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Element {
    Note(Note),
    Chord(Chord),
    Rest(Rest),
    Bar(Bar),
    /// Start of a numbered ending (`[1`, `|2`, `:|2`)
    Ending(u8),
    Tuplet(Tuplet),
    GraceNotes(Vec<Note>),
    /// Quoted chord symbol or annotation; never sounded
    ChordSymbol(String),
    InlineField(Field),
    Decoration(Decoration),
    Slur(SlurMark),
    VoiceSwitch(String),
    Space,
    LineBreak,
}

impl Element {
    /// Whether the element takes time.
    pub fn is_timed(&self) -> bool {
        matches!(
            self,
            Element::Note(_) | Element::Chord(_) | Element::Rest(_) | Element::Tuplet(_)
        )
    }
}

/// Length as a multiple of the unit note length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Length {
    pub num: u32,
    pub den: u32,
}

impl Default for Length {
    fn default() -> Self {
        Length::UNIT
    }
}

impl Length {
    pub const UNIT: Length = Length { num: 1, den: 1 };

    pub fn new(num: u32, den: u32) -> Self {
        Length {
            num,
            den: den.max(1),
        }
        .reduced()
    }

    /// Largest numerator or denominator a written length keeps.
    pub const MAX_PART: u32 = 512;

    pub fn scaled(self, num: u32, den: u32) -> Self {
        Length::new(self.num.saturating_mul(num), self.den.saturating_mul(den.max(1)))
    }

    /// Both parts clamped to [`Length::MAX_PART`], or `None` when already in range.
    pub fn capped(self) -> Option<Length> {
        (self.num > Self::MAX_PART || self.den > Self::MAX_PART)
            .then(|| Length::new(self.num.min(Self::MAX_PART), self.den.min(Self::MAX_PART)))
    }

    fn reduced(self) -> Self {
        fn gcd(a: u32, b: u32) -> u32 {
            if b == 0 {
                a
            } else {
                gcd(b, a % b)
            }
        }
        let g = gcd(self.num, self.den).max(1);
        Length {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// Ticks for this length given the ticks of one unit note.
    pub fn ticks(self, unit_ticks: u32) -> u32 {
        let ticks = unit_ticks as u64 * self.num as u64 / self.den as u64;
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub letter: Letter,
    /// 0 for `C`..`B` (middle C upward), 1 for `c`..`b`, adjusted by `'` and `,`
    pub octave: i8,
    pub accidental: Option<Accidental>,
    pub length: Length,
    pub tied: bool,
}

impl Note {
    pub fn new(letter: Letter, octave: i8) -> Self {
        Note {
            letter,
            octave,
            accidental: None,
            length: Length::UNIT,
            tied: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    pub notes: Vec<Note>,
    pub length: Length,
    pub tied: bool,
}

impl Chord {
    /// Sounding length: the chord multiplier applied to the first member's own length.
    pub fn effective_length(&self) -> Length {
        let inner = self.notes.first().map(|n| n.length).unwrap_or(Length::UNIT);
        inner.scaled(self.length.num, self.length.den)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestKind {
    /// `z`
    Visible,
    /// `x`
    Invisible,
    /// `Z4`: whole bars
    Bars(u16),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rest {
    pub length: Length,
    pub kind: RestKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bar {
    /// `|`
    Single,
    /// `||`
    Double,
    /// `|]`
    Final,
    /// `[|`
    Heavy,
    /// `|:`
    RepeatStart,
    /// `:|`
    RepeatEnd,
    /// `::`
    RepeatBoth,
}

/// `(p:q:r`: p notes in the time of q, applied to the contained elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuplet {
    pub p: u8,
    pub q: u8,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlurMark {
    Open,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decoration {
    Staccato,
    Accent,
    Fermata,
    Trill,
    Roll,
    Mordent,
    Turn,
    UpBow,
    DownBow,
    Dynamic(Dynamic),
    Crescendo(SlurMark),
    Diminuendo(SlurMark),
    Other(String),
}

impl Decoration {
    /// Decoration named inside `!…!` or `+…+`.
    pub fn from_name(name: &str) -> Decoration {
        match name {
            "staccato" => Decoration::Staccato,
            "accent" | ">" | "emphasis" => Decoration::Accent,
            "fermata" => Decoration::Fermata,
            "trill" => Decoration::Trill,
            "roll" => Decoration::Roll,
            "mordent" | "lowermordent" | "uppermordent" | "pralltriller" => Decoration::Mordent,
            "turn" => Decoration::Turn,
            "upbow" => Decoration::UpBow,
            "downbow" => Decoration::DownBow,
            "crescendo(" | "<(" => Decoration::Crescendo(SlurMark::Open),
            "crescendo)" | "<)" => Decoration::Crescendo(SlurMark::Close),
            "diminuendo(" | ">(" => Decoration::Diminuendo(SlurMark::Open),
            "diminuendo)" | ">)" => Decoration::Diminuendo(SlurMark::Close),
            other => match Dynamic::parse(other) {
                Some(dynamic) => Decoration::Dynamic(dynamic),
                None => Decoration::Other(other.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dynamic {
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
}

impl Dynamic {
    pub fn parse(name: &str) -> Option<Dynamic> {
        Some(match name {
            "ppp" => Dynamic::Ppp,
            "pp" => Dynamic::Pp,
            "p" => Dynamic::P,
            "mp" => Dynamic::Mp,
            "mf" => Dynamic::Mf,
            "f" => Dynamic::F,
            "ff" => Dynamic::Ff,
            "fff" => Dynamic::Fff,
            _ => return None,
        })
    }

    pub fn velocity(self) -> u8 {
        match self {
            Dynamic::Ppp => 20,
            Dynamic::Pp => 33,
            Dynamic::P => 49,
            Dynamic::Mp => 64,
            Dynamic::Mf => 80,
            Dynamic::F => 96,
            Dynamic::Ff => 112,
            Dynamic::Fff => 127,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parse_variants() {
        let g = Key::parse("G").unwrap();
        assert_eq!(g.fifths(), 1);

        let fsm = Key::parse("F#m").unwrap();
        assert_eq!(fsm.root, Letter::F);
        assert_eq!(fsm.accidental, Some(Accidental::Sharp));
        assert_eq!(fsm.mode, Mode::Minor);
        assert_eq!(fsm.fifths(), 3);

        let bb = Key::parse("Bb").unwrap();
        assert_eq!(bb.fifths(), -2);

        let bbm = Key::parse("Bbm").unwrap();
        assert_eq!(bbm.fifths(), -5);
        assert!(bbm.is_minor());

        let dorian = Key::parse("D dorian").unwrap();
        assert_eq!(dorian.mode, Mode::Dorian);
        assert_eq!(dorian.fifths(), 0);

        assert_eq!(Key::parse("none"), Some(Key::default()));
        assert_eq!(Key::parse("Q"), None);
        assert_eq!(Key::parse("C weird"), None);
    }

    #[test]
    fn key_signature_letters() {
        let d = Key::parse("D").unwrap().signature();
        assert_eq!(d[Letter::F.index()], 1);
        assert_eq!(d[Letter::C.index()], 1);
        assert_eq!(d[Letter::G.index()], 0);

        let eb = Key::parse("Eb").unwrap().signature();
        assert_eq!(eb[Letter::B.index()], -1);
        assert_eq!(eb[Letter::E.index()], -1);
        assert_eq!(eb[Letter::A.index()], -1);
        assert_eq!(eb[Letter::D.index()], 0);
    }

    #[test]
    fn mode_abbreviations() {
        assert_eq!(Mode::parse("m"), Some(Mode::Minor));
        assert_eq!(Mode::parse("min"), Some(Mode::Minor));
        assert_eq!(Mode::parse("Mix"), Some(Mode::Mixolydian));
        assert_eq!(Mode::parse("maj"), Some(Mode::Major));
        assert_eq!(Mode::parse("mi"), None);
        assert_eq!(Mode::parse("blues"), None);
    }

    #[test]
    fn length_arithmetic() {
        assert_eq!(Length::new(2, 4), Length::new(1, 2));
        assert_eq!(Length::new(3, 2).ticks(240), 360);
        assert_eq!(Length::UNIT.scaled(2, 3).ticks(240), 160);
    }

    #[test]
    fn tempo_in_quarters() {
        let dotted = Tempo {
            beat: (3, 8),
            bpm: 60,
            label: None,
        };
        assert_eq!(dotted.quarter_bpm(), 90);
    }

    #[test]
    fn chord_length_uses_first_member() {
        let mut c = Note::new(Letter::C, 0);
        c.length = Length::new(2, 1);
        let chord = Chord {
            notes: vec![c, Note::new(Letter::E, 0)],
            length: Length::new(1, 2),
            tied: false,
        };
        assert_eq!(chord.effective_length(), Length::UNIT);
    }

    #[test]
    fn meter_parse() {
        assert_eq!(Meter::parse("6/8").map(|m| m.fraction()), Some((6, 8)));
        assert_eq!(Meter::parse("C|"), Some(Meter::Cut));
        assert_eq!(Meter::parse("waltz"), None);
    }

    #[test]
    fn length_arithmetic_saturates() {
        let huge = Length::new(4_000_000_000, 1);
        assert_eq!(huge.scaled(3, 2), Length::new(u32::MAX, 2));
        assert_eq!(huge.ticks(240), u32::MAX);
        assert_eq!(huge.capped(), Some(Length::new(Length::MAX_PART, 1)));
        assert_eq!(Length::new(3, 2).capped(), None);
    }
}
