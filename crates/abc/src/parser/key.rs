//! K: field handling.

use crate::ast::{Accidental, Key, Letter, Mode};
use crate::diagnostics::Diagnostics;

/// Parse a K: value, falling back to the closest usable key.
///
/// An unknown mode keeps the root and assumes major; an unknown root gives C major.
pub(crate) fn parse_key_field(value: &str, diags: &mut Diagnostics) -> Key {
    if let Some(key) = Key::parse(value) {
        return key;
    }

    let trimmed = value.trim();
    let mut chars = trimmed.chars();
    let Some(root) = chars.next().and_then(Letter::from_char) else {
        diags.warning_with_hint(
            format!("Unrecognised key '{trimmed}', assuming C major"),
            "Use a key such as K:G, K:Am or K:D dorian",
        );
        return Key::default();
    };

    let accidental = match chars.next() {
        Some('#') => Some(Accidental::Sharp),
        Some('b') => Some(Accidental::Flat),
        _ => None,
    };
    diags.warning(format!("Unknown mode in key '{trimmed}', assuming major"));
    Key {
        root,
        accidental,
        mode: Mode::Major,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn well_formed_key_has_no_diagnostics() {
        let mut diags = Diagnostics::default();
        let key = parse_key_field("E mix", &mut diags);
        assert_eq!(key.root, Letter::E);
        assert_eq!(key.mode, Mode::Mixolydian);
        assert!(diags.finish().is_empty());
    }

    #[test]
    fn unknown_mode_keeps_root() {
        let mut diags = Diagnostics::default();
        let key = parse_key_field("F# blues", &mut diags);
        assert_eq!(key.root, Letter::F);
        assert_eq!(key.accidental, Some(Accidental::Sharp));
        assert_eq!(key.mode, Mode::Major);
        assert_eq!(diags.finish().len(), 1);
    }

    #[test]
    fn garbage_key_is_c_major() {
        let mut diags = Diagnostics::default();
        let key = parse_key_field("?!", &mut diags);
        assert_eq!(key, Key::default());
        let items = diags.finish();
        assert!(items[0].hint.is_some());
    }

    #[test]
    fn clef_is_ignored() {
        let mut diags = Diagnostics::default();
        let key = parse_key_field("G clef=bass", &mut diags);
        assert_eq!(key.fifths(), 1);
        assert!(diags.finish().is_empty());
    }
}
