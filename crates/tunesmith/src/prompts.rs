//! Prompt text for the three model stages.

use crate::params::MusicalParameters;

pub const PARAMETERS_SYSTEM: &str = r#"You are a professional music theorist and composer. Read the user's description and choose musical parameters for a polished, radio-ready production.

Return ONLY a valid JSON object with these fields and no comments:
{
    "tempo": <integer between 90 and 140>,
    "time_signature": "<numerator>/<denominator>",
    "key": "<key letter>[m]",
    "measures": <integer between 64 and 128>,
    "form": "<sections joined by dashes, e.g. Intro-Verse-Chorus-Outro>",
    "chord_progression": [<chord symbols>],
    "scale": "<scale type>",
    "style": "<musical style>"
}
"#;

pub const INSTRUMENTS_SYSTEM: &str = r#"You are a music arranger for a polished, radio-ready production. Read the user's description and choose instruments for a rich, balanced track.

Return ONLY a valid JSON object mapping instrument groups to [name, MIDI channel] pairs:
{
    "rhythm": [["DrumSet", 10], ["ElectricBass", 1]],
    "harmony": [["Piano", 2]],
    "lead": [["SynthLead", 3]],
    "accompaniment": [["Violin", 4]],
    "backing_vocals": [["VoiceOohs", 5]]
}

The rhythm, harmony and lead groups are required. DrumSet must always use channel 10.
Available instruments: Piano, ElectricPiano, Organ, AcousticGuitar, ElectricGuitar, ElectricBass, Violin, Cello, Strings, VoiceOohs, Trumpet, Saxophone, Flute, SynthLead, SynthPad, DrumSet.
"#;

/// System prompt for per-part notation.
pub fn notation_system(params: &MusicalParameters) -> String {
    format!(
        r#"You are a professional composer writing valid ABC notation for a polished, radio-ready song. Follow these rules strictly:

1. Follow the {scale} scale and the chord progression {progression}.
2. Style: {style}, with professional rhythmic patterns, realistic phrasing and tasteful ornamentation.
3. Use proper voice leading and develop a cohesive theme.
4. Include dynamics (!mp! !mf! !f!), crescendos and diminuendos (!<(! !<)! !>(! !>)!) and articulations (staccato, accents, slurs).
5. Song form: {form}. Give verses a memorable theme and choruses a catchy hook.
6. Use repetition and variation for coherence.
7. Exactly {measures} measures.
8. Key: {key}.
9. Time signature: {time_signature}.
10. Start with X:1 followed by the M:, L: and K: headers.
11. Output ONLY valid ABC notation with no other text.
12. For drum parts use only these notes: B (bass drum), S (snare), H (hi-hat), O (open hi-hat), C (crash), R (ride).
"#,
        scale = params.scale,
        progression = params.progression_display(),
        style = params.style,
        form = params.form,
        measures = params.measures,
        key = params.key,
        time_signature = params.time_signature,
    )
}

/// User prompt for the drum part.
pub fn drum_part(params: &MusicalParameters) -> String {
    format!(
        "Write {measures} measures of professional drum patterns in {time} for a {style} song, \
         following the chord progression {progression} and the form {form}. \
         Use tasteful variations, realistic fills and appropriate dynamics. \
         Only use the notes B, S, H, O, C and R.",
        measures = params.measures,
        time = params.time_signature,
        style = params.style,
        progression = params.progression_display(),
        form = params.form,
    )
}

/// User prompt for any pitched part.
pub fn pitched_part(instrument: &str, params: &MusicalParameters) -> String {
    format!(
        "Write {measures} measures of a {instrument} part for a {style} song. \
         Key: {key}, Time: {time}, Form: {form}, chord progression {progression}. \
         Include dynamics, articulations and tasteful melodic and harmonic content. \
         Make the result professional, cohesive and radio-ready.\n\
         Put the M:, L: and K: headers at the start and produce ONLY ABC notation.",
        measures = params.measures,
        style = params.style,
        key = params.key,
        time = params.time_signature,
        form = params.form,
        progression = params.progression_display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notation_system_mentions_parameters() {
        let params = MusicalParameters {
            key: "Dm".to_string(),
            measures: 80,
            ..Default::default()
        };
        let text = notation_system(&params);
        assert!(text.contains("Exactly 80 measures"));
        assert!(text.contains("Key: Dm."));
        assert!(text.contains("[C, G, Am, F]"));
    }

    #[test]
    fn drum_prompt_restricts_letters() {
        let text = drum_part(&MusicalParameters::default());
        assert!(text.contains("64 measures"));
        assert!(text.contains("B, S, H, O, C and R"));
        assert!(!text.contains("Key:"));
    }

    #[test]
    fn pitched_prompt_names_instrument() {
        let text = pitched_part("Cello", &MusicalParameters::default());
        assert!(text.starts_with("Write 64 measures of a Cello part"));
        assert!(text.contains("M:, L: and K: headers"));
    }
}
