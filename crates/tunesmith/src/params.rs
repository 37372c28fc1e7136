//! Song-wide musical parameters chosen by the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{parse_json_reply, ChatModel, ChatRequest, Sampling};
use crate::prompts;

pub const TEMPO_RANGE: (u16, u16) = (90, 140);
pub const MEASURES_RANGE: (u32, u32) = (64, 128);

/// Validated parameters shared by every part of a song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalParameters {
    /// Beats per minute, clamped to 90..=140
    pub tempo: u16,
    /// `n/d`, kept verbatim
    pub time_signature: String,
    /// `<letter>[#/b][m]`, kept verbatim
    pub key: String,
    /// Clamped to 64..=128
    pub measures: u32,
    /// Sections joined by `-`
    pub form: String,
    pub chord_progression: Vec<String>,
    pub scale: String,
    pub style: String,
}

impl Default for MusicalParameters {
    fn default() -> Self {
        Self {
            tempo: 120,
            time_signature: "4/4".to_string(),
            key: "C".to_string(),
            measures: 64,
            form: "Intro-Verse-Chorus-Verse-Chorus-Bridge-Chorus-Outro".to_string(),
            chord_progression: ["C", "G", "Am", "F"].iter().map(|c| c.to_string()).collect(),
            scale: "major".to_string(),
            style: "pop".to_string(),
        }
    }
}

impl MusicalParameters {
    /// Validate a parameter object, filling every missing or unusable field
    /// from the defaults.
    pub fn from_json(value: &Value) -> Self {
        let defaults = Self::default();
        let Some(map) = value.as_object() else {
            return defaults;
        };

        let tempo = map
            .get("tempo")
            .and_then(integer)
            .map(|t| t.clamp(TEMPO_RANGE.0 as i64, TEMPO_RANGE.1 as i64) as u16)
            .unwrap_or(defaults.tempo);
        let measures = map
            .get("measures")
            .and_then(integer)
            .map(|m| m.clamp(MEASURES_RANGE.0 as i64, MEASURES_RANGE.1 as i64) as u32)
            .unwrap_or(defaults.measures);

        let text = |name: &str, fallback: String| {
            map.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .unwrap_or(fallback)
        };

        let chord_progression = map
            .get("chord_progression")
            .map(chord_list)
            .filter(|chords| !chords.is_empty())
            .unwrap_or(defaults.chord_progression);

        Self {
            tempo,
            time_signature: text("time_signature", defaults.time_signature),
            key: text("key", defaults.key),
            measures,
            form: text("form", defaults.form),
            chord_progression,
            scale: text("scale", defaults.scale),
            style: text("style", defaults.style),
        }
    }

    /// Form sections in order; never empty.
    pub fn sections(&self) -> Vec<&str> {
        let sections: Vec<&str> = self
            .form
            .split('-')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if sections.is_empty() {
            vec![self.form.as_str()]
        } else {
            sections
        }
    }

    /// `[C, G, Am, F]`, as quoted in prompts.
    pub fn progression_display(&self) -> String {
        format!("[{}]", self.chord_progression.join(", "))
    }

    /// One `name: value` pair per field, for logging.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("tempo", self.tempo.to_string()),
            ("time_signature", self.time_signature.clone()),
            ("key", self.key.clone()),
            ("measures", self.measures.to_string()),
            ("form", self.form.clone()),
            ("chord_progression", self.progression_display()),
            ("scale", self.scale.clone()),
            ("style", self.style.clone()),
        ]
    }
}

/// Integers, floats (rounded) and numeric strings.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn chord_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(s) => s
            .split(|c: char| c == '-' || c == ',' || c.is_whitespace())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Ask the model for song parameters.
///
/// Never fails: any transport or JSON problem is logged and the defaults are
/// returned.
#[tracing::instrument(skip_all)]
pub async fn determine_parameters(model: &dyn ChatModel, prompt: &str) -> MusicalParameters {
    let request = ChatRequest {
        system: prompts::PARAMETERS_SYSTEM.to_string(),
        user: prompt.to_string(),
        sampling: Sampling::PLANNING,
    };

    let reply = match model.complete(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "Error determining musical parameters");
            return MusicalParameters::default();
        }
    };

    match parse_json_reply(&reply) {
        Ok(value) => MusicalParameters::from_json(&value),
        Err(e) => {
            tracing::error!(error = %e, reply = %reply, "Invalid JSON in parameter reply");
            MusicalParameters::default()
        }
    }
}
