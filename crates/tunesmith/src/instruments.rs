//! Instrument catalogue and the model's arrangement plan.

use serde::Serialize;
use serde_json::Value;

use abc::DRUM_CHANNEL;

use crate::llm::{parse_json_reply, ChatModel, ChatRequest, Sampling};
use crate::prompts;

/// Groups every plan must contain.
pub const REQUIRED_GROUPS: [&str; 3] = ["rhythm", "harmony", "lead"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Instrument {
    Piano,
    ElectricPiano,
    Organ,
    AcousticGuitar,
    ElectricGuitar,
    ElectricBass,
    Violin,
    Cello,
    Strings,
    VoiceOohs,
    Trumpet,
    Saxophone,
    Flute,
    SynthLead,
    SynthPad,
    DrumSet,
}

impl Instrument {
    pub const ALL: [Instrument; 16] = [
        Instrument::Piano,
        Instrument::ElectricPiano,
        Instrument::Organ,
        Instrument::AcousticGuitar,
        Instrument::ElectricGuitar,
        Instrument::ElectricBass,
        Instrument::Violin,
        Instrument::Cello,
        Instrument::Strings,
        Instrument::VoiceOohs,
        Instrument::Trumpet,
        Instrument::Saxophone,
        Instrument::Flute,
        Instrument::SynthLead,
        Instrument::SynthPad,
        Instrument::DrumSet,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Piano => "Piano",
            Instrument::ElectricPiano => "ElectricPiano",
            Instrument::Organ => "Organ",
            Instrument::AcousticGuitar => "AcousticGuitar",
            Instrument::ElectricGuitar => "ElectricGuitar",
            Instrument::ElectricBass => "ElectricBass",
            Instrument::Violin => "Violin",
            Instrument::Cello => "Cello",
            Instrument::Strings => "Strings",
            Instrument::VoiceOohs => "VoiceOohs",
            Instrument::Trumpet => "Trumpet",
            Instrument::Saxophone => "Saxophone",
            Instrument::Flute => "Flute",
            Instrument::SynthLead => "SynthLead",
            Instrument::SynthPad => "SynthPad",
            Instrument::DrumSet => "DrumSet",
        }
    }

    /// General MIDI program (0-based); `None` for percussion.
    pub fn program(self) -> Option<u8> {
        let program = match self {
            Instrument::Piano => 0,
            Instrument::ElectricPiano => 4,
            Instrument::Organ => 19,
            Instrument::AcousticGuitar => 24,
            Instrument::ElectricGuitar => 27,
            Instrument::ElectricBass => 33,
            Instrument::Violin => 40,
            Instrument::Cello => 42,
            Instrument::Strings => 48,
            // Choir Aahs
            Instrument::VoiceOohs => 52,
            Instrument::Trumpet => 56,
            Instrument::Saxophone => 65,
            Instrument::Flute => 73,
            Instrument::SynthLead => 80,
            Instrument::SynthPad => 88,
            Instrument::DrumSet => return None,
        };
        Some(program)
    }

    pub fn is_percussion(self) -> bool {
        self == Instrument::DrumSet
    }

    /// Catalogue lookup ignoring case, spaces, `_` and `-`.
    pub fn lookup(name: &str) -> Option<Instrument> {
        let wanted = normalize(name);
        if matches!(wanted.as_str(), "drums" | "drumkit" | "percussion") {
            return Some(Instrument::DrumSet);
        }
        Instrument::ALL
            .into_iter()
            .find(|i| normalize(i.name()) == wanted)
    }

    /// Like [`Instrument::lookup`], falling back to piano.
    pub fn from_name(name: &str) -> Instrument {
        Instrument::lookup(name).unwrap_or(Instrument::Piano)
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// One requested part.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedInstrument {
    /// Name as the model wrote it; used in prompts and track names
    pub name: String,
    pub instrument: Instrument,
    /// 0-based MIDI channel
    pub channel: u8,
}

impl PlannedInstrument {
    /// `channel` is the 1-based number from the plan; percussion always lands
    /// on the GM drum channel.
    pub fn new(name: &str, channel: i64) -> Self {
        let instrument = Instrument::from_name(name);
        let channel = if instrument.is_percussion() {
            DRUM_CHANNEL
        } else {
            (channel.clamp(1, 16) - 1) as u8
        };
        Self {
            name: name.to_string(),
            instrument,
            channel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentGroup {
    pub name: String,
    pub members: Vec<PlannedInstrument>,
}

/// Ordered instrument groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentPlan {
    pub groups: Vec<InstrumentGroup>,
}

impl Default for InstrumentPlan {
    fn default() -> Self {
        let group = |name: &str, members: &[(&str, i64)]| InstrumentGroup {
            name: name.to_string(),
            members: members
                .iter()
                .map(|(instrument, channel)| PlannedInstrument::new(instrument, *channel))
                .collect(),
        };
        Self {
            groups: vec![
                group("rhythm", &[("DrumSet", 10), ("ElectricBass", 1)]),
                group("harmony", &[("Piano", 2)]),
                group("lead", &[("SynthLead", 3)]),
                group("accompaniment", &[("Violin", 4)]),
                group("backing_vocals", &[("VoiceOohs", 5)]),
            ],
        }
    }
}

impl InstrumentPlan {
    /// Build a plan from the model's JSON object, keeping group order.
    ///
    /// Returns `None` when a required group is missing. Entries that are not
    /// `[name, channel]` pairs are skipped.
    pub fn from_json(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if !REQUIRED_GROUPS.iter().all(|g| map.contains_key(*g)) {
            return None;
        }

        let groups = map
            .iter()
            .map(|(name, entries)| InstrumentGroup {
                name: name.clone(),
                members: entries
                    .as_array()
                    .map(|items| items.iter().filter_map(planned_entry).collect())
                    .unwrap_or_default(),
            })
            .collect();
        Some(Self { groups })
    }

    /// `(group, instrument)` in play order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PlannedInstrument)> {
        self.groups
            .iter()
            .flat_map(|g| g.members.iter().map(move |m| (g.name.as_str(), m)))
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.members.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn planned_entry(entry: &Value) -> Option<PlannedInstrument> {
    let pair = entry.as_array()?;
    let [name, channel] = pair.as_slice() else {
        return None;
    };
    let name = name.as_str().map(str::trim).filter(|n| !n.is_empty())?;
    let channel = match channel {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    Some(PlannedInstrument::new(name, channel))
}

/// Ask the model for an arrangement.
///
/// Falls back to [`InstrumentPlan::default`] on any transport or JSON failure
/// and when a required group is missing.
#[tracing::instrument(skip_all)]
pub async fn determine_instruments(model: &dyn ChatModel, prompt: &str) -> InstrumentPlan {
    let request = ChatRequest {
        system: prompts::INSTRUMENTS_SYSTEM.to_string(),
        user: prompt.to_string(),
        sampling: Sampling::PLANNING,
    };

    let reply = match model.complete(&request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(error = %e, "Error determining instruments");
            return InstrumentPlan::default();
        }
    };

    let value = match parse_json_reply(&reply) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Invalid JSON response for instruments");
            return InstrumentPlan::default();
        }
    };

    InstrumentPlan::from_json(&value).unwrap_or_else(|| {
        tracing::warn!("Missing required instrument groups, using defaults");
        InstrumentPlan::default()
    })
}
