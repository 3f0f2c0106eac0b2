use serde::Serialize;

/// A built-in writing type with its default criteria, as offered by the browser client.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WritingPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub criteria: &'static [&'static str],
}

pub static PRESETS: [WritingPreset; 4] = [
    WritingPreset {
        key: "general",
        name: "General Writing",
        criteria: &["grammar", "clarity", "structure", "style", "engagement"],
    },
    WritingPreset {
        key: "academic",
        name: "Academic Writing",
        criteria: &[
            "grammar",
            "clarity",
            "structure",
            "argumentation",
            "citations",
            "formality",
        ],
    },
    WritingPreset {
        key: "business",
        name: "Business Writing",
        criteria: &[
            "grammar",
            "clarity",
            "conciseness",
            "professionalism",
            "actionability",
        ],
    },
    WritingPreset {
        key: "creative",
        name: "Creative Writing",
        criteria: &[
            "grammar",
            "creativity",
            "voice",
            "imagery",
            "narrative_flow",
            "engagement",
        ],
    },
];

pub fn find_preset(key: &str) -> Option<&'static WritingPreset> {
    PRESETS.iter().find(|p| p.key.eq_ignore_ascii_case(key))
}
