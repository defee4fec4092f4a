//! Scan requests as submitted by a caller: a target URL plus optional
//! free-text instructions saying which checks to run.

use pagehound_scanner::DetectorConfig;
use serde::{Deserialize, Serialize};

const IMAGE_WORDS: &[&str] = &[
    "image", "images", "img", "imgs", "picture", "pictures", "photo", "photos",
];

const BUTTON_WORDS: &[&str] = &[
    "button",
    "buttons",
    "control",
    "controls",
    "click",
    "clicks",
    "clickable",
];

const NEGATIONS: &[&str] = &[
    "no", "not", "skip", "without", "ignore", "exclude", "except", "don't", "dont",
];

/// How many words before a mention a negation still applies to.
const NEGATION_REACH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub target_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl ScanRequest {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            instructions: None,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn detector_config(&self) -> DetectorConfig {
        interpret_instructions(self.instructions.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct Mentions {
    wanted: bool,
    refused: bool,
}

fn mentions(words: &[String], vocabulary: &[&str]) -> Mentions {
    let mut found = Mentions::default();
    for (i, word) in words.iter().enumerate() {
        if !vocabulary.contains(&word.as_str()) {
            continue;
        }
        let negated = words[i.saturating_sub(NEGATION_REACH)..i]
            .iter()
            .any(|w| NEGATIONS.contains(&w.as_str()));
        if negated {
            found.refused = true;
        } else {
            found.wanted = true;
        }
    }
    found
}

/// Turn free-text instructions into a detector selection.
///
/// Naming images or buttons restricts the scan to what was named; negating
/// one ("skip images", "no buttons") turns just that one off. Anything else,
/// including empty text, runs both.
pub fn interpret_instructions(text: &str) -> DetectorConfig {
    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    let images = mentions(&words, IMAGE_WORDS);
    let buttons = mentions(&words, BUTTON_WORDS);

    if images.wanted || buttons.wanted {
        DetectorConfig {
            check_images: images.wanted && !images.refused,
            check_buttons: buttons.wanted && !buttons.refused,
        }
    } else {
        DetectorConfig {
            check_images: !images.refused,
            check_buttons: !buttons.refused,
        }
    }
}
