//! Scoring pass: five 1–5 dimensions, a category and a few keywords per item.
//!
//! Provider output is untrusted. Every numeric field is rounded and clamped to
//! [1, 5] and unknown categories collapse to `other-ai`, on the success path
//! too.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotate::batch::BatchEntry;
use crate::annotate::parse_json_response;

pub const MAX_KEYWORDS: usize = 4;
const NEUTRAL_SCORE: u8 = 3;
const BODY_CHARS_IN_PROMPT: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    ChatTts,
    ImageVideo,
    MusicGenerate,
    AiCoding,
    AiCowork,
    OtherAi,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::ChatTts,
        Category::ImageVideo,
        Category::MusicGenerate,
        Category::AiCoding,
        Category::AiCowork,
        Category::OtherAi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::ChatTts => "chat-tts",
            Category::ImageVideo => "image-video",
            Category::MusicGenerate => "music-generate",
            Category::AiCoding => "ai-coding",
            Category::AiCowork => "ai-cowork",
            Category::OtherAi => "other-ai",
        }
    }

    /// Unknown or missing labels map to `OtherAi`.
    pub fn parse_lenient(s: &str) -> Category {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .unwrap_or(Category::OtherAi)
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::ChatTts => "🗣️",
            Category::ImageVideo => "🎨",
            Category::MusicGenerate => "🎵",
            Category::AiCoding => "💻",
            Category::AiCowork => "📊",
            Category::OtherAi => "🔬",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::ChatTts => "Chat & speech models",
            Category::ImageVideo => "Image & video generation",
            Category::MusicGenerate => "Music generation",
            Category::AiCoding => "AI coding",
            Category::AiCowork => "AI cowork",
            Category::OtherAi => "Other AI",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Category::ChatTts => "LLMs, chat agents, chatbots, TTS, ASR, voice interaction, voice assistants",
            Category::ImageVideo => "text-to-image, image editing, video generation, diffusion, vision models",
            Category::MusicGenerate => "AI music, singing synthesis, melody/arrangement, audio generation",
            Category::AiCoding => "code generation/completion/review, coding assistants, code LLMs",
            Category::AiCowork => "office copilots, document AI, meeting notes, knowledge bases, workflow automation",
            Category::OtherAi => "anything else: foundations, policy, education, other AI tools",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub practicality: u8,
    pub deployability: u8,
    pub technical_value: u8,
    pub timeliness: u8,
    pub non_tech_redundancy: u8,
    pub category: Category,
    pub keywords: Vec<String>,
}

impl Default for ScoreResult {
    /// Neutral placeholder used when a batch cannot be scored.
    fn default() -> Self {
        Self {
            practicality: NEUTRAL_SCORE,
            deployability: NEUTRAL_SCORE,
            technical_value: NEUTRAL_SCORE,
            timeliness: NEUTRAL_SCORE,
            non_tech_redundancy: NEUTRAL_SCORE,
            category: Category::OtherAi,
            keywords: Vec::new(),
        }
    }
}

impl ScoreResult {
    /// Ranking score: plain sum of all five dimensions (5..=25).
    pub fn total(&self) -> u32 {
        [
            self.practicality,
            self.deployability,
            self.technical_value,
            self.timeliness,
            self.non_tech_redundancy,
        ]
        .iter()
        .map(|&v| u32::from(v))
        .sum()
    }
}

/// Round, then clamp into [1, 5]. Numeric strings are accepted; anything else is neutral.
pub fn clamp_score(v: &Value) -> u8 {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(x) if x.is_finite() => x.round().clamp(1.0, 5.0) as u8,
        _ => NEUTRAL_SCORE,
    }
}

pub fn build_scoring_prompt(batch: &[BatchEntry]) -> String {
    let articles = batch
        .iter()
        .map(|a| {
            let body: String = a.body.chars().take(BODY_CHARS_IN_PROMPT).collect();
            format!("Index {}: [{}] {}\n{}", a.index, a.source_name, a.title, body)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let categories = Category::ALL
        .iter()
        .map(|c| format!("- {}: {}", c.as_str(), c.describe()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You curate a daily digest for AI developers.

Score every article below on five dimensions, each an integer from 1 to 5 (5 is best):
- practicality: ready-to-use tools, models, code or recipes (5) vs. pure theory (1)
- deployability: quick to adopt, well documented, low barrier (5) vs. hard to put into practice (1)
- technicalValue: principles, implementation details, benchmarks, pitfalls (5) vs. pure introduction (1)
- timeliness: released or updated in the last 7 days (5) vs. outdated (1)
- nonTechRedundancy: pure technical content (5) vs. mostly business news or gossip (1)

Assign exactly one category:
{categories}

Extract 2-4 short English keywords per article (e.g. "LLM", "TTS", "Stable Diffusion").

## Articles

{articles}

Return strict JSON only, no markdown fences and no other text:
{{
  "results": [
    {{
      "index": 0,
      "practicality": 5,
      "deployability": 4,
      "technicalValue": 5,
      "timeliness": 4,
      "nonTechRedundancy": 5,
      "category": "ai-coding",
      "keywords": ["LLM", "AI Coding"]
    }}
  ]
}}"#
    )
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScore {
    index: usize,
    #[serde(default)]
    practicality: Value,
    #[serde(default)]
    deployability: Value,
    #[serde(default)]
    technical_value: Value,
    #[serde(default)]
    timeliness: Value,
    #[serde(default)]
    non_tech_redundancy: Value,
    #[serde(default)]
    category: Value,
    #[serde(default)]
    keywords: Value,
}

impl From<RawScore> for ScoreResult {
    fn from(r: RawScore) -> Self {
        let keywords = match r.keywords {
            Value::Array(v) => v
                .into_iter()
                .filter_map(|k| k.as_str().map(|s| s.trim().to_string()))
                .filter(|k| !k.is_empty())
                .take(MAX_KEYWORDS)
                .collect(),
            _ => Vec::new(),
        };
        Self {
            practicality: clamp_score(&r.practicality),
            deployability: clamp_score(&r.deployability),
            technical_value: clamp_score(&r.technical_value),
            timeliness: clamp_score(&r.timeliness),
            non_tech_redundancy: clamp_score(&r.non_tech_redundancy),
            category: Category::parse_lenient(r.category.as_str().unwrap_or_default()),
            keywords,
        }
    }
}

/// Decode a scoring response. A broken envelope fails the whole batch; a
/// single malformed result is skipped (its item then gets the default).
pub fn parse_scoring_response(text: &str) -> anyhow::Result<Vec<(usize, ScoreResult)>> {
    let env: Envelope = parse_json_response(text)?;
    Ok(env
        .results
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawScore>(v).ok())
        .map(|r| (r.index, ScoreResult::from(r)))
        .collect())
}

pub fn default_score(_entry: &BatchEntry) -> ScoreResult {
    ScoreResult::default()
}
