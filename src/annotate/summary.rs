//! Summary pass: translated title, a short structured summary and a one-line
//! reason to read, for the top-N items.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotate::batch::BatchEntry;
use crate::annotate::{parse_json_response, Lang};

const BODY_CHARS_IN_PROMPT: usize = 800;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SummaryResult {
    pub translated_title: String,
    pub summary: String,
    pub reason: String,
}

pub fn build_summary_prompt(batch: &[BatchEntry], lang: Lang) -> String {
    let articles = batch
        .iter()
        .map(|a| {
            let body: String = a.body.chars().take(BODY_CHARS_IN_PROMPT).collect();
            format!(
                "Index {}: [{}] {}\nURL: {}\n{}",
                a.index, a.source_name, a.title, a.link, body
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");
    let lang_instruction = lang.instruction();

    format!(
        r#"You summarize technical articles. For each article below produce:

1. titleZh: a natural translation of the title (keep it unchanged if it is already in the target language).
2. summary: 4-6 sentences so a reader understands the article without opening it:
   - the core problem or topic (1 sentence)
   - key arguments, technical approach or findings (2-3 sentences)
   - the conclusion or the author's main point (1 sentence)
3. reason: one sentence on why it is worth reading (the summary says what, the reason says why).

{lang_instruction}

Summary rules:
- Get to the point; never open with "This article discusses...".
- Keep concrete technical terms, numbers, versions and names.
- When the article compares options, name them and the verdict.

## Articles

{articles}

Return strict JSON only:
{{
  "results": [
    {{
      "index": 0,
      "titleZh": "translated title",
      "summary": "summary...",
      "reason": "why it is worth reading..."
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
struct RawSummary {
    index: usize,
    #[serde(default)]
    title_zh: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Decode a summary response. Blank translated titles are left empty here and
/// resolved against the original title by the pipeline.
pub fn parse_summary_response(text: &str) -> anyhow::Result<Vec<(usize, SummaryResult)>> {
    let env: Envelope = parse_json_response(text)?;
    Ok(env
        .results
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawSummary>(v).ok())
        .map(|r| {
            (
                r.index,
                SummaryResult {
                    translated_title: r.title_zh.unwrap_or_default().trim().to_string(),
                    summary: r.summary.unwrap_or_default().trim().to_string(),
                    reason: r.reason.unwrap_or_default().trim().to_string(),
                },
            )
        })
        .collect())
}

/// Placeholder when a summary batch fails: the title stands in for everything.
pub fn default_summary(entry: &BatchEntry) -> SummaryResult {
    SummaryResult {
        translated_title: entry.title.clone(),
        summary: entry.title.clone(),
        reason: String::new(),
    }
}
