//! Highlights: one unbatched call that turns the top items into a short
//! "what happened today" paragraph. Failure yields an empty string.

use tracing::warn;

use crate::annotate::{Annotator, Lang};
use crate::pipeline::AnnotatedItem;

const MAX_ITEMS: usize = 10;
const SUMMARY_CHARS: usize = 100;

pub fn build_highlights_prompt(items: &[AnnotatedItem], lang: Lang) -> String {
    let list = items
        .iter()
        .take(MAX_ITEMS)
        .enumerate()
        .map(|(i, a)| {
            let summary: String = a.summary.summary.chars().take(SUMMARY_CHARS).collect();
            format!(
                "{}. [{}] {} - {}",
                i + 1,
                a.score.category.as_str(),
                a.display_title(),
                summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let lang_note = match lang {
        Lang::Zh => "Answer in Simplified Chinese.",
        Lang::En => "Write in English.",
    };

    format!(
        "Based on today's selected technical articles below, write a 3-5 sentence \"today's highlights\" paragraph.\n\
         - Distill the 2-3 main trends or topics of the day\n\
         - Do not list the articles one by one; generalize\n\
         - Crisp, like a news lede\n\
         {lang_note}\n\n\
         Articles:\n{list}\n\n\
         Return plain text only, no JSON and no markdown."
    )
}

pub async fn generate_highlights(
    items: &[AnnotatedItem],
    annotator: &dyn Annotator,
    lang: Lang,
) -> String {
    if items.is_empty() {
        return String::new();
    }
    match annotator.call(&build_highlights_prompt(items, lang)).await {
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(target: "digest", error = %e, "highlights generation failed");
            String::new()
        }
    }
}
