//! Markdown report renderer. Pure function of the pipeline outcome plus a
//! clock, so the output is reproducible in tests.

use chrono::{DateTime, Utc};

use crate::annotate::{Category, Lang};
use crate::pipeline::{AnnotatedItem, RunStats};

const SHOWCASE_MIN: usize = 3;
const SHOWCASE_MAX: usize = 5;
const MEDALS: [&str; SHOWCASE_MAX] = ["🥇", "🥈", "🥉", "4️⃣", "5️⃣"];
const BAR_ROWS: usize = 10;
const BAR_WIDTH: usize = 20;
const CLOUD_TAGS: usize = 20;
const XY_KEYWORDS: usize = 12;
const MAX_TOTAL: u32 = 25;

struct Labels {
    title: &'static str,
    subtitle: &'static str,
    highlights: &'static str,
    must_read: &'static str,
    why: &'static str,
    overview: &'static str,
    table_head: &'static str,
    items_unit: &'static str,
    categories: &'static str,
    keywords: &'static str,
    pie_title: &'static str,
    count_axis: &'static str,
    plain_chart: &'static str,
    tags: &'static str,
    generated: &'static str,
}

const ZH: Labels = Labels {
    title: "AI 博客每日精选",
    subtitle: "个技术博客和社交媒体源，AI 精选 Top",
    highlights: "今日看点",
    must_read: "今日必读",
    why: "为什么值得读",
    overview: "数据概览",
    table_head: "| 扫描源 | 抓取文章 | 时间范围 | 精选 |",
    items_unit: "篇",
    categories: "分类分布",
    keywords: "高频关键词",
    pie_title: "文章分类分布",
    count_axis: "出现次数",
    plain_chart: "📈 纯文本关键词图（终端友好）",
    tags: "话题标签",
    generated: "生成于",
};

const EN: Labels = Labels {
    title: "AI Blog Daily Digest",
    subtitle: "tech blogs and social feeds, AI-picked top",
    highlights: "Today's highlights",
    must_read: "Must read",
    why: "Why read it",
    overview: "Overview",
    table_head: "| Sources | Items | Window | Picked |",
    items_unit: "items",
    categories: "Categories",
    keywords: "Top keywords",
    pie_title: "Articles by category",
    count_axis: "Mentions",
    plain_chart: "📈 Plain-text keyword chart (terminal friendly)",
    tags: "Tags",
    generated: "Generated",
};

fn labels(lang: Lang) -> &'static Labels {
    match lang {
        Lang::Zh => &ZH,
        Lang::En => &EN,
    }
}

/// "12 minutes ago" style age; a plain date once the item is a week old.
pub fn humanize_age(published: DateTime<Utc>, now: DateTime<Utc>, lang: Lang) -> String {
    let age = now.signed_duration_since(published);
    let mins = age.num_minutes().max(0);
    let hours = age.num_hours().max(0);
    let days = age.num_days().max(0);
    match lang {
        Lang::Zh if mins < 60 => format!("{mins} 分钟前"),
        Lang::Zh if hours < 24 => format!("{hours} 小时前"),
        Lang::Zh if days < 7 => format!("{days} 天前"),
        Lang::En if mins < 60 => format!("{mins} minutes ago"),
        Lang::En if hours < 24 => format!("{hours} hours ago"),
        Lang::En if days < 7 => format!("{days} days ago"),
        _ => published.format("%Y-%m-%d").to_string(),
    }
}

/// Lower-cased keyword frequencies, most frequent first; ties keep first-seen order.
pub fn keyword_counts(items: &[AnnotatedItem]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for kw in items.iter().flat_map(|a| a.score.keywords.iter()) {
        let kw = kw.trim().to_lowercase();
        if kw.is_empty() {
            continue;
        }
        match counts.iter_mut().find(|(k, _)| *k == kw) {
            Some((_, n)) => *n += 1,
            None => counts.push((kw, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Items per category, largest group first; ties keep first-seen order.
pub fn category_counts(items: &[AnnotatedItem]) -> Vec<(Category, usize)> {
    let mut counts: Vec<(Category, usize)> = Vec::new();
    for a in items {
        match counts.iter_mut().find(|(c, _)| *c == a.score.category) {
            Some((_, n)) => *n += 1,
            None => counts.push((a.score.category, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Mermaid labels are double-quoted; inner quotes would end them early.
fn mermaid_label(s: &str) -> String {
    s.replace('"', "'")
}

/// Mermaid pie of the category distribution; empty when there are no items.
pub fn category_pie_chart(counts: &[(Category, usize)], lang: Lang) -> String {
    if counts.is_empty() {
        return String::new();
    }
    let mut out = String::from("```mermaid\npie showData\n");
    out.push_str(&format!("    title \"{}\"\n", labels(lang).pie_title));
    for (cat, n) in counts {
        out.push_str(&format!("    \"{} {}\" : {n}\n", cat.emoji(), cat.label()));
    }
    out.push_str("```\n");
    out
}

/// Mermaid horizontal bar chart of the most frequent keywords.
pub fn keyword_xychart(counts: &[(String, usize)], lang: Lang) -> String {
    let rows = &counts[..counts.len().min(XY_KEYWORDS)];
    let Some(max) = rows.first().map(|(_, n)| *n) else {
        return String::new();
    };
    let l = labels(lang);
    let axis = rows
        .iter()
        .map(|(k, _)| format!("\"{}\"", mermaid_label(k)))
        .collect::<Vec<_>>()
        .join(", ");
    let values = rows
        .iter()
        .map(|(_, n)| n.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = String::from("```mermaid\nxychart-beta horizontal\n");
    out.push_str(&format!("    title \"{}\"\n", l.keywords));
    out.push_str(&format!("    x-axis [{axis}]\n"));
    out.push_str(&format!("    y-axis \"{}\" 0 --> {}\n", l.count_axis, max + 2));
    out.push_str(&format!("    bar [{values}]\n"));
    out.push_str("```\n");
    out
}

/// Fixed-width bar chart for terminals; empty when there is nothing to plot.
pub fn ascii_bar_chart(counts: &[(String, usize)]) -> String {
    let rows = &counts[..counts.len().min(BAR_ROWS)];
    let Some(max) = rows.first().map(|(_, n)| *n) else {
        return String::new();
    };
    let label_width = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
    let mut out = String::from("```\n");
    for (label, value) in rows {
        let len = ((*value as f64 / max as f64) * BAR_WIDTH as f64).round() as usize;
        let len = len.clamp(1, BAR_WIDTH);
        let pad = label_width - label.chars().count();
        out.push_str(&format!(
            "{label}{} │ {}{} {value}\n",
            " ".repeat(pad),
            "█".repeat(len),
            "░".repeat(BAR_WIDTH - len)
        ));
    }
    out.push_str("```\n");
    out
}

/// Top tags joined with middle dots; the top three are bold.
pub fn tag_cloud(counts: &[(String, usize)]) -> String {
    counts
        .iter()
        .take(CLOUD_TAGS)
        .enumerate()
        .map(|(i, (word, n))| {
            if i < 3 {
                format!("**{word}**({n})")
            } else {
                format!("{word}({n})")
            }
        })
        .collect::<Vec<_>>()
        .join(" · ")
}

fn push_keywords(out: &mut String, a: &AnnotatedItem) {
    if !a.score.keywords.is_empty() {
        out.push_str(&format!("🏷️ {}\n\n", a.score.keywords.join(", ")));
    }
}

pub fn render(
    items: &[AnnotatedItem],
    highlights: &str,
    stats: &RunStats,
    lang: Lang,
    now: DateTime<Utc>,
) -> String {
    let l = labels(lang);
    let date = now.format("%Y-%m-%d");
    let mut out = String::new();

    out.push_str(&format!("# 📰 {} — {date}\n\n", l.title));
    out.push_str(&format!(
        "> {} {} {}\n\n",
        stats.sources_total,
        l.subtitle,
        items.len()
    ));

    let highlights = highlights.trim();
    if !highlights.is_empty() {
        out.push_str(&format!("## 📝 {}\n\n{highlights}\n\n---\n\n", l.highlights));
    }

    if items.len() >= SHOWCASE_MIN {
        out.push_str(&format!("## 🏆 {}\n\n", l.must_read));
        for (a, medal) in items.iter().zip(MEDALS) {
            let cat = a.score.category;
            out.push_str(&format!("{medal} **{}**\n\n", a.display_title()));
            out.push_str(&format!(
                "[{}]({}) — {} · {} · {} {}\n\n",
                a.item.title,
                a.item.link,
                a.item.source_name,
                humanize_age(a.item.published_at, now, lang),
                cat.emoji(),
                cat.label()
            ));
            out.push_str(&format!("> {}\n\n", a.summary.summary));
            if !a.summary.reason.is_empty() {
                out.push_str(&format!("💡 **{}**: {}\n\n", l.why, a.summary.reason));
            }
            push_keywords(&mut out, a);
        }
        out.push_str("---\n\n");
    }

    out.push_str(&format!("## 📊 {}\n\n", l.overview));
    out.push_str(l.table_head);
    out.push_str("\n|:---:|:---:|:---:|:---:|\n");
    out.push_str(&format!(
        "| {}/{} | {} → {} {unit} | {}h | **{} {unit}** |\n\n",
        stats.sources_ok,
        stats.sources_total,
        stats.items_total,
        stats.items_filtered,
        stats.hours_window,
        items.len(),
        unit = l.items_unit
    ));

    let categories = category_counts(items);
    let pie = category_pie_chart(&categories, lang);
    if !pie.is_empty() {
        out.push_str(&format!("### {}\n\n{pie}\n", l.categories));
    }

    let keywords = keyword_counts(items);
    let xy = keyword_xychart(&keywords, lang);
    if !xy.is_empty() {
        out.push_str(&format!("### {}\n\n{xy}\n", l.keywords));
    }
    let ascii = ascii_bar_chart(&keywords);
    if !ascii.is_empty() {
        out.push_str(&format!(
            "<details>\n<summary>{}</summary>\n\n{ascii}\n</details>\n\n",
            l.plain_chart
        ));
    }
    let cloud = tag_cloud(&keywords);
    if !cloud.is_empty() {
        out.push_str(&format!("### 🏷️ {}\n\n{cloud}\n\n", l.tags));
    }
    out.push_str("---\n\n");

    // category sections follow the distribution order; numbering runs across them
    let mut n = 0;
    for (cat, _) in &categories {
        out.push_str(&format!("## {} {}\n\n", cat.emoji(), cat.label()));
        for a in items.iter().filter(|a| a.score.category == *cat) {
            n += 1;
            out.push_str(&format!("### {n}. {}\n\n", a.display_title()));
            out.push_str(&format!(
                "[{}]({}) — **{}** · {} · ⭐ {}/{MAX_TOTAL}\n\n",
                a.item.title,
                a.item.link,
                a.item.source_name,
                humanize_age(a.item.published_at, now, lang),
                a.total()
            ));
            out.push_str(&format!("> {}\n\n", a.summary.summary));
            push_keywords(&mut out, a);
            out.push_str("---\n\n");
        }
    }

    out.push_str(&format!(
        "*{} {} | {} → {} → {}*\n",
        l.generated,
        now.format("%Y-%m-%d %H:%M UTC"),
        stats.sources_ok,
        stats.items_total,
        items.len()
    ));
    out
}
