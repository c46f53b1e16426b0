//! 聊天上下文构建
//!
//! - 从用户消息中提取来源提示（作者 / 文档类型 / 主题）
//! - 把检索结果按来源、章节整理成提示词上下文
//! - 生成按年级定制的系统提示词

use std::sync::LazyLock;

use regex::Regex;

use crate::services::search_service::{SearchHit, SourceFilters};

const TRUNCATION_MARKER: &str = "...\n\n[Context truncated for length]";

static AUTHOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)according to (\w+)'s",
        r"(?i)from (\w+)'s",
        r"(?i)by professor (\w+)",
        r"(?i)prof\.? (\w+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static TYPE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)(notes?|slides?|lecture|document|paper) on").ok());

static TOPIC_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)on ([^,.]+?)(?:,|\.|define|explain|describe|what|how)").ok()
});

/// 从消息中提取来源提示
pub fn extract_source_filters(message: &str) -> SourceFilters {
    let author = AUTHOR_PATTERNS
        .iter()
        .find_map(|re| re.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    let doc_type = TYPE_PATTERN
        .as_ref()
        .and_then(|re| re.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase());

    let topic = TOPIC_PATTERN
        .as_ref()
        .and_then(|re| re.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    SourceFilters {
        author,
        doc_type,
        topic,
    }
}

/// 整理好的聊天上下文
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatContext {
    pub text: String,
    pub sources: Vec<String>,
    pub topics: Vec<String>,
    pub document_types: Vec<String>,
}

impl ChatContext {
    pub fn has_content(&self) -> bool {
        !self.sources.is_empty()
    }
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// 按来源分组构建上下文
///
/// 没有 `source` 的分块不进入上下文
pub fn build_context(hits: &[SearchHit]) -> ChatContext {
    let mut groups: Vec<(String, Vec<&SearchHit>)> = Vec::new();
    let mut context = ChatContext::default();

    for hit in hits {
        let Some(source) = hit.field("source") else {
            continue;
        };
        match groups.iter_mut().find(|(s, _)| s == source) {
            Some((_, members)) => members.push(hit),
            None => groups.push((source.to_string(), vec![hit])),
        }

        if let Some(topic) = hit.field("topic") {
            push_distinct(&mut context.topics, topic);
        }
        if let Some(doc_type) = hit.field("type") {
            push_distinct(&mut context.document_types, doc_type);
        }
    }

    let mut parts = Vec::with_capacity(groups.len());
    for (source, members) in &groups {
        parts.push(render_source(source, members));
        context.sources.push(source.clone());
    }

    context.text = parts.join("\n\n---\n\n");
    context
}

fn render_source(source: &str, members: &[&SearchHit]) -> String {
    let head = members[0];
    let mut block = format!("Source: {}", source);
    if let Some(title) = head.field("title") {
        block.push_str(&format!(" ({})", title));
    }
    if let Some(author) = head.field("author") {
        block.push_str(&format!(" by {}", author));
    }
    if let Some(date) = head.field("date") {
        block.push_str(&format!(" - {}", date));
    }
    if let Some(doc_type) = head.field("type") {
        block.push_str(&format!(" [{}]", doc_type));
    }
    block.push('\n');

    let mut sections: Vec<(&str, Vec<&str>)> = Vec::new();
    for hit in members {
        let section = hit.field("section").unwrap_or("main");
        let text = hit.chunk_text.trim();
        match sections.iter_mut().find(|(s, _)| *s == section) {
            Some((_, texts)) => texts.push(text),
            None => sections.push((section, vec![text])),
        }
    }

    for (section, texts) in sections {
        if section != "main" {
            block.push_str(&format!("\nSection: {}\n", section));
        }
        block.push_str(&texts.join("\n\n"));
    }

    block
}

/// 按字符截断上下文，超长时追加截断标记
pub fn truncate_context(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

fn join_or_various(items: &[String]) -> String {
    if items.is_empty() {
        "various".to_string()
    } else {
        items.join(", ")
    }
}

/// 生成系统提示词
pub fn system_prompt(user_level: Option<&str>, context: &ChatContext) -> String {
    let level = user_level.filter(|l| !l.trim().is_empty()).unwrap_or("unspecified");

    let mut prompt = format!(
        "You are an advanced academic assistant with access to a curated database of course materials and documents. \
The user is at the {level} academic level. Tailor your explanations, examples, and language to be appropriate for this level.\
Please format your responses using clear visual hierarchy by employing bold, numbered lists, subheadings, and bullet points. \
Use line breaks between sections and concepts to reduce visual clutter. Do not use different text sizes or heading tags (like h1/h2); \
keep all text the same size and rely on formatting and spacing for structure.\
Cite sources only if they are provided. If no source is available, do not use [Source] or \"Unknown source\" in your response.\
IMPORTANT: For every chemical formula, ion, mathematical equation, calculation, or symbol (even inline), ALWAYS wrap it in LaTeX math delimiters: \
use $...$ for inline and $$...$$ for block. Do not use plain text for any formulas or symbols. \
For example: $H_3O^+$, $OH^-$, $x^2 + y^2 = r^2$, $$2H_2O(l) \\rightleftharpoons H_3O^+(aq) + OH^-(aq)$$. \
Repeat: EVERY formula, symbol, or equation must be wrapped in math delimiters."
    );

    if context.has_content() {
        prompt.push_str(&format!(
            "\n\nI found relevant information in the database for this query across {} sources, covering {} topics from {} document types.\n\n{}\n\n\
IMPORTANT: Provide comprehensive explanations that combine document information with broader academic context. \
Use clear paragraph structure, cite sources as \"According to [Source]...\", and end with a brief summary. \
For math, use LaTeX notation ($$...$$ for display, \\(...\\) for inline).",
            context.sources.len(),
            join_or_various(&context.topics),
            join_or_various(&context.document_types),
            context.text
        ));
    } else {
        prompt.push_str(
            "\n\nI don't have any relevant documents in the database for this query. \
I can answer based on my general academic knowledge, suggest uploading relevant documents, or help rephrase the query.",
        );
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::search_service::{ChunkContext, CourseInfo, HitMetadata};
    use serde_json::json;

    fn hit(text: &str, metadata: serde_json::Value) -> SearchHit {
        SearchHit {
            chunk_text: text.to_string(),
            metadata: HitMetadata {
                fields: serde_json::from_value(metadata).unwrap(),
                relevance_score: Some(0.9),
                context: ChunkContext {
                    section: "main".to_string(),
                    topic_area: "general".to_string(),
                    document_type: "unknown".to_string(),
                    course_info: CourseInfo {
                        code: None,
                        title: None,
                    },
                    professor: None,
                    date: None,
                    related_concepts: Vec::new(),
                },
            },
        }
    }

    #[test]
    fn test_extract_author_type_and_topic() {
        let filters =
            extract_source_filters("According to Odumosu's notes on buffer solutions, explain pH");
        assert_eq!(filters.author.as_deref(), Some("Odumosu"));
        assert_eq!(filters.doc_type.as_deref(), Some("notes"));
        assert_eq!(filters.topic.as_deref(), Some("buffer solutions"));
    }

    #[test]
    fn test_extract_prof_abbreviation() {
        let filters = extract_source_filters("What did Prof. Adeyemi say");
        assert_eq!(filters.author.as_deref(), Some("Adeyemi"));
        assert!(filters.doc_type.is_none());
        assert!(filters.topic.is_none());
    }

    #[test]
    fn test_build_context_groups_by_source_and_section() {
        let hits = vec![
            hit(" First chunk ", json!({"source": "Odumosu's notes", "author": "Odumosu", "type": "notes", "topic": "Buffers"})),
            hit("Skipped", json!({"topic": "Ignored"})),
            hit("Second chunk", json!({"source": "Adeyemi's notes"})),
            hit("Third chunk", json!({"source": "Odumosu's notes", "section": "Henderson"})),
        ];

        let context = build_context(&hits);
        assert_eq!(context.sources, vec!["Odumosu's notes", "Adeyemi's notes"]);
        assert_eq!(context.topics, vec!["Buffers"]);
        assert_eq!(context.document_types, vec!["notes"]);
        assert_eq!(
            context.text,
            "Source: Odumosu's notes by Odumosu [notes]\nFirst chunk\nSection: Henderson\nThird chunk\
\n\n---\n\nSource: Adeyemi's notes\nSecond chunk"
        );
    }

    #[test]
    fn test_truncate_context_is_char_safe() {
        let text = "é".repeat(10);
        let truncated = truncate_context(&text, 4);
        assert_eq!(truncated, format!("éééé{}", TRUNCATION_MARKER));
        assert_eq!(truncate_context("short", 2000), "short");
    }

    #[test]
    fn test_system_prompt_mentions_level_and_context() {
        let empty = system_prompt(None, &ChatContext::default());
        assert!(empty.contains("unspecified academic level"));
        assert!(empty.contains("I don't have any relevant documents"));

        let context = ChatContext {
            text: "Source: X\nbody".to_string(),
            sources: vec!["X".to_string()],
            topics: Vec::new(),
            document_types: vec!["notes".to_string()],
        };
        let prompt = system_prompt(Some("300"), &context);
        assert!(prompt.contains("300 academic level"));
        assert!(prompt.contains("across 1 sources, covering various topics from notes document types"));
        assert!(prompt.contains("Source: X\nbody"));
    }
}
