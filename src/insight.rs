use std::sync::LazyLock;

use regex::{Regex, RegexSet};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::classifier::Classifier;
use crate::error::{Error, Result};
use crate::prompts::PromptEngine;
use crate::sources::{Comment, CommentThread};

/// Replies containing any of these carry nothing worth keeping.
pub const NO_CONTENT_SENTINELS: &[&str] = &[
    "No important content",
    "No content to extract",
    "No definition found",
];

/// Field values matching any of these are meta chatter or placeholders.
const NOISE_PATTERNS: &[&str] = &[
    r"(?i)\bvot(e|ed|es|ing)\b",
    r"(?i)refs/",
    r"(?i)\bbranch polic(y|ies)\b",
    r"(?i)\bPR ?Assistant\b",
    r"(?i)\bPR description\b",
    r"(?i)\bAI (feedback|description)\b",
    r"(?i)\bunknown\b",
    r"(?i)^\s*n/?a\.?\s*$",
    r"(?i)\bno additional information\b",
    r"(?i)\bno (content|definition)\b",
];

static NOISE: LazyLock<RegexSet> =
    LazyLock::new(|| RegexSet::new(NOISE_PATTERNS).expect("noise patterns are valid"));

/// A label line: `Label: value`, `**Label:** value` or `**Label**: value`,
/// optionally list-bulleted.
static LABEL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*+]\s+)?(?:\*\*|__)?\s*(category|summary|details)\s*(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(.*)$",
    )
    .expect("label pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Category,
    Summary,
    Details,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "category" => Some(Field::Category),
            "summary" => Some(Field::Summary),
            "details" => Some(Field::Details),
            _ => None,
        }
    }
}

/// Fields parsed from one classifier reply. Missing fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Insight {
    pub category: String,
    pub summary: String,
    pub details: String,
}

impl Insight {
    /// Best-effort parse: each field's value runs from its label line to the
    /// next recognized label line or the end of the reply. The first
    /// occurrence of a label wins.
    pub fn parse(reply: &str) -> Self {
        let mut insight = Insight::default();
        let mut current: Option<(Field, Vec<&str>)> = None;

        for line in reply.lines() {
            if let Some(caps) = LABEL_LINE.captures(line)
                && let Some(field) = Field::from_label(&caps[1])
            {
                if let Some((prev, lines)) = current.take() {
                    insight.fill(prev, &lines);
                }
                let first = caps.get(2).map_or("", |m| m.as_str());
                current = Some((field, vec![first]));
                continue;
            }
            if let Some((_, ref mut lines)) = current {
                lines.push(line);
            }
        }
        if let Some((field, lines)) = current.take() {
            insight.fill(field, &lines);
        }

        insight
    }

    fn fill(&mut self, field: Field, lines: &[&str]) {
        let slot = self.slot_mut(field);
        if slot.is_empty() {
            *slot = clean_value(&lines.join("\n"));
        }
    }

    fn slot_mut(&mut self, field: Field) -> &mut String {
        match field {
            Field::Category => &mut self.category,
            Field::Summary => &mut self.summary,
            Field::Details => &mut self.details,
        }
    }

    fn labeled_fields(&self) -> [(&'static str, &str); 3] {
        [
            ("Category", self.category.as_str()),
            ("Summary", self.summary.as_str()),
            ("Details", self.details.as_str()),
        ]
    }

    /// True when any non-empty field matches the noise denylist.
    pub fn is_noise(&self) -> bool {
        self.labeled_fields()
            .iter()
            .any(|(_, value)| !value.is_empty() && NOISE.is_match(value))
    }

    /// Markdown block for one accepted comment.
    pub fn render(&self, thread_id: u64, comment_id: u64) -> String {
        let mut out = format!("### Thread {thread_id}, Comment {comment_id}\n\n");
        for (label, value) in self.labeled_fields() {
            if !value.is_empty() {
                out.push_str(&format!("**{label}:** {value}\n"));
            }
        }
        out.push('\n');
        out
    }
}

fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_suffix("**")
        .or_else(|| trimmed.strip_suffix("__"))
        .unwrap_or(trimmed);
    trimmed.trim().to_string()
}

/// Parse a reply and apply the post-filter. `None` when the reply carries a
/// no-content sentinel, has no summary, or any field is noise.
pub fn accept(reply: &str) -> Option<Insight> {
    let lower = reply.to_lowercase();
    if NO_CONTENT_SENTINELS
        .iter()
        .any(|s| lower.contains(&s.to_lowercase()))
    {
        return None;
    }
    let insight = Insight::parse(reply);
    if insight.summary.is_empty() || insight.is_noise() {
        return None;
    }
    Some(insight)
}

/// Split comment text into its first non-empty line and the remaining
/// non-empty lines joined with spaces.
pub fn split_comment(content: &str) -> (String, String) {
    let mut lines = content
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty());
    let main = lines.next().unwrap_or_default().to_string();
    let reply = lines.collect::<Vec<_>>().join(" ");
    (main, reply)
}

/// Turns qualifying comments into rendered Markdown fragments.
pub struct InsightExtractor<C> {
    classifier: C,
    prompts: PromptEngine,
    gate: Semaphore,
}

impl<C: Classifier> InsightExtractor<C> {
    /// `max_concurrent` bounds in-flight classifier calls across every
    /// pull request sharing this extractor.
    pub fn new(classifier: C, prompts: PromptEngine, max_concurrent: usize) -> Self {
        Self {
            classifier,
            prompts,
            gate: Semaphore::new(max_concurrent.max(1)),
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Classify one comment. Returns an empty string when the reply is
    /// rejected by the post-filter.
    pub async fn extract(&self, thread: &CommentThread, comment: &Comment) -> Result<String> {
        let (main_comment, reply) = split_comment(comment.text());
        let (system, user) = self.prompts.classification_prompt(&main_comment, &reply)?;

        let answer = {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| Error::Classifier(format!("classifier gate closed: {e}")))?;
            self.classifier.complete(&system, &user).await?
        };

        match accept(&answer) {
            Some(insight) => Ok(insight.render(thread.id, comment.id)),
            None => {
                debug!(
                    thread_id = thread.id,
                    comment_id = comment.id,
                    "classifier reply rejected"
                );
                Ok(String::new())
            }
        }
    }
}
