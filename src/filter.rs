/// Substrings marking bot-authored or boilerplate comments.
pub const DEFAULT_BOILERPLATE: &[&str] = &[
    "Ownership Enforcer",
    "Diff coverage",
    "AI feedback",
    "Coverage",
    "PR description",
    "AI description",
    "PRAssistant",
];

/// Decides which raw comments are worth a classifier call.
#[derive(Debug, Clone)]
pub struct CommentFilter {
    min_length: usize,
    boilerplate: Vec<String>,
}

impl Default for CommentFilter {
    fn default() -> Self {
        Self::new(20, DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()))
    }
}

impl CommentFilter {
    pub fn new(min_length: usize, boilerplate: impl IntoIterator<Item = String>) -> Self {
        Self {
            min_length,
            boilerplate: boilerplate
                .into_iter()
                .map(|s| s.to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    /// True iff the text is longer than the minimum length (in characters)
    /// and contains none of the boilerplate markers, ignoring case.
    pub fn should_process(&self, text: &str) -> bool {
        if text.trim().is_empty() || text.chars().count() <= self.min_length {
            return false;
        }
        let lower = text.to_lowercase();
        !self.boilerplate.iter().any(|b| lower.contains(b.as_str()))
    }
}
