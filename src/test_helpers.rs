use std::path::PathBuf;

use crate::config::{ClassifierConfig, Config};
use crate::filter::DEFAULT_BOILERPLATE;
use crate::sources::{Author, Comment, CommentThread};

/// A fully resolved config pointing at fake endpoints.
pub fn test_config() -> Config {
    Config {
        base_url: "https://dev.azure.com/contoso".to_string(),
        project: "Platform".to_string(),
        repository: "api".to_string(),
        ado_pat: None,
        days_back: 7,
        max_prs: 15,
        chunk_size: 10,
        batch_delay_secs: 0,
        max_concurrent_classifications: 8,
        min_comment_length: 20,
        boilerplate: DEFAULT_BOILERPLATE.iter().map(|s| s.to_string()).collect(),
        output_path: PathBuf::from("important_comments.md"),
        index_path: PathBuf::from("index.html"),
        thread_log_dir: None,
        prompt_dir: None,
        refresh_window_secs: 300,
        refresh_timeout_secs: 120,
        classifier: ClassifierConfig {
            endpoint: "https://example.openai.azure.com".to_string(),
            deployment: "gpt-5-nano".to_string(),
            api_version: "2024-10-21".to_string(),
            api_key_env: "PR_DIGEST_TEST_UNSET_KEY".to_string(),
            temperature: 1.0,
            timeout_secs: 60,
        },
        port: 0,
        hosted: false,
    }
}

pub fn make_comment(id: u64, content: &str) -> Comment {
    Comment {
        id,
        content: Some(content.to_string()),
        author: Author {
            email: Some("dev@contoso.com".to_string()),
            unique_name: None,
        },
        published_date: None,
    }
}

pub fn make_thread(id: u64, comments: Vec<Comment>) -> CommentThread {
    CommentThread { id, comments }
}
