//! The seam between the dispatcher and the analysis backend.

use async_trait::async_trait;
use securepilot_core::AnalysisError;

use crate::llm::{ChatMessage, LlmClient, Role};
use crate::prompt;

/// Analyzes one chunk of a file's patch and returns issue descriptions.
///
/// Calls must be independent of each other: the dispatcher runs many at once
/// and retries [`AnalysisError::Unavailable`] failures.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze `content` (a line-aligned slice of `filename`'s patch).
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::Refused`] for permanent rejections and
    /// [`AnalysisError::Unavailable`] for transient backend failures.
    async fn analyze(&self, filename: &str, content: &str) -> Result<Vec<String>, AnalysisError>;

    /// Model or backend name reported in scan statistics.
    fn model(&self) -> &str;
}

/// [`Analyzer`] backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmAnalyzer {
    llm: LlmClient,
}

impl LlmAnalyzer {
    /// Wrap an LLM client.
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(&self, filename: &str, content: &str) -> Result<Vec<String>, AnalysisError> {
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: prompt::build_system_prompt(),
            },
            ChatMessage {
                role: Role::User,
                content: prompt::build_scan_prompt(filename, content),
            },
        ];
        let reply = self.llm.chat(messages).await?;
        prompt::parse_issues_response(&reply)
    }

    fn model(&self) -> &str {
        self.llm.model()
    }
}
