use serde::{Deserialize, Serialize};

/// Where an evidence record's text came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceOrigin {
    /// Short search-engine snippet; eligible for extension
    #[default]
    Snippet,
    /// Long-form summary or page body supplied by the provider
    MainText,
    /// Direct answer box returned for the query
    AnswerBox,
    /// Snippet replaced with surrounding page context
    Extended,
}

/// One piece of retrieved evidence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceRecord {
    pub text: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub origin: EvidenceOrigin,
    /// Full page body supplied by the search provider, used for snippet
    /// extension in place of fetching the page
    #[serde(skip)]
    pub page_text: Option<String>,
}

impl EvidenceRecord {
    pub fn snippet(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: url.into(),
            date: None,
            origin: EvidenceOrigin::Snippet,
            page_text: None,
        }
    }

    /// Whether snippet extension should try to fetch more context
    pub fn needs_extension(&self) -> bool {
        self.origin == EvidenceOrigin::Snippet && !self.url.is_empty()
    }
}
