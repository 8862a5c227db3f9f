//! Snippet extension
//!
//! Search snippets are short and often cut mid-sentence. For records that
//! only carry a snippet, fetch the source page (or use the body the search
//! provider already returned), find the snippet in the page text and keep a
//! longer window starting at the snippet. Any failure along the way leaves
//! the record untouched.

use crate::config::EvidenceConfig;
use crate::errors::CallError;
use crate::metrics;
use crate::models::{ClaimEvidence, EvidenceOrigin, EvidenceRecord};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scraper::{Html, Node};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Characters dropped from the snippet end when the full snippet is not
/// found verbatim. Providers commonly end snippets with an ellipsis.
const SNIPPET_TAIL_TOLERANCE: usize = 10;

/// Source of page bodies for snippet extension
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the raw page (HTML) at `url`
    async fn fetch(&self, url: &str) -> Result<String, CallError>;
}

/// HTTP page fetcher
pub struct ReqwestPageFetcher {
    client: reqwest::Client,
}

impl ReqwestPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, CallError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("claimcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CallError::fatal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for ReqwestPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, CallError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(CallError::from_status(response.status(), url));
        }

        // Redirects can land on a PDF even when the link did not look like one
        let is_pdf = response.url().as_str().contains(".pdf")
            || response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("application/pdf"));
        if is_pdf {
            return Err(CallError::fatal(format!("{} is a PDF", url)));
        }

        Ok(response.text().await?)
    }
}

/// Plain text of an HTML document, script and style contents excluded
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut text = String::with_capacity(html.len() / 2);

    for node in document.root_element().descendants() {
        if let Node::Text(fragment) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript"))
            });
            if !hidden {
                text.push_str(fragment);
            }
        }
    }

    text
}

/// Replace `snippet` with a window of `page_text` around it.
///
/// The window starts `pre` chars before the snippet and ends `post` chars
/// after it (clipped to the page), followed by `marker`. Returns `None` when
/// the snippet cannot be located.
pub fn extend_snippet(
    page_text: &str,
    snippet: &str,
    pre: usize,
    post: usize,
    marker: &str,
) -> Option<String> {
    if snippet.is_empty() {
        return None;
    }

    let byte_pos = page_text.find(snippet).or_else(|| {
        let len = snippet.chars().count();
        if len <= SNIPPET_TAIL_TOLERANCE {
            return None;
        }
        let head: String = snippet.chars().take(len - SNIPPET_TAIL_TOLERANCE).collect();
        page_text.find(&head)
    })?;

    let snippet_start = page_text[..byte_pos].chars().count();
    let start = snippet_start.saturating_sub(pre);
    let end = snippet_start + snippet.chars().count() + post;

    let mut window: String = page_text.chars().skip(start).take(end - start).collect();
    window.push_str(marker);
    Some(window)
}

fn is_pdf_url(url: &str) -> bool {
    url.contains(".pdf")
}

/// Record selected for extension
struct Target {
    claim_idx: usize,
    record_idx: usize,
    url: String,
    snippet: String,
    page_text: Option<String>,
}

enum Page {
    Text(String),
    Html(String),
}

fn clear_page_texts(evidence: &mut ClaimEvidence) {
    for record in evidence.values_mut().flat_map(|records| records.iter_mut()) {
        record.page_text = None;
    }
}

/// Second concurrent stage over aggregated evidence
pub struct SnippetExtender {
    fetcher: Arc<dyn PageFetcher>,
    config: EvidenceConfig,
}

impl SnippetExtender {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: EvidenceConfig) -> Self {
        Self { fetcher, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.snippet_extend
    }

    /// Extend every snippet-only record in place; returns how many changed
    #[instrument(skip(self, evidence), fields(claims = evidence.len()))]
    pub async fn extend(&self, evidence: &mut ClaimEvidence) -> usize {
        if !self.config.snippet_extend {
            clear_page_texts(evidence);
            return 0;
        }

        let targets: Vec<Target> = evidence
            .values_mut()
            .enumerate()
            .flat_map(|(claim_idx, records)| {
                records
                    .iter_mut()
                    .enumerate()
                    .filter_map(move |(record_idx, r)| {
                        let page_text = r.page_text.take();
                        (r.needs_extension() && !is_pdf_url(&r.url)).then(|| Target {
                            claim_idx,
                            record_idx,
                            url: r.url.clone(),
                            snippet: r.text.clone(),
                            page_text,
                        })
                    })
            })
            .collect();

        if targets.is_empty() {
            return 0;
        }

        let concurrency = self.config.effective_concurrency();
        debug!(targets = targets.len(), concurrency, "Extending snippets");

        let extended: Vec<(usize, usize, Option<String>)> = stream::iter(targets)
            .map(|target| async move {
                let text = self.extend_one(&target.url, target.snippet, target.page_text).await;
                (target.claim_idx, target.record_idx, text)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut count = 0;
        let mut claims: Vec<&mut Vec<EvidenceRecord>> = evidence.values_mut().collect();
        for (claim_idx, record_idx, text) in extended {
            if let Some(text) = text {
                let record = &mut claims[claim_idx][record_idx];
                record.text = super::normalize_newlines(&text);
                record.origin = EvidenceOrigin::Extended;
                count += 1;
            }
        }

        metrics::record_extended_snippets(count);
        info!(extended = count, "Snippet extension complete");
        count
    }

    async fn extend_one(&self, url: &str, snippet: String, page_text: Option<String>) -> Option<String> {
        let page = match page_text {
            Some(text) => Page::Text(text),
            None => match self.fetcher.fetch(url).await {
                Ok(html) => Page::Html(html),
                Err(e) => {
                    debug!(url, error = %e, "Page fetch failed, keeping snippet");
                    return None;
                }
            },
        };

        let pre = self.config.pre_context_chars;
        let post = self.config.post_context_chars;
        let marker = self.config.truncation_marker.clone();

        // HTML parsing is CPU-bound; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let text = match page {
                Page::Text(text) => text,
                Page::Html(html) => html_to_text(&html),
            };
            extend_snippet(&text, &snippet, pre, post, &marker)
        })
        .await
        .ok()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<String, CallError> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| CallError::transient("connection refused"))
        }
    }

    #[test]
    fn test_window_runs_from_snippet_to_post_context() {
        let page = format!("{}{}{}", "x".repeat(40), "the snippet", "y".repeat(600));
        let out = extend_snippet(&page, "the snippet", 0, 500, " ...").unwrap();

        assert!(out.starts_with("the snippet"));
        assert!(out.ends_with(" ..."));
        assert_eq!(out.chars().count(), "the snippet".len() + 500 + 4);
    }

    #[test]
    fn test_window_clipped_at_page_end() {
        let page = "intro the snippet tail";
        let out = extend_snippet(page, "the snippet", 0, 500, " ...").unwrap();
        assert_eq!(out, "the snippet tail ...");
    }

    #[test]
    fn test_pre_context() {
        let page = "0123456789the snippet";
        let out = extend_snippet(page, "the snippet", 4, 0, "").unwrap();
        assert_eq!(out, "6789the snippet");
    }

    #[test]
    fn test_truncated_snippet_still_found() {
        let page = "Paris is the capital and largest city of France, with an estimated population.";
        let snippet = "Paris is the capital and largest city of Fr ...";
        let out = extend_snippet(page, snippet, 0, 5, "").unwrap();
        assert!(out.starts_with("Paris is the capital"));
    }

    #[test]
    fn test_absent_snippet() {
        assert!(extend_snippet("unrelated text", "the snippet", 0, 500, " ...").is_none());
        assert!(extend_snippet("short", "abc", 0, 500, " ...").is_none());
    }

    #[test]
    fn test_multibyte_offsets() {
        let page = "巴黎是法国的首都。巴黎也是最大的城市。";
        let out = extend_snippet(page, "法国的首都", 0, 3, "…").unwrap();
        assert_eq!(out, "法国的首都。巴黎…");
    }

    #[test]
    fn test_html_to_text_skips_scripts() {
        let html = "<html><head><style>p{}</style><script>var x=1;</script></head>\
                    <body><p>Paris is the capital</p><p> of France.</p></body></html>";
        let text = html_to_text(html);
        assert_eq!(text, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn test_extender_replaces_only_found_snippets() {
        let mut pages = HashMap::new();
        pages.insert(
            "https://a.example/paris".to_string(),
            "<p>Intro. Paris is the capital of France. More context follows here.</p>".to_string(),
        );
        let config = EvidenceConfig {
            post_context_chars: 10,
            extend_concurrency: 2,
            ..EvidenceConfig::default()
        };
        let extender = SnippetExtender::new(Arc::new(FakeFetcher { pages }), config);

        let mut evidence = ClaimEvidence::new();
        evidence.insert(
            "claim",
            vec![
                EvidenceRecord::snippet("Paris is the capital of France.", "https://a.example/paris"),
                EvidenceRecord::snippet("unreachable", "https://b.example/"),
                EvidenceRecord::snippet("a report", "https://c.example/report.pdf"),
                EvidenceRecord {
                    origin: EvidenceOrigin::MainText,
                    ..EvidenceRecord::snippet("long body", "https://a.example/paris")
                },
            ],
        );

        let count = extender.extend(&mut evidence).await;
        assert_eq!(count, 1);

        let records = evidence.get("claim").unwrap();
        assert_eq!(records[0].text, "Paris is the capital of France. More cont ...");
        assert_eq!(records[0].origin, EvidenceOrigin::Extended);
        assert_eq!(records[0].url, "https://a.example/paris");
        assert_eq!(records[1].text, "unreachable");
        assert_eq!(records[2].text, "a report");
        assert_eq!(records[3].text, "long body");
    }

    #[tokio::test]
    async fn test_disabled_extender_is_noop() {
        let config = EvidenceConfig {
            snippet_extend: false,
            ..EvidenceConfig::default()
        };
        let extender = SnippetExtender::new(
            Arc::new(FakeFetcher {
                pages: HashMap::new(),
            }),
            config,
        );
        let mut evidence = ClaimEvidence::new();
        evidence.insert("claim", vec![EvidenceRecord::snippet("s", "https://x")]);
        assert_eq!(extender.extend(&mut evidence).await, 0);
    }

    #[tokio::test]
    async fn test_provider_body_used_without_fetching() {
        let config = EvidenceConfig {
            post_context_chars: 9,
            ..EvidenceConfig::default()
        };
        // Any fetch would fail, so extension must come from the supplied body
        let extender = SnippetExtender::new(
            Arc::new(FakeFetcher {
                pages: HashMap::new(),
            }),
            config,
        );

        let mut evidence = ClaimEvidence::new();
        evidence.insert(
            "claim",
            vec![EvidenceRecord {
                page_text: Some("Intro. Lyon lies on the Rhone river in France.".to_string()),
                ..EvidenceRecord::snippet("Lyon lies on the Rhone", "https://lyon.example/")
            }],
        );

        assert_eq!(extender.extend(&mut evidence).await, 1);
        let record = &evidence.get("claim").unwrap()[0];
        assert_eq!(record.text, "Lyon lies on the Rhone river in ...");
        assert_eq!(record.origin, EvidenceOrigin::Extended);
        assert_eq!(record.page_text, None);
    }
}
