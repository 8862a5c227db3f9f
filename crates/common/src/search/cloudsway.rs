//! Cloudsway full-text search adapter

use super::{http_client, SearchHit, SearchRequest, SearchResponse, SearchTransport};
use crate::config::SearchConfig;
use crate::errors::{CallError, Result};
use crate::retry::AuthChain;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct CloudswaySearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    auth: AuthChain,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudswayBody {
    query_context: Option<QueryContext>,
    query: Option<String>,
    web_pages: Option<WebPages>,
    results: Option<Vec<CloudswayPage>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryContext {
    original_query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<CloudswayPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudswayPage {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    snippet: String,
    main_text: Option<String>,
    content: Option<String>,
    score: Option<f64>,
    date_published: Option<String>,
}

impl CloudswaySearch {
    pub fn new(endpoint: String, api_key: String, config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            endpoint,
            api_key,
            auth: AuthChain::new(config.auth_strategies.clone()),
        })
    }

    fn params(request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("q", request.query.clone()),
            ("count", request.count.to_string()),
            ("mainText", "True".to_string()),
        ];
        if !request.sites.is_empty() {
            params.push(("sites", request.sites.join(",")));
        }
        params
    }
}

/// Map a Cloudsway body (`webPages.value` or `results` layout)
fn parse_body(body: &str, query: &str) -> std::result::Result<SearchResponse, CallError> {
    let body: CloudswayBody = serde_json::from_str(body)
        .map_err(|e| CallError::shape(format!("cloudsway response: {}", e)))?;

    let echoed = body
        .query_context
        .and_then(|c| c.original_query)
        .or(body.query)
        .unwrap_or_else(|| query.to_string());

    let pages = match (body.web_pages, body.results) {
        (Some(web_pages), _) => web_pages.value,
        (None, Some(results)) => results,
        (None, None) => Vec::new(),
    };

    let hits = pages
        .into_iter()
        .map(|page| SearchHit {
            url: page.url,
            title: page.name,
            snippet: page.snippet,
            main_text: page.main_text.filter(|t| !t.is_empty()),
            raw_content: page.content.filter(|t| !t.is_empty()),
            score: page.score,
            date: page.date_published,
        })
        .collect();

    Ok(SearchResponse {
        query: echoed,
        answer: None,
        hits,
    })
}

#[async_trait]
impl SearchTransport for CloudswaySearch {
    async fn search(&self, request: &SearchRequest) -> std::result::Result<SearchResponse, CallError> {
        let params = Self::params(request);

        let body = self
            .auth
            .run(|strategy| {
                let builder = self.client.get(&self.endpoint).query(&params);
                let builder = strategy.apply(builder, &self.api_key);
                async move {
                    let response = builder.send().await?;
                    let status = response.status();
                    let request_id = response
                        .headers()
                        .get("x-ws-request-id")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let text = response.text().await?;
                    if !status.is_success() {
                        return Err(CallError::from_status(status, &text));
                    }
                    debug!(request_id = ?request_id, "Cloudsway search completed");
                    Ok(text)
                }
            })
            .await?;

        let response = parse_body(&body, &request.query)?;
        if response.query != request.query {
            debug!(sent = %request.query, echoed = %response.query, "Provider rewrote query");
        }
        Ok(response)
    }

    fn name(&self) -> &str {
        "cloudsway"
    }
}
