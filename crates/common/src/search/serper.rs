//! Serper (Google) search adapter

use super::{http_client, SearchHit, SearchRequest, SearchResponse, SearchTransport};
use crate::config::SearchConfig;
use crate::errors::{CallError, Result};
use crate::retry::AuthChain;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://google.serper.dev/search";

pub struct SerperSearch {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    auth: AuthChain,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerperBody {
    search_parameters: Option<SearchParameters>,
    answer_box: Option<AnswerBox>,
    #[serde(default)]
    organic: Vec<SerperItem>,
}

#[derive(Debug, Deserialize)]
struct SearchParameters {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerBox {
    answer: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    date: Option<String>,
}

impl SerperSearch {
    pub fn new(endpoint: Option<String>, api_key: String, config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(config.timeout_secs))?,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
            auth: AuthChain::new(config.auth_strategies.clone()),
        })
    }
}

/// Site filters become `site:` operators in the query itself
fn query_with_sites(request: &SearchRequest) -> String {
    if request.sites.is_empty() {
        return request.query.clone();
    }
    let sites: Vec<String> = request.sites.iter().map(|s| format!("site:{}", s)).collect();
    format!("{} ({})", request.query, sites.join(" OR "))
}

fn parse_body(body: &str, query: &str) -> std::result::Result<SearchResponse, CallError> {
    let body: SerperBody = serde_json::from_str(body)
        .map_err(|e| CallError::shape(format!("serper response: {}", e)))?;

    let answer = body
        .answer_box
        .and_then(|answer_box| answer_box.answer.or(answer_box.snippet));

    let hits = body
        .organic
        .into_iter()
        .map(|item| SearchHit {
            url: item.link,
            title: item.title,
            snippet: item.snippet,
            date: item.date,
            ..SearchHit::default()
        })
        .collect();

    Ok(SearchResponse {
        query: body
            .search_parameters
            .and_then(|p| p.q)
            .unwrap_or_else(|| query.to_string()),
        answer,
        hits,
    })
}

#[async_trait]
impl SearchTransport for SerperSearch {
    async fn search(&self, request: &SearchRequest) -> std::result::Result<SearchResponse, CallError> {
        let payload = serde_json::json!({
            "q": query_with_sites(request),
            "num": request.count,
        });

        let body = self
            .auth
            .run(|strategy| {
                let builder = self.client.post(&self.endpoint).json(&payload);
                let builder = strategy.apply(builder, &self.api_key);
                async move {
                    let response = builder.send().await?;
                    let status = response.status();
                    let text = response.text().await?;
                    if !status.is_success() {
                        return Err(CallError::from_status(status, &text));
                    }
                    Ok(text)
                }
            })
            .await?;

        parse_body(&body, &request.query)
    }

    fn name(&self) -> &str {
        "serper"
    }
}
