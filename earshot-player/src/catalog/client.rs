//! HTTP client for the search and directory services

use crate::error::{Error, Result};
use earshot_common::models::{DirectoryEpisode, SearchHit};
use earshot_common::session::{SessionContext, SESSION_HEADER};
use serde::Serialize;
use serde_json::Value;

/// Number of hits requested when the config does not say otherwise
pub const DEFAULT_TOP_K: usize = 20;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    top_k: usize,
}

/// Search and directory client
///
/// Every search carries the session id header so the service can group
/// queries from one listening session.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    top_k: usize,
    session: SessionContext,
}

impl CatalogClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        top_k: usize,
        session: SessionContext,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            top_k: top_k.max(1),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Run a question search, returning hits ordered as the service ranked them
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::BadRequest("Search query must not be empty".to_string()));
        }

        let url = format!("{}/search", self.base_url);
        tracing::debug!(url = %url, query = %query, top_k = self.top_k, "Querying search service");

        let response = self
            .http
            .post(&url)
            .header(SESSION_HEADER, self.session.session_id())
            .json(&SearchRequest {
                query,
                top_k: self.top_k,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::CatalogResponse(format!(
                "search returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: Value = response.json().await?;
        let hits = parse_search_response(body)?;

        tracing::info!(query = %query, hits = hits.len(), "Search completed");
        Ok(hits)
    }

    /// List the episodes of one feed
    pub async fn episodes(&self, feed_id: &str) -> Result<Vec<DirectoryEpisode>> {
        let feed_id = feed_id.trim();
        if feed_id.is_empty() {
            return Err(Error::BadRequest("Feed id must not be empty".to_string()));
        }

        let url = format!("{}/episodes/{}", self.base_url, feed_id);
        tracing::debug!(url = %url, feed_id = %feed_id, "Querying directory service");

        let response = self.http.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::CatalogResponse(format!(
                "directory returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: Value = response.json().await?;
        let episodes = parse_directory_response(body)?;

        tracing::debug!(feed_id = %feed_id, episodes = episodes.len(), "Directory listing received");
        Ok(episodes)
    }
}

/// Decode a search response body.
///
/// The service answers with one result group per query; only the first group
/// is used. Distances are paired with hits by position.
pub fn parse_search_response(body: Value) -> Result<Vec<SearchHit>> {
    let results = match body.get("results") {
        Some(results) if !results.is_null() => results,
        _ => return Ok(Vec::new()),
    };

    let metadatas = match first_group(results, "metadatas") {
        Some(group) => group,
        None => return Ok(Vec::new()),
    };

    let distances: Vec<Option<f64>> = first_group(results, "distances")
        .map(|group| group.iter().map(Value::as_f64).collect())
        .unwrap_or_default();

    metadatas
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut hit: SearchHit = serde_json::from_value(raw.clone()).map_err(|e| {
                Error::CatalogResponse(format!("search hit {} is malformed: {}", index, e))
            })?;
            hit.distance = distances.get(index).copied().flatten();
            Ok(hit)
        })
        .collect()
}

/// Decode a directory listing body (`{"episodes": [...]}`)
pub fn parse_directory_response(body: Value) -> Result<Vec<DirectoryEpisode>> {
    match body.get("episodes") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(episodes) => serde_json::from_value(episodes.clone())
            .map_err(|e| Error::CatalogResponse(format!("episode listing is malformed: {}", e))),
    }
}

fn first_group<'a>(results: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    results
        .get(key)?
        .as_array()?
        .first()?
        .as_array()
}
