//! Backfill of older entries over HTTP
//!
//! One page at a time, ending at the buffer's top cursor. Only one request may
//! be in flight; the session holds the `SingleFlight` guard around it.

use super::buffer::{BufferStore, PrependOutcome};
use anyhow::{Context, Result};
use feedview_common::{constants, Entry, FeedError, FetchMeta, FetchResponse};
use reqwest::Client;
use std::time::Duration;

/// Parameters of one backfill request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    /// Session epoch the request belongs to; bumped on every buffer reset
    pub epoch: u64,
    /// Page ends just before this entry id
    pub cursor: String,
    pub query: String,
    pub limit: u32,
    pub timeout_ms: u64,
}

/// A page of older entries, ascending
#[derive(Debug, Clone)]
pub struct BackfillPage {
    pub entries: Vec<Entry>,
    pub meta: FetchMeta,
}

/// Single-flight guard for backfill requests
#[derive(Debug, Default)]
pub struct SingleFlight {
    in_flight: bool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot, or reject a re-entrant request
    pub fn try_begin(&mut self) -> Result<(), FeedError> {
        if self.in_flight {
            return Err(FeedError::ReentrantBackfill);
        }
        self.in_flight = true;
        Ok(())
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

/// What merging a page did to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeResult {
    pub outcome: PrependOutcome,
    /// Index the viewport should be brought to, if any
    pub scroll_to: Option<usize>,
}

/// Merge a fetched page into the buffer
///
/// The backend's cursor wins over the one derived from the new head, since it
/// is the token the next page must be requested with.
pub fn merge_page(buffer: &mut BufferStore, page: BackfillPage) -> MergeResult {
    let BackfillPage { entries, meta } = page;

    let outcome = buffer.prepend_head(entries);
    buffer.set_top_cursor(meta.left_off);

    let scroll_to = if meta.no_more_data {
        buffer.set_no_more_older(true);
        None
    } else {
        outcome.inserted.checked_sub(1)
    };

    MergeResult { outcome, scroll_to }
}

/// HTTP client for the backfill endpoint
#[derive(Clone)]
pub struct BackfillFetcher {
    url: String,
    client: Client,
}

impl BackfillFetcher {
    pub fn new(server_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: format!("{}{}", server_url.trim_end_matches('/'), constants::ITEMS_PATH),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the page of entries preceding `request.cursor`
    ///
    /// Transport failures, timeouts, bad statuses and incomplete bodies all come
    /// back as `FeedError::BackfillUnavailable`.
    pub async fn fetch_older(&self, request: &BackfillRequest) -> Result<BackfillPage, FeedError> {
        if request.cursor.is_empty() {
            return Err(FeedError::MissingCursor);
        }

        let direction = constants::BACKFILL_DIRECTION.to_string();
        let limit = request.limit.to_string();
        let timeout_ms = request_timeout(request.timeout_ms).as_millis().to_string();

        let req = self
            .client
            .get(&self.url)
            .query(&[
                ("leftOff", request.cursor.as_str()),
                ("direction", direction.as_str()),
                ("query", request.query.as_str()),
                ("limit", limit.as_str()),
                ("timeoutMs", timeout_ms.as_str()),
            ])
            .timeout(request_timeout(request.timeout_ms));

        let response = req.send().await.map_err(unavailable)?;
        if !response.status().is_success() {
            return Err(FeedError::BackfillUnavailable(format!(
                "backend answered {}",
                response.status()
            )));
        }

        let body: FetchResponse = response.json().await.map_err(unavailable)?;
        let (entries, meta) = body.into_ascending_page()?;

        tracing::debug!(
            "Fetched {} older entries before {} (total {}, no more data: {})",
            entries.len(),
            request.cursor,
            meta.total,
            meta.no_more_data
        );

        Ok(BackfillPage { entries, meta })
    }
}

/// Every request is bounded; zero falls back to the default budget
fn request_timeout(timeout_ms: u64) -> Duration {
    if timeout_ms == 0 {
        Duration::from_millis(constants::BACKFILL_TIMEOUT_MS)
    } else {
        Duration::from_millis(timeout_ms)
    }
}

fn unavailable(e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::BackfillUnavailable("request timed out".to_string())
    } else {
        FeedError::BackfillUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_support::spawn_backend;
    use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn entry(id: &str) -> Entry {
        Entry::new("w", id, id.parse().unwrap_or(0))
    }

    fn meta(left_off: &str, no_more_data: bool) -> FetchMeta {
        FetchMeta {
            left_off: left_off.to_string(),
            no_more_data,
            total: 40,
            truncated_timestamp: 0,
        }
    }

    fn request(cursor: &str, timeout_ms: u64) -> BackfillRequest {
        BackfillRequest {
            epoch: 0,
            cursor: cursor.to_string(),
            query: "http".to_string(),
            limit: 2,
            timeout_ms,
        }
    }

    #[test]
    fn test_single_flight() {
        let mut guard = SingleFlight::new();
        assert!(guard.try_begin().is_ok());
        assert!(matches!(guard.try_begin(), Err(FeedError::ReentrantBackfill)));
        assert!(guard.is_in_flight());

        guard.finish();
        assert!(guard.try_begin().is_ok());
    }

    #[test]
    fn test_request_timeout_is_always_bounded() {
        assert_eq!(request_timeout(50), Duration::from_millis(50));
        assert_eq!(request_timeout(0), Duration::from_millis(constants::BACKFILL_TIMEOUT_MS));
    }

    #[test]
    fn test_merge_page_truncates_tail() {
        let mut buffer = BufferStore::new(3);
        for id in ["2", "3", "4"] {
            buffer.append_tail(entry(id));
        }

        let result = merge_page(
            &mut buffer,
            BackfillPage {
                entries: vec![entry("0"), entry("1")],
                meta: meta("0", false),
            },
        );

        let ids: Vec<&str> = buffer.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1", "2"]);
        assert_eq!(result.outcome.evicted, 2);
        assert_eq!(result.scroll_to, Some(1));
        assert_eq!(buffer.top_cursor(), Some("0"));
        assert!(!buffer.no_more_older());
    }

    #[test]
    fn test_merge_page_no_more_data() {
        let mut buffer = BufferStore::new(10);
        buffer.append_tail(entry("5"));

        let result = merge_page(
            &mut buffer,
            BackfillPage {
                entries: vec![entry("4")],
                meta: meta("4", true),
            },
        );

        assert!(buffer.no_more_older());
        assert_eq!(result.scroll_to, None);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_merge_empty_page_keeps_buffer() {
        let mut buffer = BufferStore::new(10);
        buffer.append_tail(entry("5"));

        let result = merge_page(
            &mut buffer,
            BackfillPage {
                entries: Vec::new(),
                meta: meta("", false),
            },
        );

        assert_eq!(result.scroll_to, None);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.top_cursor(), Some("5"));
    }

    async fn items(Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
        let cursor = params.get("leftOff").cloned().unwrap_or_default();
        match cursor.as_str() {
            "10" => {
                assert_eq!(params.get("direction").map(String::as_str), Some("-1"));
                assert_eq!(params.get("query").map(String::as_str), Some("http"));
                assert_eq!(params.get("limit").map(String::as_str), Some("2"));
                Json(json!({
                    "data": [
                        {"id": "9", "worker": "w", "timestamp": 9},
                        {"id": "8", "worker": "w", "timestamp": 8}
                    ],
                    "meta": {"leftOff": "8", "noMoreData": false, "total": 40, "truncatedTimestamp": 3}
                }))
                .into_response()
            }
            "nometa" => Json(json!({"data": [], "meta": null})).into_response(),
            "slow" => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Json(json!({"data": [], "meta": {}})).into_response()
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        }
    }

    async fn fetcher() -> BackfillFetcher {
        let addr = spawn_backend(Router::new().route("/items", get(items))).await;
        BackfillFetcher::new(&format!("http://{}/", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_older_reverses_page() {
        let fetcher = fetcher().await;
        assert!(fetcher.url().ends_with("/items"));

        let page = fetcher.fetch_older(&request("10", 3000)).await.unwrap();
        let ids: Vec<&str> = page.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["8", "9"]);
        assert_eq!(page.meta.left_off, "8");
        assert_eq!(page.meta.truncated_timestamp, 3);
    }

    #[tokio::test]
    async fn test_fetch_older_unavailable_cases() {
        let fetcher = fetcher().await;

        for cursor in ["nometa", "broken"] {
            let result = fetcher.fetch_older(&request(cursor, 3000)).await;
            assert!(
                matches!(result, Err(FeedError::BackfillUnavailable(_))),
                "cursor {} gave {:?}",
                cursor,
                result
            );
        }

        let timed_out = fetcher.fetch_older(&request("slow", 50)).await;
        assert!(matches!(timed_out, Err(FeedError::BackfillUnavailable(_))));

        let no_cursor = fetcher.fetch_older(&request("", 3000)).await;
        assert!(matches!(no_cursor, Err(FeedError::MissingCursor)));
    }
}
