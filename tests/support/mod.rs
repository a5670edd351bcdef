//! Shared test doubles for the query API

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use solana_transfers_ingest::fetcher::{FetcherError, FetcherResult, QueryApi, SubmittedQuery};
use solana_transfers_ingest::{RawRow, TRANSFERS};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// How the mock answers a submission
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Return the result metadata
    Succeed,
    /// Reject the query
    Reject(String),
    /// Never finish within the caller's ceiling
    Hang,
}

/// How the mock answers one page
#[derive(Debug, Clone, Copy)]
pub enum PageBehavior {
    /// Throttle the first `n` requests for the page, then serve it
    RateLimited(u32),
    /// Fail with a non rate-limit API error
    Fail,
}

/// In-memory query service paging over a fixed row set
pub struct MockApi {
    columns: Vec<String>,
    rows: Vec<RawRow>,
    submit: SubmitBehavior,
    pages: Mutex<HashMap<u64, PageBehavior>>,
    fetch_delay: Duration,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockApi {
    /// Serve `rows` aligned to `columns`
    pub fn new(columns: Vec<String>, rows: Vec<RawRow>) -> Self {
        Self {
            columns,
            rows,
            submit: SubmitBehavior::Succeed,
            pages: Mutex::new(HashMap::new()),
            fetch_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Serve `count` generated transfers in the transfers column order
    pub fn transfers(count: u64) -> Self {
        Self::new(transfer_columns(), (0..count).map(|i| transfer_row(i, count)).collect())
    }

    pub fn with_submit(mut self, submit: SubmitBehavior) -> Self {
        self.submit = submit;
        self
    }

    pub fn with_page(self, page_number: u64, behavior: PageBehavior) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(page_number, behavior);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryApi for MockApi {
    async fn submit(
        &self,
        _sql: &str,
        _page_number: u64,
        _page_size: u64,
        timeout: Duration,
    ) -> FetcherResult<SubmittedQuery> {
        match &self.submit {
            SubmitBehavior::Succeed => Ok(SubmittedQuery {
                query_id: "run-1".to_string(),
                columns: self.columns.clone(),
                column_types: vec!["string".to_string(); self.columns.len()],
                total_rows: self.rows.len() as u64,
            }),
            SubmitBehavior::Reject(message) => Err(FetcherError::ExecutionFailed(message.clone())),
            SubmitBehavior::Hang => {
                tokio::time::sleep(timeout * 2).await;
                Err(FetcherError::Timeout(timeout))
            }
        }
    }

    async fn fetch_page(
        &self,
        _query_id: &str,
        page_number: u64,
        page_size: u64,
    ) -> FetcherResult<Vec<RawRow>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut pages = self.pages.lock().unwrap();
            match pages.get_mut(&page_number) {
                Some(PageBehavior::RateLimited(remaining)) if *remaining > 0 => {
                    *remaining -= 1;
                    return Err(FetcherError::RateLimited(format!(
                        "page {page_number} throttled"
                    )));
                }
                Some(PageBehavior::Fail) => {
                    return Err(FetcherError::ApiError {
                        code: -32000,
                        message: "QueryRunNotFound: results expired".to_string(),
                    });
                }
                _ => {}
            }
        }

        let start = ((page_number - 1) * page_size) as usize;
        let end = (start + page_size as usize).min(self.rows.len());
        Ok(self.rows.get(start..end).map(<[RawRow]>::to_vec).unwrap_or_default())
    }
}

pub fn transfer_columns() -> Vec<String> {
    TRANSFERS
        .column_names()
        .into_iter()
        .map(|c| c.to_uppercase())
        .collect()
}

/// One transfer; `block_timestamp` is scrambled relative to `i` but unique
pub fn transfer_row(i: u64, count: u64) -> RawRow {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let offset = if count == 0 { 0 } else { (i * 37) % count };
    let ts = (base + ChronoDuration::seconds(offset as i64))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
    vec![
        Some(format!("ft-{i}")),
        Some(ts.clone()),
        Some((1_000 + i).to_string()),
        Some(format!("tx{i}")),
        Some("0".to_string()),
        Some(format!("from{}", i % 5)),
        Some(format!("to{}", i % 3)),
        Some(format!("{}.5", i)),
        Some(if i % 2 == 0 { "So11111111111111111111111111111111111111112" } else { "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v" }.to_string()),
        Some(ts.clone()),
        None,
    ]
}
