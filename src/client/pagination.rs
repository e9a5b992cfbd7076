use std::future::Future;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use tokio::time::Instant;

use crate::cancel::CancellationSignal;
use crate::error::{PaginationLimitError, Result};

pub const DEFAULT_MAX_PAGES: usize = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    /// The cursor for the next request; an empty token ends pagination like `null`.
    pub fn next_token(&self) -> Option<&str> {
        self.next_page_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Safety valves for a pagination loop. Both limits are independent.
#[derive(Debug, Clone)]
pub struct PaginationOptions {
    pub max_pages: usize,
    pub timeout: Duration,
    pub cancel: Option<CancellationSignal>,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            timeout: DEFAULT_TIMEOUT,
            cancel: None,
        }
    }
}

impl PaginationOptions {
    #[must_use]
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn check(&self, started: Instant, pages_fetched: usize) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            cancel.check()?;
        }
        if started.elapsed() > self.timeout {
            return Err(PaginationLimitError::TimeoutExceeded {
                timeout: self.timeout,
            }
            .into());
        }
        if pages_fetched >= self.max_pages {
            return Err(PaginationLimitError::MaxPagesExceeded {
                max_pages: self.max_pages,
            }
            .into());
        }
        Ok(())
    }
}

/// How a filtered scan decides it has seen enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep leading matches; the first non-matching item ends the whole scan.
    ///
    /// Relies on the collection being newest-first with the relevant items
    /// contiguous at its head.
    Contiguous,
    /// Skip non-matching items and stop at the first match.
    FindFirst,
}

/// Fetches every page, concatenating items in page order.
///
/// `fetch_page` receives the token from the previous page (`None` first) and
/// is never called again before its previous future resolved.
///
/// # Errors
///
/// Fails with [`PaginationLimitError`] when `max_pages` pages were fetched and
/// a token is still present, or when `timeout` elapsed before the next
/// request. Request and decoding errors propagate unchanged.
pub async fn paginate<T, F, Fut>(options: &PaginationOptions, fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    paginate_filtered(options, FilterMode::Contiguous, fetch_page, |_| true).await
}

/// Pagination with a per-item predicate and early stop; see [`FilterMode`].
///
/// # Errors
///
/// Same as [`paginate`].
pub async fn paginate_filtered<T, F, Fut, P>(
    options: &PaginationOptions,
    mode: FilterMode,
    mut fetch_page: F,
    mut predicate: P,
) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
    P: FnMut(&T) -> bool,
{
    let started = Instant::now();
    let mut matched = Vec::new();
    let mut page_token: Option<String> = None;
    let mut pages_fetched = 0;

    loop {
        options.check(started, pages_fetched)?;

        let page = fetch_page(page_token.take()).await?;
        pages_fetched += 1;
        let next_token = page.next_token().map(ToString::to_string);
        debug!(
            "Fetched page {pages_fetched} ({} items, more: {})",
            page.items.len(),
            next_token.is_some()
        );

        let mut finished = false;
        for item in page.items {
            if predicate(&item) {
                matched.push(item);
                if mode == FilterMode::FindFirst {
                    finished = true;
                    break;
                }
            } else if mode == FilterMode::Contiguous {
                finished = true;
                break;
            }
        }

        match next_token {
            Some(token) if !finished => page_token = Some(token),
            _ => break,
        }
    }

    Ok(matched)
}
