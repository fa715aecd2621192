//! Lazy, restartable paginated sequences
//!
//! List calls return a [`Paged`] cursor rather than a vector: pages are only
//! fetched as the caller advances, so a search that matches early never
//! pulls the rest of the listing.

use crate::error::ApiError;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A single page of items plus the link to the next one
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_link: Option<String>,
}

/// Where pages come from. `link` is `None` for the first page.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    async fn fetch(&self, link: Option<&str>) -> Result<Page<T>, ApiError>;
}

/// Cursor over a paginated listing with explicit `advance` / `current`
pub struct Paged<T> {
    source: Box<dyn PageSource<T>>,
    items: Vec<T>,
    index: usize,
    next_link: Option<String>,
    started: bool,
}

impl<T: Send + 'static> Paged<T> {
    pub fn new(source: impl PageSource<T> + 'static) -> Self {
        Self {
            source: Box::new(source),
            items: Vec::new(),
            index: 0,
            next_link: None,
            started: false,
        }
    }

    /// Move to the next item, fetching pages as needed.
    /// Returns `false` once the sequence is exhausted.
    pub async fn advance(&mut self) -> Result<bool, ApiError> {
        if !self.started {
            self.started = true;
            self.load(None).await?;
            return self.settle().await;
        }

        if self.index < self.items.len() {
            self.index += 1;
        }
        self.settle().await
    }

    /// The item the cursor is on, if any
    pub fn current(&self) -> Option<&T> {
        if self.started {
            self.items.get(self.index)
        } else {
            None
        }
    }

    /// Rewind to before the first item; the next `advance` refetches page one
    pub fn restart(&mut self) {
        self.items.clear();
        self.index = 0;
        self.next_link = None;
        self.started = false;
    }

    /// Skip past empty pages until an item is current or the listing ends
    async fn settle(&mut self) -> Result<bool, ApiError> {
        while self.index >= self.items.len() {
            match self.next_link.take() {
                Some(link) => self.load(Some(link)).await?,
                None => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn load(&mut self, link: Option<String>) -> Result<(), ApiError> {
        let page = self.source.fetch(link.as_deref()).await?;
        self.items = page.items;
        self.next_link = page.next_link.filter(|l| !l.is_empty());
        self.index = 0;
        Ok(())
    }
}

impl<T: Clone + Send + Sync + 'static> Paged<T> {
    /// A finite sequence served from pre-built pages
    pub fn from_pages(pages: Vec<Vec<T>>) -> Self {
        Self::new(StaticPages::new(pages))
    }
}

/// In-memory page source; counts how many pages were fetched
#[derive(Clone)]
pub struct StaticPages<T> {
    pages: Arc<Vec<Vec<T>>>,
    fetches: Arc<AtomicUsize>,
}

impl<T> StaticPages<T> {
    pub fn new(pages: Vec<Vec<T>>) -> Self {
        Self {
            pages: Arc::new(pages),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PageSource<T> for StaticPages<T> {
    async fn fetch(&self, link: Option<&str>) -> Result<Page<T>, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let index = match link {
            None => 0,
            Some(link) => link.parse::<usize>().map_err(|_| ApiError::Status {
                status: 400,
                url: link.to_string(),
                body: "bad page link".to_string(),
            })?,
        };
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let next_link = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(Page { items, next_link })
    }
}
