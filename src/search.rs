//! Search orchestration: query normalization, similarity lookup, and merging
//! the ranked candidates with stored metadata under one of two orderings.

use crate::error::AppError;
use crate::metadata::{ImageId, ImageRecord};
use crate::similarity::{SimilarityProvider, SimilarityResponse};
use crate::store::MetadataStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// Provider relevance order.
    Accuracy,
    /// Stored like count, descending.
    Like,
}

impl SortMode {
    /// Unknown modes fall back to accuracy.
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "like" => SortMode::Like,
            _ => SortMode::Accuracy,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub text: String,
    pub page: i64,
    pub size: i64,
    pub sort: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultPage {
    pub items: Vec<ImageRecord>,
    /// Candidate count before paging, regardless of how many are stored.
    pub total: usize,
    pub page: i64,
    pub size: i64,
    pub sort: SortMode,
}

/// Trims, folds case and collapses whitespace runs to a single space.
pub fn normalize_query(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageWindow {
    page: i64,
    size: i64,
    offset: usize,
}

impl PageWindow {
    fn new(page: i64, size: i64) -> Self {
        let page = page.max(1);
        let size = size.clamp(1, MAX_PAGE_SIZE);
        let offset = ((page - 1) as u64).saturating_mul(size as u64);
        Self {
            page,
            size,
            offset: usize::try_from(offset).unwrap_or(usize::MAX),
        }
    }

    fn limit(&self) -> usize {
        self.size as usize
    }
}

/// Puts `records` in the order of `ids`, dropping ids with no record.
fn order_by_candidates(ids: &[ImageId], records: Vec<ImageRecord>) -> Vec<ImageRecord> {
    let by_id: HashMap<ImageId, ImageRecord> =
        records.into_iter().map(|r| (r.image_id, r)).collect();
    ids.iter().filter_map(|id| by_id.get(id).cloned()).collect()
}

pub struct SearchService {
    store: Arc<dyn MetadataStore>,
    similarity: Arc<dyn SimilarityProvider>,
}

impl SearchService {
    pub fn new(store: Arc<dyn MetadataStore>, similarity: Arc<dyn SimilarityProvider>) -> Self {
        Self { store, similarity }
    }

    pub async fn similar(&self, raw: &str) -> Result<SimilarityResponse, AppError> {
        let text = normalize_query(raw);
        if text.is_empty() {
            return Err(AppError::InvalidQuery);
        }
        self.similarity.similarity_search(&text).await
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResultPage, AppError> {
        let text = normalize_query(&query.text);
        if text.is_empty() {
            return Err(AppError::InvalidQuery);
        }
        let window = PageWindow::new(query.page, query.size);
        let sort = SortMode::coerce(&query.sort);
        log::debug!(
            "Searching '{}' page={} size={} offset={} sort={:?}",
            text,
            window.page,
            window.size,
            window.offset,
            sort
        );

        let candidates = self.similarity.similarity_search(&text).await?;
        let ids = candidates.candidate_ids();
        if ids.is_empty() {
            return Err(AppError::no_results());
        }

        let total = ids.len();
        if window.offset >= total {
            log::debug!("Offset {} is past {} candidates for '{}'", window.offset, total, text);
            return Err(AppError::page_out_of_range());
        }

        let items = match sort {
            SortMode::Accuracy => {
                let end = window.offset.saturating_add(window.limit()).min(total);
                let page_ids = &ids[window.offset..end];
                let records = self.store.find_many(page_ids).await?;
                order_by_candidates(page_ids, records)
            }
            SortMode::Like => {
                self.store
                    .find_many_by_likes(&ids, window.offset, window.limit())
                    .await?
            }
        };
        log::debug!("Search '{}' matched {} of {} candidates on this page", text, items.len(), total);

        Ok(SearchResultPage {
            items,
            total,
            page: window.page,
            size: window.size,
            sort,
        })
    }
}
