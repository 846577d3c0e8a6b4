use crate::error::AppError;
use crate::metadata::{ImageDetail, ImageId, ImageRecord};
use async_trait::async_trait;

/// Persisted image metadata.
///
/// Batch lookups make no promise about the order of the returned records.
/// Counter updates are atomic at the store level; `decrement_likes` floors the
/// counter at zero as part of the same atomic step.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), AppError>;
    async fn upsert_image(&self, detail: ImageDetail) -> Result<(), AppError>;
    async fn find_by_id(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError>;
    async fn find_tags(&self, id: ImageId) -> Result<Vec<String>, AppError>;
    async fn find_many(&self, ids: &[ImageId]) -> Result<Vec<ImageRecord>, AppError>;
    /// Records among `ids`, by `like_cnt` descending (ties by id), windowed by `offset`/`limit`.
    async fn find_many_by_likes(
        &self,
        ids: &[ImageId],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>, AppError>;
    async fn top_by_likes(&self, limit: usize) -> Result<Vec<ImageRecord>, AppError>;
    /// `None` when no record has this id.
    async fn increment_likes(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError>;
    async fn decrement_likes(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError>;
}
