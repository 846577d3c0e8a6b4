use crate::error::AppError;
use crate::metadata::{ImageDetail, ImageId, ImageRecord};
use crate::store::MetadataStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// In-process store. Every counter update holds the write lock for its whole
/// read-branch-write, which makes it atomic with respect to other updates.
#[derive(Default)]
pub struct MemoryStore {
    images: RwLock<HashMap<ImageId, ImageDetail>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_likes_desc(a: &ImageRecord, b: &ImageRecord) -> std::cmp::Ordering {
    b.like_cnt.cmp(&a.like_cnt).then(a.image_id.cmp(&b.image_id))
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        log::debug!("Memory store needs no schema.");
        Ok(())
    }

    async fn upsert_image(&self, mut detail: ImageDetail) -> Result<(), AppError> {
        detail.image.like_cnt = detail.image.like_cnt.max(0);
        log::trace!("Upserting image {} into memory store", detail.image.image_id);
        self.images.write().await.insert(detail.image.image_id, detail);
        Ok(())
    }

    async fn find_by_id(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError> {
        Ok(self.images.read().await.get(&id).map(|d| d.image.clone()))
    }

    async fn find_tags(&self, id: ImageId) -> Result<Vec<String>, AppError> {
        Ok(self
            .images
            .read()
            .await
            .get(&id)
            .map(|d| d.tags.clone())
            .unwrap_or_default())
    }

    async fn find_many(&self, ids: &[ImageId]) -> Result<Vec<ImageRecord>, AppError> {
        let wanted: HashSet<ImageId> = ids.iter().copied().collect();
        let images = self.images.read().await;
        // HashMap iteration order: callers must not rely on it.
        Ok(images
            .values()
            .filter(|d| wanted.contains(&d.image.image_id))
            .map(|d| d.image.clone())
            .collect())
    }

    async fn find_many_by_likes(
        &self,
        ids: &[ImageId],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<ImageRecord>, AppError> {
        let mut records = self.find_many(ids).await?;
        records.sort_by(by_likes_desc);
        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    async fn top_by_likes(&self, limit: usize) -> Result<Vec<ImageRecord>, AppError> {
        let mut records: Vec<ImageRecord> = self
            .images
            .read()
            .await
            .values()
            .map(|d| d.image.clone())
            .collect();
        records.sort_by(by_likes_desc);
        records.truncate(limit);
        Ok(records)
    }

    async fn increment_likes(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError> {
        let mut images = self.images.write().await;
        Ok(images.get_mut(&id).map(|d| {
            d.image.like_cnt += 1;
            d.image.clone()
        }))
    }

    async fn decrement_likes(&self, id: ImageId) -> Result<Option<ImageRecord>, AppError> {
        let mut images = self.images.write().await;
        Ok(images.get_mut(&id).map(|d| {
            if d.image.like_cnt <= 0 {
                d.image.like_cnt = 0;
            } else {
                d.image.like_cnt -= 1;
            }
            d.image.clone()
        }))
    }
}
