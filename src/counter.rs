use crate::error::AppError;
use crate::metadata::{ImageId, ImageRecord};
use crate::store::MetadataStore;
use std::sync::Arc;

/// Like/unlike on an image's popularity counter. The counter moves
/// n -> n + 1 on like and n -> max(n - 1, 0) on unlike.
pub struct CounterService {
    store: Arc<dyn MetadataStore>,
}

impl CounterService {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    async fn ensure_exists(&self, id: ImageId) -> Result<(), AppError> {
        match self.store.find_by_id(id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::image_not_found()),
        }
    }

    pub async fn increment(&self, id: ImageId) -> Result<ImageRecord, AppError> {
        self.ensure_exists(id).await?;
        let record = self
            .store
            .increment_likes(id)
            .await?
            .ok_or_else(AppError::image_not_found)?;
        log::debug!("Image {} liked, count now {}", id, record.like_cnt);
        Ok(record)
    }

    pub async fn decrement(&self, id: ImageId) -> Result<ImageRecord, AppError> {
        self.ensure_exists(id).await?;
        let record = self
            .store
            .decrement_likes(id)
            .await?
            .ok_or_else(AppError::image_not_found)?;
        log::debug!("Image {} unliked, count now {}", id, record.like_cnt);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ImageDetail;
    use crate::stores::memory::MemoryStore;
    use crate::stores::sqlite::SqliteStore;
    use futures::future::join_all;

    async fn seed(store: &dyn MetadataStore, id: ImageId, likes: i64) {
        store
            .upsert_image(ImageDetail {
                image: ImageRecord::new(id).with_likes(likes),
                tags: vec![],
            })
            .await
            .unwrap();
    }

    async fn memory_service(id: ImageId, likes: i64) -> Arc<CounterService> {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref(), id, likes).await;
        Arc::new(CounterService::new(store))
    }

    #[tokio::test]
    async fn unknown_image_is_not_found() {
        let service = memory_service(1, 0).await;
        assert!(matches!(service.increment(2).await, Err(AppError::NotFound(_))));
        assert!(matches!(service.decrement(2).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn decrement_at_zero_stays_zero() {
        let service = memory_service(1, 0).await;
        assert_eq!(service.decrement(1).await.unwrap().like_cnt, 0);
    }

    #[tokio::test]
    async fn like_then_unlike_round_trips() {
        for start in [0, 1, 5] {
            let service = memory_service(1, start).await;
            assert_eq!(service.increment(1).await.unwrap().like_cnt, start + 1);
            assert_eq!(service.decrement(1).await.unwrap().like_cnt, start);
        }
    }

    #[tokio::test]
    async fn concurrent_unlikes_never_go_negative() {
        let service = memory_service(1, 3).await;
        let tasks = (0..40).map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.decrement(1).await.map(|r| r.like_cnt) })
        });
        for result in join_all(tasks).await {
            assert!(result.unwrap().unwrap() >= 0);
        }
        assert_eq!(service.decrement(1).await.unwrap().like_cnt, 0);
    }

    #[tokio::test]
    async fn concurrent_mixed_updates_stay_in_bounds() {
        let service = memory_service(1, 2).await;
        let tasks = (0..60).map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                if i % 3 == 0 {
                    service.increment(1).await
                } else {
                    service.decrement(1).await
                }
            })
        });
        for result in join_all(tasks).await {
            assert!(result.unwrap().unwrap().like_cnt >= 0);
        }
        let last = service.increment(1).await.unwrap().like_cnt - 1;
        assert!((0..=22).contains(&last));
    }

    #[tokio::test]
    async fn increments_are_not_lost() {
        let service = memory_service(1, 0).await;
        let tasks = (0..50).map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.increment(1).await })
        });
        for result in join_all(tasks).await {
            result.unwrap().unwrap();
        }
        assert_eq!(service.decrement(1).await.unwrap().like_cnt, 49);
    }

    fn remove_db_files(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn sqlite_file_counters_stay_in_bounds_under_parallel_updates() {
        let path = std::env::temp_dir().join(format!("meme_search_counters_{}.db", std::process::id()));
        remove_db_files(&path);

        let store = Arc::new(
            SqliteStore::connect(&format!("sqlite://{}", path.display()))
                .await
                .unwrap(),
        );
        store.ensure_schema().await.unwrap();
        seed(store.as_ref(), 7, 5).await;
        let service = Arc::new(CounterService::new(store));

        let likes = (0..200).filter(|i| i % 3 == 0).count() as i64;
        let tasks = (0..200).map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                if i % 3 == 0 {
                    service.increment(7).await
                } else {
                    service.decrement(7).await
                }
            })
        });
        for result in join_all(tasks).await {
            let record = result.unwrap().unwrap();
            assert!(record.like_cnt >= 0, "went negative: {}", record.like_cnt);
            assert!(record.like_cnt <= 5 + likes, "overshot: {}", record.like_cnt);
        }

        let settled = service.decrement(7).await.unwrap().like_cnt;
        assert!((0..=5 + likes).contains(&settled));

        // Increments alone must all land.
        let tasks = (0..50).map(|_| {
            let service = service.clone();
            tokio::spawn(async move { service.increment(7).await })
        });
        for result in join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }
        assert_eq!(service.decrement(7).await.unwrap().like_cnt, settled + 49);

        remove_db_files(&path);
    }
}
