use crate::error::AppError;
use crate::metadata::{ImageDetail, ImageId, ImageRecord};
use crate::store::MetadataStore;
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadTarget {
    pub url: Url,
    pub filename: String,
}

pub struct ImageService {
    store: Arc<dyn MetadataStore>,
    popular_limit: usize,
}

impl ImageService {
    pub fn new(store: Arc<dyn MetadataStore>, popular_limit: usize) -> Self {
        Self {
            store,
            popular_limit,
        }
    }

    pub async fn get_image(&self, id: ImageId) -> Result<ImageDetail, AppError> {
        let image = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(AppError::image_not_found)?;
        let tags = self.store.find_tags(id).await?;
        Ok(ImageDetail { image, tags })
    }

    pub async fn popular(&self) -> Result<Vec<ImageRecord>, AppError> {
        self.store.top_by_likes(self.popular_limit).await
    }

    pub async fn download_target(&self, id: ImageId) -> Result<DownloadTarget, AppError> {
        let detail = self.get_image(id).await?;
        let url = detail
            .image
            .cloud_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .and_then(|u| match Url::parse(u) {
                Ok(url) => Some(url),
                Err(e) => {
                    log::warn!("Image {} has an unusable cloud_url '{}': {}", id, u, e);
                    None
                }
            })
            .ok_or_else(|| AppError::NotFound("Download URL not found".to_string()))?;

        Ok(DownloadTarget {
            url,
            filename: format!("meme_{}.jpg", detail.image.image_id),
        })
    }
}
