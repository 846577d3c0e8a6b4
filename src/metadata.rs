// src/metadata.rs

use serde::{Deserialize, Serialize};

pub type ImageId = i64;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct ImageRecord {
    pub image_id: ImageId,
    #[serde(default)]
    pub original_url: Option<String>,
    #[serde(default)]
    pub like_cnt: i64,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub src_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub cloud_url: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl ImageRecord {
    pub fn new(image_id: ImageId) -> Self {
        Self {
            image_id,
            original_url: None,
            like_cnt: 0,
            width: None,
            height: None,
            src_url: None,
            caption: None,
            cloud_url: None,
            status: None,
        }
    }

    pub fn with_likes(mut self, like_cnt: i64) -> Self {
        self.like_cnt = like_cnt;
        self
    }

    pub fn with_cloud_url(mut self, url: impl Into<String>) -> Self {
        self.cloud_url = Some(url.into());
        self
    }
}

/// A record together with the names of the tags attached to it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageDetail {
    #[serde(flatten)]
    pub image: ImageRecord,
    #[serde(default)]
    pub tags: Vec<String>,
}
