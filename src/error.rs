use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::response;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Please enter a search query.")]
    InvalidQuery,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{0}")]
    NoResults(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid response from similarity provider.")]
    InvalidProviderResponse,

    #[error("Similarity provider request failed: {0}")]
    ProviderUnavailable(String),

    #[error("Image download failed: {0}")]
    Download(String),

    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] SerdeJsonError),
}

impl AppError {
    pub fn no_results() -> Self {
        AppError::NoResults("No search results.".to_string())
    }

    pub fn page_out_of_range() -> Self {
        AppError::NoResults("No more results.".to_string())
    }

    pub fn image_not_found() -> Self {
        AppError::NotFound("Image not found".to_string())
    }

    // Internal faults are reported generically; the detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            AppError::Store(_)
            | AppError::Config(_)
            | AppError::Io(_)
            | AppError::Json(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed with {}: {}", status, self);
        } else {
            log::debug!("Request rejected with {}: {}", status, self);
        }

        HttpResponse::build(status).json(response::error_body(self.public_message(), status.as_u16()))
    }

    fn status_code(&self) -> StatusCode {
        match *self {
            AppError::InvalidQuery => StatusCode::BAD_REQUEST,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NoResults(_) => StatusCode::NOT_FOUND,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidProviderResponse => StatusCode::BAD_REQUEST,
            AppError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Download(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
