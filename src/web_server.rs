use actix_web::http::header;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::config::AppConfig;
use crate::counter::CounterService;
use crate::error::AppError;
use crate::images::ImageService;
use crate::metadata::ImageId;
use crate::response;
use crate::search::{SearchQuery, SearchService, DEFAULT_PAGE, DEFAULT_PAGE_SIZE};
use crate::similarity::SimilarityProvider;
use crate::store::MetadataStore;

fn default_page() -> i64 {
    DEFAULT_PAGE
}

fn default_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

fn default_sort() -> String {
    "accuracy".to_string()
}

#[derive(Debug, Deserialize, Validate)]
struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "page must be at least 1"))]
    page: i64,
    #[serde(default = "default_size")]
    #[validate(range(min = 1, max = 100, message = "size must be between 1 and 100"))]
    size: i64,
    // Left unvalidated: unknown modes are coerced, not rejected.
    #[serde(default = "default_sort")]
    sort: String,
}

#[derive(Debug, Deserialize, Validate)]
struct SimilarBody {
    #[validate(length(min = 1, message = "query must not be empty"))]
    query: String,
}

fn validated<T: Validate>(value: T) -> Result<T, AppError> {
    value
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(value)
}

async fn search(
    service: web::Data<SearchService>,
    params: web::Query<SearchParams>,
) -> Result<HttpResponse, AppError> {
    let params = validated(params.into_inner())?;
    log::debug!("Received search request: {:?}", params);

    let page = service
        .search(&SearchQuery {
            text: params.query,
            page: params.page,
            size: params.size,
            sort: params.sort,
        })
        .await?;
    Ok(response::ok(page))
}

async fn similar(
    service: web::Data<SearchService>,
    body: web::Json<SimilarBody>,
) -> Result<HttpResponse, AppError> {
    let body = validated(body.into_inner())?;
    Ok(response::ok(service.similar(&body.query).await?))
}

async fn popular_images(images: web::Data<ImageService>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(images.popular().await?))
}

async fn get_image(
    path: web::Path<ImageId>,
    images: web::Data<ImageService>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    log::debug!("Received request for image {}", id);
    Ok(response::ok(images.get_image(id).await?))
}

async fn like_image(
    path: web::Path<ImageId>,
    counter: web::Data<CounterService>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(counter.increment(path.into_inner()).await?))
}

async fn unlike_image(
    path: web::Path<ImageId>,
    counter: web::Data<CounterService>,
) -> Result<HttpResponse, AppError> {
    Ok(response::ok(counter.decrement(path.into_inner()).await?))
}

async fn download_image(
    path: web::Path<ImageId>,
    images: web::Data<ImageService>,
    http: web::Data<reqwest::Client>,
) -> Result<HttpResponse, AppError> {
    let target = images.download_target(path.into_inner()).await?;
    log::debug!("Proxying download of {} from {}", target.filename, target.url);

    let upstream = http
        .get(target.url.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            log::warn!("Fetching {} failed: {}", target.url, e);
            AppError::Download(e.without_url().to_string())
        })?;

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM.essence_str())
        .to_string();

    // Streamed through as-is, outside the JSON envelope.
    Ok(HttpResponse::Ok()
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", target.filename),
        ))
        .insert_header((header::CONTENT_TYPE, content_type))
        .streaming(upstream.bytes_stream()))
}

async fn not_found(req: HttpRequest) -> Result<HttpResponse, AppError> {
    Err(AppError::NotFound(format!("Cannot {} {}", req.method(), req.path())))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .route("/search", web::get().to(search))
    .route("/ai/similar", web::post().to(similar))
    .service(
        web::scope("/image")
            // Before "/{image_id}" so that "popular" is never read as an id.
            .route("/popular", web::get().to(popular_images))
            .route("/{image_id}", web::get().to(get_image))
            .route("/{image_id}/download", web::get().to(download_image))
            .route("/{image_id}/like", web::post().to(like_image))
            .service(
                web::resource("/{image_id}/unlike")
                    .route(web::post().to(unlike_image))
                    .route(web::delete().to(unlike_image)),
            ),
    );
}

pub async fn start_web_server(
    config: Arc<AppConfig>,
    store: Arc<dyn MetadataStore>,
    similarity: Arc<dyn SimilarityProvider>,
) -> Result<(), AppError> {
    let port = config.web_port;
    let download_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout_secs))
        .build()
        .map_err(|e| AppError::Config(config::ConfigError::Message(e.to_string())))?;

    let search_data = web::Data::new(SearchService::new(store.clone(), similarity));
    let counter_data = web::Data::new(CounterService::new(store.clone()));
    let image_data = web::Data::new(ImageService::new(store, config.popular_limit));
    let http_data = web::Data::new(download_client);

    log::info!("Starting web server on port: {}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(search_data.clone())
            .app_data(counter_data.clone())
            .app_data(image_data.clone())
            .app_data(http_data.clone())
            .configure(configure)
            .default_service(web::to(not_found))
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await?;

    Ok(())
}
