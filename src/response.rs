use actix_web::HttpResponse;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct SuccessBody<T> {
    pub data: T,
    pub status_code: u16,
    pub timestamp: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    pub timestamp: String,
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(SuccessBody {
        data,
        status_code: 200,
        timestamp: now_iso(),
    })
}

pub fn error_body(message: String, status_code: u16) -> ErrorBody {
    ErrorBody {
        message,
        status_code,
        timestamp: now_iso(),
    }
}
