use actix_web::{http::StatusCode, HttpResponse, HttpResponseBuilder};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: String,
}

/// Success envelope shared by every JSON endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub data: Option<T>,
    pub meta: Meta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            status_code: status.as_u16(),
            message: message.into(),
            data,
            meta: Meta {
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
        }
    }

    /// Finish `builder` (which may already carry cookies) with this envelope
    pub fn send(self, mut builder: HttpResponseBuilder) -> HttpResponse {
        builder.json(self)
    }
}

pub fn respond<T: Serialize>(status: StatusCode, message: &str, data: Option<T>) -> HttpResponse {
    ApiResponse::new(status, message, data).send(HttpResponse::build(status))
}

/// Envelope without a payload
pub fn respond_empty(status: StatusCode, message: &str) -> HttpResponse {
    respond::<()>(status, message, None)
}
