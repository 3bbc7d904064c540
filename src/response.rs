//! Standard response envelope helpers and flashed messages.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<FlashMessage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Success,
    Error,
    Info,
}

/// A message the host application is expected to flash to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub category: Category,
    pub message: String,
}

impl FlashMessage {
    pub fn success(message: impl Into<String>) -> Self {
        FlashMessage {
            category: Category::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        FlashMessage {
            category: Category::Error,
            message: message.into(),
        }
    }
}

/// 303 redirect carrying the flashed messages in a JSON body.
#[derive(Debug)]
pub struct Redirect {
    pub location: String,
    pub messages: Vec<FlashMessage>,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Redirect {
            location: location.into(),
            messages: Vec::new(),
        }
    }

    pub fn with(mut self, message: FlashMessage) -> Self {
        self.messages.push(message);
        self
    }
}

#[derive(Serialize)]
struct RedirectBody {
    redirect: String,
    messages: Vec<FlashMessage>,
}

impl IntoResponse for Redirect {
    fn into_response(self) -> Response {
        let body = RedirectBody {
            redirect: self.location.clone(),
            messages: self.messages,
        };
        (
            StatusCode::SEE_OTHER,
            [(header::LOCATION, self.location)],
            Json(body),
        )
            .into_response()
    }
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (
        StatusCode::OK,
        Json(SuccessOne {
            data,
            messages: Vec::new(),
        }),
    )
}

/// Form re-display after failed validation or a flashed backend error.
pub fn unprocessable<T: Serialize>(
    data: T,
    messages: Vec<FlashMessage>,
) -> (StatusCode, Json<SuccessOne<T>>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(SuccessOne { data, messages }),
    )
}

pub fn error_body(code: &str, message: String, details: Option<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}
