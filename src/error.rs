use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("you must be signed in to do that")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("session error: {0}")]
    SessionRead(#[from] actix_session::SessionGetError),

    #[error("session error: {0}")]
    SessionWrite(#[from] actix_session::SessionInsertError),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::SessionRead(_) | AppError::SessionWrite(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Internal failures are logged server-side, never echoed to the client.
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {self}");
            return HttpResponse::InternalServerError().body("internal server error");
        }
        HttpResponse::build(self.status_code()).body(self.to_string())
    }
}
