// src/error.rs
use crate::views;
use log::error;
use std::convert::Infallible;
use thiserror::Error;
use warp::http::{StatusCode, Uri};
use warp::reject::Reject;
use warp::{Rejection, Reply};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("must provide {0}")]
    MissingField(&'static str),
    #[error("shares must be a positive whole number")]
    InvalidShares,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error("invalid stock symbol {0}")]
    InvalidSymbol(String),
    #[error("not enough cash")]
    InsufficientCash,
    #[error("not enough shares")]
    InsufficientShares,
    #[error("username already taken")]
    UsernameTaken,
    #[error("must provide {0}")]
    MissingCredential(&'static str),
    #[error("invalid username and/or password")]
    InvalidCredentials,
    #[error("login required")]
    LoginRequired,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("password hashing failed: {0}")]
    Password(String),
    #[error("session error: {0}")]
    Session(String),
}

impl Reject for AppError {}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingField(_)
            | AppError::InvalidShares
            | AppError::PasswordMismatch
            | AppError::InvalidSymbol(_)
            | AppError::InsufficientCash
            | AppError::InsufficientShares
            | AppError::UsernameTaken => StatusCode::BAD_REQUEST,
            AppError::MissingCredential(_) | AppError::InvalidCredentials => StatusCode::FORBIDDEN,
            AppError::LoginRequired => StatusCode::SEE_OTHER,
            AppError::Database(_) | AppError::Password(_) | AppError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message shown on the apology page. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

fn apology(message: &str, status: StatusCode) -> Box<dyn Reply> {
    Box::new(warp::reply::with_status(
        warp::reply::html(views::apology(message, status)),
        status,
    ))
}

/// Renders every rejection, ours or warp's, as an apology page.
pub async fn handle_rejection(err: Rejection) -> Result<Box<dyn Reply>, Infallible> {
    if let Some(app_err) = err.find::<AppError>() {
        if let AppError::LoginRequired = app_err {
            return Ok(Box::new(warp::redirect::see_other(Uri::from_static("/login"))));
        }
        let status = app_err.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {}", app_err);
        }
        return Ok(apology(&app_err.public_message(), status));
    }

    if err.is_not_found() {
        return Ok(apology("page not found", StatusCode::NOT_FOUND));
    }
    if err
        .find::<warp::filters::body::BodyDeserializeError>()
        .is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
    {
        return Ok(apology("malformed request", StatusCode::BAD_REQUEST));
    }
    if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        return Ok(apology(
            "unsupported media type",
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ));
    }
    if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        return Ok(apology("payload too large", StatusCode::PAYLOAD_TOO_LARGE));
    }
    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(apology(
            "method not allowed",
            StatusCode::METHOD_NOT_ALLOWED,
        ));
    }

    error!("Unhandled rejection: {:?}", err);
    Ok(apology(
        "internal server error",
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(AppError::InvalidShares.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::InvalidSymbol("ZZZZ".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::InsufficientCash.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::InvalidCredentials.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn app_errors_convert_into_rejections() {
        let rejection: Rejection = AppError::InsufficientShares.into();
        assert!(matches!(
            rejection.find::<AppError>(),
            Some(AppError::InsufficientShares)
        ));
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.public_message(), "internal server error");
        assert_eq!(
            AppError::MissingField("symbol").public_message(),
            "must provide symbol"
        );
    }
}
