//! Request extractors whose rejections render as [`AppError`]

use crate::errors::AppError;
use axum::extract::FromRequest;

/// JSON body extractor; a bad body becomes a 400 `{status, message}`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
