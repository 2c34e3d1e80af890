//! Success envelopes: `{"success": true, "data": ...}`.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Serialize)]
struct Envelope<T> {
  success: bool,
  data:    T,
}

/// `200 OK` with `data`.
pub struct Data<T>(pub T);

/// `201 Created` with `data`.
pub struct Created<T>(pub T);

impl<T: Serialize> IntoResponse for Data<T> {
  fn into_response(self) -> Response {
    Json(Envelope { success: true, data: self.0 }).into_response()
  }
}

impl<T: Serialize> IntoResponse for Created<T> {
  fn into_response(self) -> Response {
    (StatusCode::CREATED, Json(Envelope { success: true, data: self.0 })).into_response()
  }
}
