//! Response envelopes
//!
//! Single objects go out as `{"data": ...}`, plain acknowledgements as
//! `{"message": ...}`. Lists use [`super::Paginated`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }

    fn with_status(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

impl<T: Serialize> IntoResponse for DataResponse<T> {
    fn into_response(self) -> Response {
        self.with_status(StatusCode::OK)
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for MessageResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// 201, for anything a POST brought into existence
pub struct Created<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        DataResponse::new(self.0).with_status(StatusCode::CREATED)
    }
}

/// 202, for work handed to a background task (queued reports)
pub struct Accepted<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Accepted<T> {
    fn into_response(self) -> Response {
        DataResponse::new(self.0).with_status(StatusCode::ACCEPTED)
    }
}

pub struct NoContent;

impl IntoResponse for NoContent {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn created_wraps_in_data() {
        let response = Created(json!({ "id": 7 })).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({ "data": { "id": 7 } }));
    }

    #[tokio::test]
    async fn accepted_and_message_shapes() {
        let response = Accepted(json!({ "report_id": "r1" })).into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(response).await["data"]["report_id"], "r1");

        let response = MessageResponse::new("Webhook received").into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "message": "Webhook received" }));
    }

    #[test]
    fn no_content_is_empty() {
        assert_eq!(NoContent.into_response().status(), StatusCode::NO_CONTENT);
    }
}
