pub use axum::body::Body;

pub type Request = ::http::Request<Body>;
pub type Response = ::http::Response<Body>;

/// Largest request body we will buffer before translation.
pub const REQUEST_BUFFER_LIMIT: usize = 2_097_152;

/// Buffer a request or response body, bounded.
pub async fn read_body(body: Body, limit: usize) -> Result<bytes::Bytes, axum_core::Error> {
	axum::body::to_bytes(body, limit).await
}
