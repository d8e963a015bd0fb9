//! Inline-image resolution for multimodal requests. Remote images are
//! fetched up front (bounded concurrency, request-scoped cancellation via
//! the caller dropping the future) so translation itself stays pure.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use relay_core::prelude::*;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::AIError;
use super::types::gemini::Blob;

/// Hard cap on image parts per request.
pub const MAX_IMAGES: usize = 16;
/// In-flight fetch bound.
const CONCURRENT_FETCHES: usize = 3;

pub type ImageSet = HashMap<String, Blob>;

/// Decode a `data:` URI into its mime type and base64 payload.
pub fn decode_data_uri(url: &str) -> Option<Blob> {
	let rest = url.strip_prefix("data:")?;
	let (meta, data) = rest.split_once(',')?;
	let mime_type = meta
		.strip_suffix(";base64")
		.unwrap_or(meta)
		.split(';')
		.next()
		.filter(|m| !m.is_empty())
		.unwrap_or("image/png")
		.to_string();
	Some(Blob {
		mime_type,
		data: data.to_string(),
	})
}

/// Resolve one image reference against the prefetched set. `data:` URIs are
/// decoded inline; anything else must have been fetched already.
pub fn resolve(url: &str, images: &ImageSet) -> Result<Blob, AIError> {
	if url.starts_with("data:") {
		return decode_data_uri(url).ok_or_else(|| AIError::ImageFetch(format!("bad data uri: {url}")));
	}
	images
		.get(url)
		.cloned()
		.ok_or_else(|| AIError::ImageFetch(format!("image not prefetched: {url}")))
}

/// Fetch every remote image referenced by a request. At most
/// [`CONCURRENT_FETCHES`] downloads run at once; the first failure fails the
/// whole request. Dropping the returned future cancels in-flight fetches.
pub async fn load_images(
	client: &reqwest::Client,
	urls: Vec<String>,
) -> Result<ImageSet, AIError> {
	if urls.len() > MAX_IMAGES {
		return Err(AIError::TooManyImages(MAX_IMAGES));
	}
	let mut set = ImageSet::new();
	let mut seen = std::collections::HashSet::new();
	let semaphore = Arc::new(Semaphore::new(CONCURRENT_FETCHES));
	let mut tasks: JoinSet<Result<(String, Blob), AIError>> = JoinSet::new();
	for url in urls {
		if url.starts_with("data:") {
			continue;
		}
		if !seen.insert(url.clone()) {
			continue;
		}
		let client = client.clone();
		let semaphore = semaphore.clone();
		tasks.spawn(async move {
			let _permit = semaphore
				.acquire_owned()
				.await
				.map_err(|e| AIError::Internal(e.to_string()))?;
			let resp = client
				.get(&url)
				.send()
				.await
				.map_err(|e| AIError::ImageFetch(e.to_string()))?;
			if !resp.status().is_success() {
				return Err(AIError::ImageFetch(format!(
					"{url}: upstream returned {}",
					resp.status()
				)));
			}
			let mime_type = resp
				.headers()
				.get(::http::header::CONTENT_TYPE)
				.and_then(|v| v.to_str().ok())
				.unwrap_or("image/png")
				.split(';')
				.next()
				.unwrap_or("image/png")
				.to_string();
			let bytes = resp
				.bytes()
				.await
				.map_err(|e| AIError::ImageFetch(e.to_string()))?;
			Ok((
				url,
				Blob {
					mime_type,
					data: BASE64.encode(&bytes),
				},
			))
		});
	}
	while let Some(joined) = tasks.join_next().await {
		let (url, blob) = joined.map_err(|e| AIError::Internal(e.to_string()))??;
		set.insert(url, blob);
	}
	Ok(set)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn data_uri_decodes_mime_and_payload() {
		let blob = decode_data_uri("data:image/jpeg;base64,aGVsbG8=").unwrap();
		assert_eq!(blob.mime_type, "image/jpeg");
		assert_eq!(blob.data, "aGVsbG8=");
	}

	#[test]
	fn data_uri_defaults_mime() {
		let blob = decode_data_uri("data:;base64,aGVsbG8=").unwrap();
		assert_eq!(blob.mime_type, "image/png");
	}

	#[tokio::test]
	async fn too_many_images_rejected() {
		let client = reqwest::Client::new();
		let urls = (0..MAX_IMAGES + 1)
			.map(|i| format!("https://example.com/{i}.png"))
			.collect();
		let err = load_images(&client, urls).await.unwrap_err();
		assert!(matches!(err, AIError::TooManyImages(_)));
	}
}
