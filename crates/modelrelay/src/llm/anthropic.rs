use ::http::HeaderMap;
use relay_core::prelude::*;

use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("anthropic");
}

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_PATH: &str = "/v1/messages";
// https://docs.anthropic.com/en/api/versioning
pub const API_VERSION: &str = "2023-06-01";

/// Beta flags we know the upstream accepts; anything else from the client is
/// stripped rather than forwarded.
const SUPPORTED_BETA_FLAGS: &[&str] = &[
	"prompt-caching-2024-07-31",
	"computer-use-2024-10-22",
	"computer-use-2025-01-24",
	"token-efficient-tools-2025-02-19",
	"output-128k-2025-02-19",
	"context-1m-2025-08-07",
];

impl Provider {
	pub fn new(channel: &Channel) -> Provider {
		Provider {
			base_url: channel
				.base_url
				.clone()
				.unwrap_or_else(|| strng::literal!(DEFAULT_BASE_URL)),
			key: channel.key.clone(),
		}
	}
}

/// Collect the client's `anthropic-beta` values, dropping unsupported flags.
pub fn filter_beta_headers(incoming: &HeaderMap) -> Option<String> {
	let flags: Vec<&str> = incoming
		.get_all("anthropic-beta")
		.iter()
		.filter_map(|v| v.to_str().ok())
		.flat_map(|v| v.split(','))
		.map(|f| f.trim())
		.filter(|f| SUPPORTED_BETA_FLAGS.contains(f))
		.collect();
	(!flags.is_empty()).then(|| flags.join(","))
}

#[cfg(test)]
mod tests {
	use ::http::HeaderValue;

	use super::*;

	#[test]
	fn beta_headers_filtered_to_allowlist() {
		let mut headers = HeaderMap::new();
		headers.append(
			"anthropic-beta",
			HeaderValue::from_static("prompt-caching-2024-07-31, not-a-real-flag"),
		);
		headers.append(
			"anthropic-beta",
			HeaderValue::from_static("computer-use-2024-10-22"),
		);
		assert_eq!(
			filter_beta_headers(&headers).unwrap(),
			"prompt-caching-2024-07-31,computer-use-2024-10-22"
		);

		let empty = HeaderMap::new();
		assert!(filter_beta_headers(&empty).is_none());
	}
}
