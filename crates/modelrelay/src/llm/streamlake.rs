use relay_core::prelude::*;

use super::{AIError, Mode};
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("streamlake");
}

pub const DEFAULT_BASE_URL: &str = "https://wanqing.streamlakeapi.com";

/// The upstream reports burst throttling as a 400 with this exact (sic)
/// message fragment.
const RATE_MESSAGE: &str = "Request rate increased too quickl";

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

	pub fn path_for(&self, mode: Mode) -> Option<&'static str> {
		match mode {
			Mode::ChatCompletions | Mode::Anthropic | Mode::Gemini => {
				Some("/api/gateway/v1/chat/completions")
			},
			_ => None,
		}
	}

	/// Rewrite the provider's disguised throttling error into a real 429.
	pub fn classify_error(&self, status: u16, body: &[u8]) -> Option<AIError> {
		if status == 400
			&& let Ok(text) = std::str::from_utf8(body)
			&& text.contains(RATE_MESSAGE)
		{
			return Some(AIError::RateLimited(
				"upstream request rate exceeded".to_string(),
			));
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::ProviderKind;

	#[test]
	fn throttle_400_becomes_rate_limit() {
		let p = Provider::new(&Channel {
			id: 1,
			name: strng::literal!("sl"),
			provider: ProviderKind::StreamLake,
			base_url: None,
			key: strng::literal!("k"),
			supported_modes: vec![],
			supported_models: vec![],
			priority: 0,
		});
		let body = br#"{"error":{"message":"Request rate increased too quickl, please retry"}}"#;
		assert!(matches!(
			p.classify_error(400, body),
			Some(AIError::RateLimited(_))
		));
		assert!(p.classify_error(400, b"other").is_none());
		assert!(p.classify_error(500, body).is_none());
	}
}
