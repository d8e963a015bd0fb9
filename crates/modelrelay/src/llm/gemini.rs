use relay_core::prelude::*;

use super::Mode;
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
	/// API surface version; a handful of models are only on `v1`.
	pub version: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("gcp.gemini");
}

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

impl Provider {
	pub fn new(channel: &Channel) -> Provider {
		Provider {
			base_url: channel
				.base_url
				.clone()
				.unwrap_or_else(|| strng::literal!(DEFAULT_BASE_URL)),
			key: channel.key.clone(),
			version: strng::literal!("v1beta"),
		}
	}

	pub fn path_for(&self, mode: Mode, model: &str, streaming: bool) -> Option<String> {
		match mode {
			Mode::ChatCompletions | Mode::Anthropic | Mode::Gemini | Mode::Completions => {
				let op = if streaming {
					"streamGenerateContent?alt=sse"
				} else {
					"generateContent"
				};
				Some(format!("/{}/models/{model}:{op}", self.version))
			},
			Mode::Embeddings => Some(format!("/{}/models/{model}:batchEmbedContents", self.version)),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::ProviderKind;

	#[test]
	fn stream_switches_operation() {
		let p = Provider::new(&Channel {
			id: 1,
			name: strng::literal!("gem"),
			provider: ProviderKind::Gemini,
			base_url: None,
			key: strng::literal!("k"),
			supported_modes: vec![],
			supported_models: vec![],
			priority: 0,
		});
		assert_eq!(
			p.path_for(Mode::Gemini, "gemini-2.5-pro", false).unwrap(),
			"/v1beta/models/gemini-2.5-pro:generateContent"
		);
		assert_eq!(
			p.path_for(Mode::Gemini, "gemini-2.5-pro", true).unwrap(),
			"/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
		);
	}
}
