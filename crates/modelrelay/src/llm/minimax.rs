use relay_core::prelude::*;

use super::Mode;
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("minimax");
}

pub const DEFAULT_BASE_URL: &str = "https://api.minimaxi.com";

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
				Some("/v1/text/chatcompletion_v2")
			},
			Mode::AudioSpeech => Some("/v1/t2a_v2"),
			Mode::Embeddings => Some("/v1/embeddings"),
			_ => None,
		}
	}
}
