use relay_core::prelude::*;

use super::Mode;
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Option<Strng>,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("ollama");
}

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

impl Provider {
	pub fn new(channel: &Channel) -> Provider {
		Provider {
			base_url: channel
				.base_url
				.clone()
				.unwrap_or_else(|| strng::literal!(DEFAULT_BASE_URL)),
			key: (!channel.key.is_empty()).then(|| channel.key.clone()),
		}
	}

	pub fn path_for(&self, mode: Mode) -> Option<&'static str> {
		match mode {
			Mode::ChatCompletions | Mode::Anthropic | Mode::Gemini => Some("/api/chat"),
			Mode::Completions => Some("/api/generate"),
			Mode::Embeddings => Some("/api/embed"),
			_ => None,
		}
	}
}
