use relay_core::prelude::*;

use super::Mode;
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("openai");
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

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

/// The OpenAI-compatible path for a mode. Shared by every provider that
/// exposes an OpenAI-shaped surface.
pub fn path(mode: Mode) -> Option<&'static str> {
	Some(match mode {
		Mode::ChatCompletions => "/v1/chat/completions",
		Mode::Completions => "/v1/completions",
		Mode::Responses => "/v1/responses",
		Mode::Anthropic => "/v1/chat/completions",
		Mode::Gemini => "/v1/chat/completions",
		Mode::Embeddings => "/v1/embeddings",
		Mode::Rerank => return None,
		Mode::AudioSpeech => "/v1/audio/speech",
		Mode::AudioTranscription => "/v1/audio/transcriptions",
		Mode::ImagesGenerations => "/v1/images/generations",
		Mode::Moderations => "/v1/moderations",
	})
}
