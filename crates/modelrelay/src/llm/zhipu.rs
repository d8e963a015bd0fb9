use relay_core::prelude::*;

use super::Mode;
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("zhipu");
}

pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn";

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

	/// The coding surface speaks Anthropic natively; everything else rides
	/// the paas v4 OpenAI-compatible endpoint.
	pub fn path_for(&self, mode: Mode) -> Option<&'static str> {
		match mode {
			Mode::Anthropic => Some("/api/anthropic/v1/messages"),
			Mode::ChatCompletions | Mode::Gemini => Some("/api/paas/v4/chat/completions"),
			Mode::Embeddings => Some("/api/paas/v4/embeddings"),
			Mode::ImagesGenerations => Some("/api/paas/v4/images/generations"),
			_ => None,
		}
	}
}
