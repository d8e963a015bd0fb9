use relay_core::prelude::*;

use super::Mode;
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("baidu.qianfan");
}

pub const DEFAULT_BASE_URL: &str = "https://qianfan.baidubce.com";

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
			Mode::ChatCompletions | Mode::Anthropic | Mode::Gemini => Some("/v2/chat/completions"),
			Mode::Embeddings => Some("/v2/embeddings"),
			Mode::Rerank => Some("/v2/rerankers"),
			_ => None,
		}
	}
}
