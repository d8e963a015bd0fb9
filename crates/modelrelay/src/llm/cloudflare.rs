use relay_core::prelude::*;

use super::{AIError, Mode};
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub account_id: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("cloudflare");
}

pub const DEFAULT_BASE_URL: &str = "https://api.cloudflare.com";

impl Provider {
	/// Cloudflare keys are `{account_id}|{api_token}`.
	pub fn new(channel: &Channel) -> Result<Provider, AIError> {
		let (account_id, key) = channel.key.split_once('|').ok_or_else(|| {
			AIError::KeyInvalid(strng::literal!("cloudflare key must be accountID|token"))
		})?;
		if account_id.is_empty() || key.is_empty() {
			return Err(AIError::KeyInvalid(strng::literal!(
				"cloudflare account id or token is empty"
			)));
		}
		Ok(Provider {
			base_url: channel
				.base_url
				.clone()
				.unwrap_or_else(|| strng::literal!(DEFAULT_BASE_URL)),
			account_id: strng::new(account_id),
			key: strng::new(key),
		})
	}

	pub fn path_for(&self, mode: Mode) -> Option<String> {
		let op = match mode {
			Mode::ChatCompletions | Mode::Anthropic | Mode::Gemini => "v1/chat/completions",
			Mode::Embeddings => "v1/embeddings",
			_ => return None,
		};
		Some(format!(
			"/client/v4/accounts/{}/ai/{op}",
			self.account_id
		))
	}
}
