use relay_core::prelude::*;
use serde::Deserialize;

use super::{AIError, Mode};
use crate::store::Channel;

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("siliconflow");
}

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn";

#[derive(Deserialize)]
struct UserInfoResponse {
	data: UserInfoData,
}

#[derive(Deserialize)]
struct UserInfoData {
	#[serde(rename = "totalBalance")]
	total_balance: String,
}

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
			Mode::Rerank => Some("/v1/rerank"),
			_ => super::openai::path(mode),
		}
	}

	/// Remaining credit from the account endpoint.
	pub async fn balance(&self, client: &reqwest::Client) -> Result<f64, AIError> {
		let resp = client
			.get(format!("{}/v1/user/info", self.base_url))
			.bearer_auth(self.key.as_str())
			.send()
			.await
			.map_err(|e| AIError::Transport(e.to_string()))?;
		if !resp.status().is_success() {
			return Err(AIError::KeyInvalid(strng::format!(
				"balance query returned {}",
				resp.status()
			)));
		}
		let info: UserInfoResponse = resp
			.json()
			.await
			.map_err(|e| AIError::Transport(e.to_string()))?;
		info
			.data
			.total_balance
			.parse::<f64>()
			.map_err(|e| AIError::Internal(format!("bad balance payload: {e}")))
	}
}
