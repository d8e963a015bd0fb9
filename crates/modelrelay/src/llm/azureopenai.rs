use relay_core::prelude::*;

use super::{AIError, Mode};
use crate::store::Channel;

const DEFAULT_API_VERSION: &str = "2024-02-01";

#[derive(Debug, Clone)]
pub struct Provider {
	pub base_url: Strng,
	pub key: Strng,
	pub api_version: Strng,
}

impl super::provider::ProviderName for Provider {
	const NAME: Strng = strng::literal!("azure.openai");
}

impl Provider {
	/// Azure keys are `{key}` or `{key}|{api-version}`.
	pub fn new(channel: &Channel) -> Result<Provider, AIError> {
		let base_url = channel
			.base_url
			.clone()
			.ok_or_else(|| AIError::KeyInvalid(strng::literal!("azure channels require a base url")))?;
		let (key, api_version) = match channel.key.split_once('|') {
			Some((key, version)) if !version.is_empty() => (strng::new(key), strng::new(version)),
			Some((key, _)) => (strng::new(key), strng::literal!(DEFAULT_API_VERSION)),
			None => (channel.key.clone(), strng::literal!(DEFAULT_API_VERSION)),
		};
		if key.is_empty() {
			return Err(AIError::KeyInvalid(strng::literal!("azure key is empty")));
		}
		Ok(Provider {
			base_url,
			key,
			api_version,
		})
	}

	/// `{base}/openai/deployments/{model}/{op}?api-version={v}`, with dots
	/// stripped from the model to match Azure deployment naming.
	pub fn path_for(&self, mode: Mode, model: &str) -> Option<String> {
		let op = match mode {
			Mode::ChatCompletions | Mode::Anthropic | Mode::Gemini => "chat/completions",
			Mode::Completions => "completions",
			Mode::Responses => "responses",
			Mode::Embeddings => "embeddings",
			Mode::ImagesGenerations => "images/generations",
			Mode::AudioSpeech => "audio/speech",
			Mode::AudioTranscription => "audio/transcriptions",
			_ => return None,
		};
		let deployment = model.replace('.', "");
		Some(format!(
			"/openai/deployments/{deployment}/{op}?api-version={}",
			self.api_version
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::ProviderKind;

	fn channel(key: &str) -> Channel {
		Channel {
			id: 1,
			name: strng::literal!("azure"),
			provider: ProviderKind::AzureOpenAi,
			base_url: Some(strng::literal!("https://x.openai.azure.com")),
			key: strng::new(key),
			supported_modes: vec![],
			supported_models: vec![],
			priority: 0,
		}
	}

	#[test]
	fn key_with_version_overrides_default() {
		let p = Provider::new(&channel("k|2024-03-01-preview")).unwrap();
		assert_eq!(p.key.as_str(), "k");
		assert_eq!(p.api_version.as_str(), "2024-03-01-preview");
		assert_eq!(
			p.path_for(Mode::ChatCompletions, "gpt-4.1").unwrap(),
			"/openai/deployments/gpt-41/chat/completions?api-version=2024-03-01-preview"
		);
	}

	#[test]
	fn bare_key_uses_default_version() {
		let p = Provider::new(&channel("k")).unwrap();
		assert_eq!(p.api_version.as_str(), DEFAULT_API_VERSION);
	}
}
