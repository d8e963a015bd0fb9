//! The adaptor capability set, realized as a tagged variant over per-provider
//! configs. Shared OpenAI-shaped behavior is the default match arm; specific
//! providers override URL templating, auth, and error classification.

use ::http::{HeaderMap, HeaderValue, Method};
use relay_core::prelude::*;

use super::{
	AIError, Meta, Mode, anthropic, azureopenai, baidu, cloudflare, gemini,
	is_responses_only_model, minimax, ollama, openai, siliconflow, streamlake, vertex, zhipu,
};
use crate::store::{Channel, ProviderKind};

/// Implemented by every provider config to pin its canonical name.
pub trait ProviderName {
	const NAME: Strng;
}

/// The wire dialect spoken at the upstream for a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamDialect {
	OpenAiChat,
	Responses,
	Claude,
	Gemini,
	Ollama,
	/// Auxiliary surface; body forwarded untranslated.
	Passthrough,
}

/// Static description surfaced by the admin UI.
#[derive(Debug, Clone, Copy)]
pub struct Metadata {
	pub readme: &'static str,
	pub models: &'static [&'static str],
	pub key_help: &'static str,
}

#[derive(Debug, Clone)]
pub enum AIProvider {
	OpenAI(openai::Provider),
	AzureOpenAI(azureopenai::Provider),
	Anthropic(anthropic::Provider),
	Gemini(gemini::Provider),
	Vertex(vertex::Provider),
	Ollama(ollama::Provider),
	Zhipu(zhipu::Provider),
	Baidu(baidu::Provider),
	SiliconFlow(siliconflow::Provider),
	MiniMax(minimax::Provider),
	StreamLake(streamlake::Provider),
	Cloudflare(cloudflare::Provider),
}

impl AIProvider {
	pub fn from_channel(channel: &Channel) -> Result<AIProvider, AIError> {
		Ok(match channel.provider {
			ProviderKind::OpenAi => AIProvider::OpenAI(openai::Provider::new(channel)),
			ProviderKind::AzureOpenAi => AIProvider::AzureOpenAI(azureopenai::Provider::new(channel)?),
			ProviderKind::Anthropic => AIProvider::Anthropic(anthropic::Provider::new(channel)),
			ProviderKind::Gemini => AIProvider::Gemini(gemini::Provider::new(channel)),
			ProviderKind::VertexAi => AIProvider::Vertex(vertex::Provider::new(channel)?),
			ProviderKind::Ollama => AIProvider::Ollama(ollama::Provider::new(channel)),
			ProviderKind::Zhipu => AIProvider::Zhipu(zhipu::Provider::new(channel)),
			ProviderKind::Baidu => AIProvider::Baidu(baidu::Provider::new(channel)),
			ProviderKind::SiliconFlow => AIProvider::SiliconFlow(siliconflow::Provider::new(channel)),
			ProviderKind::MiniMax => AIProvider::MiniMax(minimax::Provider::new(channel)),
			ProviderKind::StreamLake => AIProvider::StreamLake(streamlake::Provider::new(channel)),
			ProviderKind::Cloudflare => AIProvider::Cloudflare(cloudflare::Provider::new(channel)?),
		})
	}

	/// Format-check a channel key without keeping the adaptor.
	pub fn validate_channel_key(channel: &Channel) -> Result<(), AIError> {
		if channel.key.is_empty() && channel.provider != ProviderKind::Ollama {
			return Err(AIError::KeyInvalid(strng::literal!("channel key is empty")));
		}
		Self::from_channel(channel).map(|_| ())
	}

	pub fn name(&self) -> Strng {
		match self {
			AIProvider::OpenAI(_) => openai::Provider::NAME,
			AIProvider::AzureOpenAI(_) => azureopenai::Provider::NAME,
			AIProvider::Anthropic(_) => anthropic::Provider::NAME,
			AIProvider::Gemini(_) => gemini::Provider::NAME,
			AIProvider::Vertex(_) => vertex::Provider::NAME,
			AIProvider::Ollama(_) => ollama::Provider::NAME,
			AIProvider::Zhipu(_) => zhipu::Provider::NAME,
			AIProvider::Baidu(_) => baidu::Provider::NAME,
			AIProvider::SiliconFlow(_) => siliconflow::Provider::NAME,
			AIProvider::MiniMax(_) => minimax::Provider::NAME,
			AIProvider::StreamLake(_) => streamlake::Provider::NAME,
			AIProvider::Cloudflare(_) => cloudflare::Provider::NAME,
		}
	}

	pub fn default_base_url(&self) -> &'static str {
		match self {
			AIProvider::OpenAI(_) => openai::DEFAULT_BASE_URL,
			AIProvider::AzureOpenAI(_) => "",
			AIProvider::Anthropic(_) => anthropic::DEFAULT_BASE_URL,
			AIProvider::Gemini(_) => gemini::DEFAULT_BASE_URL,
			AIProvider::Vertex(_) => "",
			AIProvider::Ollama(_) => ollama::DEFAULT_BASE_URL,
			AIProvider::Zhipu(_) => zhipu::DEFAULT_BASE_URL,
			AIProvider::Baidu(_) => baidu::DEFAULT_BASE_URL,
			AIProvider::SiliconFlow(_) => siliconflow::DEFAULT_BASE_URL,
			AIProvider::MiniMax(_) => minimax::DEFAULT_BASE_URL,
			AIProvider::StreamLake(_) => streamlake::DEFAULT_BASE_URL,
			AIProvider::Cloudflare(_) => cloudflare::DEFAULT_BASE_URL,
		}
	}

	pub fn support_mode(&self, mode: Mode) -> bool {
		match self {
			AIProvider::OpenAI(_) | AIProvider::AzureOpenAI(_) => true,
			AIProvider::Anthropic(_) => matches!(
				mode,
				Mode::Anthropic | Mode::ChatCompletions | Mode::Completions
			),
			AIProvider::Gemini(_) | AIProvider::Vertex(_) => matches!(
				mode,
				Mode::Gemini | Mode::ChatCompletions | Mode::Anthropic | Mode::Embeddings
			),
			AIProvider::Ollama(_) => {
				matches!(mode, Mode::ChatCompletions | Mode::Completions | Mode::Embeddings)
			},
			AIProvider::Zhipu(_) => matches!(
				mode,
				Mode::ChatCompletions | Mode::Anthropic | Mode::Embeddings | Mode::ImagesGenerations
			),
			AIProvider::Baidu(_) => matches!(
				mode,
				Mode::ChatCompletions | Mode::Embeddings | Mode::Rerank
			),
			AIProvider::SiliconFlow(_) => !matches!(mode, Mode::Responses),
			AIProvider::MiniMax(_) => matches!(
				mode,
				Mode::ChatCompletions | Mode::AudioSpeech | Mode::Embeddings
			),
			AIProvider::StreamLake(_) => matches!(mode, Mode::ChatCompletions),
			AIProvider::Cloudflare(_) => matches!(mode, Mode::ChatCompletions | Mode::Embeddings),
		}
	}

	/// Which dialect the upstream call will speak for this request. This is
	/// the pivot the translator dispatch keys on.
	pub fn dialect(&self, mode: Mode, model: &str) -> UpstreamDialect {
		if matches!(
			mode,
			Mode::Embeddings
				| Mode::Rerank
				| Mode::AudioSpeech
				| Mode::AudioTranscription
				| Mode::ImagesGenerations
				| Mode::Moderations
		) {
			return UpstreamDialect::Passthrough;
		}
		match self {
			AIProvider::OpenAI(_) | AIProvider::AzureOpenAI(_) => {
				if mode == Mode::Responses || is_responses_only_model(model) {
					UpstreamDialect::Responses
				} else {
					UpstreamDialect::OpenAiChat
				}
			},
			AIProvider::Anthropic(_) => UpstreamDialect::Claude,
			AIProvider::Gemini(_) => UpstreamDialect::Gemini,
			AIProvider::Vertex(_) => {
				if vertex::Provider::is_anthropic_model(model) {
					UpstreamDialect::Claude
				} else {
					UpstreamDialect::Gemini
				}
			},
			AIProvider::Ollama(_) => UpstreamDialect::Ollama,
			AIProvider::Zhipu(_) => {
				if mode == Mode::Anthropic {
					UpstreamDialect::Claude
				} else {
					UpstreamDialect::OpenAiChat
				}
			},
			_ => UpstreamDialect::OpenAiChat,
		}
	}

	/// Absolute upstream URL for the request, including provider-specific
	/// path templating.
	pub fn request_url(&self, meta: &Meta) -> Result<(Method, String), AIError> {
		let model = meta.actual_model.as_str();
		let streaming = meta.bag.stream;
		let unsupported = || AIError::UnsupportedMode(meta.mode);
		let url = match self {
			AIProvider::OpenAI(p) => format!(
				"{}{}",
				p.base_url,
				openai::path(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::AzureOpenAI(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode, model).ok_or_else(unsupported)?
			),
			AIProvider::Anthropic(p) => format!("{}{}", p.base_url, anthropic::DEFAULT_PATH),
			AIProvider::Gemini(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode, model, streaming)
					.ok_or_else(unsupported)?
			),
			AIProvider::Vertex(p) => format!(
				"https://{}{}",
				p.host(),
				p.path_for(meta.mode, model, streaming)
					.ok_or_else(unsupported)?
			),
			AIProvider::Ollama(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::Zhipu(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::Baidu(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::SiliconFlow(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::MiniMax(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::StreamLake(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
			AIProvider::Cloudflare(p) => format!(
				"{}{}",
				p.base_url,
				p.path_for(meta.mode).ok_or_else(unsupported)?
			),
		};
		Ok((Method::POST, url))
	}

	/// Apply authentication and provider-required headers. Vertex ADC
	/// channels exchange their credential for a bearer token on first use.
	pub async fn setup_headers(
		&self,
		meta: &Meta,
		headers: &mut HeaderMap,
		client: &reqwest::Client,
		incoming: Option<&HeaderMap>,
	) -> Result<(), AIError> {
		let bearer = |headers: &mut HeaderMap, key: &str| -> Result<(), AIError> {
			let mut v = HeaderValue::from_str(&format!("Bearer {key}"))
				.map_err(|_| AIError::KeyInvalid(strng::literal!("key is not a valid header value")))?;
			v.set_sensitive(true);
			headers.insert(::http::header::AUTHORIZATION, v);
			Ok(())
		};
		match self {
			AIProvider::OpenAI(p) => bearer(headers, &p.key)?,
			AIProvider::Zhipu(p) => bearer(headers, &p.key)?,
			AIProvider::Baidu(p) => bearer(headers, &p.key)?,
			AIProvider::SiliconFlow(p) => bearer(headers, &p.key)?,
			AIProvider::MiniMax(p) => bearer(headers, &p.key)?,
			AIProvider::StreamLake(p) => bearer(headers, &p.key)?,
			AIProvider::Cloudflare(p) => bearer(headers, &p.key)?,
			AIProvider::Ollama(p) => {
				if let Some(key) = &p.key {
					bearer(headers, key)?;
				}
			},
			AIProvider::AzureOpenAI(p) => {
				let mut v = HeaderValue::from_str(&p.key)
					.map_err(|_| AIError::KeyInvalid(strng::literal!("key is not a valid header value")))?;
				v.set_sensitive(true);
				headers.insert("api-key", v);
			},
			AIProvider::Anthropic(p) => {
				let mut v = HeaderValue::from_str(&p.key)
					.map_err(|_| AIError::KeyInvalid(strng::literal!("key is not a valid header value")))?;
				v.set_sensitive(true);
				headers.insert("x-api-key", v);
				headers.insert(
					"anthropic-version",
					HeaderValue::from_static(anthropic::API_VERSION),
				);
				if let Some(incoming) = incoming
					&& let Some(beta) = anthropic::filter_beta_headers(incoming)
					&& let Ok(v) = HeaderValue::from_str(&beta)
				{
					headers.insert("anthropic-beta", v);
				}
			},
			AIProvider::Gemini(p) => {
				let mut v = HeaderValue::from_str(&p.key)
					.map_err(|_| AIError::KeyInvalid(strng::literal!("key is not a valid header value")))?;
				v.set_sensitive(true);
				headers.insert("x-goog-api-key", v);
			},
			AIProvider::Vertex(p) => match &p.auth {
				vertex::VertexAuth::ApiKey(key) => {
					let mut v = HeaderValue::from_str(key).map_err(|_| {
						AIError::KeyInvalid(strng::literal!("key is not a valid header value"))
					})?;
					v.set_sensitive(true);
					headers.insert("x-goog-api-key", v);
				},
				vertex::VertexAuth::Adc(adc) => {
					let token = adc.bearer(client).await?;
					bearer(headers, &token)?;
				},
			},
		}
		let _ = meta;
		Ok(())
	}

	/// Provider-specific rewrites of upstream error responses. Returns None
	/// when the generic upstream-error path should handle it.
	pub fn classify_error(&self, status: u16, body: &[u8]) -> Option<AIError> {
		match self {
			AIProvider::StreamLake(p) => p.classify_error(status, body),
			_ => None,
		}
	}

	pub async fn get_balance(&self, client: &reqwest::Client) -> Result<f64, AIError> {
		match self {
			AIProvider::SiliconFlow(p) => p.balance(client).await,
			_ => Err(AIError::NotImplemented),
		}
	}

	pub fn metadata(&self) -> Metadata {
		match self {
			AIProvider::OpenAI(_) => Metadata {
				readme: "OpenAI platform API. Uses bearer authentication.",
				models: &["gpt-4o", "gpt-4.1", "gpt-5", "o4-mini", "text-embedding-3-small"],
				key_help: "sk-... API key",
			},
			AIProvider::AzureOpenAI(_) => Metadata {
				readme: "Azure OpenAI deployments; the channel base URL is the resource endpoint.",
				models: &["gpt-4o", "gpt-4.1"],
				key_help: "{key} or {key}|{api-version}",
			},
			AIProvider::Anthropic(_) => Metadata {
				readme: "Anthropic Messages API.",
				models: &["claude-sonnet-4-5", "claude-opus-4-1", "claude-haiku-4-5"],
				key_help: "sk-ant-... API key",
			},
			AIProvider::Gemini(_) => Metadata {
				readme: "Google AI Studio (Gemini) generateContent API.",
				models: &["gemini-2.5-pro", "gemini-2.5-flash", "gemini-3-pro-preview"],
				key_help: "AI Studio API key",
			},
			AIProvider::Vertex(_) => Metadata {
				readme: "Google Vertex AI publisher models, Gemini and Anthropic.",
				models: &["gemini-2.5-pro", "claude-sonnet-4-5"],
				key_help: "{region}|{adcJSON} or {region}|{apiKey} or {region}|{projectID}|{apiKey}",
			},
			AIProvider::Ollama(_) => Metadata {
				readme: "Local Ollama daemon.",
				models: &["llama3.3", "qwen3", "nomic-embed-text"],
				key_help: "optional bearer token",
			},
			AIProvider::Zhipu(_) => Metadata {
				readme: "Zhipu BigModel; coding models use the Anthropic surface.",
				models: &["glm-4.6", "glm-4.5-air"],
				key_help: "API key from bigmodel.cn",
			},
			AIProvider::Baidu(_) => Metadata {
				readme: "Baidu Qianfan v2 OpenAI-compatible API.",
				models: &["ernie-4.0-8k", "ernie-speed-128k"],
				key_help: "bearer API key",
			},
			AIProvider::SiliconFlow(_) => Metadata {
				readme: "SiliconFlow hosted open models; supports rerank and balance queries.",
				models: &["deepseek-ai/DeepSeek-V3", "Qwen/Qwen3-235B-A22B"],
				key_help: "sk-... API key",
			},
			AIProvider::MiniMax(_) => Metadata {
				readme: "MiniMax chat and speech APIs.",
				models: &["MiniMax-M2", "abab6.5s-chat"],
				key_help: "API key",
			},
			AIProvider::StreamLake(_) => Metadata {
				readme: "StreamLake (Kuaishou) gateway endpoints.",
				models: &["KAT-Coder"],
				key_help: "API key",
			},
			AIProvider::Cloudflare(_) => Metadata {
				readme: "Cloudflare Workers AI, OpenAI-compatible surface.",
				models: &["@cf/meta/llama-3.1-70b-instruct"],
				key_help: "{account_id}|{api_token}",
			},
		}
	}
}
