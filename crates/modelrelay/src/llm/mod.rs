//! The LLM request lifecycle: mode resolution, per-request context, provider
//! adaptors and the error taxonomy every layer reports through.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use ::http::StatusCode;
use chrono::{DateTime, Utc};
use relay_core::prelude::*;
use serde_json::json;
use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};
use uuid::Uuid;

use crate::serdes::{apply, schema};
use crate::store::{Channel, ChannelPicker, ModelConfig};

pub mod anthropic;
pub mod azureopenai;
pub mod baidu;
pub mod cloudflare;
pub mod gemini;
pub mod minimax;
pub mod ollama;
pub mod openai;
pub mod siliconflow;
pub mod streamlake;
pub mod vertex;
pub mod zhipu;

pub mod conversion;
pub mod multimodal;
pub mod provider;
pub mod types;

pub use provider::{AIProvider, Metadata, UpstreamDialect};

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;

/// The client protocol variant a request arrived in.
#[apply(schema!)]
#[derive(Copy, PartialEq, Eq, Hash)]
pub enum Mode {
	ChatCompletions,
	Completions,
	Responses,
	Anthropic,
	Gemini,
	Embeddings,
	Rerank,
	AudioSpeech,
	AudioTranscription,
	ImagesGenerations,
	Moderations,
}

/// The protocol family used for bodies and errors on a given side of the
/// proxy. Several modes share a family (e.g. legacy completions ride the
/// chat dialect for error shaping).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dialect {
	Chat,
	Responses,
	Claude,
	Gemini,
	/// Auxiliary endpoints with passthrough bodies (embeddings, audio, ...).
	Aux,
}

impl Mode {
	pub fn dialect(self) -> Dialect {
		match self {
			Mode::ChatCompletions | Mode::Completions => Dialect::Chat,
			Mode::Responses => Dialect::Responses,
			Mode::Anthropic => Dialect::Claude,
			Mode::Gemini => Dialect::Gemini,
			Mode::Embeddings
			| Mode::Rerank
			| Mode::AudioSpeech
			| Mode::AudioTranscription
			| Mode::ImagesGenerations
			| Mode::Moderations => Dialect::Aux,
		}
	}

	/// The client-facing route for this mode, used in consume logs.
	pub fn endpoint(self) -> &'static str {
		match self {
			Mode::ChatCompletions => "/v1/chat/completions",
			Mode::Completions => "/v1/completions",
			Mode::Responses => "/v1/responses",
			Mode::Anthropic => "/v1/messages",
			Mode::Gemini => "/v1beta/models/{model}:generateContent",
			Mode::Embeddings => "/v1/embeddings",
			Mode::Rerank => "/v1/rerank",
			Mode::AudioSpeech => "/v1/audio/speech",
			Mode::AudioTranscription => "/v1/audio/transcriptions",
			Mode::ImagesGenerations => "/v1/images/generations",
			Mode::Moderations => "/v1/moderations",
		}
	}
}

/// Token counts established before dispatch, used for quota checks and as
/// the fallback when the upstream omits usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestUsage {
	pub input_tokens: u64,
	pub image_input_tokens: u64,
}

/// Request-scoped toggles discovered during translation.
#[derive(Debug, Clone, Default)]
pub struct MetaBag {
	pub stream: bool,
	/// Arms the `</think>` splitter on OpenAI-shaped streams
	/// (deepseek-reasoner and friends).
	pub reasoning_split: bool,
	/// The caller explicitly opted out of `stream_options.include_usage`.
	pub include_usage_opt_out: bool,
	/// Image-generation models inline base64 into SSE events and need the
	/// large scanner buffer.
	pub image_model: bool,
}

/// Billing identities attached by the (out of scope) auth middleware.
#[derive(Debug, Clone, Default)]
pub struct Caller {
	pub group: Strng,
	pub token_id: i64,
	pub token_name: Strng,
	pub ip: Strng,
}

/// Per-request context. Exclusively owned by the handling task; destroyed
/// when the consume log is enqueued.
#[derive(Debug, Clone)]
pub struct Meta {
	pub request_id: Strng,
	pub origin_model: Strng,
	/// Model name actually sent upstream (after channel mapping).
	pub actual_model: Strng,
	pub mode: Mode,
	pub channel: Arc<Channel>,
	pub model_config: Arc<ModelConfig>,
	pub request_timeout: Duration,
	pub request_usage: RequestUsage,
	pub request_at: DateTime<Utc>,
	pub retry_at: Option<DateTime<Utc>>,
	pub retry_times: u32,
	pub caller: Caller,
	pub bag: MetaBag,
}

/// Telemetry collected while a translated stream flows to the client.
/// Shared between the proxy and the stream translators through an
/// [`crate::telemetry::AsyncLog`].
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
	pub usage: crate::billing::Usage,
	pub first_token: Option<DateTime<Utc>>,
	pub provider_model: Option<Strng>,
	/// Concatenated output text, kept for post-hoc token counting when the
	/// upstream never reports usage.
	pub completion: String,
}

impl StreamInfo {
	pub fn saw_token(&mut self) {
		if self.first_token.is_none() {
			self.first_token = Some(Utc::now());
		}
	}
}

/// Resolves (mode, model) to a channel and constructs the per-request Meta.
/// Selection policy itself comes from the routing collaborator.
pub struct Dispatcher {
	pub picker: Arc<dyn ChannelPicker>,
	pub models: HashMap<Strng, Arc<ModelConfig>>,
	pub default_timeout: Duration,
}

impl Dispatcher {
	pub fn new(picker: Arc<dyn ChannelPicker>, models: Vec<ModelConfig>) -> Dispatcher {
		Dispatcher {
			picker,
			models: models
				.into_iter()
				.map(|m| (m.name.clone(), Arc::new(m)))
				.collect(),
			default_timeout: Duration::from_secs(600),
		}
	}

	pub fn resolve(&self, mode: Mode, model: &str, caller: Caller) -> Result<Meta, AIError> {
		let model_config = self
			.models
			.get(model)
			.cloned()
			.ok_or_else(|| AIError::ModelNotSupported(strng::new(model)))?;
		let channel = self
			.picker
			.pick(mode, model)
			.ok_or(AIError::NoChannelAvailable)?;
		Ok(Meta {
			request_id: strng::new(Uuid::new_v4().to_string()),
			origin_model: strng::new(model),
			actual_model: strng::new(model),
			mode,
			channel,
			model_config,
			request_timeout: self.default_timeout,
			request_usage: RequestUsage::default(),
			request_at: Utc::now(),
			retry_at: None,
			retry_times: 0,
			caller,
			bag: MetaBag::default(),
		})
	}
}

#[derive(thiserror::Error, Debug)]
pub enum AIError {
	#[error("no channel available for this model")]
	NoChannelAvailable,
	#[error("model {0} is not supported")]
	ModelNotSupported(Strng),
	#[error("mode {0:?} is not supported by this provider")]
	UnsupportedMode(Mode),
	#[error("no adaptor for channel type")]
	AdaptorNotFound,
	#[error("invalid channel key: {0}")]
	KeyInvalid(Strng),
	#[error("missing field: {0}")]
	MissingField(Strng),
	#[error("request was too large")]
	RequestTooLarge,
	#[error("response was too large")]
	ResponseTooLarge,
	#[error("unsupported content")]
	UnsupportedContent,
	#[error("too many images in request (max {0})")]
	TooManyImages(usize),
	#[error("unsupported conversion to {0}")]
	UnsupportedConversion(Strng),
	#[error("rate limited by upstream: {0}")]
	RateLimited(String),
	#[error("failed to parse request: {0}")]
	RequestParsing(#[source] serde_json::Error),
	#[error("failed to marshal request: {0}")]
	RequestMarshal(#[source] serde_json::Error),
	#[error("failed to parse response: {0}")]
	ResponseParsing(#[source] serde_json::Error),
	#[error("failed to marshal response: {0}")]
	ResponseMarshal(#[source] serde_json::Error),
	#[error("failed to fetch image: {0}")]
	ImageFetch(String),
	#[error("upstream transport error: {0}")]
	Transport(String),
	#[error("not implemented")]
	NotImplemented,
	#[error("internal error: {0}")]
	Internal(String),
}

impl AIError {
	pub fn status(&self) -> StatusCode {
		match self {
			AIError::NoChannelAvailable => StatusCode::SERVICE_UNAVAILABLE,
			AIError::ModelNotSupported(_)
			| AIError::UnsupportedMode(_)
			| AIError::AdaptorNotFound
			| AIError::MissingField(_)
			| AIError::UnsupportedContent
			| AIError::TooManyImages(_)
			| AIError::UnsupportedConversion(_)
			| AIError::RequestParsing(_) => StatusCode::BAD_REQUEST,
			AIError::KeyInvalid(_) => StatusCode::UNAUTHORIZED,
			AIError::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
			AIError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
			AIError::Transport(_) => StatusCode::BAD_GATEWAY,
			AIError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
			AIError::ResponseTooLarge
			| AIError::RequestMarshal(_)
			| AIError::ResponseParsing(_)
			| AIError::ResponseMarshal(_)
			| AIError::ImageFetch(_)
			| AIError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Machine-readable error kind, stable across dialects.
	pub fn kind(&self) -> &'static str {
		match self {
			AIError::NoChannelAvailable => "no_channel_available",
			AIError::ModelNotSupported(_) => "model_not_supported",
			AIError::UnsupportedMode(_) => "unsupported_mode",
			AIError::AdaptorNotFound => "adaptor_not_found",
			AIError::KeyInvalid(_) => "invalid_key",
			AIError::RateLimited(_) => "rate_limit_error",
			AIError::MissingField(_)
			| AIError::RequestTooLarge
			| AIError::UnsupportedContent
			| AIError::TooManyImages(_)
			| AIError::UnsupportedConversion(_)
			| AIError::RequestParsing(_) => "bad_request",
			AIError::Transport(_) => "upstream_error",
			AIError::NotImplemented => "not_implemented",
			_ => "internal_error",
		}
	}

	/// Render the error body in the client's native dialect.
	pub fn to_body(&self, dialect: Dialect) -> serde_json::Value {
		let status = self.status().as_u16();
		let message = self.to_string();
		match dialect {
			Dialect::Claude => json!({
				"type": "error",
				"error": {"type": self.kind(), "message": message},
			}),
			Dialect::Gemini => json!({
				"error": {
					"code": status,
					"message": message,
					"status": self.kind(),
				},
			}),
			_ => json!({
				"error": {
					"message": message,
					"type": self.kind(),
					"code": status,
				},
			}),
		}
	}
}

/// Models that only exist behind the Responses API; chat-completions input
/// for them is translated up.
pub fn is_responses_only_model(model: &str) -> bool {
	model.starts_with("gpt-5-codex") || model.starts_with("gpt-5-pro")
}

fn bpe_for(tokenizer: Tokenizer) -> &'static CoreBPE {
	match tokenizer {
		Tokenizer::O200kHarmony => tiktoken_rs::o200k_harmony_singleton(),
		Tokenizer::O200kBase => tiktoken_rs::o200k_base_singleton(),
		Tokenizer::Cl100kBase => tiktoken_rs::cl100k_base_singleton(),
		Tokenizer::R50kBase | Tokenizer::P50kBase | Tokenizer::P50kEdit | Tokenizer::Gpt2 => {
			tiktoken_rs::r50k_base_singleton()
		},
	}
}

/// Model-name to encoder resolution is cached; the cache is append-only and
/// read-mostly. Unknown models fall back to cl100k.
fn encoder_for(model: &str) -> &'static CoreBPE {
	static CACHE: OnceLock<RwLock<HashMap<String, Tokenizer>>> = OnceLock::new();
	let cache = CACHE.get_or_init(|| RwLock::new(HashMap::new()));
	if let Ok(read) = cache.read()
		&& let Some(t) = read.get(model)
	{
		return bpe_for(*t);
	}
	let t = get_tokenizer(model).unwrap_or(Tokenizer::Cl100kBase);
	if let Ok(mut write) = cache.write() {
		write.insert(model.to_string(), t);
	}
	bpe_for(t)
}

/// Tokenizers take ~200ms to load lazily; warm them outside the request path.
pub fn preload_tokenizers() {
	let _ = tiktoken_rs::cl100k_base_singleton();
	let _ = tiktoken_rs::o200k_base_singleton();
}

pub fn count_text_tokens(model: &str, text: &str) -> u64 {
	encoder_for(model).encode_with_special_tokens(text).len() as u64
}

/// Image parts contribute a provider-defined flat cost depending on detail.
fn image_tokens(detail: Option<&str>) -> u64 {
	match detail {
		Some("high") => 765,
		_ => 85,
	}
}

/// Prompt-size estimate for chat messages, used before dispatch. Counts text
/// across every message; image parts are tallied separately.
pub fn num_tokens_from_messages(
	model: &str,
	messages: &[types::completions::RequestMessage],
) -> RequestUsage {
	let bpe = encoder_for(model);
	let tokens_per_message = 3;

	let mut num_tokens: u64 = 0;
	let mut image_tokens_total: u64 = 0;
	for message in messages {
		num_tokens += tokens_per_message;
		// Role is always 1 token
		num_tokens += 1;
		match &message.content {
			Some(types::completions::MessageContent::Text(t)) => {
				num_tokens += bpe.encode_with_special_tokens(t).len() as u64;
			},
			Some(types::completions::MessageContent::Parts(parts)) => {
				for part in parts {
					match part {
						types::completions::ContentPart::Text { text } => {
							num_tokens += bpe.encode_with_special_tokens(text).len() as u64;
						},
						types::completions::ContentPart::ImageUrl { image_url } => {
							image_tokens_total += image_tokens(image_url.detail.as_deref());
						},
						types::completions::ContentPart::InputAudio { .. } => {},
					}
				}
			},
			None => {},
		}
		for tc in &message.tool_calls {
			num_tokens += bpe
				.encode_with_special_tokens(&tc.function.arguments)
				.len() as u64;
		}
	}
	num_tokens += 3; // every reply is primed with <|start|>assistant<|message|>
	RequestUsage {
		input_tokens: num_tokens + image_tokens_total,
		image_input_tokens: image_tokens_total,
	}
}

pub fn num_tokens_from_anthropic_messages(
	model: &str,
	system: Option<&types::messages::SystemPrompt>,
	messages: &[types::messages::Message],
) -> RequestUsage {
	let bpe = encoder_for(model);
	let tokens_per_message = 3;

	let mut num_tokens: u64 = 0;
	let mut image_tokens_total: u64 = 0;
	if let Some(system) = system {
		num_tokens += bpe
			.encode_with_special_tokens(&system.joined_text())
			.len() as u64;
	}
	for message in messages {
		num_tokens += tokens_per_message + 1;
		for block in &message.content {
			match block {
				types::messages::ContentBlock::Text { text } => {
					num_tokens += bpe.encode_with_special_tokens(text).len() as u64;
				},
				types::messages::ContentBlock::Image { .. } => {
					image_tokens_total += image_tokens(None);
				},
				types::messages::ContentBlock::ToolResult { content, .. } => {
					num_tokens += bpe
						.encode_with_special_tokens(&content.joined_text())
						.len() as u64;
				},
				_ => {},
			}
		}
	}
	num_tokens += 3;
	RequestUsage {
		input_tokens: num_tokens + image_tokens_total,
		image_input_tokens: image_tokens_total,
	}
}

pub fn num_tokens_from_gemini_contents(
	model: &str,
	system: Option<&types::gemini::Content>,
	contents: &[types::gemini::Content],
) -> RequestUsage {
	let bpe = encoder_for(model);
	let mut num_tokens: u64 = 0;
	let mut image_tokens_total: u64 = 0;
	for content in system.into_iter().chain(contents.iter()) {
		num_tokens += 4;
		for part in &content.parts {
			if let Some(text) = &part.text {
				num_tokens += bpe.encode_with_special_tokens(text).len() as u64;
			}
			if part.inline_data.is_some() {
				image_tokens_total += image_tokens(None);
			}
		}
	}
	num_tokens += 3;
	RequestUsage {
		input_tokens: num_tokens + image_tokens_total,
		image_input_tokens: image_tokens_total,
	}
}
