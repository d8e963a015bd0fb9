use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::store::{Channel, ModelConfig, Price, ProviderKind, StaticPicker};

fn channel(provider: ProviderKind, key: &str, base_url: Option<&str>) -> Arc<Channel> {
	Arc::new(Channel {
		id: 7,
		name: strng::literal!("test-channel"),
		provider,
		base_url: base_url.map(strng::new),
		key: strng::new(key),
		supported_modes: vec![],
		supported_models: vec![strng::literal!("gpt-4.1"), strng::literal!("gpt-5-codex")],
		priority: 1,
	})
}

fn model_config(name: &str) -> ModelConfig {
	ModelConfig {
		name: strng::new(name),
		mode: Mode::ChatCompletions,
		owner: strng::literal!("openai"),
		max_context_tokens: None,
		max_output_tokens: None,
		tool_choice: None,
		vision: None,
		price: Price::default(),
		conditional_prices: vec![],
		rpm: None,
	}
}

fn meta_for(provider: ProviderKind, key: &str, base_url: Option<&str>, model: &str) -> Meta {
	let ch = channel(provider, key, base_url);
	Meta {
		request_id: strng::literal!("req-1"),
		origin_model: strng::new(model),
		actual_model: strng::new(model),
		mode: Mode::ChatCompletions,
		channel: ch,
		model_config: Arc::new(model_config(model)),
		request_timeout: Duration::from_secs(30),
		request_usage: RequestUsage::default(),
		request_at: chrono::Utc::now(),
		retry_at: None,
		retry_times: 0,
		caller: Caller::default(),
		bag: MetaBag::default(),
	}
}

#[test]
fn modes_map_to_dialects() {
	assert_eq!(Mode::ChatCompletions.dialect(), Dialect::Chat);
	assert_eq!(Mode::Completions.dialect(), Dialect::Chat);
	assert_eq!(Mode::Responses.dialect(), Dialect::Responses);
	assert_eq!(Mode::Anthropic.dialect(), Dialect::Claude);
	assert_eq!(Mode::Gemini.dialect(), Dialect::Gemini);
	assert_eq!(Mode::Embeddings.dialect(), Dialect::Aux);
	assert_eq!(Mode::AudioSpeech.dialect(), Dialect::Aux);
}

#[test]
fn error_taxonomy_statuses() {
	use ::http::StatusCode;
	assert_eq!(
		AIError::ModelNotSupported(strng::literal!("x")).status(),
		StatusCode::BAD_REQUEST
	);
	assert_eq!(
		AIError::KeyInvalid(strng::literal!("x")).status(),
		StatusCode::UNAUTHORIZED
	);
	assert_eq!(
		AIError::RateLimited("x".into()).status(),
		StatusCode::TOO_MANY_REQUESTS
	);
	assert_eq!(
		AIError::Transport("x".into()).status(),
		StatusCode::BAD_GATEWAY
	);
	assert_eq!(
		AIError::Internal("x".into()).status(),
		StatusCode::INTERNAL_SERVER_ERROR
	);
	assert_eq!(AIError::RateLimited("x".into()).kind(), "rate_limit_error");
	assert_eq!(AIError::UnsupportedMode(Mode::Rerank).kind(), "unsupported_mode");
}

#[test]
fn error_bodies_use_client_dialect() {
	let err = AIError::RateLimited("slow down".into());
	let openai = err.to_body(Dialect::Chat);
	assert_eq!(openai["error"]["type"], "rate_limit_error");
	assert_eq!(openai["error"]["code"], 429);

	let claude = err.to_body(Dialect::Claude);
	assert_eq!(claude["type"], "error");
	assert_eq!(claude["error"]["type"], "rate_limit_error");

	let gemini = err.to_body(Dialect::Gemini);
	assert_eq!(gemini["error"]["code"], 429);
	assert_eq!(gemini["error"]["status"], "rate_limit_error");
}

#[test]
fn dispatcher_resolves_or_rejects() {
	let ch = Arc::new(Channel {
		id: 1,
		name: strng::literal!("primary"),
		provider: ProviderKind::OpenAi,
		base_url: None,
		key: strng::literal!("sk-x"),
		supported_modes: vec![Mode::ChatCompletions],
		supported_models: vec![strng::literal!("gpt-4o")],
		priority: 1,
	});
	let dispatcher = Dispatcher::new(
		Arc::new(StaticPicker::new(vec![ch])),
		vec![model_config("gpt-4o")],
	);

	let meta = dispatcher
		.resolve(Mode::ChatCompletions, "gpt-4o", Caller::default())
		.unwrap();
	assert_eq!(meta.origin_model.as_str(), "gpt-4o");
	assert_eq!(meta.channel.id, 1);
	assert!(!meta.request_id.is_empty());

	assert!(matches!(
		dispatcher.resolve(Mode::ChatCompletions, "unknown-model", Caller::default()),
		Err(AIError::ModelNotSupported(_))
	));
	// Known model, but no channel serves this mode.
	let dispatcher = Dispatcher::new(
		Arc::new(StaticPicker::new(vec![])),
		vec![model_config("gpt-4o")],
	);
	assert!(matches!(
		dispatcher.resolve(Mode::ChatCompletions, "gpt-4o", Caller::default()),
		Err(AIError::NoChannelAvailable)
	));
}

#[test]
fn token_counting_covers_text_and_images() {
	let messages: Vec<types::completions::RequestMessage> = serde_json::from_value(json!([
		{"role": "user", "content": "count these tokens please"}
	]))
	.unwrap();
	let plain = num_tokens_from_messages("gpt-4o", &messages);
	assert!(plain.input_tokens > 0);
	assert_eq!(plain.image_input_tokens, 0);

	let with_image: Vec<types::completions::RequestMessage> = serde_json::from_value(json!([
		{"role": "user", "content": [
			{"type": "text", "text": "count these tokens please"},
			{"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
		]}
	]))
	.unwrap();
	let with_image = num_tokens_from_messages("gpt-4o", &with_image);
	assert_eq!(with_image.image_input_tokens, 85);
	assert_eq!(with_image.input_tokens, plain.input_tokens + 85);

	let high_detail: Vec<types::completions::RequestMessage> = serde_json::from_value(json!([
		{"role": "user", "content": [
			{"type": "image_url", "image_url": {"url": "https://example.com/x.png", "detail": "high"}}
		]}
	]))
	.unwrap();
	assert_eq!(
		num_tokens_from_messages("gpt-4o", &high_detail).image_input_tokens,
		765
	);

	// Unknown models fall back to the default encoder instead of failing.
	assert!(count_text_tokens("totally-unknown-model", "hello world") > 0);
}

#[test]
fn provider_dialects_follow_mode_and_model() {
	let openai =
		AIProvider::from_channel(&channel(ProviderKind::OpenAi, "sk-x", None)).unwrap();
	assert_eq!(
		openai.dialect(Mode::ChatCompletions, "gpt-4.1"),
		UpstreamDialect::OpenAiChat
	);
	// responses-only models push chat traffic up to the Responses dialect
	assert_eq!(
		openai.dialect(Mode::ChatCompletions, "gpt-5-codex"),
		UpstreamDialect::Responses
	);
	assert_eq!(
		openai.dialect(Mode::Embeddings, "text-embedding-3-small"),
		UpstreamDialect::Passthrough
	);

	let vertex = AIProvider::from_channel(&channel(
		ProviderKind::VertexAi,
		"us-central1|proj|key",
		None,
	))
	.unwrap();
	assert_eq!(
		vertex.dialect(Mode::ChatCompletions, "gemini-2.5-pro"),
		UpstreamDialect::Gemini
	);
	assert_eq!(
		vertex.dialect(Mode::Anthropic, "claude-sonnet-4-5"),
		UpstreamDialect::Claude
	);

	let zhipu = AIProvider::from_channel(&channel(ProviderKind::Zhipu, "zk", None)).unwrap();
	assert_eq!(zhipu.dialect(Mode::Anthropic, "glm-4.6"), UpstreamDialect::Claude);
	assert_eq!(
		zhipu.dialect(Mode::ChatCompletions, "glm-4.6"),
		UpstreamDialect::OpenAiChat
	);

	let ollama = AIProvider::from_channel(&channel(ProviderKind::Ollama, "", None)).unwrap();
	assert_eq!(
		ollama.dialect(Mode::ChatCompletions, "llama3.3"),
		UpstreamDialect::Ollama
	);
}

#[tokio::test]
async fn azure_url_and_header_templating() {
	// Channel base https://x.openai.azure.com with key k|2024-03-01-preview
	// produces the documented deployment URL and Api-Key header.
	let ch = channel(
		ProviderKind::AzureOpenAi,
		"k|2024-03-01-preview",
		Some("https://x.openai.azure.com"),
	);
	let provider = AIProvider::from_channel(&ch).unwrap();
	let mut meta = meta_for(
		ProviderKind::AzureOpenAi,
		"k|2024-03-01-preview",
		Some("https://x.openai.azure.com"),
		"gpt-4.1",
	);
	meta.channel = ch;
	let (method, url) = provider.request_url(&meta).unwrap();
	assert_eq!(method, ::http::Method::POST);
	assert_eq!(
		url,
		"https://x.openai.azure.com/openai/deployments/gpt-41/chat/completions?api-version=2024-03-01-preview"
	);

	let mut headers = ::http::HeaderMap::new();
	provider
		.setup_headers(&meta, &mut headers, &reqwest::Client::new(), None)
		.await
		.unwrap();
	assert_eq!(headers.get("api-key").unwrap(), "k");
	assert!(headers.get(::http::header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn anthropic_headers_carry_version_and_filtered_betas() {
	let provider =
		AIProvider::from_channel(&channel(ProviderKind::Anthropic, "sk-ant-x", None)).unwrap();
	let meta = meta_for(ProviderKind::Anthropic, "sk-ant-x", None, "claude-sonnet-4-5");

	let mut incoming = ::http::HeaderMap::new();
	incoming.insert(
		"anthropic-beta",
		::http::HeaderValue::from_static("prompt-caching-2024-07-31,bogus-flag"),
	);
	let mut headers = ::http::HeaderMap::new();
	provider
		.setup_headers(&meta, &mut headers, &reqwest::Client::new(), Some(&incoming))
		.await
		.unwrap();
	assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-x");
	assert_eq!(headers.get("anthropic-version").unwrap(), "2023-06-01");
	assert_eq!(
		headers.get("anthropic-beta").unwrap(),
		"prompt-caching-2024-07-31"
	);
}

#[test]
fn gemini_and_vertex_urls() {
	let provider = AIProvider::from_channel(&channel(ProviderKind::Gemini, "gk", None)).unwrap();
	let mut meta = meta_for(ProviderKind::Gemini, "gk", None, "gemini-2.5-pro");
	meta.mode = Mode::Gemini;
	meta.bag.stream = true;
	let (_, url) = provider.request_url(&meta).unwrap();
	assert_eq!(
		url,
		"https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:streamGenerateContent?alt=sse"
	);

	let provider = AIProvider::from_channel(&channel(
		ProviderKind::VertexAi,
		"europe-west4|proj|key",
		None,
	))
	.unwrap();
	let mut meta = meta_for(
		ProviderKind::VertexAi,
		"europe-west4|proj|key",
		None,
		"gemini-2.5-pro",
	);
	meta.bag.stream = false;
	let (_, url) = provider.request_url(&meta).unwrap();
	assert_eq!(
		url,
		"https://europe-west4-aiplatform.googleapis.com/v1/projects/proj/locations/europe-west4/publishers/google/models/gemini-2.5-pro:generateContent"
	);
}

#[test]
fn key_validation_flags_bad_formats() {
	assert!(
		AIProvider::validate_channel_key(&channel(ProviderKind::OpenAi, "sk-x", None)).is_ok()
	);
	assert!(matches!(
		AIProvider::validate_channel_key(&channel(ProviderKind::VertexAi, "missing-pipe", None)),
		Err(AIError::KeyInvalid(_))
	));
	assert!(matches!(
		AIProvider::validate_channel_key(&channel(ProviderKind::Cloudflare, "no-pipe", None)),
		Err(AIError::KeyInvalid(_))
	));
	assert!(matches!(
		AIProvider::validate_channel_key(&channel(ProviderKind::OpenAi, "", None)),
		Err(AIError::KeyInvalid(_))
	));
}

#[tokio::test]
async fn balance_defaults_to_not_implemented() {
	let provider = AIProvider::from_channel(&channel(ProviderKind::OpenAi, "sk-x", None)).unwrap();
	assert!(matches!(
		provider.get_balance(&reqwest::Client::new()).await,
		Err(AIError::NotImplemented)
	));
}

#[test]
fn metadata_is_populated_for_every_provider() {
	for kind in [
		ProviderKind::OpenAi,
		ProviderKind::Anthropic,
		ProviderKind::Gemini,
		ProviderKind::Ollama,
		ProviderKind::Zhipu,
		ProviderKind::Baidu,
		ProviderKind::SiliconFlow,
		ProviderKind::MiniMax,
		ProviderKind::StreamLake,
	] {
		let provider = AIProvider::from_channel(&channel(kind, "region|key", None)).unwrap();
		let md = provider.metadata();
		assert!(!md.readme.is_empty());
		assert!(!md.models.is_empty());
		assert!(!md.key_help.is_empty());
	}
}
