use std::sync::Arc;

use bytes::Bytes;
use relay_core::prelude::*;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use super::upstream::{ClientRequest, RelayError, build_consume_log, convert_request};
use crate::billing::Usage;
use crate::llm::{AIError, AIProvider, Caller, Dialect, Meta, MetaBag, Mode, RequestUsage, StreamInfo};
use crate::store::{Channel, ConditionalPrice, ModelConfig, Price, ProviderKind};
use crate::telemetry::AsyncLog;

fn channel(provider: ProviderKind, key: &str) -> Arc<Channel> {
	Arc::new(Channel {
		id: 3,
		name: strng::literal!("ch"),
		provider,
		base_url: None,
		key: strng::new(key),
		supported_modes: vec![],
		supported_models: vec![],
		priority: 0,
	})
}

fn meta(provider: ProviderKind, key: &str, mode: Mode, model: &str) -> Meta {
	let price = Price {
		input: Decimal::new(2, 6),
		output: Decimal::new(10, 6),
		..Default::default()
	};
	Meta {
		request_id: strng::literal!("req-42"),
		origin_model: strng::new(model),
		actual_model: strng::new(model),
		mode,
		channel: channel(provider, key),
		model_config: Arc::new(ModelConfig {
			name: strng::new(model),
			mode,
			owner: strng::literal!("test"),
			max_context_tokens: None,
			max_output_tokens: None,
			tool_choice: None,
			vision: None,
			price,
			conditional_prices: vec![ConditionalPrice {
				min_input_tokens: 1000,
				max_input_tokens: None,
				price: Price {
					input: Decimal::new(4, 6),
					output: Decimal::new(20, 6),
					..Default::default()
				},
			}],
			rpm: None,
		}),
		request_timeout: Duration::from_secs(30),
		request_usage: RequestUsage::default(),
		request_at: chrono::Utc::now(),
		retry_at: None,
		retry_times: 0,
		caller: Caller {
			group: strng::literal!("g1"),
			token_id: 5,
			token_name: strng::literal!("t1"),
			ip: strng::literal!("127.0.0.1"),
		},
		bag: MetaBag::default(),
	}
}

#[test]
fn client_requests_parse_per_dialect() {
	let chat = Bytes::from(r#"{"model":"gpt-4o","stream":true,"messages":[{"role":"user","content":"hi"}]}"#);
	let req = ClientRequest::parse(Mode::ChatCompletions, &chat, false).unwrap();
	assert_eq!(req.model(), Some("gpt-4o"));
	assert!(req.is_stream(false));
	assert!(req.count_tokens("gpt-4o").input_tokens > 0);

	let claude =
		Bytes::from(r#"{"model":"claude-sonnet-4-5","max_tokens":10,"messages":[{"role":"user","content":"hi"}]}"#);
	let req = ClientRequest::parse(Mode::Anthropic, &claude, false).unwrap();
	assert_eq!(req.model(), Some("claude-sonnet-4-5"));
	assert!(!req.is_stream(false));

	// Gemini stream-ness rides the route, not the body.
	let gem = Bytes::from(r#"{"contents":[{"role":"user","parts":[{"text":"hi"}]}]}"#);
	let req = ClientRequest::parse(Mode::Gemini, &gem, true).unwrap();
	assert!(req.is_stream(true));
	assert_eq!(req.model(), None);

	let bad = Bytes::from("not json");
	assert!(matches!(
		ClientRequest::parse(Mode::ChatCompletions, &bad, false),
		Err(AIError::RequestParsing(_))
	));
}

#[test]
fn identity_chat_conversion_applies_gateway_rules() {
	let m = meta(ProviderKind::OpenAi, "sk-x", Mode::ChatCompletions, "gpt-4o");
	let bytes = Bytes::from(
		r#"{"model":"alias-model","stream":true,"store":true,"messages":[{"role":"user","content":"hi"}],"custom_field":1}"#,
	);
	let mut req = ClientRequest::parse(Mode::ChatCompletions, &bytes, false).unwrap();
	let mut m = m;
	m.bag.stream = true;
	let provider = AIProvider::from_channel(&m.channel).unwrap();
	let out = convert_request(&provider, &m, &mut req, &Default::default()).unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();
	// model rewritten to the resolved one, store forced off, usage opted in
	assert_eq!(v["model"], "gpt-4o");
	assert_eq!(v["store"], false);
	assert_eq!(v["stream_options"]["include_usage"], true);
	// unknown fields survive the round trip
	assert_eq!(v["custom_field"], 1);
}

#[test]
fn vertex_claude_bodies_swap_model_for_version() {
	let m = meta(
		ProviderKind::VertexAi,
		"us-east5|proj|key",
		Mode::Anthropic,
		"claude-sonnet-4-5",
	);
	let bytes = Bytes::from(
		r#"{"model":"claude-sonnet-4-5","max_tokens":64,"messages":[{"role":"user","content":"hi"}]}"#,
	);
	let mut req = ClientRequest::parse(Mode::Anthropic, &bytes, false).unwrap();
	let provider = AIProvider::from_channel(&m.channel).unwrap();
	let out = convert_request(&provider, &m, &mut req, &Default::default()).unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(v["anthropic_version"], "vertex-2023-10-16");
	assert!(v.get("model").is_none());
}

#[test]
fn unsupported_pairs_are_rejected() {
	let m = meta(
		ProviderKind::Anthropic,
		"sk-ant",
		Mode::Responses,
		"claude-sonnet-4-5",
	);
	let bytes = Bytes::from(r#"{"model":"claude-sonnet-4-5","input":"hi"}"#);
	let mut req = ClientRequest::parse(Mode::Responses, &bytes, false).unwrap();
	let provider = AIProvider::from_channel(&m.channel).unwrap();
	assert!(matches!(
		convert_request(&provider, &m, &mut req, &Default::default()),
		Err(AIError::UnsupportedConversion(_))
	));
}

#[test]
fn relay_error_bodies_are_dialect_shaped() {
	let err = RelayError::from_ai(&AIError::NoChannelAvailable, Dialect::Claude);
	assert_eq!(err.status.as_u16(), 503);
	let v: Value = serde_json::from_slice(&err.body).unwrap();
	assert_eq!(v["type"], "error");

	let resp = err.into_response();
	assert_eq!(resp.status().as_u16(), 503);
	assert_eq!(
		resp.headers().get(::http::header::CONTENT_TYPE).unwrap(),
		"application/json"
	);
	assert!(resp.headers().contains_key(::http::header::CONTENT_LENGTH));
}

#[test]
fn consume_log_normalizes_usage() {
	let mut m = meta(ProviderKind::OpenAi, "sk-x", Mode::ChatCompletions, "gpt-4o");
	m.request_usage = RequestUsage {
		input_tokens: 30,
		image_input_tokens: 0,
	};
	let log: AsyncLog<StreamInfo> = AsyncLog::default();
	log.store(Some(StreamInfo {
		usage: Usage {
			total_tokens: 100,
			..Default::default()
		},
		..Default::default()
	}));
	let entry = build_consume_log(&m, &log, 200, true);
	// total-only usage: input from the precomputed estimate, rest is output
	assert_eq!(entry.usage.input_tokens, 30);
	assert_eq!(entry.usage.output_tokens, 70);
	assert_eq!(
		entry.usage.total_tokens,
		entry.usage.input_tokens + entry.usage.output_tokens
	);
	// amount = 30 * 0.000002 + 70 * 0.000010
	assert_eq!(entry.amount, Decimal::new(760, 9) * Decimal::from(1000));
	assert_eq!(entry.group.as_str(), "g1");
	assert_eq!(entry.channel_id, 3);
	assert!(entry.downstream_result);
}

#[test]
fn consume_log_counts_tokens_post_hoc() {
	let mut m = meta(ProviderKind::OpenAi, "sk-x", Mode::ChatCompletions, "gpt-4o");
	m.request_usage = RequestUsage {
		input_tokens: 12,
		image_input_tokens: 3,
	};
	let log: AsyncLog<StreamInfo> = AsyncLog::default();
	log.store(Some(StreamInfo {
		completion: "the stream produced text but no usage event".to_string(),
		..Default::default()
	}));
	let entry = build_consume_log(&m, &log, 200, true);
	assert_eq!(entry.usage.input_tokens, 12);
	assert!(entry.usage.output_tokens > 0);
	assert_eq!(entry.usage.image_input_tokens, 3);
	assert_eq!(
		entry.usage.total_tokens,
		entry.usage.input_tokens + entry.usage.output_tokens
	);
}

#[test]
fn consume_log_selects_conditional_price() {
	let mut m = meta(ProviderKind::OpenAi, "sk-x", Mode::ChatCompletions, "gpt-4o");
	m.request_usage = RequestUsage::default();
	let log: AsyncLog<StreamInfo> = AsyncLog::default();
	log.store(Some(StreamInfo {
		usage: Usage {
			input_tokens: 2000,
			output_tokens: 10,
			total_tokens: 2010,
			..Default::default()
		},
		..Default::default()
	}));
	let entry = build_consume_log(&m, &log, 200, true);
	// 2000 input tokens falls in the conditional tier with doubled rates.
	assert_eq!(entry.price.input, Decimal::new(4, 6));
	assert_eq!(
		entry.amount,
		Decimal::from(2000) * Decimal::new(4, 6) + Decimal::from(10) * Decimal::new(20, 6)
	);
}
