//! The streaming proxy: executes the upstream call, translates the response
//! into the client dialect (buffered or event by event), and accounts for
//! what actually flowed.

use std::convert::Infallible;

use ::http::{HeaderMap, HeaderValue, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use relay_core::prelude::*;

use crate::billing::ConsumeLog;
use crate::http::Body;
use crate::llm::types::{completions, embeddings, gemini as gemini_types, messages, ollama as ollama_types, responses};
use crate::llm::{
	AIError, AIProvider, Dialect, Meta, Mode, StreamInfo, UpstreamDialect, conversion, multimodal,
	num_tokens_from_anthropic_messages, num_tokens_from_gemini_contents, num_tokens_from_messages,
};
use crate::parse;
use crate::telemetry::AsyncLog;

/// Largest non-streaming upstream body we will buffer.
const RESPONSE_BUFFER_LIMIT: usize = 10_485_760;

/// A request-lifecycle error carrying the client-dialect body to write
/// downstream.
#[derive(Debug)]
pub struct RelayError {
	pub status: StatusCode,
	pub body: Bytes,
}

impl RelayError {
	pub fn from_ai(err: &AIError, dialect: Dialect) -> RelayError {
		let body = err.to_body(dialect);
		RelayError {
			status: err.status(),
			body: Bytes::from(body.to_string()),
		}
	}

	pub fn into_response(self) -> crate::http::Response {
		let mut resp = ::http::Response::new(Body::from(self.body.clone()));
		*resp.status_mut() = self.status;
		resp.headers_mut().insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("application/json"),
		);
		if let Ok(v) = HeaderValue::from_str(&self.body.len().to_string()) {
			resp.headers_mut().insert(header::CONTENT_LENGTH, v);
		}
		resp
	}
}

/// The client request, parsed into its dialect's typed form. Auxiliary modes
/// stay as raw bytes.
pub enum ClientRequest {
	Chat(completions::Request),
	Claude(messages::Request),
	Gemini(gemini_types::Request),
	Responses(responses::Request),
	Raw(Bytes),
}

impl ClientRequest {
	/// `stream_hint` carries stream-ness that lives in the route rather than
	/// the body (Gemini `:streamGenerateContent`).
	pub fn parse(mode: Mode, bytes: &Bytes, stream_hint: bool) -> Result<ClientRequest, AIError> {
		Ok(match mode.dialect() {
			Dialect::Chat => {
				let req: completions::Request =
					serde_json::from_slice(bytes).map_err(AIError::RequestParsing)?;
				ClientRequest::Chat(req)
			},
			Dialect::Claude => {
				let req: messages::Request =
					serde_json::from_slice(bytes).map_err(AIError::RequestParsing)?;
				ClientRequest::Claude(req)
			},
			Dialect::Gemini => {
				let req: gemini_types::Request =
					serde_json::from_slice(bytes).map_err(AIError::RequestParsing)?;
				let _ = stream_hint;
				ClientRequest::Gemini(req)
			},
			Dialect::Responses => {
				let req: responses::Request =
					serde_json::from_slice(bytes).map_err(AIError::RequestParsing)?;
				ClientRequest::Responses(req)
			},
			Dialect::Aux => ClientRequest::Raw(bytes.clone()),
		})
	}

	pub fn model(&self) -> Option<&str> {
		match self {
			ClientRequest::Chat(r) => r.model.as_deref(),
			ClientRequest::Claude(r) => Some(r.model.as_str()),
			ClientRequest::Responses(r) => r.model.as_deref(),
			// Gemini carries the model in the route.
			ClientRequest::Gemini(_) | ClientRequest::Raw(_) => None,
		}
	}

	pub fn is_stream(&self, stream_hint: bool) -> bool {
		match self {
			ClientRequest::Chat(r) => r.is_stream(),
			ClientRequest::Claude(r) => r.stream,
			ClientRequest::Responses(r) => r.stream.unwrap_or_default(),
			ClientRequest::Gemini(_) => stream_hint,
			ClientRequest::Raw(_) => false,
		}
	}

	/// Pre-dispatch prompt sizing (text via the BPE cache, image parts via
	/// the provider heuristics).
	pub fn count_tokens(&self, model: &str) -> crate::llm::RequestUsage {
		match self {
			ClientRequest::Chat(r) => num_tokens_from_messages(model, &r.messages),
			ClientRequest::Claude(r) => {
				num_tokens_from_anthropic_messages(model, r.system.as_ref(), &r.messages)
			},
			ClientRequest::Gemini(r) => {
				num_tokens_from_gemini_contents(model, r.system_instruction.as_ref(), &r.contents)
			},
			ClientRequest::Responses(_) | ClientRequest::Raw(_) => Default::default(),
		}
	}

	/// Remote image references that must be prefetched before translation.
	pub fn remote_image_urls(&self) -> Vec<String> {
		let mut urls = Vec::new();
		match self {
			ClientRequest::Chat(r) => {
				for msg in &r.messages {
					if let Some(content) = &msg.content {
						for url in content.image_urls() {
							if !url.starts_with("data:") {
								urls.push(url.to_string());
							}
						}
					}
				}
			},
			ClientRequest::Claude(r) => {
				for msg in &r.messages {
					for block in &msg.content {
						if let messages::ContentBlock::Image {
							source: messages::ImageSource::Url { url },
						} = block
						{
							urls.push(url.clone());
						}
					}
				}
			},
			_ => {},
		}
		urls
	}
}

pub struct UpstreamClient {
	client: reqwest::Client,
}

impl Default for UpstreamClient {
	fn default() -> Self {
		Self::new()
	}
}

impl UpstreamClient {
	pub fn new() -> UpstreamClient {
		let client = reqwest::Client::builder()
			.connect_timeout(Duration::from_secs(15))
			.build()
			// Builder only fails on TLS backend misconfiguration; surface it
			// at startup rather than per request.
			.unwrap_or_default();
		UpstreamClient { client }
	}

	pub fn http(&self) -> &reqwest::Client {
		&self.client
	}

	/// Execute the converted request, honoring the per-request timeout.
	pub async fn execute(
		&self,
		meta: &Meta,
		provider: &AIProvider,
		body: Vec<u8>,
		incoming_headers: Option<&HeaderMap>,
	) -> Result<reqwest::Response, AIError> {
		let (method, url) = provider.request_url(meta)?;
		let mut headers = HeaderMap::new();
		headers.insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("application/json"),
		);
		provider
			.setup_headers(meta, &mut headers, &self.client, incoming_headers)
			.await?;
		self
			.client
			.request(method, url)
			.headers(headers)
			.timeout(meta.request_timeout)
			.body(body)
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					AIError::Transport("upstream timed out".to_string())
				} else {
					AIError::Transport(e.to_string())
				}
			})
	}
}

/// Translate the parsed client request into the upstream dialect's bytes.
/// Pure except for the prefetched image set.
pub fn convert_request(
	provider: &AIProvider,
	meta: &Meta,
	req: &mut ClientRequest,
	images: &multimodal::ImageSet,
) -> Result<Vec<u8>, AIError> {
	let upstream = provider.dialect(meta.mode, meta.actual_model.as_str());
	let stream = meta.bag.stream;
	match (req, upstream) {
		(ClientRequest::Chat(r), UpstreamDialect::OpenAiChat) => {
			r.model = Some(meta.actual_model.to_string());
			// Conversation state is never stored upstream.
			r.store = Some(false);
			conversion::completions::ensure_stream_usage(r);
			serde_json::to_vec(r).map_err(AIError::RequestMarshal)
		},
		(ClientRequest::Chat(r), UpstreamDialect::Claude) => {
			conversion::messages::from_completions::translate(r)
		},
		(ClientRequest::Chat(r), UpstreamDialect::Gemini) => {
			let body = conversion::gemini::from_completions::translate(r, images)?;
			prepare_gemini_like(provider, body)
		},
		(ClientRequest::Chat(r), UpstreamDialect::Responses) => {
			conversion::responses::from_completions::translate(r)
		},
		(ClientRequest::Chat(r), UpstreamDialect::Ollama) => {
			conversion::ollama::from_completions::translate(r)
		},
		(ClientRequest::Claude(r), UpstreamDialect::Claude) => {
			r.model = meta.actual_model.to_string();
			let body = serde_json::to_vec(r).map_err(AIError::RequestMarshal)?;
			if let AIProvider::Vertex(p) = provider {
				p.prepare_anthropic_request_body(body)
			} else {
				Ok(body)
			}
		},
		(ClientRequest::Claude(r), UpstreamDialect::OpenAiChat) => {
			conversion::completions::from_messages::translate(r)
		},
		(ClientRequest::Claude(r), UpstreamDialect::Gemini) => {
			let body = conversion::gemini::from_messages::translate(r, images)?;
			prepare_gemini_like(provider, body)
		},
		(ClientRequest::Claude(r), UpstreamDialect::Responses) => {
			conversion::responses::from_messages::translate(r)
		},
		(ClientRequest::Gemini(r), UpstreamDialect::Gemini) => {
			serde_json::to_vec(r).map_err(AIError::RequestMarshal)
		},
		(ClientRequest::Gemini(r), UpstreamDialect::OpenAiChat) => {
			conversion::completions::from_gemini::translate(r, meta.actual_model.as_str(), stream)
		},
		(ClientRequest::Gemini(r), UpstreamDialect::Responses) => {
			conversion::responses::from_gemini::translate(r, meta.actual_model.as_str(), stream)
		},
		(ClientRequest::Responses(r), UpstreamDialect::Responses) => {
			r.model = Some(meta.actual_model.to_string());
			r.store = Some(false);
			serde_json::to_vec(r).map_err(AIError::RequestMarshal)
		},
		(ClientRequest::Raw(bytes), UpstreamDialect::Passthrough) => Ok(bytes.to_vec()),
		(_, upstream) => Err(AIError::UnsupportedConversion(strng::format!(
			"{:?} to {upstream:?}",
			meta.mode
		))),
	}
}

/// Gemini bodies on Vertex are identical to the native dialect; nothing else
/// needs adjusting today, but the seam is where Vertex-only body tweaks go.
fn prepare_gemini_like(_provider: &AIProvider, body: Vec<u8>) -> Result<Vec<u8>, AIError> {
	Ok(body)
}

/// End-to-end relay of one request: parse, count, convert, execute,
/// translate the response. The consume log is built afterwards from `log`.
pub async fn relay(
	upstream: &UpstreamClient,
	meta: &mut Meta,
	provider: &AIProvider,
	body: Bytes,
	incoming_headers: Option<&HeaderMap>,
	stream_hint: bool,
	log: AsyncLog<StreamInfo>,
) -> Result<crate::http::Response, RelayError> {
	let dialect = meta.mode.dialect();
	let wrap = |e: AIError| RelayError::from_ai(&e, dialect);

	if !provider.support_mode(meta.mode) {
		return Err(wrap(AIError::UnsupportedMode(meta.mode)));
	}

	let mut req = ClientRequest::parse(meta.mode, &body, stream_hint).map_err(wrap)?;
	meta.bag.stream = req.is_stream(stream_hint);
	meta.bag.image_model = meta.actual_model.contains("image");
	if let ClientRequest::Chat(r) = &mut req {
		meta.bag.include_usage_opt_out = r
			.stream_options
			.as_ref()
			.is_some_and(|o| !o.include_usage);
		meta.bag.reasoning_split = conversion::completions::apply_reasoner_quirks(r);
	}
	meta.request_usage = req.count_tokens(meta.actual_model.as_str());

	let images = match provider.dialect(meta.mode, meta.actual_model.as_str()) {
		UpstreamDialect::Gemini => {
			multimodal::load_images(upstream.http(), req.remote_image_urls())
				.await
				.map_err(wrap)?
		},
		_ => Default::default(),
	};

	let converted = convert_request(provider, meta, &mut req, &images).map_err(wrap)?;
	let resp = upstream
		.execute(meta, provider, converted, incoming_headers)
		.await
		.map_err(wrap)?;
	log.store(Some(StreamInfo::default()));
	handle_response(provider, meta, resp, log).await
}

/// Translate the upstream response and build the downstream one.
pub async fn handle_response(
	provider: &AIProvider,
	meta: &Meta,
	resp: reqwest::Response,
	log: AsyncLog<StreamInfo>,
) -> Result<crate::http::Response, RelayError> {
	let client_dialect = meta.mode.dialect();
	let upstream_dialect = provider.dialect(meta.mode, meta.actual_model.as_str());
	let status = resp.status();

	if !status.is_success() {
		let body = resp.bytes().await.unwrap_or_default();
		if let Some(err) = provider.classify_error(status.as_u16(), &body) {
			return Err(RelayError::from_ai(&err, client_dialect));
		}
		let body = translate_error_body(client_dialect, upstream_dialect, &body);
		return Err(RelayError {
			status: StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
			body,
		});
	}

	let content_type = resp
		.headers()
		.get(header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default()
		.to_string();
	let is_stream = content_type.contains("event-stream") || content_type.contains("x-ndjson");

	if is_stream {
		let buffer_limit = if meta.bag.image_model {
			parse::sse::IMAGE_BUFFER_LIMIT
		} else {
			parse::sse::DEFAULT_BUFFER_LIMIT
		};
		let upstream_body = reqwest_body(resp);
		let translated = translate_stream(
			meta,
			client_dialect,
			upstream_dialect,
			upstream_body,
			buffer_limit,
			log.clone(),
		)
		.map_err(|e| RelayError::from_ai(&e, client_dialect))?;
		let body = observe_first_byte(translated, log);
		let mut out = ::http::Response::new(body);
		out.headers_mut().insert(
			header::CONTENT_TYPE,
			HeaderValue::from_static("text/event-stream; charset=utf-8"),
		);
		out
			.headers_mut()
			.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
		return Ok(out);
	}

	let bytes = resp
		.bytes()
		.await
		.map_err(|e| RelayError::from_ai(&AIError::Transport(e.to_string()), client_dialect))?;
	if bytes.len() > RESPONSE_BUFFER_LIMIT {
		return Err(RelayError::from_ai(
			&AIError::ResponseTooLarge,
			client_dialect,
		));
	}
	let translated = translate_response(
		meta,
		client_dialect,
		upstream_dialect,
		&bytes,
		&log,
	)
	.map_err(|e| RelayError::from_ai(&e, client_dialect))?;

	log.non_atomic_mutate(|r| r.saw_token());
	let mut out = ::http::Response::new(Body::from(translated.clone()));
	out.headers_mut().insert(
		header::CONTENT_TYPE,
		HeaderValue::from_static("application/json"),
	);
	if let Ok(v) = HeaderValue::from_str(&translated.len().to_string()) {
		out.headers_mut().insert(header::CONTENT_LENGTH, v);
	}
	Ok(out)
}

fn reqwest_body(resp: reqwest::Response) -> Body {
	use futures_util::TryStreamExt;
	Body::from_stream(resp.bytes_stream().map_err(axum_core::Error::new))
}

/// Stamp the first-byte timestamp when the downstream body yields its first
/// chunk.
fn observe_first_byte(body: Body, log: AsyncLog<StreamInfo>) -> Body {
	let stream = async_stream::stream! {
		let mut body = body;
		let mut seen = false;
		while let Some(frame) = body.frame().await {
			match frame {
				Ok(frame) => {
					let Ok(data) = frame.into_data() else { continue };
					if !seen {
						seen = true;
						log.non_atomic_mutate(|r| r.saw_token());
					}
					yield Ok::<Bytes, Infallible>(data);
				},
				Err(e) => {
					warn!("downstream stream error: {e}");
					break;
				},
			}
		}
	};
	Body::from_stream(stream)
}

#[allow(clippy::too_many_arguments)]
fn translate_stream(
	meta: &Meta,
	client: Dialect,
	upstream: UpstreamDialect,
	body: Body,
	limit: usize,
	log: AsyncLog<StreamInfo>,
) -> Result<Body, AIError> {
	use conversion as conv;
	let model = meta.origin_model.as_str();
	Ok(match (client, upstream) {
		(Dialect::Chat, UpstreamDialect::OpenAiChat) => {
			conv::completions::passthrough_stream(body, limit, meta.bag.reasoning_split, log)
		},
		(Dialect::Chat, UpstreamDialect::Claude) => {
			conv::messages::from_completions::translate_stream(body, limit, log)
		},
		(Dialect::Chat, UpstreamDialect::Gemini) => {
			conv::gemini::from_completions::translate_stream(body, limit, model, log)
		},
		(Dialect::Chat, UpstreamDialect::Responses) => {
			conv::responses::from_completions::translate_stream(body, limit, log)
		},
		(Dialect::Chat, UpstreamDialect::Ollama) => {
			conv::ollama::from_completions::translate_stream(body, limit, log)
		},
		(Dialect::Claude, UpstreamDialect::Claude) => {
			conv::messages::passthrough_stream(body, limit, log)
		},
		(Dialect::Claude, UpstreamDialect::OpenAiChat) => {
			conv::completions::from_messages::translate_stream(body, limit, log)
		},
		(Dialect::Claude, UpstreamDialect::Gemini) => {
			conv::gemini::from_messages::translate_stream(body, limit, model, log)
		},
		(Dialect::Claude, UpstreamDialect::Responses) => {
			conv::responses::from_messages::translate_stream(body, limit, log)
		},
		(Dialect::Gemini, UpstreamDialect::Gemini) => {
			conv::gemini::passthrough_stream(body, limit, log)
		},
		(Dialect::Gemini, UpstreamDialect::OpenAiChat) => {
			conv::completions::from_gemini::translate_stream(body, limit, log)
		},
		(Dialect::Gemini, UpstreamDialect::Responses) => {
			conv::responses::from_gemini::translate_stream(body, limit, model, log)
		},
		(Dialect::Responses, UpstreamDialect::Responses) => {
			conv::responses::passthrough_stream(body, limit, log)
		},
		(Dialect::Aux, UpstreamDialect::Passthrough) => body,
		(client, upstream) => {
			return Err(AIError::UnsupportedConversion(strng::format!(
				"stream {client:?} from {upstream:?}"
			)));
		},
	})
}

fn translate_response(
	meta: &Meta,
	client: Dialect,
	upstream: UpstreamDialect,
	bytes: &Bytes,
	log: &AsyncLog<StreamInfo>,
) -> Result<Bytes, AIError> {
	use conversion as conv;
	let model = meta.origin_model.as_str();
	// Record billing usage from the upstream body regardless of direction.
	record_usage(upstream, bytes, log);
	Ok(match (client, upstream) {
		// Matched dialects pass the original bytes through untouched so
		// unknown fields survive.
		(Dialect::Chat, UpstreamDialect::OpenAiChat)
		| (Dialect::Claude, UpstreamDialect::Claude)
		| (Dialect::Gemini, UpstreamDialect::Gemini)
		| (Dialect::Responses, UpstreamDialect::Responses)
		| (Dialect::Aux, UpstreamDialect::Passthrough) => bytes.clone(),
		(Dialect::Chat, UpstreamDialect::Claude) => {
			Bytes::from(conv::messages::from_completions::translate_response(bytes)?)
		},
		(Dialect::Chat, UpstreamDialect::Gemini) => Bytes::from(
			conv::gemini::from_completions::translate_response(bytes, model)?,
		),
		(Dialect::Chat, UpstreamDialect::Responses) => Bytes::from(
			conv::responses::from_completions::translate_response(bytes)?,
		),
		(Dialect::Chat, UpstreamDialect::Ollama) => {
			Bytes::from(conv::ollama::from_completions::translate_response(bytes)?)
		},
		(Dialect::Claude, UpstreamDialect::OpenAiChat) => {
			Bytes::from(conv::completions::from_messages::translate_response(bytes)?)
		},
		(Dialect::Claude, UpstreamDialect::Gemini) => Bytes::from(
			conv::gemini::from_messages::translate_response(bytes, model)?,
		),
		(Dialect::Claude, UpstreamDialect::Responses) => Bytes::from(
			conv::responses::from_messages::translate_response(bytes)?,
		),
		(Dialect::Gemini, UpstreamDialect::OpenAiChat) => {
			Bytes::from(conv::completions::from_gemini::translate_response(bytes)?)
		},
		(Dialect::Gemini, UpstreamDialect::Responses) => Bytes::from(
			conv::responses::from_gemini::translate_response(bytes, model)?,
		),
		(client, upstream) => {
			return Err(AIError::UnsupportedConversion(strng::format!(
				"response {client:?} from {upstream:?}"
			)));
		},
	})
}

fn record_usage(upstream: UpstreamDialect, bytes: &Bytes, log: &AsyncLog<StreamInfo>) {
	let usage = match upstream {
		UpstreamDialect::OpenAiChat => serde_json::from_slice::<completions::Response>(bytes)
			.ok()
			.and_then(|r| r.usage.map(|u| u.to_billing())),
		UpstreamDialect::Claude => serde_json::from_slice::<messages::Response>(bytes)
			.ok()
			.map(|r| r.usage.to_billing()),
		UpstreamDialect::Gemini => serde_json::from_slice::<gemini_types::Response>(bytes)
			.ok()
			.and_then(|r| r.usage_metadata.map(|u| u.to_billing())),
		UpstreamDialect::Responses => serde_json::from_slice::<responses::Response>(bytes)
			.ok()
			.and_then(|r| r.usage.map(|u| u.to_billing())),
		UpstreamDialect::Ollama => serde_json::from_slice::<ollama_types::Response>(bytes)
			.ok()
			.map(|r| r.to_billing()),
		UpstreamDialect::Passthrough => serde_json::from_slice::<embeddings::Response>(bytes)
			.ok()
			.and_then(|r| r.usage.map(|u| u.to_billing()))
			.or_else(|| {
				serde_json::from_slice::<embeddings::rerank::Response>(bytes)
					.ok()
					.and_then(|r| r.usage.map(|u| u.to_billing()))
			}),
	};
	if let Some(usage) = usage {
		log.non_atomic_mutate(|r| r.usage.supersede(usage));
	}
}

/// Render an upstream error body in the client dialect. Unparseable bodies
/// are wrapped verbatim.
fn translate_error_body(client: Dialect, upstream: UpstreamDialect, bytes: &Bytes) -> Bytes {
	use conversion as conv;
	let translated = match (client, upstream) {
		(Dialect::Chat, UpstreamDialect::OpenAiChat | UpstreamDialect::Responses)
		| (Dialect::Claude, UpstreamDialect::Claude)
		| (Dialect::Gemini, UpstreamDialect::Gemini)
		| (Dialect::Responses, UpstreamDialect::Responses)
		| (Dialect::Aux, _) => Ok(bytes.clone()),
		(Dialect::Chat, UpstreamDialect::Claude) => {
			conv::messages::from_completions::translate_error(bytes)
		},
		(Dialect::Chat, UpstreamDialect::Gemini) => {
			conv::gemini::from_completions::translate_error(bytes)
		},
		(Dialect::Chat, UpstreamDialect::Ollama) => {
			conv::ollama::from_completions::translate_error(bytes)
		},
		(Dialect::Claude, UpstreamDialect::OpenAiChat) => {
			conv::completions::from_messages::translate_error(bytes)
		},
		(Dialect::Claude, UpstreamDialect::Gemini) => {
			conv::gemini::from_messages::translate_error(bytes)
		},
		(Dialect::Claude, UpstreamDialect::Responses) => {
			conv::responses::from_messages::translate_error(bytes)
		},
		(Dialect::Gemini, UpstreamDialect::OpenAiChat) => {
			conv::completions::from_gemini::translate_error(bytes)
		},
		(Dialect::Gemini, UpstreamDialect::Responses) => {
			conv::responses::from_gemini::translate_error(bytes)
		},
		_ => Ok(bytes.clone()),
	};
	translated.unwrap_or_else(|_| {
		let message = String::from_utf8_lossy(bytes).to_string();
		let body = AIError::Transport(message).to_body(client);
		Bytes::from(body.to_string())
	})
}

/// Assemble the consume log once the response has fully flowed (or failed).
/// Applies the token-normalization invariant and the post-hoc count when the
/// upstream never reported usage for a stream that produced text.
pub fn build_consume_log(
	meta: &Meta,
	log: &AsyncLog<StreamInfo>,
	code: u16,
	downstream_result: bool,
) -> ConsumeLog {
	let info = log.take().unwrap_or_default();
	let mut usage = info.usage;
	if usage.is_empty() && !info.completion.is_empty() {
		usage.output_tokens = crate::llm::count_text_tokens(meta.actual_model.as_str(), &info.completion);
		usage.input_tokens = meta.request_usage.input_tokens;
	}
	usage.normalize(meta.request_usage.input_tokens);
	if usage.image_input_tokens == 0 {
		usage.image_input_tokens = meta.request_usage.image_input_tokens;
	}
	let price = meta.model_config.price_for(usage.input_tokens).clone();
	let amount = usage.cost(&price);
	ConsumeLog {
		request_id: meta.request_id.clone(),
		request_at: meta.request_at,
		retry_at: meta.retry_at,
		first_byte_at: info.first_token,
		group: meta.caller.group.clone(),
		code,
		channel_id: meta.channel.id,
		model: meta.origin_model.clone(),
		token_id: meta.caller.token_id,
		token_name: meta.caller.token_name.clone(),
		endpoint: strng::new(meta.mode.endpoint()),
		mode: meta.mode,
		ip: meta.caller.ip.clone(),
		retry_times: meta.retry_times,
		request_detail: None,
		downstream_result,
		usage,
		price,
		amount,
	}
}
