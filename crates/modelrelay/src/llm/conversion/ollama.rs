//! Translation between the chat-completions client dialect and the Ollama
//! native dialect (`/api/chat`, NDJSON streaming).

use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};

use super::ids;
use crate::http::Body;
use crate::llm::types::{completions, ollama};
use crate::llm::{AIError, StreamInfo};
use crate::parse;
use crate::parse::sse::{Event, OutFrame};
use crate::telemetry::AsyncLog;

pub mod from_completions {
	use super::*;

	pub fn translate(req: &completions::Request) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(req: &completions::Request) -> ollama::Request {
		let messages = req
			.messages
			.iter()
			.map(|msg| {
				let role = match msg.role {
					completions::Role::System | completions::Role::Developer => "system",
					completions::Role::Assistant => "assistant",
					completions::Role::Tool => "tool",
					completions::Role::User => "user",
				};
				let mut images = Vec::new();
				if let Some(completions::MessageContent::Parts(parts)) = &msg.content {
					for part in parts {
						if let completions::ContentPart::ImageUrl { image_url } = part
							&& let Some(blob) = crate::llm::multimodal::decode_data_uri(&image_url.url)
						{
							images.push(blob.data);
						}
					}
				}
				ollama::Message {
					role: role.to_string(),
					content: msg.content.as_ref().map(|c| c.text()).unwrap_or_default(),
					images,
					tool_calls: msg
						.tool_calls
						.iter()
						.map(|tc| ollama::ToolCall {
							function: ollama::FunctionCall {
								name: tc.function.name.clone(),
								arguments: serde_json::from_str(&tc.function.arguments)
									.unwrap_or_else(|_| json!({})),
							},
						})
						.collect(),
				}
			})
			.collect();
		ollama::Request {
			model: req.model.clone().unwrap_or_default(),
			messages,
			stream: req.is_stream(),
			options: Some(ollama::Options {
				temperature: req.temperature,
				top_p: req.top_p,
				num_predict: req.output_cap(),
				stop: req.stop.clone(),
			}),
			tools: req
				.tools
				.as_ref()
				.and_then(|t| serde_json::to_value(t).ok()),
			format: req.response_format.as_ref().and_then(|rf| {
				(rf.kind == "json_object" || rf.kind == "json_schema").then(|| json!("json"))
			}),
		}
	}

	pub fn translate_response(bytes: &Bytes) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<ollama::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let openai = translate_response_internal(&resp);
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &ollama::Response) -> completions::Response {
		let message = resp.message.clone().unwrap_or_default();
		let tool_calls: Vec<completions::ToolCall> = message
			.tool_calls
			.iter()
			.map(|tc| completions::ToolCall {
				id: ids::new_call_id(),
				kind: "function".to_string(),
				function: completions::FunctionCall {
					name: tc.function.name.clone(),
					arguments: tc.function.arguments.to_string(),
				},
			})
			.collect();
		let finish_reason = if !tool_calls.is_empty() {
			completions::FinishReason::ToolCalls
		} else {
			done_reason_to_finish(resp.done_reason.as_deref())
		};
		completions::Response {
			id: ids::new_completion_id(),
			object: completions::OBJECT_COMPLETION.to_string(),
			created: Utc::now().timestamp(),
			model: resp.model.clone(),
			choices: vec![completions::Choice {
				index: 0,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: (!message.content.is_empty())
						.then(|| completions::MessageContent::Text(message.content.clone())),
					tool_calls,
					..Default::default()
				},
				finish_reason: Some(finish_reason),
			}],
			usage: Some(completions::Usage::from_billing(&resp.to_billing())),
			rest: Value::Null,
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		#[derive(serde::Deserialize)]
		struct OllamaError {
			error: String,
		}
		let res = serde_json::from_slice::<OllamaError>(bytes).map_err(AIError::ResponseParsing)?;
		let m = completions::ErrorResponse {
			error: completions::ErrorDetail {
				message: res.error,
				kind: "upstream_error".to_string(),
				param: None,
				code: None,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	/// Ollama NDJSON to OpenAI chunks.
	pub fn translate_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
		let id = ids::new_completion_id();
		let created = Utc::now().timestamp();
		let mut model = String::new();
		let mut usage: Option<completions::Usage> = None;
		parse::ndjson::json_transform_multi::<ollama::Response, _>(b, buffer_limit, move |ev| {
			match ev {
				Event::Data(Ok(resp)) => {
					if model.is_empty() {
						model = resp.model.clone();
						let name = resp.model.clone();
						log.non_atomic_mutate(|r| r.provider_model = Some(relay_core::strng::new(&name)));
					}
					let mut out = Vec::new();
					let mk = |choices, usage| completions::StreamResponse {
						id: id.clone(),
						object: completions::OBJECT_CHUNK.to_string(),
						created,
						model: model.clone(),
						choices,
						usage,
					};
					if let Some(message) = &resp.message
						&& !message.content.is_empty()
					{
						let text = message.content.clone();
						log.non_atomic_mutate(|r| {
							r.saw_token();
							r.completion.push_str(&text);
						});
						let mut delta = completions::Delta::default();
						delta.content = Some(text);
						out.push(OutFrame::data(&mk(
							vec![completions::StreamChoice {
								index: 0,
								delta,
								finish_reason: None,
							}],
							None,
						)));
					}
					if resp.done {
						let billing = resp.to_billing();
						log.non_atomic_mutate(|r| r.usage.supersede(billing));
						usage = Some(completions::Usage::from_billing(&billing));
						out.push(OutFrame::data(&mk(
							vec![completions::StreamChoice {
								index: 0,
								delta: completions::Delta::default(),
								finish_reason: Some(done_reason_to_finish(resp.done_reason.as_deref())),
							}],
							None,
						)));
					}
					out
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					let mut out = Vec::new();
					if let Some(u) = usage.take() {
						out.push(OutFrame::data(&completions::StreamResponse {
							id: id.clone(),
							object: completions::OBJECT_CHUNK.to_string(),
							created,
							model: model.clone(),
							choices: Vec::new(),
							usage: Some(u),
						}));
					}
					out.push(OutFrame::done());
					out
				},
			}
		})
	}

	fn done_reason_to_finish(reason: Option<&str>) -> completions::FinishReason {
		match reason {
			Some("length") => completions::FinishReason::Length,
			_ => completions::FinishReason::Stop,
		}
	}
}
