//! Translation between client dialects and the Anthropic Messages upstream
//! dialect.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};

use super::ids;
use crate::http::Body;
use crate::llm::types::{completions, messages};
use crate::llm::{AIError, StreamInfo};
use crate::parse;
use crate::parse::sse::{Event, OutFrame};
use crate::telemetry::AsyncLog;

/// Anthropic requires `max_tokens`; applied when the client did not send a
/// cap.
const DEFAULT_MAX_TOKENS: u64 = 4096;

pub mod from_completions {
	use super::*;

	/// Translate an OpenAI chat-completions request into an Anthropic
	/// messages request.
	pub fn translate(req: &completions::Request) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(req: &completions::Request) -> messages::Request {
		// Anthropic has all system prompts in a single field. Join them.
		let system = req
			.messages
			.iter()
			.filter(|m| {
				matches!(
					m.role,
					completions::Role::System | completions::Role::Developer
				)
			})
			.filter_map(|m| m.content.as_ref().map(|c| c.text()))
			.collect::<Vec<_>>()
			.join("\n");

		let mut msgs: Vec<messages::Message> = Vec::new();
		for msg in &req.messages {
			match msg.role {
				completions::Role::System | completions::Role::Developer => {},
				completions::Role::User => {
					let mut blocks = Vec::new();
					match &msg.content {
						Some(completions::MessageContent::Text(t)) => {
							blocks.push(messages::ContentBlock::Text { text: t.clone() });
						},
						Some(completions::MessageContent::Parts(parts)) => {
							for part in parts {
								match part {
									completions::ContentPart::Text { text } => {
										blocks.push(messages::ContentBlock::Text { text: text.clone() });
									},
									completions::ContentPart::ImageUrl { image_url } => {
										let source = match crate::llm::multimodal::decode_data_uri(&image_url.url) {
											Some(blob) => messages::ImageSource::Base64 {
												media_type: blob.mime_type,
												data: blob.data,
											},
											None => messages::ImageSource::Url {
												url: image_url.url.clone(),
											},
										};
										blocks.push(messages::ContentBlock::Image { source });
									},
									completions::ContentPart::InputAudio { .. } => {},
								}
							}
						},
						None => {},
					}
					if !blocks.is_empty() {
						msgs.push(messages::Message {
							role: messages::Role::User,
							content: blocks,
						});
					}
				},
				completions::Role::Assistant => {
					let mut blocks = Vec::new();
					if let Some(reasoning) = &msg.reasoning_content {
						// Anthropic rejects replayed thinking without its
						// signature; only include complete pairs.
						if let Some(sig) = msg
							.extra_content
							.as_ref()
							.and_then(|e| e.get("signature"))
							.and_then(|v| v.as_str())
						{
							blocks.push(messages::ContentBlock::Thinking {
								thinking: reasoning.clone(),
								signature: sig.to_string(),
							});
						}
					}
					if let Some(content) = &msg.content {
						let text = content.text();
						if !text.is_empty() {
							blocks.push(messages::ContentBlock::Text { text });
						}
					}
					for tc in &msg.tool_calls {
						blocks.push(messages::ContentBlock::ToolUse {
							id: tc.id.clone(),
							name: tc.function.name.clone(),
							input: serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| json!({})),
						});
					}
					if !blocks.is_empty() {
						msgs.push(messages::Message {
							role: messages::Role::Assistant,
							content: blocks,
						});
					}
				},
				completions::Role::Tool => {
					let block = messages::ContentBlock::ToolResult {
						tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
						content: messages::ToolResultContent::Text(
							msg.content.as_ref().map(|c| c.text()).unwrap_or_default(),
						),
						is_error: None,
					};
					// Tool results must arrive in a user turn.
					if let Some(last) = msgs.last_mut()
						&& last.role == messages::Role::User
						&& last
							.content
							.iter()
							.all(|b| matches!(b, messages::ContentBlock::ToolResult { .. }))
					{
						last.content.push(block);
					} else {
						msgs.push(messages::Message {
							role: messages::Role::User,
							content: vec![block],
						});
					}
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.map(|t| messages::Tool {
					name: t.function.name.clone(),
					description: t.function.description.clone(),
					input_schema: t.function.parameters.clone().unwrap_or_else(|| json!({})),
				})
				.collect()
		});

		let tool_choice = req.tool_choice.as_ref().and_then(|choice| match choice {
			completions::ToolChoice::Mode(mode) => match mode.as_str() {
				"auto" => Some(messages::ToolChoice::Auto),
				"required" => Some(messages::ToolChoice::Any),
				"none" => Some(messages::ToolChoice::None),
				_ => None,
			},
			completions::ToolChoice::Named { function, .. } => Some(messages::ToolChoice::Tool {
				name: function.name.clone(),
			}),
		});

		let thinking = req.thinking.as_ref().map(|t| match t {
			completions::ThinkingConfig::Enabled { budget_tokens } => messages::ThinkingInput::Enabled {
				budget_tokens: budget_tokens.unwrap_or(1024),
			},
			completions::ThinkingConfig::Disabled {} => messages::ThinkingInput::Disabled {},
		});

		let stop_sequences = match &req.stop {
			Some(Value::String(s)) => vec![s.clone()],
			Some(Value::Array(items)) => items
				.iter()
				.filter_map(|v| v.as_str().map(|s| s.to_string()))
				.collect(),
			_ => Vec::new(),
		};

		messages::Request {
			model: req.model.clone().unwrap_or_default(),
			messages: msgs,
			system: (!system.is_empty()).then(|| messages::SystemPrompt::Text(system)),
			max_tokens: req.output_cap().unwrap_or(DEFAULT_MAX_TOKENS),
			stop_sequences,
			stream: req.is_stream(),
			temperature: req.temperature,
			top_p: req.top_p,
			top_k: None,
			tools,
			tool_choice,
			metadata: req.user.as_ref().map(|u| json!({"user_id": u})),
			thinking,
		}
	}

	/// Translate an Anthropic response into an OpenAI chat completion.
	pub fn translate_response(bytes: &Bytes) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<messages::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let openai = translate_response_internal(&resp);
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &messages::Response) -> completions::Response {
		let mut content: Option<String> = None;
		let mut reasoning: Option<String> = None;
		let mut signature: Option<String> = None;
		let mut tool_calls: Vec<completions::ToolCall> = Vec::new();
		for block in &resp.content {
			match block {
				messages::ContentBlock::Text { text } => match &mut content {
					Some(c) => c.push_str(text),
					None => content = Some(text.clone()),
				},
				messages::ContentBlock::Thinking {
					thinking,
					signature: sig,
				} => {
					reasoning = Some(thinking.clone());
					if !sig.is_empty() {
						signature = Some(sig.clone());
					}
				},
				messages::ContentBlock::ToolUse { id, name, input } => {
					tool_calls.push(completions::ToolCall {
						id: ids::sanitize_call_id(id),
						kind: "function".to_string(),
						function: completions::FunctionCall {
							name: name.clone(),
							arguments: input.to_string(),
						},
					});
				},
				// Request-path blocks and redacted thinking do not surface.
				_ => {},
			}
		}
		completions::Response {
			id: resp.id.clone(),
			object: completions::OBJECT_COMPLETION.to_string(),
			created: Utc::now().timestamp(),
			model: resp.model.clone(),
			choices: vec![completions::Choice {
				index: 0,
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content: content.map(completions::MessageContent::Text),
					reasoning_content: reasoning,
					signature,
					tool_calls,
				},
				finish_reason: resp.stop_reason.map(stop_reason_to_openai),
			}],
			usage: Some(completions::Usage::from_billing(&resp.usage.to_billing())),
			rest: Value::Null,
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res =
			serde_json::from_slice::<messages::ErrorResponse>(bytes).map_err(AIError::ResponseParsing)?;
		let m = completions::ErrorResponse {
			error: completions::ErrorDetail {
				message: res.error.message,
				kind: res.error.r#type,
				param: None,
				code: None,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	/// Anthropic typed events to OpenAI chunks.
	pub fn translate_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
		let created = Utc::now().timestamp();
		let mut message_id: Option<String> = None;
		let mut model = String::new();
		let mut input_tokens: u64 = 0;
		// Anthropic block index to OpenAI tool index for in-flight tool_use
		// blocks.
		let mut block_tools: HashMap<usize, u32> = HashMap::new();
		let mut next_tool: u32 = 0;
		let mut usage: Option<completions::Usage> = None;
		let mut finish: Option<completions::FinishReason> = None;
		parse::sse::json_transform_multi::<messages::StreamEvent, _>(b, buffer_limit, move |ev| {
			let mk = |message_id: &Option<String>,
			          model: &str,
			          choices: Vec<completions::StreamChoice>,
			          usage: Option<completions::Usage>| {
				let mut r = completions::StreamResponse::new(
					message_id.as_deref().unwrap_or("unknown"),
					model,
					created,
				);
				r.choices = choices;
				r.usage = usage;
				r
			};
			let delta_choice = |delta: completions::Delta| completions::StreamChoice {
				index: 0,
				delta,
				finish_reason: None,
			};
			match ev {
				Event::Data(Ok(event)) => match event {
					messages::StreamEvent::MessageStart { message } => {
						message_id = Some(message.id.clone());
						model = message.model.clone();
						input_tokens = message.usage.input_tokens;
						let model_name = message.model.clone();
						log.non_atomic_mutate(|r| {
							r.usage.supersede(message.usage.to_billing());
							r.provider_model = Some(relay_core::strng::new(&model_name));
						});
						let mut delta = completions::Delta::default();
						delta.role = Some(completions::Role::Assistant);
						vec![OutFrame::data(&mk(
							&message_id,
							&model,
							vec![delta_choice(delta)],
							None,
						))]
					},
					messages::StreamEvent::ContentBlockStart {
						index,
						content_block,
					} => match content_block {
						messages::ContentBlock::ToolUse { id, name, .. } => {
							let tool_index = next_tool;
							next_tool += 1;
							block_tools.insert(index, tool_index);
							let mut delta = completions::Delta::default();
							delta.tool_calls = vec![completions::DeltaToolCall {
								index: tool_index,
								id: Some(ids::sanitize_call_id(&id)),
								kind: Some("function".to_string()),
								function: completions::DeltaFunction {
									name: Some(name),
									arguments: Some(String::new()),
								},
							}];
							vec![OutFrame::data(&mk(
								&message_id,
								&model,
								vec![delta_choice(delta)],
								None,
							))]
						},
						_ => Vec::new(),
					},
					messages::StreamEvent::ContentBlockDelta { index, delta } => {
						log.non_atomic_mutate(|r| r.saw_token());
						let mut dr = completions::Delta::default();
						match delta {
							messages::ContentBlockDelta::TextDelta { text } => {
								log.non_atomic_mutate(|r| r.completion.push_str(&text));
								dr.content = Some(text);
							},
							messages::ContentBlockDelta::ThinkingDelta { thinking } => {
								dr.reasoning_content = Some(thinking);
							},
							messages::ContentBlockDelta::SignatureDelta { signature } => {
								dr.signature = Some(signature);
							},
							messages::ContentBlockDelta::InputJsonDelta { partial_json } => {
								let Some(tool_index) = block_tools.get(&index) else {
									return Vec::new();
								};
								dr.tool_calls = vec![completions::DeltaToolCall {
									index: *tool_index,
									id: None,
									kind: None,
									function: completions::DeltaFunction {
										name: None,
										arguments: Some(partial_json),
									},
								}];
							},
						}
						vec![OutFrame::data(&mk(
							&message_id,
							&model,
							vec![delta_choice(dr)],
							None,
						))]
					},
					messages::StreamEvent::MessageDelta { delta, usage: u } => {
						let total = completions::Usage {
							prompt_tokens: input_tokens,
							completion_tokens: u.output_tokens,
							total_tokens: input_tokens + u.output_tokens,
							prompt_tokens_details: u.cache_read_input_tokens.map(|cached| {
								completions::PromptTokensDetails {
									cached_tokens: cached,
									audio_tokens: 0,
								}
							}),
							completion_tokens_details: None,
						};
						log.non_atomic_mutate(|r| r.usage.supersede(total.to_billing()));
						usage = Some(total);
						finish = delta.stop_reason.map(stop_reason_to_openai);
						let choice = completions::StreamChoice {
							index: 0,
							delta: completions::Delta::default(),
							finish_reason: finish,
						};
						vec![OutFrame::data(&mk(&message_id, &model, vec![choice], None))]
					},
					messages::StreamEvent::ContentBlockStop { .. }
					| messages::StreamEvent::MessageStop
					| messages::StreamEvent::Ping => Vec::new(),
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					vec![
						OutFrame::data(&mk(&message_id, &model, Vec::new(), usage.take())),
						OutFrame::done(),
					]
				},
			}
		})
	}
}

fn stop_reason_to_openai(reason: messages::StopReason) -> completions::FinishReason {
	match reason {
		messages::StopReason::EndTurn | messages::StopReason::StopSequence => {
			completions::FinishReason::Stop
		},
		messages::StopReason::MaxTokens => completions::FinishReason::Length,
		messages::StopReason::ToolUse => completions::FinishReason::ToolCalls,
		messages::StopReason::Refusal => completions::FinishReason::ContentFilter,
	}
}

/// Observe an Anthropic-to-Anthropic stream without rewriting it.
pub fn passthrough_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
	let mut input_tokens: u64 = 0;
	parse::sse::json_passthrough::<messages::StreamEvent, _>(b, buffer_limit, move |ev| {
		let Some(Ok(ev)) = ev else { return };
		match ev {
			messages::StreamEvent::MessageStart { message } => {
				input_tokens = message.usage.input_tokens;
				log.non_atomic_mutate(|r| {
					r.usage.supersede(message.usage.to_billing());
					r.provider_model = Some(relay_core::strng::new(&message.model));
				});
			},
			messages::StreamEvent::ContentBlockDelta { delta, .. } => {
				log.non_atomic_mutate(|r| {
					r.saw_token();
					if let messages::ContentBlockDelta::TextDelta { text } = &delta {
						r.completion.push_str(text);
					}
				});
			},
			messages::StreamEvent::MessageDelta { usage, .. } => {
				let mut u = usage;
				u.input_tokens = input_tokens;
				log.non_atomic_mutate(|r| r.usage.supersede(u.to_billing()));
			},
			_ => {},
		}
	})
}
