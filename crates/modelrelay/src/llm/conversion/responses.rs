//! Translation between client dialects and the OpenAI Responses upstream
//! dialect, used for models that only exist behind `/v1/responses`.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::Utc;
use itertools::Itertools;
use serde_json::{Value, json};

use super::{PendingCalls, ids, schema};
use crate::http::Body;
use crate::llm::types::{completions, gemini, messages, responses};
use crate::llm::{AIError, StreamInfo};
use crate::parse;
use crate::parse::sse::{Event, OutFrame};
use crate::telemetry::AsyncLog;

/// Claude-style thinking budgets collapse onto effort tiers.
fn budget_to_effort(budget: u64) -> &'static str {
	if budget < 2048 {
		"low"
	} else if budget < 4096 {
		"medium"
	} else {
		"high"
	}
}

fn status_to_finish(status: &str) -> completions::FinishReason {
	match status {
		responses::STATUS_INCOMPLETE => completions::FinishReason::Length,
		_ => completions::FinishReason::Stop,
	}
}

fn status_to_stop_reason(status: &str) -> messages::StopReason {
	match status {
		responses::STATUS_INCOMPLETE => messages::StopReason::MaxTokens,
		_ => messages::StopReason::EndTurn,
	}
}

/// Observe a Responses-to-Responses stream without rewriting it.
pub fn passthrough_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
	parse::sse::json_passthrough::<responses::StreamEvent, _>(b, buffer_limit, move |ev| {
		let Some(Ok(event)) = ev else { return };
		match event {
			responses::StreamEvent::Created { response }
			| responses::StreamEvent::Completed { response }
			| responses::StreamEvent::Incomplete { response }
			| responses::StreamEvent::Failed { response } => {
				log.non_atomic_mutate(|r| {
					r.provider_model = Some(relay_core::strng::new(&response.model));
					if let Some(u) = &response.usage {
						r.usage.supersede(u.to_billing());
					}
				});
			},
			responses::StreamEvent::OutputTextDelta { delta, .. } => {
				log.non_atomic_mutate(|r| {
					r.saw_token();
					r.completion.push_str(&delta);
				});
			},
			_ => {},
		}
	})
}

pub mod from_completions {
	use super::*;

	/// Translate an OpenAI chat-completions request into a Responses-API
	/// request. Conversation state is never stored upstream.
	pub fn translate(req: &completions::Request) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(req: &completions::Request) -> responses::Request {
		let mut items: Vec<responses::InputItem> = Vec::new();
		for msg in &req.messages {
			match msg.role {
				completions::Role::System | completions::Role::Developer | completions::Role::User => {
					let role = match msg.role {
						completions::Role::User => "user",
						_ => "system",
					};
					let content = match &msg.content {
						Some(completions::MessageContent::Text(t)) => {
							Some(responses::InputContent::Text(t.clone()))
						},
						Some(completions::MessageContent::Parts(parts)) => {
							let converted: Vec<responses::InputContentPart> = parts
								.iter()
								.filter_map(|p| match p {
									completions::ContentPart::Text { text } => {
										Some(responses::InputContentPart::InputText { text: text.clone() })
									},
									completions::ContentPart::ImageUrl { image_url } => {
										Some(responses::InputContentPart::InputImage {
											image_url: Some(image_url.url.clone()),
											detail: image_url.detail.clone(),
										})
									},
									completions::ContentPart::InputAudio { .. } => None,
								})
								.collect();
							Some(responses::InputContent::Parts(converted))
						},
						None => None,
					};
					if let Some(content) = content {
						items.push(responses::InputItem::Message {
							role: role.to_string(),
							content,
						});
					}
				},
				completions::Role::Assistant => {
					if let Some(content) = &msg.content {
						let text = content.text();
						if !text.is_empty() {
							items.push(responses::InputItem::Message {
								role: "assistant".to_string(),
								content: responses::InputContent::Text(text),
							});
						}
					}
					for tc in &msg.tool_calls {
						items.push(responses::InputItem::FunctionCall {
							id: None,
							call_id: tc.id.clone(),
							name: tc.function.name.clone(),
							arguments: tc.function.arguments.clone(),
						});
					}
				},
				completions::Role::Tool => {
					items.push(responses::InputItem::FunctionCallOutput {
						call_id: msg.tool_call_id.clone().unwrap_or_default(),
						output: msg.content.as_ref().map(|c| c.text()).unwrap_or_default(),
					});
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.map(|t| responses::ToolDefinition {
					kind: "function".to_string(),
					name: Some(t.function.name.clone()),
					description: t.function.description.clone(),
					parameters: t.function.parameters.as_ref().map(schema::clean_required),
					strict: t.function.strict,
					rest: Value::Null,
				})
				.collect()
		});

		let tool_choice = req.tool_choice.as_ref().map(|choice| match choice {
			completions::ToolChoice::Mode(m) => json!(m),
			completions::ToolChoice::Named { function, .. } => {
				json!({"type": "function", "name": function.name})
			},
		});

		let reasoning = match (&req.reasoning_effort, &req.thinking) {
			(Some(effort), _) => Some(responses::ReasoningConfig {
				effort: Some(effort.clone()),
				summary: None,
			}),
			(None, Some(completions::ThinkingConfig::Enabled { budget_tokens })) => {
				Some(responses::ReasoningConfig {
					effort: Some(budget_to_effort(budget_tokens.unwrap_or(1024)).to_string()),
					summary: None,
				})
			},
			_ => None,
		};

		responses::Request {
			model: req.model.clone(),
			input: responses::Input::Items(items),
			instructions: None,
			max_output_tokens: req.output_cap(),
			temperature: req.temperature,
			top_p: req.top_p,
			stream: req.stream,
			store: Some(false),
			tools,
			tool_choice,
			reasoning,
			rest: Value::Null,
		}
	}

	/// Translate a Responses-API response into an OpenAI chat completion.
	/// Every output item becomes its own choice, reasoning items included;
	/// single-choice consumers take index 0.
	pub fn translate_response(bytes: &Bytes) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<responses::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let openai = translate_response_internal(&resp);
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &responses::Response) -> completions::Response {
		let mut choices: Vec<completions::Choice> = Vec::new();
		for item in &resp.output {
			let index = choices.len() as u32;
			match item {
				responses::OutputItem::Message { content, .. } => {
					let text = content
						.iter()
						.filter_map(|c| match c {
							responses::OutputContent::OutputText { text, .. } => Some(text.as_str()),
							_ => None,
						})
						.join("");
					choices.push(completions::Choice {
						index,
						message: completions::ResponseMessage {
							role: completions::Role::Assistant,
							content: Some(completions::MessageContent::Text(text)),
							..Default::default()
						},
						finish_reason: Some(status_to_finish(&resp.status)),
					});
				},
				responses::OutputItem::FunctionCall {
					call_id,
					name,
					arguments,
					..
				} => {
					choices.push(completions::Choice {
						index,
						message: completions::ResponseMessage {
							role: completions::Role::Assistant,
							tool_calls: vec![completions::ToolCall {
								id: ids::sanitize_call_id(call_id),
								kind: "function".to_string(),
								function: completions::FunctionCall {
									name: name.clone(),
									arguments: arguments.clone(),
								},
							}],
							..Default::default()
						},
						finish_reason: Some(completions::FinishReason::ToolCalls),
					});
				},
				responses::OutputItem::Reasoning { summary, .. } => {
					let text = summary
						.iter()
						.map(|s| s.text.as_str())
						.join("\n");
					choices.push(completions::Choice {
						index,
						message: completions::ResponseMessage {
							role: completions::Role::Assistant,
							content: Some(completions::MessageContent::Text(text)),
							..Default::default()
						},
						finish_reason: Some(status_to_finish(&resp.status)),
					});
				},
				responses::OutputItem::Unknown => {},
			}
		}
		completions::Response {
			id: resp.id.clone(),
			object: completions::OBJECT_COMPLETION.to_string(),
			created: resp.created_at,
			model: resp.model.clone(),
			choices,
			usage: resp
				.usage
				.as_ref()
				.map(|u| completions::Usage::from_billing(&u.to_billing())),
			rest: Value::Null,
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		// Responses errors already use the OpenAI error envelope.
		let res =
			serde_json::from_slice::<responses::ErrorResponse>(bytes).map_err(AIError::ResponseParsing)?;
		let m = completions::ErrorResponse {
			error: completions::ErrorDetail {
				message: res.error.message,
				kind: res.error.kind,
				param: res.error.param,
				code: res.error.code,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	/// Responses event stream to OpenAI chunks. Partial function-call
	/// argument deltas are forwarded as they arrive; chat chunks can express
	/// them.
	pub fn translate_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
		let created = Utc::now().timestamp();
		let mut id = ids::new_completion_id();
		let mut model = String::new();
		// output_index -> chat tool index for in-flight function_call items.
		let mut tool_indices: HashMap<usize, u32> = HashMap::new();
		let mut next_tool: u32 = 0;
		let mut saw_tools = false;
		let mut usage: Option<completions::Usage> = None;
		let mut finish: Option<completions::FinishReason> = None;
		parse::sse::json_transform_multi::<responses::StreamEvent, _>(b, buffer_limit, move |ev| {
			let mk = |id: &str,
			          model: &str,
			          choices: Vec<completions::StreamChoice>,
			          usage: Option<completions::Usage>| {
				let mut r = completions::StreamResponse::new(id, model, created);
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
					responses::StreamEvent::Created { response }
					| responses::StreamEvent::InProgress { response } => {
						id = response.id.clone();
						model = response.model.clone();
						let model_name = response.model.clone();
						log.non_atomic_mutate(|r| {
							r.provider_model = Some(relay_core::strng::new(&model_name));
						});
						Vec::new()
					},
					responses::StreamEvent::OutputItemAdded { output_index, item } => match item {
						responses::OutputItem::FunctionCall { call_id, name, .. } => {
							saw_tools = true;
							let tool_index = next_tool;
							next_tool += 1;
							tool_indices.insert(output_index, tool_index);
							let mut delta = completions::Delta::default();
							delta.tool_calls = vec![completions::DeltaToolCall {
								index: tool_index,
								id: Some(ids::sanitize_call_id(&call_id)),
								kind: Some("function".to_string()),
								function: completions::DeltaFunction {
									name: Some(name),
									arguments: Some(String::new()),
								},
							}];
							vec![OutFrame::data(&mk(&id, &model, vec![delta_choice(delta)], None))]
						},
						_ => Vec::new(),
					},
					responses::StreamEvent::OutputTextDelta { delta, .. } => {
						log.non_atomic_mutate(|r| {
							r.saw_token();
							r.completion.push_str(&delta);
						});
						let mut dr = completions::Delta::default();
						dr.content = Some(delta);
						vec![OutFrame::data(&mk(&id, &model, vec![delta_choice(dr)], None))]
					},
					responses::StreamEvent::ReasoningTextDelta { delta, .. }
					| responses::StreamEvent::ReasoningSummaryTextDelta { delta, .. } => {
						log.non_atomic_mutate(|r| r.saw_token());
						let mut dr = completions::Delta::default();
						dr.reasoning_content = Some(delta);
						vec![OutFrame::data(&mk(&id, &model, vec![delta_choice(dr)], None))]
					},
					responses::StreamEvent::FunctionCallArgumentsDelta {
						output_index,
						delta,
						..
					} => {
						let Some(tool_index) = tool_indices.get(&output_index) else {
							return Vec::new();
						};
						let mut dr = completions::Delta::default();
						dr.tool_calls = vec![completions::DeltaToolCall {
							index: *tool_index,
							id: None,
							kind: None,
							function: completions::DeltaFunction {
								name: None,
								arguments: Some(delta),
							},
						}];
						vec![OutFrame::data(&mk(&id, &model, vec![delta_choice(dr)], None))]
					},
					responses::StreamEvent::Completed { response }
					| responses::StreamEvent::Incomplete { response }
					| responses::StreamEvent::Failed { response } => {
						if let Some(u) = &response.usage {
							let billing = u.to_billing();
							usage = Some(completions::Usage::from_billing(&billing));
							log.non_atomic_mutate(|r| r.usage.supersede(billing));
						}
						finish = Some(if saw_tools {
							completions::FinishReason::ToolCalls
						} else {
							status_to_finish(&response.status)
						});
						let choice = completions::StreamChoice {
							index: 0,
							delta: completions::Delta::default(),
							finish_reason: finish,
						};
						vec![OutFrame::data(&mk(&id, &model, vec![choice], None))]
					},
					_ => Vec::new(),
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					vec![
						OutFrame::data(&mk(&id, &model, Vec::new(), usage.take())),
						OutFrame::done(),
					]
				},
			}
		})
	}
}

pub mod from_messages {
	use super::*;

	/// Translate an Anthropic messages request into a Responses-API request.
	pub fn translate(req: &messages::Request) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(req: &messages::Request) -> responses::Request {
		let mut items: Vec<responses::InputItem> = Vec::new();
		let mut renames: HashMap<String, String> = HashMap::new();
		for msg in &req.messages {
			match msg.role {
				messages::Role::User => {
					let mut parts: Vec<responses::InputContentPart> = Vec::new();
					for block in &msg.content {
						match block {
							messages::ContentBlock::Text { text } => {
								parts.push(responses::InputContentPart::InputText { text: text.clone() });
							},
							messages::ContentBlock::Image { source } => {
								let url = match source {
									messages::ImageSource::Base64 { media_type, data } => {
										format!("data:{media_type};base64,{data}")
									},
									messages::ImageSource::Url { url } => url.clone(),
								};
								parts.push(responses::InputContentPart::InputImage {
									image_url: Some(url),
									detail: None,
								});
							},
							messages::ContentBlock::ToolResult {
								tool_use_id,
								content,
								..
							} => {
								let call_id = renames
									.get(tool_use_id)
									.cloned()
									.unwrap_or_else(|| tool_use_id.clone());
								items.push(responses::InputItem::FunctionCallOutput {
									call_id,
									output: content.joined_text(),
								});
							},
							_ => {},
						}
					}
					if !parts.is_empty() {
						items.push(responses::InputItem::Message {
							role: "user".to_string(),
							content: responses::InputContent::Parts(parts),
						});
					}
				},
				messages::Role::Assistant => {
					for block in &msg.content {
						match block {
							messages::ContentBlock::Text { text } => {
								items.push(responses::InputItem::Message {
									role: "assistant".to_string(),
									content: responses::InputContent::Text(text.clone()),
								});
							},
							messages::ContentBlock::ToolUse { id, name, input } => {
								let call_id = ids::sanitize_call_id(id);
								if call_id != *id {
									renames.insert(id.clone(), call_id.clone());
								}
								items.push(responses::InputItem::FunctionCall {
									id: None,
									call_id,
									name: name.clone(),
									arguments: input.to_string(),
								});
							},
							_ => {},
						}
					}
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			tools
				.iter()
				.map(|t| responses::ToolDefinition {
					kind: "function".to_string(),
					name: Some(t.name.clone()),
					description: t.description.clone(),
					parameters: Some(schema::clean_required(&t.input_schema)),
					strict: None,
					rest: Value::Null,
				})
				.collect()
		});

		let reasoning = req.thinking.as_ref().and_then(|t| match t {
			messages::ThinkingInput::Enabled { budget_tokens } => Some(responses::ReasoningConfig {
				effort: Some(budget_to_effort(*budget_tokens).to_string()),
				summary: Some("auto".to_string()),
			}),
			messages::ThinkingInput::Disabled {} => None,
		});

		responses::Request {
			model: Some(req.model.clone()),
			input: responses::Input::Items(items),
			instructions: req.system.as_ref().map(|s| s.joined_text()),
			max_output_tokens: Some(req.max_tokens),
			temperature: req.temperature,
			top_p: req.top_p,
			stream: Some(req.stream),
			store: Some(false),
			tools,
			tool_choice: req.tool_choice.as_ref().map(|tc| match tc {
				messages::ToolChoice::Auto => json!("auto"),
				messages::ToolChoice::Any => json!("required"),
				messages::ToolChoice::None => json!("none"),
				messages::ToolChoice::Tool { name } => json!({"type": "function", "name": name}),
			}),
			reasoning,
			rest: Value::Null,
		}
	}

	/// Translate a Responses-API response into an Anthropic response.
	pub fn translate_response(bytes: &Bytes) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<responses::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let claude = translate_response_internal(&resp);
		serde_json::to_vec(&claude).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &responses::Response) -> messages::Response {
		let mut content: Vec<messages::ContentBlock> = Vec::new();
		let mut has_tools = false;
		for item in &resp.output {
			match item {
				responses::OutputItem::Message { content: parts, .. } => {
					let text = parts
						.iter()
						.filter_map(|c| match c {
							responses::OutputContent::OutputText { text, .. } => Some(text.as_str()),
							_ => None,
						})
						.collect::<Vec<_>>()
						.join("");
					if !text.is_empty() {
						content.push(messages::ContentBlock::Text { text });
					}
				},
				responses::OutputItem::Reasoning { summary, .. } => {
					let text = summary
						.iter()
						.map(|s| s.text.as_str())
						.join("\n");
					if !text.is_empty() {
						content.push(messages::ContentBlock::Thinking {
							thinking: text,
							signature: String::new(),
						});
					}
				},
				responses::OutputItem::FunctionCall {
					call_id,
					name,
					arguments,
					..
				} => {
					has_tools = true;
					content.push(messages::ContentBlock::ToolUse {
						id: ids::sanitize_call_id(call_id),
						name: name.clone(),
						input: serde_json::from_str(arguments).unwrap_or_else(|_| json!({})),
					});
				},
				responses::OutputItem::Unknown => {},
			}
		}
		if content.is_empty() {
			content.push(messages::ContentBlock::Text {
				text: String::new(),
			});
		}
		messages::Response {
			id: ids::new_message_id(),
			r#type: "message".to_string(),
			role: messages::Role::Assistant,
			content,
			model: resp.model.clone(),
			stop_reason: Some(if has_tools {
				messages::StopReason::ToolUse
			} else {
				status_to_stop_reason(&resp.status)
			}),
			stop_sequence: None,
			usage: resp
				.usage
				.as_ref()
				.map(|u| messages::Usage::from_billing(&u.to_billing()))
				.unwrap_or_default(),
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res =
			serde_json::from_slice::<responses::ErrorResponse>(bytes).map_err(AIError::ResponseParsing)?;
		let m = messages::ErrorResponse {
			r#type: "error".to_string(),
			error: messages::ErrorDetail {
				r#type: "api_error".to_string(),
				message: res.error.message,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	enum OpenBlock {
		None,
		Text,
		Thinking,
		Tool,
	}

	/// Responses event stream to Anthropic typed events.
	pub fn translate_stream(b: Body, buffer_limit: usize, log: AsyncLog<StreamInfo>) -> Body {
		let id = ids::new_message_id();
		let mut started = false;
		let mut finished = false;
		let mut block = OpenBlock::None;
		let mut block_index: usize = 0;
		let mut tool_blocks: HashMap<usize, usize> = HashMap::new();
		let mut has_tools = false;
		parse::sse::json_transform_multi::<responses::StreamEvent, _>(b, buffer_limit, move |ev| {
			let ev_frame = |e: &messages::StreamEvent| OutFrame::event(e.event_name(), e);
			let close = |out: &mut Vec<OutFrame>, block: &mut OpenBlock, block_index: &mut usize| {
				if !matches!(block, OpenBlock::None) {
					out.push(OutFrame::event(
						"content_block_stop",
						&messages::StreamEvent::ContentBlockStop {
							index: *block_index,
						},
					));
					*block_index += 1;
					*block = OpenBlock::None;
				}
			};
			match ev {
				Event::Data(Ok(event)) => match event {
					responses::StreamEvent::Created { response } => {
						started = true;
						log.non_atomic_mutate(|r| {
							r.provider_model = Some(relay_core::strng::new(&response.model));
						});
						vec![ev_frame(&messages::StreamEvent::MessageStart {
							message: messages::Response {
								id: id.clone(),
								r#type: "message".to_string(),
								role: messages::Role::Assistant,
								content: Vec::new(),
								model: response.model.clone(),
								stop_reason: None,
								stop_sequence: None,
								usage: messages::Usage::default(),
							},
						})]
					},
					responses::StreamEvent::OutputTextDelta { delta, .. } => {
						log.non_atomic_mutate(|r| {
							r.saw_token();
							r.completion.push_str(&delta);
						});
						let mut out = Vec::new();
						if !matches!(block, OpenBlock::Text) {
							close(&mut out, &mut block, &mut block_index);
							block = OpenBlock::Text;
							out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
								index: block_index,
								content_block: messages::ContentBlock::Text {
									text: String::new(),
								},
							}));
						}
						out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
							index: block_index,
							delta: messages::ContentBlockDelta::TextDelta { text: delta },
						}));
						out
					},
					responses::StreamEvent::ReasoningTextDelta { delta, .. }
					| responses::StreamEvent::ReasoningSummaryTextDelta { delta, .. } => {
						log.non_atomic_mutate(|r| r.saw_token());
						let mut out = Vec::new();
						if !matches!(block, OpenBlock::Thinking) {
							close(&mut out, &mut block, &mut block_index);
							block = OpenBlock::Thinking;
							out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
								index: block_index,
								content_block: messages::ContentBlock::Thinking {
									thinking: String::new(),
									signature: String::new(),
								},
							}));
						}
						out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
							index: block_index,
							delta: messages::ContentBlockDelta::ThinkingDelta { thinking: delta },
						}));
						out
					},
					responses::StreamEvent::OutputItemAdded { output_index, item } => match item {
						responses::OutputItem::FunctionCall { call_id, name, .. } => {
							has_tools = true;
							let mut out = Vec::new();
							close(&mut out, &mut block, &mut block_index);
							block = OpenBlock::Tool;
							tool_blocks.insert(output_index, block_index);
							out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
								index: block_index,
								content_block: messages::ContentBlock::ToolUse {
									id: ids::sanitize_call_id(&call_id),
									name,
									input: json!({}),
								},
							}));
							out
						},
						_ => Vec::new(),
					},
					responses::StreamEvent::FunctionCallArgumentsDelta {
						output_index,
						delta,
						..
					} => {
						let Some(idx) = tool_blocks.get(&output_index) else {
							return Vec::new();
						};
						vec![ev_frame(&messages::StreamEvent::ContentBlockDelta {
							index: *idx,
							delta: messages::ContentBlockDelta::InputJsonDelta {
								partial_json: delta,
							},
						})]
					},
					responses::StreamEvent::OutputItemDone { .. } => {
						let mut out = Vec::new();
						close(&mut out, &mut block, &mut block_index);
						out
					},
					responses::StreamEvent::Completed { response }
					| responses::StreamEvent::Incomplete { response }
					| responses::StreamEvent::Failed { response } => {
						finished = true;
						let usage = response
							.usage
							.as_ref()
							.map(|u| {
								let billing = u.to_billing();
								log.non_atomic_mutate(|r| r.usage.supersede(billing));
								messages::Usage::from_billing(&billing)
							})
							.unwrap_or_default();
						let mut out = Vec::new();
						close(&mut out, &mut block, &mut block_index);
						out.push(ev_frame(&messages::StreamEvent::MessageDelta {
							delta: messages::MessageDelta {
								stop_reason: Some(if has_tools {
									messages::StopReason::ToolUse
								} else {
									status_to_stop_reason(&response.status)
								}),
								stop_sequence: None,
							},
							usage,
						}));
						out.push(ev_frame(&messages::StreamEvent::MessageStop));
						out
					},
					_ => Vec::new(),
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					// A truncated stream still closes the Anthropic envelope.
					if !started || finished {
						return Vec::new();
					}
					let mut out = Vec::new();
					close(&mut out, &mut block, &mut block_index);
					out.push(ev_frame(&messages::StreamEvent::MessageDelta {
						delta: messages::MessageDelta {
							stop_reason: Some(messages::StopReason::EndTurn),
							stop_sequence: None,
						},
						usage: messages::Usage::default(),
					}));
					out.push(ev_frame(&messages::StreamEvent::MessageStop));
					out
				},
			}
		})
	}
}

pub mod from_gemini {
	use super::*;

	/// Translate a Gemini-native request into a Responses-API request.
	/// Stream-ness comes from the route, not the body.
	pub fn translate(req: &gemini::Request, model: &str, stream: bool) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req, model, stream);
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(req: &gemini::Request, model: &str, stream: bool) -> responses::Request {
		let mut items: Vec<responses::InputItem> = Vec::new();
		let mut pending = PendingCalls::default();
		for content in &req.contents {
			let is_model = content.role.as_deref() == Some(gemini::ROLE_MODEL);
			if is_model {
				for part in &content.parts {
					if let Some(text) = &part.text {
						if !part.thought {
							items.push(responses::InputItem::Message {
								role: "assistant".to_string(),
								content: responses::InputContent::Text(text.clone()),
							});
						}
					}
					if let Some(fc) = &part.function_call {
						let call_id = ids::new_call_id();
						pending.push(&fc.name, &call_id);
						items.push(responses::InputItem::FunctionCall {
							id: None,
							call_id,
							name: fc.name.clone(),
							arguments: fc.args.to_string(),
						});
					}
				}
				continue;
			}
			let mut parts: Vec<responses::InputContentPart> = Vec::new();
			for part in &content.parts {
				if let Some(text) = &part.text {
					parts.push(responses::InputContentPart::InputText { text: text.clone() });
				}
				if let Some(blob) = &part.inline_data {
					parts.push(responses::InputContentPart::InputImage {
						image_url: Some(format!("data:{};base64,{}", blob.mime_type, blob.data)),
						detail: None,
					});
				}
				if let Some(fr) = &part.function_response {
					let call_id = match pending.pop_by_name(&fr.name) {
						Some(id) => id,
						None => {
							let id = ids::new_call_id();
							items.push(responses::InputItem::FunctionCall {
								id: None,
								call_id: id.clone(),
								name: fr.name.clone(),
								arguments: "{}".to_string(),
							});
							id
						},
					};
					items.push(responses::InputItem::FunctionCallOutput {
						call_id,
						output: fr.response.to_string(),
					});
				}
			}
			if !parts.is_empty() {
				items.push(responses::InputItem::Message {
					role: "user".to_string(),
					content: responses::InputContent::Parts(parts),
				});
			}
		}

		let tools: Vec<responses::ToolDefinition> = req
			.tools
			.iter()
			.flat_map(|t| t.function_declarations.iter().flatten())
			.map(|fd| responses::ToolDefinition {
				kind: "function".to_string(),
				name: Some(fd.name.clone()),
				description: fd.description.clone(),
				parameters: fd.parameters.as_ref().map(schema::clean_required),
				strict: None,
				rest: Value::Null,
			})
			.collect();

		let gc = req.generation_config.as_ref();
		let reasoning = gc
			.and_then(|g| g.thinking_config.as_ref())
			.filter(|tc| tc.include_thoughts)
			.map(|tc| responses::ReasoningConfig {
				effort: Some(budget_to_effort(tc.thinking_budget.unwrap_or(1024)).to_string()),
				summary: Some("auto".to_string()),
			});

		responses::Request {
			model: Some(model.to_string()),
			input: responses::Input::Items(items),
			instructions: req.system_instruction.as_ref().map(|s| {
				s.parts
					.iter()
					.filter_map(|p| p.text.as_deref())
					.join("\n")
			}),
			max_output_tokens: gc.and_then(|g| g.max_output_tokens),
			temperature: gc.and_then(|g| g.temperature),
			top_p: gc.and_then(|g| g.top_p),
			stream: Some(stream),
			store: Some(false),
			tools: (!tools.is_empty()).then_some(tools),
			tool_choice: None,
			reasoning,
			rest: Value::Null,
		}
	}

	/// Translate a Responses-API response into a Gemini response.
	pub fn translate_response(bytes: &Bytes, model: &str) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<responses::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let gem = translate_response_internal(&resp, model);
		serde_json::to_vec(&gem).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &responses::Response, model: &str) -> gemini::Response {
		let mut parts: Vec<gemini::Part> = Vec::new();
		for item in &resp.output {
			match item {
				responses::OutputItem::Reasoning { summary, .. } => {
					let text = summary
						.iter()
						.map(|s| s.text.as_str())
						.join("\n");
					if !text.is_empty() {
						parts.push(gemini::Part {
							text: Some(text),
							thought: true,
							..Default::default()
						});
					}
				},
				responses::OutputItem::Message { content, .. } => {
					let text = content
						.iter()
						.filter_map(|c| match c {
							responses::OutputContent::OutputText { text, .. } => Some(text.as_str()),
							_ => None,
						})
						.join("");
					if !text.is_empty() {
						parts.push(gemini::Part::text(text));
					}
				},
				responses::OutputItem::FunctionCall {
					name, arguments, ..
				} => {
					parts.push(gemini::Part {
						function_call: Some(gemini::FunctionCall {
							name: name.clone(),
							args: serde_json::from_str(arguments).unwrap_or_else(|_| json!({})),
						}),
						..Default::default()
					});
				},
				responses::OutputItem::Unknown => {},
			}
		}
		let finish_reason = match resp.status.as_str() {
			responses::STATUS_INCOMPLETE => gemini::FINISH_MAX_TOKENS,
			_ => gemini::FINISH_STOP,
		};
		gemini::Response {
			candidates: vec![gemini::Candidate {
				content: Some(gemini::Content {
					role: Some(gemini::ROLE_MODEL.to_string()),
					parts,
				}),
				finish_reason: Some(finish_reason.to_string()),
				index: Some(0),
			}],
			usage_metadata: resp
				.usage
				.as_ref()
				.map(|u| gemini::UsageMetadata::from_billing(&u.to_billing())),
			model_version: Some(model.to_string()),
			response_id: Some(resp.id.clone()),
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res =
			serde_json::from_slice::<responses::ErrorResponse>(bytes).map_err(AIError::ResponseParsing)?;
		let m = gemini::ErrorResponse {
			error: gemini::ErrorDetail {
				code: res.error.code.as_ref().and_then(|c| c.as_i64()).unwrap_or(500) as i32,
				message: res.error.message,
				status: res.error.kind,
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	/// Responses event stream to Gemini SSE. Gemini cannot express partial
	/// function-call JSON, so arguments are only emitted once `.done`
	/// reports the full string.
	pub fn translate_stream(
		b: Body,
		buffer_limit: usize,
		model: &str,
		log: AsyncLog<StreamInfo>,
	) -> Body {
		let model = model.to_string();
		// output_index -> function name, filled by output_item.added.
		let mut call_names: HashMap<usize, String> = HashMap::new();
		let mut emitted_calls: std::collections::HashSet<usize> = Default::default();
		let mut saw_tools = false;
		parse::sse::json_transform_multi::<responses::StreamEvent, _>(b, buffer_limit, move |ev| {
			let candidate_frame = |parts: Vec<gemini::Part>,
			                       finish: Option<String>,
			                       usage: Option<gemini::UsageMetadata>,
			                       model: &str| {
				OutFrame::data(&gemini::Response {
					candidates: vec![gemini::Candidate {
						content: Some(gemini::Content {
							role: Some(gemini::ROLE_MODEL.to_string()),
							parts,
						}),
						finish_reason: finish,
						index: Some(0),
					}],
					usage_metadata: usage,
					model_version: Some(model.to_string()),
					response_id: None,
				})
			};
			match ev {
				Event::Data(Ok(event)) => match event {
					responses::StreamEvent::OutputTextDelta { delta, .. } => {
						log.non_atomic_mutate(|r| {
							r.saw_token();
							r.completion.push_str(&delta);
						});
						vec![candidate_frame(
							vec![gemini::Part::text(delta)],
							None,
							None,
							&model,
						)]
					},
					responses::StreamEvent::ReasoningTextDelta { delta, .. }
					| responses::StreamEvent::ReasoningSummaryTextDelta { delta, .. } => {
						log.non_atomic_mutate(|r| r.saw_token());
						vec![candidate_frame(
							vec![gemini::Part {
								text: Some(delta),
								thought: true,
								..Default::default()
							}],
							None,
							None,
							&model,
						)]
					},
					responses::StreamEvent::OutputItemAdded { output_index, item } => {
						if let responses::OutputItem::FunctionCall { name, .. } = item {
							saw_tools = true;
							call_names.insert(output_index, name);
						}
						Vec::new()
					},
					responses::StreamEvent::FunctionCallArgumentsDone {
						output_index,
						arguments,
						..
					} => {
						let Some(name) = call_names.get(&output_index) else {
							return Vec::new();
						};
						emitted_calls.insert(output_index);
						vec![candidate_frame(
							vec![gemini::Part {
								function_call: Some(gemini::FunctionCall {
									name: name.clone(),
									args: serde_json::from_str(&arguments).unwrap_or_else(|_| json!({})),
								}),
								..Default::default()
							}],
							None,
							None,
							&model,
						)]
					},
					responses::StreamEvent::OutputItemDone { output_index, item } => {
						// Fallback for upstreams that skip arguments.done.
						if emitted_calls.contains(&output_index) {
							return Vec::new();
						}
						if let responses::OutputItem::FunctionCall {
							name, arguments, ..
						} = item
						{
							emitted_calls.insert(output_index);
							return vec![candidate_frame(
								vec![gemini::Part {
									function_call: Some(gemini::FunctionCall {
										name,
										args: serde_json::from_str(&arguments).unwrap_or_else(|_| json!({})),
									}),
									..Default::default()
								}],
								None,
								None,
								&model,
							)];
						}
						Vec::new()
					},
					responses::StreamEvent::Completed { response }
					| responses::StreamEvent::Incomplete { response }
					| responses::StreamEvent::Failed { response } => {
						let usage = response.usage.as_ref().map(|u| {
							let billing = u.to_billing();
							log.non_atomic_mutate(|r| r.usage.supersede(billing));
							gemini::UsageMetadata::from_billing(&billing)
						});
						let finish = if saw_tools {
							gemini::FINISH_TOOL_CALLS
						} else {
							match response.status.as_str() {
								responses::STATUS_INCOMPLETE => gemini::FINISH_MAX_TOKENS,
								_ => gemini::FINISH_STOP,
							}
						};
						vec![candidate_frame(
							Vec::new(),
							Some(finish.to_string()),
							usage,
							&model,
						)]
					},
					_ => Vec::new(),
				},
				Event::Data(Err(_)) => Vec::new(),
				// Gemini streams end without a sentinel.
				Event::Done => Vec::new(),
			}
		})
	}
}
