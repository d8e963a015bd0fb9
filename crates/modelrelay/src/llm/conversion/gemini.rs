//! Translation between client chat dialects and the Gemini upstream
//! dialect.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::Utc;
use serde_json::{Value, json};

use super::{ids, schema};
use crate::llm::multimodal::{self, ImageSet};
use crate::llm::types::gemini;
use crate::llm::{AIError, StreamInfo};

/// Whether `includeThoughts` defaults on for a model. Gemini 2.5+ and 3.x
/// expose thought summaries; image-generation models do not accept the
/// config at all.
pub fn thinking_default(model: &str) -> bool {
	(model.contains("gemini-2.5") || model.contains("gemini-3") || model.contains("gemini-exp"))
		&& !model.contains("image")
}

fn parse_args_value(args: &str) -> Value {
	serde_json::from_str(args).unwrap_or_else(|_| json!({}))
}

/// Buffered partial function-call arguments, keyed by `"choice-tool"`.
#[derive(Debug, Clone)]
struct BufferedCall {
	tool_index: usize,
	name: String,
	args: String,
}

#[derive(Default)]
struct ToolCallBuffer {
	calls: HashMap<String, BufferedCall>,
	next_index: HashMap<usize, usize>,
	last_key: HashMap<usize, String>,
}

impl ToolCallBuffer {
	/// Record one functionCall part from a streamed candidate. A part with a
	/// name opens a new buffered call; a nameless part continues the last
	/// one, accumulating by string concatenation.
	fn push(&mut self, choice: usize, fc: &gemini::FunctionCall) {
		let fragment = match &fc.args {
			Value::Null => String::new(),
			Value::String(s) => s.clone(),
			other => other.to_string(),
		};
		if fc.name.is_empty() {
			if let Some(key) = self.last_key.get(&choice)
				&& let Some(buf) = self.calls.get_mut(key)
			{
				buf.args.push_str(&fragment);
			}
			return;
		}
		let idx = self.next_index.entry(choice).or_default();
		let key = format!("{choice}-{idx}");
		self.calls.insert(
			key.clone(),
			BufferedCall {
				tool_index: *idx,
				name: fc.name.clone(),
				args: fragment,
			},
		);
		*idx += 1;
		self.last_key.insert(choice, key);
	}

	/// Drain the calls buffered for one choice, ordered by tool index rather
	/// than map iteration order.
	fn flush(&mut self, choice: usize) -> Vec<BufferedCall> {
		let prefix = format!("{choice}-");
		let keys: Vec<String> = self
			.calls
			.keys()
			.filter(|k| k.starts_with(&prefix))
			.cloned()
			.collect();
		let mut out: Vec<BufferedCall> = keys
			.into_iter()
			.filter_map(|k| self.calls.remove(&k))
			.collect();
		out.sort_by_key(|c| c.tool_index);
		self.last_key.remove(&choice);
		out
	}

	fn is_empty(&self) -> bool {
		self.calls.is_empty()
	}
}

pub mod from_completions {
	use super::*;
	use crate::http::Body;
	use crate::llm::types::completions;
	use crate::parse;
	use crate::parse::sse::{Event, OutFrame};
	use crate::telemetry::AsyncLog;

	/// Translate an OpenAI chat-completions request into a Gemini
	/// `generateContent` request. Remote images must be prefetched into
	/// `images`.
	pub fn translate(req: &completions::Request, images: &ImageSet) -> Result<Vec<u8>, AIError> {
		let model = req.model.as_deref().unwrap_or_default();
		let xlated = translate_internal(req, model, images)?;
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(
		req: &completions::Request,
		model: &str,
		images: &ImageSet,
	) -> Result<gemini::Request, AIError> {
		let mut system_parts: Vec<gemini::Part> = Vec::new();
		let mut contents: Vec<gemini::Content> = Vec::new();
		// Assistant tool-call ids seen so far, so tool responses can recover
		// the function name Gemini keys on.
		let mut call_names: HashMap<String, String> = HashMap::new();

		for msg in &req.messages {
			match msg.role {
				completions::Role::System | completions::Role::Developer => {
					if let Some(content) = &msg.content {
						system_parts.push(gemini::Part::text(content.text()));
					}
				},
				completions::Role::User => {
					let mut parts = Vec::new();
					match &msg.content {
						Some(completions::MessageContent::Text(t)) => parts.push(gemini::Part::text(t.clone())),
						Some(completions::MessageContent::Parts(items)) => {
							for item in items {
								match item {
									completions::ContentPart::Text { text } => {
										parts.push(gemini::Part::text(text.clone()));
									},
									completions::ContentPart::ImageUrl { image_url } => {
										let blob = multimodal::resolve(&image_url.url, images)?;
										parts.push(gemini::Part {
											inline_data: Some(blob),
											..Default::default()
										});
									},
									completions::ContentPart::InputAudio { .. } => {},
								}
							}
						},
						None => {},
					}
					push_content(&mut contents, gemini::ROLE_USER, parts);
				},
				completions::Role::Assistant => {
					let mut parts = Vec::new();
					if let Some(reasoning) = &msg.reasoning_content {
						parts.push(gemini::Part {
							text: Some(reasoning.clone()),
							thought: true,
							thought_signature: msg
								.extra_content
								.as_ref()
								.and_then(|e| e.get("thoughtSignature"))
								.and_then(|v| v.as_str())
								.map(|s| s.to_string()),
							..Default::default()
						});
					}
					if let Some(content) = &msg.content {
						let text = content.text();
						if !text.is_empty() {
							parts.push(gemini::Part::text(text));
						}
					}
					for tc in &msg.tool_calls {
						call_names.insert(tc.id.clone(), tc.function.name.clone());
						parts.push(gemini::Part {
							function_call: Some(gemini::FunctionCall {
								name: tc.function.name.clone(),
								args: parse_args_value(&tc.function.arguments),
							}),
							..Default::default()
						});
					}
					push_content(&mut contents, gemini::ROLE_MODEL, parts);
				},
				completions::Role::Tool => {
					// Gemini has no tool role; function responses ride inside a
					// user-role content.
					let name = msg
						.tool_call_id
						.as_ref()
						.and_then(|id| call_names.get(id).cloned())
						.or_else(|| msg.name.clone())
						.unwrap_or_else(|| "tool".to_string());
					let output = msg
						.content
						.as_ref()
						.map(|c| c.text())
						.unwrap_or_default();
					let response = serde_json::from_str::<Value>(&output)
						.ok()
						.filter(|v| v.is_object())
						.unwrap_or_else(|| json!({"result": output}));
					let part = gemini::Part {
						function_response: Some(gemini::FunctionResponse { name, response }),
						..Default::default()
					};
					push_content(&mut contents, gemini::ROLE_USER, vec![part]);
				},
			}
		}

		let tools = req.tools.as_ref().map(|tools| {
			vec![gemini::Tool {
				function_declarations: Some(
					tools
						.iter()
						.map(|t| gemini::FunctionDeclaration {
							name: t.function.name.clone(),
							description: t.function.description.clone(),
							parameters: t.function.parameters.as_ref().map(schema::clean_for_gemini),
						})
						.collect(),
				),
				rest: Value::Null,
			}]
		});

		let tool_config = req.tool_choice.as_ref().map(|choice| match choice {
			completions::ToolChoice::Mode(mode) => {
				let mode = match mode.as_str() {
					"none" => "NONE",
					"required" => "ANY",
					_ => "AUTO",
				};
				json!({"functionCallingConfig": {"mode": mode}})
			},
			completions::ToolChoice::Named { function, .. } => json!({
				"functionCallingConfig": {
					"mode": "ANY",
					"allowedFunctionNames": [function.name],
				},
			}),
		});

		let (response_mime_type, response_schema) = match &req.response_format {
			Some(rf) => match rf.kind.as_str() {
				"json_object" => (Some("application/json".to_string()), None),
				"json_schema" => (
					Some("application/json".to_string()),
					rf.json_schema
						.as_ref()
						.and_then(|s| s.schema.as_ref())
						.map(schema::clean_for_gemini),
				),
				"text" => (Some("text/plain".to_string()), None),
				_ => (None, None),
			},
			None => (None, None),
		};

		let thinking_config = match &req.thinking {
			Some(completions::ThinkingConfig::Enabled { budget_tokens }) => Some(gemini::ThinkingConfig {
				include_thoughts: true,
				thinking_budget: *budget_tokens,
			}),
			Some(completions::ThinkingConfig::Disabled {}) => None,
			None => thinking_default(model).then(|| gemini::ThinkingConfig {
				include_thoughts: true,
				thinking_budget: None,
			}),
		};

		let stop_sequences = match &req.stop {
			Some(Value::String(s)) => vec![s.clone()],
			Some(Value::Array(items)) => items
				.iter()
				.filter_map(|v| v.as_str().map(|s| s.to_string()))
				.collect(),
			_ => Vec::new(),
		};

		Ok(gemini::Request {
			contents,
			system_instruction: (!system_parts.is_empty()).then(|| gemini::Content {
				role: Some(gemini::ROLE_USER.to_string()),
				parts: system_parts,
			}),
			tools: tools.unwrap_or_default(),
			tool_config,
			safety_settings: gemini::default_safety_settings(gemini::DEFAULT_SAFETY_THRESHOLD),
			generation_config: Some(gemini::GenerationConfig {
				temperature: req.temperature,
				top_p: req.top_p,
				max_output_tokens: req.output_cap(),
				stop_sequences,
				response_mime_type,
				response_schema,
				thinking_config,
				rest: Value::Null,
			}),
			rest: Value::Null,
		})
	}

	/// Translate a Gemini response into an OpenAI chat completion.
	pub fn translate_response(bytes: &Bytes, model: &str) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<gemini::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let openai = translate_response_internal(&resp, model);
		serde_json::to_vec(&openai).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &gemini::Response, model: &str) -> completions::Response {
		let mut choices = Vec::new();
		for (i, candidate) in resp.candidates.iter().enumerate() {
			let mut texts: Vec<String> = Vec::new();
			let mut image_parts: Vec<completions::ContentPart> = Vec::new();
			let mut reasoning: Option<String> = None;
			let mut signature: Option<String> = None;
			let mut tool_calls: Vec<completions::ToolCall> = Vec::new();
			if let Some(content) = &candidate.content {
				for part in &content.parts {
					if let Some(text) = &part.text {
						if part.thought {
							match &mut reasoning {
								Some(r) => r.push_str(text),
								None => reasoning = Some(text.clone()),
							}
							if signature.is_none() {
								signature = part.thought_signature.clone();
							}
						} else {
							texts.push(text.clone());
						}
					}
					if let Some(fc) = &part.function_call {
						tool_calls.push(completions::ToolCall {
							id: ids::new_call_id(),
							kind: "function".to_string(),
							function: completions::FunctionCall {
								name: fc.name.clone(),
								arguments: fc.args.to_string(),
							},
						});
					}
					if let Some(blob) = &part.inline_data {
						image_parts.push(completions::ContentPart::ImageUrl {
							image_url: completions::ImageUrl {
								url: format!("data:{};base64,{}", blob.mime_type, blob.data),
								detail: None,
							},
						});
					}
				}
			}
			// Inline data forces the list form of content; plain text joins
			// into a single string.
			let content = if !image_parts.is_empty() {
				let mut parts: Vec<completions::ContentPart> = texts
					.into_iter()
					.map(|text| completions::ContentPart::Text { text })
					.collect();
				parts.extend(image_parts);
				Some(completions::MessageContent::Parts(parts))
			} else if !texts.is_empty() {
				Some(completions::MessageContent::Text(texts.join("")))
			} else {
				None
			};
			let finish_reason = if !tool_calls.is_empty() {
				Some(completions::FinishReason::ToolCalls)
			} else {
				candidate
					.finish_reason
					.as_deref()
					.map(finish_reason_to_openai)
			};
			choices.push(completions::Choice {
				index: candidate.index.unwrap_or(i as u32),
				message: completions::ResponseMessage {
					role: completions::Role::Assistant,
					content,
					reasoning_content: reasoning,
					signature,
					tool_calls,
				},
				finish_reason,
			});
		}
		completions::Response {
			id: ids::new_completion_id(),
			object: completions::OBJECT_COMPLETION.to_string(),
			created: Utc::now().timestamp(),
			model: resp
				.model_version
				.clone()
				.unwrap_or_else(|| model.to_string()),
			choices,
			usage: resp
				.usage_metadata
				.as_ref()
				.map(|u| completions::Usage::from_billing(&u.to_billing())),
			rest: Value::Null,
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res =
			serde_json::from_slice::<gemini::ErrorResponse>(bytes).map_err(AIError::ResponseParsing)?;
		let m = completions::ErrorResponse {
			error: completions::ErrorDetail {
				message: res.error.message,
				kind: "upstream_error".to_string(),
				param: None,
				code: Some(json!(res.error.code)),
			},
		};
		Ok(Bytes::from(
			serde_json::to_vec(&m).map_err(AIError::ResponseMarshal)?,
		))
	}

	/// Gemini SSE to OpenAI chunk stream. Partial function-call arguments
	/// are buffered and flushed as one chunk when the candidate finishes;
	/// the final usage rides an empty chunk before `[DONE]`.
	pub fn translate_stream(
		b: Body,
		buffer_limit: usize,
		model: &str,
		log: AsyncLog<StreamInfo>,
	) -> Body {
		let id = ids::new_completion_id();
		let created = Utc::now().timestamp();
		let model = model.to_string();
		let mut buffer = ToolCallBuffer::default();
		let mut usage: Option<completions::Usage> = None;
		let mut sent_signature = false;
		parse::sse::json_transform_multi::<gemini::Response, _>(b, buffer_limit, move |ev| {
			let mk = |choices: Vec<completions::StreamChoice>,
			          usage: Option<completions::Usage>|
			 -> completions::StreamResponse {
				let mut r = completions::StreamResponse::new(&id, &model, created);
				r.choices = choices;
				r.usage = usage;
				r
			};
			match ev {
				Event::Data(Ok(resp)) => {
					if let Some(u) = &resp.usage_metadata {
						let billing = u.to_billing();
						usage = Some(completions::Usage::from_billing(&billing));
						log.non_atomic_mutate(|r| r.usage.supersede(billing));
					}
					if let Some(v) = &resp.model_version {
						let v = v.clone();
						log.non_atomic_mutate(|r| {
							r.provider_model.get_or_insert_with(|| relay_core::strng::new(&v));
						});
					}
					let mut out = Vec::new();
					for (i, candidate) in resp.candidates.iter().enumerate() {
						// Older upstreams echo empty candidates; drop them.
						if candidate.is_empty() {
							continue;
						}
						let choice_idx = candidate.index.unwrap_or(i as u32) as usize;
						let mut delta = completions::Delta::default();
						if let Some(content) = &candidate.content {
							for part in &content.parts {
								if let Some(text) = &part.text {
									if part.thought {
										match &mut delta.reasoning_content {
											Some(r) => r.push_str(text),
											None => delta.reasoning_content = Some(text.clone()),
										}
										if !sent_signature && part.thought_signature.is_some() {
											sent_signature = true;
											delta.signature = part.thought_signature.clone();
										}
									} else {
										match &mut delta.content {
											Some(c) => c.push_str(text),
											None => delta.content = Some(text.clone()),
										}
									}
								}
								if let Some(blob) = &part.inline_data {
									let url = format!("data:{};base64,{}", blob.mime_type, blob.data);
									match &mut delta.content {
										Some(c) => c.push_str(&url),
										None => delta.content = Some(url),
									}
								}
								if let Some(fc) = &part.function_call {
									buffer.push(choice_idx, fc);
								}
							}
						}
						if delta.content.is_some() || delta.reasoning_content.is_some() {
							if let Some(text) = &delta.content {
								let text = text.clone();
								log.non_atomic_mutate(|r| {
									r.saw_token();
									r.completion.push_str(&text);
								});
							} else {
								log.non_atomic_mutate(|r| r.saw_token());
							}
							out.push(OutFrame::data(&mk(
								vec![completions::StreamChoice {
									index: choice_idx as u32,
									delta,
									finish_reason: None,
								}],
								None,
							)));
						}
						if let Some(reason) = &candidate.finish_reason {
							let flushed = buffer.flush(choice_idx);
							let mut delta = completions::Delta::default();
							let finish = if flushed.is_empty() {
								finish_reason_to_openai(reason)
							} else {
								delta.tool_calls = flushed
									.into_iter()
									.map(|c| completions::DeltaToolCall {
										index: c.tool_index as u32,
										id: Some(ids::new_call_id()),
										kind: Some("function".to_string()),
										function: completions::DeltaFunction {
											name: Some(c.name),
											arguments: Some(c.args),
										},
									})
									.collect();
								completions::FinishReason::ToolCalls
							};
							out.push(OutFrame::data(&mk(
								vec![completions::StreamChoice {
									index: choice_idx as u32,
									delta,
									finish_reason: Some(finish),
								}],
								None,
							)));
						}
					}
					out
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					let mut out = Vec::new();
					// A truncated upstream may never send finishReason; don't
					// lose buffered calls.
					if !buffer.is_empty() {
						let flushed = buffer.flush(0);
						if !flushed.is_empty() {
							let mut delta = completions::Delta::default();
							delta.tool_calls = flushed
								.into_iter()
								.map(|c| completions::DeltaToolCall {
									index: c.tool_index as u32,
									id: Some(ids::new_call_id()),
									kind: Some("function".to_string()),
									function: completions::DeltaFunction {
										name: Some(c.name),
										arguments: Some(c.args),
									},
								})
								.collect();
							out.push(OutFrame::data(&mk(
								vec![completions::StreamChoice {
									index: 0,
									delta,
									finish_reason: Some(completions::FinishReason::ToolCalls),
								}],
								None,
							)));
						}
					}
					out.push(OutFrame::data(&mk(Vec::new(), usage.take())));
					out.push(OutFrame::done());
					out
				},
			}
		})
	}
}

pub mod from_messages {
	use super::*;
	use crate::http::Body;
	use crate::llm::types::messages;
	use crate::parse;
	use crate::parse::sse::{Event, OutFrame};
	use crate::telemetry::AsyncLog;

	/// Translate an Anthropic messages request into a Gemini request.
	pub fn translate(req: &messages::Request, images: &ImageSet) -> Result<Vec<u8>, AIError> {
		let xlated = translate_internal(req, images)?;
		serde_json::to_vec(&xlated).map_err(AIError::RequestMarshal)
	}

	fn translate_internal(
		req: &messages::Request,
		images: &ImageSet,
	) -> Result<gemini::Request, AIError> {
		let mut contents: Vec<gemini::Content> = Vec::new();
		let mut call_names: HashMap<String, String> = HashMap::new();

		for msg in &req.messages {
			let role = match msg.role {
				messages::Role::User => gemini::ROLE_USER,
				messages::Role::Assistant => gemini::ROLE_MODEL,
			};
			let mut parts = Vec::new();
			for block in &msg.content {
				match block {
					messages::ContentBlock::Text { text } => parts.push(gemini::Part::text(text.clone())),
					messages::ContentBlock::Image { source } => {
						let blob = match source {
							messages::ImageSource::Base64 { media_type, data } => gemini::Blob {
								mime_type: media_type.clone(),
								data: data.clone(),
							},
							messages::ImageSource::Url { url } => multimodal::resolve(url, images)?,
						};
						parts.push(gemini::Part {
							inline_data: Some(blob),
							..Default::default()
						});
					},
					messages::ContentBlock::Thinking {
						thinking,
						signature,
					} => {
						parts.push(gemini::Part {
							text: Some(thinking.clone()),
							thought: true,
							thought_signature: (!signature.is_empty()).then(|| signature.clone()),
							..Default::default()
						});
					},
					messages::ContentBlock::RedactedThinking { .. } => {},
					messages::ContentBlock::ToolUse { id, name, input } => {
						call_names.insert(id.clone(), name.clone());
						parts.push(gemini::Part {
							function_call: Some(gemini::FunctionCall {
								name: name.clone(),
								args: input.clone(),
							}),
							..Default::default()
						});
					},
					messages::ContentBlock::ToolResult {
						tool_use_id,
						content,
						..
					} => {
						let name = call_names
							.get(tool_use_id)
							.cloned()
							.unwrap_or_else(|| "tool".to_string());
						let output = content.joined_text();
						let response = serde_json::from_str::<Value>(&output)
							.ok()
							.filter(|v| v.is_object())
							.unwrap_or_else(|| json!({"result": output}));
						parts.push(gemini::Part {
							function_response: Some(gemini::FunctionResponse { name, response }),
							..Default::default()
						});
					},
					messages::ContentBlock::Unknown => {},
				}
			}
			push_content(&mut contents, role, parts);
		}

		let tools = req.tools.as_ref().map(|tools| {
			vec![gemini::Tool {
				function_declarations: Some(
					tools
						.iter()
						.map(|t| gemini::FunctionDeclaration {
							name: t.name.clone(),
							description: t.description.clone(),
							parameters: Some(schema::clean_for_gemini(&t.input_schema)),
						})
						.collect(),
				),
				rest: Value::Null,
			}]
		});

		let tool_config = req.tool_choice.as_ref().map(|choice| match choice {
			messages::ToolChoice::Auto => json!({"functionCallingConfig": {"mode": "AUTO"}}),
			messages::ToolChoice::Any => json!({"functionCallingConfig": {"mode": "ANY"}}),
			messages::ToolChoice::None => json!({"functionCallingConfig": {"mode": "NONE"}}),
			messages::ToolChoice::Tool { name } => json!({
				"functionCallingConfig": {"mode": "ANY", "allowedFunctionNames": [name]},
			}),
		});

		let thinking_config = match &req.thinking {
			Some(messages::ThinkingInput::Enabled { budget_tokens }) => Some(gemini::ThinkingConfig {
				include_thoughts: true,
				thinking_budget: Some(*budget_tokens),
			}),
			Some(messages::ThinkingInput::Disabled {}) => None,
			None => thinking_default(&req.model).then(|| gemini::ThinkingConfig {
				include_thoughts: true,
				thinking_budget: None,
			}),
		};

		Ok(gemini::Request {
			contents,
			system_instruction: req.system.as_ref().map(|s| gemini::Content {
				role: Some(gemini::ROLE_USER.to_string()),
				parts: vec![gemini::Part::text(s.joined_text())],
			}),
			tools: tools.unwrap_or_default(),
			tool_config,
			safety_settings: gemini::default_safety_settings(gemini::DEFAULT_SAFETY_THRESHOLD),
			generation_config: Some(gemini::GenerationConfig {
				temperature: req.temperature,
				top_p: req.top_p,
				max_output_tokens: Some(req.max_tokens),
				stop_sequences: req.stop_sequences.clone(),
				response_mime_type: None,
				response_schema: None,
				thinking_config,
				rest: Value::Null,
			}),
			rest: Value::Null,
		})
	}

	/// Translate a Gemini response into an Anthropic messages response.
	pub fn translate_response(bytes: &Bytes, model: &str) -> Result<Vec<u8>, AIError> {
		let resp =
			serde_json::from_slice::<gemini::Response>(bytes).map_err(AIError::ResponseParsing)?;
		let claude = translate_response_internal(&resp, model);
		serde_json::to_vec(&claude).map_err(AIError::ResponseMarshal)
	}

	fn translate_response_internal(resp: &gemini::Response, model: &str) -> messages::Response {
		let mut content: Vec<messages::ContentBlock> = Vec::new();
		let mut stop_reason = None;
		for candidate in &resp.candidates {
			if let Some(c) = &candidate.content {
				for part in &c.parts {
					if let Some(text) = &part.text {
						if part.thought {
							content.push(messages::ContentBlock::Thinking {
								thinking: text.clone(),
								signature: part.thought_signature.clone().unwrap_or_default(),
							});
						} else {
							content.push(messages::ContentBlock::Text { text: text.clone() });
						}
					}
					if let Some(fc) = &part.function_call {
						content.push(messages::ContentBlock::ToolUse {
							id: ids::new_call_id(),
							name: fc.name.clone(),
							input: fc.args.clone(),
						});
					}
				}
			}
			if stop_reason.is_none() {
				stop_reason = candidate
					.finish_reason
					.as_deref()
					.map(finish_reason_to_claude);
			}
		}
		let has_tool_use = content
			.iter()
			.any(|b| matches!(b, messages::ContentBlock::ToolUse { .. }));
		if has_tool_use {
			stop_reason = Some(messages::StopReason::ToolUse);
		}
		// Claude requires at least one content block.
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
			model: resp
				.model_version
				.clone()
				.unwrap_or_else(|| model.to_string()),
			stop_reason,
			stop_sequence: None,
			usage: resp
				.usage_metadata
				.as_ref()
				.map(|u| messages::Usage::from_billing(&u.to_billing()))
				.unwrap_or_default(),
		}
	}

	pub fn translate_error(bytes: &Bytes) -> Result<Bytes, AIError> {
		let res =
			serde_json::from_slice::<gemini::ErrorResponse>(bytes).map_err(AIError::ResponseParsing)?;
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
	}

	/// Gemini SSE to Anthropic typed events. Text and thought deltas open
	/// and close content blocks at type transitions; buffered tool calls
	/// flush as complete `tool_use` blocks when the candidate finishes.
	pub fn translate_stream(
		b: Body,
		buffer_limit: usize,
		model: &str,
		log: AsyncLog<StreamInfo>,
	) -> Body {
		let id = ids::new_message_id();
		let model = model.to_string();
		let mut started = false;
		let mut block: OpenBlock = OpenBlock::None;
		let mut block_index: usize = 0;
		let mut buffer = ToolCallBuffer::default();
		let mut input_tokens: u64 = 0;
		let mut final_usage = messages::Usage::default();
		let mut stop_reason: Option<messages::StopReason> = None;
		parse::sse::json_transform_multi::<gemini::Response, _>(b, buffer_limit, move |ev| {
			let ev_frame = |e: &messages::StreamEvent| OutFrame::event(e.event_name(), e);
			match ev {
				Event::Data(Ok(resp)) => {
					let mut out = Vec::new();
					if !started {
						started = true;
						if let Some(u) = &resp.usage_metadata {
							input_tokens = u.prompt_token_count;
						}
						let start = messages::StreamEvent::MessageStart {
							message: messages::Response {
								id: id.clone(),
								r#type: "message".to_string(),
								role: messages::Role::Assistant,
								content: Vec::new(),
								model: model.clone(),
								stop_reason: None,
								stop_sequence: None,
								usage: messages::Usage {
									input_tokens,
									..Default::default()
								},
							},
						};
						out.push(ev_frame(&start));
					}
					if let Some(u) = &resp.usage_metadata {
						let billing = u.to_billing();
						final_usage = messages::Usage::from_billing(&billing);
						log.non_atomic_mutate(|r| r.usage.supersede(billing));
					}
					for candidate in resp.candidates.iter().filter(|c| !c.is_empty()) {
						if let Some(content) = &candidate.content {
							for part in &content.parts {
								if let Some(text) = &part.text {
									log.non_atomic_mutate(|r| r.saw_token());
									if part.thought {
										if !matches!(block, OpenBlock::Thinking) {
											if !matches!(block, OpenBlock::None) {
												out.push(ev_frame(&messages::StreamEvent::ContentBlockStop {
													index: block_index,
												}));
												block_index += 1;
											}
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
											delta: messages::ContentBlockDelta::ThinkingDelta {
												thinking: text.clone(),
											},
										}));
										if let Some(sig) = &part.thought_signature {
											out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
												index: block_index,
												delta: messages::ContentBlockDelta::SignatureDelta {
													signature: sig.clone(),
												},
											}));
										}
									} else {
										if !matches!(block, OpenBlock::Text) {
											if !matches!(block, OpenBlock::None) {
												out.push(ev_frame(&messages::StreamEvent::ContentBlockStop {
													index: block_index,
												}));
												block_index += 1;
											}
											block = OpenBlock::Text;
											out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
												index: block_index,
												content_block: messages::ContentBlock::Text {
													text: String::new(),
												},
											}));
										}
										let text = text.clone();
										log.non_atomic_mutate(|r| r.completion.push_str(&text));
										out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
											index: block_index,
											delta: messages::ContentBlockDelta::TextDelta { text },
										}));
									}
								}
								if let Some(fc) = &part.function_call {
									buffer.push(0, fc);
								}
							}
						}
						if let Some(reason) = &candidate.finish_reason {
							if !matches!(block, OpenBlock::None) {
								out.push(ev_frame(&messages::StreamEvent::ContentBlockStop {
									index: block_index,
								}));
								block_index += 1;
								block = OpenBlock::None;
							}
							let flushed = buffer.flush(0);
							let had_tools = !flushed.is_empty();
							for call in flushed {
								out.push(ev_frame(&messages::StreamEvent::ContentBlockStart {
									index: block_index,
									content_block: messages::ContentBlock::ToolUse {
										id: ids::new_call_id(),
										name: call.name.clone(),
										input: json!({}),
									},
								}));
								out.push(ev_frame(&messages::StreamEvent::ContentBlockDelta {
									index: block_index,
									delta: messages::ContentBlockDelta::InputJsonDelta {
										partial_json: call.args,
									},
								}));
								out.push(ev_frame(&messages::StreamEvent::ContentBlockStop {
									index: block_index,
								}));
								block_index += 1;
							}
							stop_reason = Some(if had_tools {
								messages::StopReason::ToolUse
							} else {
								finish_reason_to_claude(reason)
							});
						}
					}
					out
				},
				Event::Data(Err(_)) => Vec::new(),
				Event::Done => {
					let mut out = Vec::new();
					if !matches!(block, OpenBlock::None) {
						out.push(ev_frame(&messages::StreamEvent::ContentBlockStop {
							index: block_index,
						}));
						block = OpenBlock::None;
					}
					out.push(ev_frame(&messages::StreamEvent::MessageDelta {
						delta: messages::MessageDelta {
							stop_reason: Some(stop_reason.take().unwrap_or(messages::StopReason::EndTurn)),
							stop_sequence: None,
						},
						usage: final_usage,
					}));
					out.push(ev_frame(&messages::StreamEvent::MessageStop));
					out
				},
			}
		})
	}
}

/// Observe a Gemini-to-Gemini stream without rewriting it.
pub fn passthrough_stream(
	b: crate::http::Body,
	buffer_limit: usize,
	log: crate::telemetry::AsyncLog<StreamInfo>,
) -> crate::http::Body {
	crate::parse::sse::json_passthrough::<gemini::Response, _>(b, buffer_limit, move |ev| {
		let Some(Ok(resp)) = ev else { return };
		log.non_atomic_mutate(|r| {
			if let Some(u) = &resp.usage_metadata {
				r.usage.supersede(u.to_billing());
			}
			if let Some(v) = &resp.model_version
				&& r.provider_model.is_none()
			{
				r.provider_model = Some(relay_core::strng::new(v));
			}
			for candidate in &resp.candidates {
				let Some(content) = &candidate.content else {
					continue;
				};
				for part in &content.parts {
					if let Some(text) = &part.text {
						r.saw_token();
						if !part.thought {
							r.completion.push_str(text);
						}
					}
				}
			}
		});
	})
}

fn push_content(contents: &mut Vec<gemini::Content>, role: &str, parts: Vec<gemini::Part>) {
	if parts.is_empty() {
		return;
	}
	// Gemini rejects consecutive turns with the same role; merge instead.
	if let Some(last) = contents.last_mut()
		&& last.role.as_deref() == Some(role)
	{
		last.parts.extend(parts);
		return;
	}
	contents.push(gemini::Content {
		role: Some(role.to_string()),
		parts,
	});
}

fn finish_reason_to_openai(reason: &str) -> crate::llm::types::completions::FinishReason {
	use crate::llm::types::completions::FinishReason;
	match reason {
		gemini::FINISH_MAX_TOKENS => FinishReason::Length,
		gemini::FINISH_TOOL_CALLS | gemini::FINISH_FUNCTION_CALL => FinishReason::ToolCalls,
		gemini::FINISH_SAFETY => FinishReason::ContentFilter,
		_ => FinishReason::Stop,
	}
}

fn finish_reason_to_claude(reason: &str) -> crate::llm::types::messages::StopReason {
	use crate::llm::types::messages::StopReason;
	match reason {
		gemini::FINISH_MAX_TOKENS => StopReason::MaxTokens,
		gemini::FINISH_TOOL_CALLS | gemini::FINISH_FUNCTION_CALL => StopReason::ToolUse,
		gemini::FINISH_SAFETY => StopReason::StopSequence,
		_ => StopReason::EndTurn,
	}
}

/// Map an OpenAI finish reason onto the Gemini vocabulary, for streams
/// headed the other way.
pub(crate) fn finish_reason_from_openai(
	reason: crate::llm::types::completions::FinishReason,
) -> &'static str {
	use crate::llm::types::completions::FinishReason;
	match reason {
		FinishReason::Stop => gemini::FINISH_STOP,
		FinishReason::Length => gemini::FINISH_MAX_TOKENS,
		FinishReason::ToolCalls => gemini::FINISH_TOOL_CALLS,
		FinishReason::ContentFilter => gemini::FINISH_SAFETY,
	}
}
