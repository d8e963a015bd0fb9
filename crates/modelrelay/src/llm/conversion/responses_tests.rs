use http_body_util::BodyExt;
use serde_json::{Value, json};

use super::responses::{from_completions, from_gemini, from_messages};
use crate::http::Body;
use crate::llm::StreamInfo;
use crate::llm::types::{completions, gemini, responses};
use crate::telemetry::AsyncLog;

async fn collect(body: Body) -> String {
	let bytes = body.collect().await.unwrap().to_bytes();
	String::from_utf8(bytes.to_vec()).unwrap()
}

fn data_frames(s: &str) -> Vec<Value> {
	s.split("\n\n")
		.filter_map(|f| f.trim().strip_prefix("data: "))
		.filter(|d| *d != "[DONE]")
		.map(|d| serde_json::from_str(d).expect("frame must be json"))
		.collect()
}

fn event_names(s: &str) -> Vec<String> {
	s.split("\n\n")
		.filter(|f| !f.trim().is_empty())
		.filter_map(|f| {
			f.lines()
				.find_map(|l| l.strip_prefix("event: "))
				.map(|e| e.to_string())
		})
		.collect()
}

#[test]
fn chat_request_maps_to_items_and_never_stores() {
	let req: completions::Request = serde_json::from_value(json!({
		"model": "gpt-5-codex",
		"messages": [
			{"role": "system", "content": "rules"},
			{"role": "user", "content": "do it"},
			{"role": "assistant", "tool_calls": [
				{"id": "call_9", "type": "function", "function": {"name": "run", "arguments": "{}"}}
			]},
			{"role": "tool", "tool_call_id": "call_9", "content": "done"}
		],
		"max_completion_tokens": 900,
		"store": true
	}))
	.unwrap();
	let body = from_completions::translate(&req).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();

	let items = v["input"].as_array().unwrap();
	assert_eq!(items[0]["type"], "message");
	assert_eq!(items[0]["role"], "system");
	assert_eq!(items[1]["role"], "user");
	assert_eq!(items[2]["type"], "function_call");
	assert_eq!(items[2]["call_id"], "call_9");
	assert_eq!(items[3]["type"], "function_call_output");
	assert_eq!(items[3]["call_id"], "call_9");
	assert_eq!(v["max_output_tokens"], 900);
	// Conversation persistence upstream is always off, whatever the client
	// asked for.
	assert_eq!(v["store"], false);
}

#[test]
fn tool_schema_required_cleanup() {
	// required: null disappears; a populated required list is preserved.
	let req: completions::Request = serde_json::from_value(json!({
		"model": "gpt-5-pro",
		"messages": [{"role": "user", "content": "x"}],
		"tools": [
			{"type": "function", "function": {"name": "a", "parameters": {"type": "object", "required": null}}},
			{"type": "function", "function": {"name": "b", "parameters": {"type": "object", "required": ["x"]}}}
		]
	}))
	.unwrap();
	let body = from_completions::translate(&req).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();
	let tools = v["tools"].as_array().unwrap();
	assert_eq!(tools[0]["name"], "a");
	assert!(tools[0]["parameters"].get("required").is_none());
	assert_eq!(tools[1]["parameters"]["required"], json!(["x"]));
}

#[test]
fn response_emits_one_choice_per_output_item() {
	let resp = json!({
		"id": "resp_1", "object": "response", "created_at": 10,
		"status": "completed", "model": "gpt-5-pro",
		"output": [
			{"type": "reasoning", "summary": [{"type": "summary_text", "text": "mulling"}]},
			{"type": "message", "role": "assistant", "content": [
				{"type": "output_text", "text": "hello "},
				{"type": "output_text", "text": "there"}
			]}
		],
		"usage": {"input_tokens": 6, "output_tokens": 3, "total_tokens": 9,
			"output_tokens_details": {"reasoning_tokens": 2}}
	});
	let bytes = bytes::Bytes::from(serde_json::to_vec(&resp).unwrap());
	let out = from_completions::translate_response(&bytes).unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();

	// Current behavior: the reasoning item is its own choice, carrying the
	// reasoning text as content.
	let choices = v["choices"].as_array().unwrap();
	assert_eq!(choices.len(), 2);
	assert_eq!(choices[0]["message"]["content"], "mulling");
	assert_eq!(choices[1]["message"]["content"], "hello there");
	assert_eq!(choices[1]["finish_reason"], "stop");
	assert_eq!(v["usage"]["completion_tokens_details"]["reasoning_tokens"], 2);
}

#[test]
fn incomplete_status_maps_to_length() {
	let resp = json!({
		"id": "resp_1", "object": "response", "created_at": 10,
		"status": "incomplete", "model": "gpt-5-pro",
		"output": [{"type": "message", "role": "assistant", "content": [
			{"type": "output_text", "text": "cut off"}
		]}]
	});
	let bytes = bytes::Bytes::from(serde_json::to_vec(&resp).unwrap());
	let out = from_completions::translate_response(&bytes).unwrap();
	let v: Value = serde_json::from_slice(&out).unwrap();
	assert_eq!(v["choices"][0]["finish_reason"], "length");
}

#[tokio::test]
async fn stream_to_openai_forwards_partial_arguments() {
	let upstream = concat!(
		"data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"status\":\"in_progress\",\"model\":\"gpt-5-codex\",\"output\":[]}}\n\n",
		"data: {\"type\":\"response.output_item.added\",\"output_index\":0,\"item\":{\"type\":\"function_call\",\"call_id\":\"call_7\",\"name\":\"run\",\"arguments\":\"\"}}\n\n",
		"data: {\"type\":\"response.function_call_arguments.delta\",\"output_index\":0,\"delta\":\"{\\\"x\\\"\"}\n\n",
		"data: {\"type\":\"response.function_call_arguments.delta\",\"output_index\":0,\"delta\":\":2}\"}\n\n",
		"data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"status\":\"completed\",\"model\":\"gpt-5-codex\",\"output\":[],\"usage\":{\"input_tokens\":8,\"output_tokens\":5,\"total_tokens\":13}}}\n\n",
	);
	let log = AsyncLog::<StreamInfo>::default();
	log.store(Some(StreamInfo::default()));
	let body = from_completions::translate_stream(Body::from(upstream), 0, log.clone());
	let out = collect(body).await;
	let frames = data_frames(&out);

	// Chat streams can express partial arguments; fragments flow as deltas.
	assert_eq!(
		frames[0]["choices"][0]["delta"]["tool_calls"][0]["function"]["name"],
		"run"
	);
	assert_eq!(
		frames[1]["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"],
		"{\"x\""
	);
	assert_eq!(
		frames[2]["choices"][0]["delta"]["tool_calls"][0]["function"]["arguments"],
		":2}"
	);
	assert_eq!(frames[3]["choices"][0]["finish_reason"], "tool_calls");
	let last = frames.last().unwrap();
	assert_eq!(last["usage"]["total_tokens"], 13);
	assert_eq!(out.matches("[DONE]").count(), 1);

	let info = log.take().unwrap();
	assert_eq!(info.usage.input_tokens, 8);
}

#[tokio::test]
async fn stream_to_claude_closes_envelope() {
	let upstream = concat!(
		"data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"status\":\"in_progress\",\"model\":\"gpt-5-pro\",\"output\":[]}}\n\n",
		"data: {\"type\":\"response.reasoning_text.delta\",\"output_index\":0,\"delta\":\"mull\"}\n\n",
		"data: {\"type\":\"response.output_text.delta\",\"output_index\":1,\"delta\":\"answer\"}\n\n",
		"data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"status\":\"completed\",\"model\":\"gpt-5-pro\",\"output\":[],\"usage\":{\"input_tokens\":4,\"output_tokens\":6,\"total_tokens\":10}}}\n\n",
	);
	let log = AsyncLog::<StreamInfo>::default();
	log.store(Some(StreamInfo::default()));
	let body = from_messages::translate_stream(Body::from(upstream), 0, log);
	let out = collect(body).await;
	assert_eq!(
		event_names(&out),
		vec![
			"message_start",
			"content_block_start", // thinking
			"content_block_delta",
			"content_block_stop",
			"content_block_start", // text
			"content_block_delta",
			"content_block_stop",
			"message_delta",
			"message_stop",
		]
	);
}

#[tokio::test]
async fn stream_to_gemini_emits_arguments_only_when_done() {
	let upstream = concat!(
		"data: {\"type\":\"response.created\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"status\":\"in_progress\",\"model\":\"gpt-5-codex\",\"output\":[]}}\n\n",
		"data: {\"type\":\"response.output_item.added\",\"output_index\":0,\"item\":{\"type\":\"function_call\",\"call_id\":\"call_7\",\"name\":\"run\",\"arguments\":\"\"}}\n\n",
		"data: {\"type\":\"response.function_call_arguments.delta\",\"output_index\":0,\"delta\":\"{\\\"x\\\"\"}\n\n",
		"data: {\"type\":\"response.function_call_arguments.done\",\"output_index\":0,\"arguments\":\"{\\\"x\\\":2}\"}\n\n",
		"data: {\"type\":\"response.completed\",\"response\":{\"id\":\"resp_1\",\"object\":\"response\",\"created_at\":1,\"status\":\"completed\",\"model\":\"gpt-5-codex\",\"output\":[],\"usage\":{\"input_tokens\":8,\"output_tokens\":5,\"total_tokens\":13}}}\n\n",
	);
	let log = AsyncLog::<StreamInfo>::default();
	log.store(Some(StreamInfo::default()));
	let body = from_gemini::translate_stream(Body::from(upstream), 0, "gemini-2.5-pro", log);
	let out = collect(body).await;
	let frames = data_frames(&out);

	// No frame carries a partial argument string; the call appears once,
	// fully parsed.
	assert_eq!(frames.len(), 2);
	let fc = &frames[0]["candidates"][0]["content"]["parts"][0]["functionCall"];
	assert_eq!(fc["name"], "run");
	assert_eq!(fc["args"]["x"], 2);
	let last = frames.last().unwrap();
	assert_eq!(last["candidates"][0]["finishReason"], "TOOL_CALLS");
	assert_eq!(last["usageMetadata"]["totalTokenCount"], 13);
	assert!(!out.contains("[DONE]"));
}

#[test]
fn claude_request_uses_instructions() {
	let req: crate::llm::types::messages::Request = serde_json::from_value(json!({
		"model": "gpt-5-pro",
		"max_tokens": 700,
		"system": "house rules",
		"messages": [{"role": "user", "content": "hello"}],
		"thinking": {"type": "enabled", "budget_tokens": 8192}
	}))
	.unwrap();
	let body = from_messages::translate(&req).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();
	assert_eq!(v["instructions"], "house rules");
	assert_eq!(v["max_output_tokens"], 700);
	assert_eq!(v["store"], false);
	assert_eq!(v["reasoning"]["effort"], "high");
}

#[test]
fn gemini_request_with_orphan_response_synthesizes_call() {
	let req: gemini::Request = serde_json::from_value(json!({
		"contents": [
			{"role": "user", "parts": [{"functionResponse": {"name": "probe", "response": {"ok": 1}}}]}
		]
	}))
	.unwrap();
	let body = from_gemini::translate(&req, "gpt-5-codex", false).unwrap();
	let v: Value = serde_json::from_slice(&body).unwrap();
	let items = v["input"].as_array().unwrap();
	assert_eq!(items[0]["type"], "function_call");
	assert_eq!(items[0]["name"], "probe");
	assert_eq!(items[0]["arguments"], "{}");
	assert_eq!(items[1]["type"], "function_call_output");
	assert_eq!(items[1]["call_id"], items[0]["call_id"]);
}

#[test]
fn usage_round_trips_through_dialects() {
	// Chat usage -> Responses usage -> Chat usage preserves the tuple.
	let chat = completions::Usage {
		prompt_tokens: 11,
		completion_tokens: 7,
		total_tokens: 18,
		prompt_tokens_details: Some(completions::PromptTokensDetails {
			cached_tokens: 5,
			audio_tokens: 0,
		}),
		completion_tokens_details: Some(completions::CompletionTokensDetails {
			reasoning_tokens: 3,
		}),
	};
	let responses_usage = responses::Usage::from_billing(&chat.to_billing());
	let back = completions::Usage::from_billing(&responses_usage.to_billing());
	assert_eq!(back.prompt_tokens, 11);
	assert_eq!(back.completion_tokens, 7);
	assert_eq!(back.total_tokens, 18);
	assert_eq!(back.prompt_tokens_details.unwrap().cached_tokens, 5);
	assert_eq!(back.completion_tokens_details.unwrap().reasoning_tokens, 3);

	// Responses usage -> Gemini usage -> Responses usage preserves it too.
	let resp = responses::Usage {
		input_tokens: 11,
		output_tokens: 7,
		total_tokens: 18,
		input_tokens_details: Some(responses::InputTokensDetails { cached_tokens: 5 }),
		output_tokens_details: Some(responses::OutputTokensDetails { reasoning_tokens: 3 }),
	};
	let gem = gemini::UsageMetadata::from_billing(&resp.to_billing());
	let back = responses::Usage::from_billing(&gem.to_billing());
	assert_eq!(back.input_tokens, 11);
	assert_eq!(back.output_tokens, 7);
	assert_eq!(back.total_tokens, 18);
	assert_eq!(back.input_tokens_details.unwrap().cached_tokens, 5);
	assert_eq!(back.output_tokens_details.unwrap().reasoning_tokens, 3);
}
