//! Newline-delimited JSON scanning, used by upstreams (Ollama) that stream
//! one JSON document per line instead of SSE frames.

use std::convert::Infallible;

use bytes::Bytes;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::sse::{Event, OutFrame, SseError};
use crate::http::Body;

struct LineParser {
	limit: usize,
	line: Vec<u8>,
}

impl LineParser {
	fn new(limit: usize) -> Self {
		let limit = if limit == 0 {
			super::sse::DEFAULT_BUFFER_LIMIT
		} else {
			limit
		};
		LineParser {
			limit,
			line: Vec::new(),
		}
	}

	fn push(&mut self, chunk: &[u8], out: &mut Vec<String>) -> Result<(), SseError> {
		for &b in chunk {
			if b == b'\n' {
				self.end_line(out);
			} else {
				if self.line.len() >= self.limit {
					return Err(SseError::Overflow(self.limit));
				}
				self.line.push(b);
			}
		}
		Ok(())
	}

	fn end_line(&mut self, out: &mut Vec<String>) {
		let mut line = std::mem::take(&mut self.line);
		if line.last() == Some(&b'\r') {
			line.pop();
		}
		if line.is_empty() {
			return;
		}
		out.push(String::from_utf8_lossy(&line).to_string());
	}

	fn finish(&mut self, out: &mut Vec<String>) {
		self.end_line(out);
	}
}

/// Rewrite an NDJSON body line by line into SSE frames. Mirrors
/// [`super::sse::json_transform_multi`]; the callback's `Done` arm fires once.
pub fn json_transform_multi<I, F>(b: Body, limit: usize, mut f: F) -> Body
where
	I: DeserializeOwned,
	F: FnMut(Event<I>) -> Vec<OutFrame> + Send + 'static,
{
	let out = async_stream::stream! {
		let mut body = b;
		let mut parser = LineParser::new(limit);
		let mut lines = Vec::new();
		'read: while let Some(frame) = body.frame().await {
			match frame {
				Ok(frame) => {
					let Ok(data) = frame.into_data() else {
						continue;
					};
					if let Err(e) = parser.push(&data, &mut lines) {
						warn!("ndjson scan failed: {e}");
						break 'read;
					}
				},
				Err(e) => {
					warn!("error reading upstream stream: {e}");
					break 'read;
				},
			}
			for line in lines.drain(..) {
				let parsed = serde_json::from_str::<I>(&line).map_err(SseError::Json);
				for out in f(Event::Data(parsed)) {
					let bytes = out.into_bytes();
					if !bytes.is_empty() {
						yield Ok::<Bytes, Infallible>(bytes);
					}
				}
			}
		}
		parser.finish(&mut lines);
		for line in lines.drain(..) {
			let parsed = serde_json::from_str::<I>(&line).map_err(SseError::Json);
			for out in f(Event::Data(parsed)) {
				let bytes = out.into_bytes();
				if !bytes.is_empty() {
					yield Ok::<Bytes, Infallible>(bytes);
				}
			}
		}
		for out in f(Event::Done) {
			let bytes = out.into_bytes();
			if !bytes.is_empty() {
				yield Ok::<Bytes, Infallible>(bytes);
			}
		}
	};
	Body::from_stream(out)
}
