//! Server-sent-event scanning and rewriting.
//!
//! Upstream bodies are consumed frame by frame; complete SSE events are
//! surfaced to a translator callback which emits zero or more rewritten
//! frames for the downstream body. The callback sees a terminal
//! [`Event::Done`] exactly once, either at the upstream `[DONE]` sentinel or
//! at end of stream, so it can flush buffered state and append its own
//! terminator.

use std::convert::Infallible;

use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::http::Body;

/// Scanner limit for ordinary chat streams.
pub const DEFAULT_BUFFER_LIMIT: usize = 262_144;
/// Image models inline base64 payloads into SSE events; allow much larger
/// frames for those.
pub const IMAGE_BUFFER_LIMIT: usize = 2_097_152;

pub const DONE_MESSAGE: &str = "[DONE]";

#[derive(thiserror::Error, Debug)]
pub enum SseError {
	#[error("sse frame exceeded buffer limit of {0} bytes")]
	Overflow(usize),
	#[error("invalid event payload: {0}")]
	Json(#[from] serde_json::Error),
}

/// One decoded wire frame: optional `event:` name plus joined `data:` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
	pub event: Option<String>,
	pub data: String,
}

/// Input to a stream translator.
pub enum Event<T> {
	Data(Result<T, SseError>),
	/// Upstream finished (explicit `[DONE]` or end of body). Delivered once.
	Done,
}

/// A rewritten frame ready to be written downstream.
pub struct OutFrame(Bytes);

impl OutFrame {
	pub fn data<T: Serialize>(v: &T) -> OutFrame {
		Self::encode(None, v)
	}

	pub fn event<T: Serialize>(name: &str, v: &T) -> OutFrame {
		Self::encode(Some(name), v)
	}

	pub fn done() -> OutFrame {
		OutFrame(Bytes::from_static(b"data: [DONE]\n\n"))
	}

	pub fn raw(bytes: Bytes) -> OutFrame {
		OutFrame(bytes)
	}

	fn encode<T: Serialize>(name: Option<&str>, v: &T) -> OutFrame {
		let json = match serde_json::to_vec(v) {
			Ok(j) => j,
			Err(e) => {
				debug!("failed to serialize sse frame: {e}");
				return OutFrame(Bytes::new());
			},
		};
		let mut b = BytesMut::with_capacity(json.len() + 32);
		if let Some(name) = name {
			b.extend_from_slice(b"event: ");
			b.extend_from_slice(name.as_bytes());
			b.extend_from_slice(b"\n");
		}
		b.extend_from_slice(b"data: ");
		b.extend_from_slice(&json);
		b.extend_from_slice(b"\n\n");
		OutFrame(b.freeze())
	}

	pub fn into_bytes(self) -> Bytes {
		self.0
	}
}

/// Incremental SSE frame scanner with a per-line size cap.
pub struct FrameParser {
	limit: usize,
	line: Vec<u8>,
	event: Option<String>,
	data: Vec<String>,
}

impl FrameParser {
	pub fn new(limit: usize) -> Self {
		let limit = if limit == 0 { DEFAULT_BUFFER_LIMIT } else { limit };
		FrameParser {
			limit,
			line: Vec::new(),
			event: None,
			data: Vec::new(),
		}
	}

	pub fn push(&mut self, chunk: &[u8], out: &mut Vec<Frame>) -> Result<(), SseError> {
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

	/// Flush any trailing frame not terminated by a blank line.
	pub fn finish(&mut self, out: &mut Vec<Frame>) {
		if !self.line.is_empty() {
			self.end_line(out);
		}
		self.dispatch(out);
	}

	fn end_line(&mut self, out: &mut Vec<Frame>) {
		let mut line = std::mem::take(&mut self.line);
		if line.last() == Some(&b'\r') {
			line.pop();
		}
		if line.is_empty() {
			self.dispatch(out);
			return;
		}
		let line = String::from_utf8_lossy(&line);
		if let Some(v) = line.strip_prefix("data:") {
			self.data.push(v.strip_prefix(' ').unwrap_or(v).to_string());
		} else if let Some(v) = line.strip_prefix("event:") {
			self.event = Some(v.trim().to_string());
		}
		// Comments, `id:` and `retry:` fields are ignored.
	}

	fn dispatch(&mut self, out: &mut Vec<Frame>) {
		if self.data.is_empty() {
			self.event = None;
			return;
		}
		out.push(Frame {
			event: self.event.take(),
			data: std::mem::take(&mut self.data).join("\n"),
		});
	}
}

/// Rewrite an SSE body event by event. Each upstream `data:` payload is
/// decoded as `I` and handed to `f`, which returns the frames to emit.
/// `f(Event::Done)` is invoked exactly once for the flush.
pub fn json_transform_multi<I, F>(b: Body, limit: usize, mut f: F) -> Body
where
	I: DeserializeOwned,
	F: FnMut(Event<I>) -> Vec<OutFrame> + Send + 'static,
{
	let out = async_stream::stream! {
		let mut body = b;
		let mut parser = FrameParser::new(limit);
		let mut frames = Vec::new();
		let mut finished = false;
		'read: while let Some(frame) = body.frame().await {
			match frame {
				Ok(frame) => {
					let Ok(data) = frame.into_data() else {
						continue;
					};
					if let Err(e) = parser.push(&data, &mut frames) {
						warn!("sse scan failed: {e}");
						break 'read;
					}
				},
				Err(e) => {
					warn!("error reading upstream stream: {e}");
					break 'read;
				},
			}
			for frame in frames.drain(..) {
				if frame.data == DONE_MESSAGE {
					finished = true;
					for out in f(Event::Done) {
						let bytes = out.into_bytes();
						if !bytes.is_empty() {
							yield Ok::<Bytes, Infallible>(bytes);
						}
					}
					break 'read;
				}
				let parsed = serde_json::from_str::<I>(&frame.data).map_err(SseError::Json);
				for out in f(Event::Data(parsed)) {
					let bytes = out.into_bytes();
					if !bytes.is_empty() {
						yield Ok::<Bytes, Infallible>(bytes);
					}
				}
			}
		}
		if !finished {
			parser.finish(&mut frames);
			for frame in frames.drain(..) {
				if frame.data == DONE_MESSAGE {
					continue;
				}
				let parsed = serde_json::from_str::<I>(&frame.data).map_err(SseError::Json);
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
		}
	};
	Body::from_stream(out)
}

/// Single-out transform targeting OpenAI-shaped streams: every produced chunk
/// is written as a bare `data:` frame and the stream is closed with exactly
/// one `[DONE]` sentinel.
pub fn json_transform<I, O, F>(b: Body, limit: usize, mut f: F) -> Body
where
	I: DeserializeOwned,
	O: Serialize,
	F: FnMut(Result<I, SseError>) -> Option<O> + Send + 'static,
{
	json_transform_multi(b, limit, move |ev| match ev {
		Event::Data(r) => f(r).map(|o| vec![OutFrame::data(&o)]).unwrap_or_default(),
		Event::Done => vec![OutFrame::done()],
	})
}

/// Pass the body through byte-for-byte while surfacing each decoded event to
/// an observer. The observer sees `None` at end of stream.
pub fn json_passthrough<T, F>(b: Body, limit: usize, mut f: F) -> Body
where
	T: DeserializeOwned,
	F: FnMut(Option<Result<T, SseError>>) + Send + 'static,
{
	let out = async_stream::stream! {
		let mut body = b;
		let mut parser = FrameParser::new(limit);
		let mut frames = Vec::new();
		let mut broken = false;
		while let Some(frame) = body.frame().await {
			match frame {
				Ok(frame) => {
					let Ok(data) = frame.into_data() else {
						continue;
					};
					if !broken {
						if let Err(e) = parser.push(&data, &mut frames) {
							// Observation failed, but the bytes still flow through.
							debug!("sse scan failed: {e}");
							broken = true;
						}
						for frame in frames.drain(..) {
							if frame.data == DONE_MESSAGE {
								continue;
							}
							f(Some(serde_json::from_str::<T>(&frame.data).map_err(SseError::Json)));
						}
					}
					yield Ok::<Bytes, Infallible>(data);
				},
				Err(e) => {
					warn!("error reading upstream stream: {e}");
					break;
				},
			}
		}
		if !broken {
			parser.finish(&mut frames);
			for frame in frames.drain(..) {
				if frame.data == DONE_MESSAGE {
					continue;
				}
				f(Some(serde_json::from_str::<T>(&frame.data).map_err(SseError::Json)));
			}
		}
		f(None);
	};
	Body::from_stream(out)
}
