//! Usage accounting: turns completed-request records into coalesced,
//! periodically flushed updates against the persistence seam.

mod aggregate;
pub mod store;

#[cfg(test)]
#[path = "billing_tests.rs"]
mod tests;

use chrono::{DateTime, Utc};
use relay_core::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use aggregate::{Aggregator, GroupSummaryKey, SummaryDelta, SummaryKey, Tally};
pub use store::{BillingStore, MemStore, StoreError};

use crate::llm::Mode;
use crate::store::Price;

/// Per-request token counters. All counters are non-negative; `total` is
/// normalized to `input + output` before anything is persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
	pub input_tokens: u64,
	pub output_tokens: u64,
	pub total_tokens: u64,
	pub cached_tokens: u64,
	pub cache_creation_tokens: u64,
	pub reasoning_tokens: u64,
	pub image_input_tokens: u64,
	pub image_output_tokens: u64,
	pub web_search_count: u64,
}

impl Usage {
	/// Normalize after the upstream reported its counts. When only a total is
	/// known, the pre-dispatch input estimate fills in `input` and the rest
	/// is attributed to output.
	pub fn normalize(&mut self, precomputed_input: u64) {
		if self.input_tokens == 0 && self.output_tokens == 0 && self.total_tokens > 0 {
			self.input_tokens = precomputed_input.min(self.total_tokens);
			self.output_tokens = self.total_tokens - self.input_tokens;
		}
		self.total_tokens = self.input_tokens + self.output_tokens;
	}

	/// Streaming upstreams may emit usage several times; the latest populated
	/// report wins, while `web_search_count` accumulates across events.
	pub fn supersede(&mut self, next: Usage) {
		let web = self.web_search_count + next.web_search_count;
		if next.input_tokens > 0 || next.output_tokens > 0 || next.total_tokens > 0 {
			*self = next;
		}
		self.web_search_count = web;
	}

	pub fn add(&mut self, other: &Usage) {
		self.input_tokens += other.input_tokens;
		self.output_tokens += other.output_tokens;
		self.total_tokens += other.total_tokens;
		self.cached_tokens += other.cached_tokens;
		self.cache_creation_tokens += other.cache_creation_tokens;
		self.reasoning_tokens += other.reasoning_tokens;
		self.image_input_tokens += other.image_input_tokens;
		self.image_output_tokens += other.image_output_tokens;
		self.web_search_count += other.web_search_count;
	}

	pub fn is_empty(&self) -> bool {
		*self == Usage::default()
	}

	/// Price this usage against a unit-price vector. Cached tokens are billed
	/// at the cached rate when one is configured, otherwise at the input rate.
	pub fn cost(&self, price: &Price) -> Decimal {
		let d = Decimal::from;
		let uncached = self.input_tokens.saturating_sub(self.cached_tokens);
		let mut amount = d(uncached) * price.input + d(self.output_tokens) * price.output;
		amount += d(self.cached_tokens) * price.cached_input.unwrap_or(price.input);
		if let Some(p) = price.cache_creation {
			amount += d(self.cache_creation_tokens) * p;
		}
		if let Some(p) = price.image_input {
			amount += d(self.image_input_tokens) * p;
		}
		if let Some(p) = price.image_output {
			amount += d(self.image_output_tokens) * p;
		}
		if let Some(p) = price.web_search {
			amount += d(self.web_search_count) * p;
		}
		amount
	}
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("timestamp {0} is not aligned to an hour boundary")]
pub struct UnalignedTimestamp(i64);

/// Unix seconds truncated to the start of an hour; the bucket key for the
/// summary aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HourTimestamp(i64);

impl HourTimestamp {
	pub fn new(secs: i64) -> Result<HourTimestamp, UnalignedTimestamp> {
		if secs.rem_euclid(3600) != 0 {
			return Err(UnalignedTimestamp(secs));
		}
		Ok(HourTimestamp(secs))
	}

	pub fn truncate(secs: i64) -> HourTimestamp {
		HourTimestamp(secs - secs.rem_euclid(3600))
	}

	pub fn of(at: DateTime<Utc>) -> HourTimestamp {
		Self::truncate(at.timestamp())
	}

	pub fn as_secs(self) -> i64 {
		self.0
	}
}

/// One row per completed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeLog {
	pub request_id: Strng,
	pub request_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_at: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub first_byte_at: Option<DateTime<Utc>>,
	pub group: Strng,
	pub code: u16,
	pub channel_id: u64,
	pub model: Strng,
	pub token_id: i64,
	pub token_name: Strng,
	pub endpoint: Strng,
	pub mode: Mode,
	pub ip: Strng,
	pub retry_times: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub request_detail: Option<String>,
	/// Whether the response reached the client successfully. Failed requests
	/// still count toward the channel totals, but not group or token totals.
	pub downstream_result: bool,
	pub usage: Usage,
	pub price: Price,
	pub amount: Decimal,
}

impl ConsumeLog {
	pub fn hour(&self) -> HourTimestamp {
		HourTimestamp::of(self.request_at)
	}
}
