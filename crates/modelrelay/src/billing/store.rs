//! The persistence seam. The real gateway persists through a relational
//! store with ON-CONFLICT upserts; requests only ever see this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use super::aggregate::{GroupSummaryKey, SummaryDelta, SummaryKey, Tally};
use super::{ConsumeLog, Usage};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
	/// Unique-key violation on insert. The aggregator reacts by retrying the
	/// additive update.
	#[error("duplicate key")]
	Duplicate,
	#[error(transparent)]
	Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait BillingStore: Send + Sync {
	async fn insert_consume_log(&self, log: &ConsumeLog) -> Result<(), StoreError>;

	async fn add_group_usage(&self, group: &str, delta: &Tally) -> Result<(), StoreError>;
	async fn add_token_usage(&self, token_id: i64, delta: &Tally) -> Result<(), StoreError>;
	async fn add_channel_usage(&self, channel_id: u64, delta: &Tally) -> Result<(), StoreError>;

	/// Additive update of an existing summary row. Returns `false` when no
	/// row with this key exists yet.
	async fn update_summary(&self, key: &SummaryKey, delta: &SummaryDelta)
	-> Result<bool, StoreError>;
	async fn insert_summary(&self, key: &SummaryKey, delta: &SummaryDelta) -> Result<(), StoreError>;

	async fn update_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<bool, StoreError>;
	async fn insert_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<(), StoreError>;
}

/// A complete in-memory store. The reference implementation for tests and
/// single-process deployments.
#[derive(Default)]
pub struct MemStore {
	inner: Mutex<MemInner>,
}

#[derive(Default)]
struct MemInner {
	logs: Vec<ConsumeLog>,
	groups: HashMap<String, Tally>,
	tokens: HashMap<i64, Tally>,
	channels: HashMap<u64, Tally>,
	summaries: HashMap<SummaryKey, SummaryRow>,
	group_summaries: HashMap<GroupSummaryKey, SummaryRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryRow {
	pub request_count: u64,
	pub used_amount: Decimal,
	pub exception_count: u64,
	pub usage: Usage,
}

impl SummaryRow {
	fn apply(&mut self, delta: &SummaryDelta) {
		self.request_count += delta.request_count;
		self.used_amount += delta.used_amount;
		self.exception_count += delta.exception_count;
		self.usage.add(&delta.usage);
	}
}

impl MemStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn logs(&self) -> Vec<ConsumeLog> {
		self.inner.lock().logs.clone()
	}

	pub fn group(&self, group: &str) -> Option<Tally> {
		self.inner.lock().groups.get(group).cloned()
	}

	pub fn token(&self, token_id: i64) -> Option<Tally> {
		self.inner.lock().tokens.get(&token_id).cloned()
	}

	pub fn channel(&self, channel_id: u64) -> Option<Tally> {
		self.inner.lock().channels.get(&channel_id).cloned()
	}

	pub fn summary(&self, key: &SummaryKey) -> Option<SummaryRow> {
		self.inner.lock().summaries.get(key).cloned()
	}

	pub fn group_summary(&self, key: &GroupSummaryKey) -> Option<SummaryRow> {
		self.inner.lock().group_summaries.get(key).cloned()
	}

	pub fn summary_count(&self) -> usize {
		self.inner.lock().summaries.len()
	}

	pub fn group_summary_count(&self) -> usize {
		self.inner.lock().group_summaries.len()
	}
}

#[async_trait]
impl BillingStore for MemStore {
	async fn insert_consume_log(&self, log: &ConsumeLog) -> Result<(), StoreError> {
		self.inner.lock().logs.push(log.clone());
		Ok(())
	}

	async fn add_group_usage(&self, group: &str, delta: &Tally) -> Result<(), StoreError> {
		let mut inner = self.inner.lock();
		let t = inner.groups.entry(group.to_string()).or_default();
		t.amount += delta.amount;
		t.count += delta.count;
		Ok(())
	}

	async fn add_token_usage(&self, token_id: i64, delta: &Tally) -> Result<(), StoreError> {
		let mut inner = self.inner.lock();
		let t = inner.tokens.entry(token_id).or_default();
		t.amount += delta.amount;
		t.count += delta.count;
		Ok(())
	}

	async fn add_channel_usage(&self, channel_id: u64, delta: &Tally) -> Result<(), StoreError> {
		let mut inner = self.inner.lock();
		let t = inner.channels.entry(channel_id).or_default();
		t.amount += delta.amount;
		t.count += delta.count;
		Ok(())
	}

	async fn update_summary(
		&self,
		key: &SummaryKey,
		delta: &SummaryDelta,
	) -> Result<bool, StoreError> {
		let mut inner = self.inner.lock();
		match inner.summaries.get_mut(key) {
			Some(row) => {
				row.apply(delta);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	async fn insert_summary(&self, key: &SummaryKey, delta: &SummaryDelta) -> Result<(), StoreError> {
		let mut inner = self.inner.lock();
		if inner.summaries.contains_key(key) {
			return Err(StoreError::Duplicate);
		}
		let mut row = SummaryRow::default();
		row.apply(delta);
		inner.summaries.insert(key.clone(), row);
		Ok(())
	}

	async fn update_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<bool, StoreError> {
		let mut inner = self.inner.lock();
		match inner.group_summaries.get_mut(key) {
			Some(row) => {
				row.apply(delta);
				Ok(true)
			},
			None => Ok(false),
		}
	}

	async fn insert_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<(), StoreError> {
		let mut inner = self.inner.lock();
		if inner.group_summaries.contains_key(key) {
			return Err(StoreError::Duplicate);
		}
		let mut row = SummaryRow::default();
		row.apply(delta);
		inner.group_summaries.insert(key.clone(), row);
		Ok(())
	}
}
