use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use relay_core::prelude::*;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::store::{BillingStore, StoreError};
use super::{ConsumeLog, HourTimestamp, Usage};

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(60);
const UPSERT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
	pub amount: Decimal,
	pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
	pub channel_id: u64,
	pub model: Strng,
	pub hour: HourTimestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupSummaryKey {
	pub group: Strng,
	pub token_name: Strng,
	pub model: Strng,
	pub hour: HourTimestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryDelta {
	pub request_count: u64,
	pub used_amount: Decimal,
	pub exception_count: u64,
	pub usage: Usage,
}

impl SummaryDelta {
	fn absorb(&mut self, other: &SummaryDelta) {
		self.request_count += other.request_count;
		self.used_amount += other.used_amount;
		self.exception_count += other.exception_count;
		self.usage.add(&other.usage);
	}
}

#[derive(Default)]
struct Maps {
	logs: Vec<ConsumeLog>,
	groups: HashMap<Strng, Tally>,
	tokens: HashMap<i64, Tally>,
	channels: HashMap<u64, Tally>,
	summaries: HashMap<SummaryKey, SummaryDelta>,
	group_summaries: HashMap<GroupSummaryKey, SummaryDelta>,
}

impl Maps {
	fn is_empty(&self) -> bool {
		self.logs.is_empty()
			&& self.groups.is_empty()
			&& self.tokens.is_empty()
			&& self.channels.is_empty()
			&& self.summaries.is_empty()
			&& self.group_summaries.is_empty()
	}
}

/// Coalesces completed-request records into five update maps and flushes
/// them to the store every five seconds. Entries survive failed flushes and
/// are retried on the next cycle.
pub struct Aggregator {
	store: Arc<dyn BillingStore>,
	maps: Mutex<Maps>,
	last_error_log: Mutex<Option<Instant>>,
}

impl Aggregator {
	pub fn new(store: Arc<dyn BillingStore>) -> Arc<Aggregator> {
		Arc::new(Aggregator {
			store,
			maps: Mutex::new(Maps::default()),
			last_error_log: Mutex::new(None),
		})
	}

	/// Record one completed request. Cheap: a brief lock and a few map
	/// updates; persistence happens on the flush cycle.
	pub fn record(&self, log: ConsumeLog) {
		let exception = u64::from(log.code != 200);
		let mut maps = self.maps.lock();

		let channel = maps.channels.entry(log.channel_id).or_default();
		channel.amount += log.amount;
		channel.count += 1;

		if log.downstream_result {
			let group = maps.groups.entry(log.group.clone()).or_default();
			group.amount += log.amount;
			group.count += 1;

			let token = maps.tokens.entry(log.token_id).or_default();
			token.amount += log.amount;
			token.count += 1;

			let delta = SummaryDelta {
				request_count: 1,
				used_amount: log.amount,
				exception_count: exception,
				usage: log.usage,
			};
			maps
				.summaries
				.entry(SummaryKey {
					channel_id: log.channel_id,
					model: log.model.clone(),
					hour: log.hour(),
				})
				.or_default()
				.absorb(&delta);
			maps
				.group_summaries
				.entry(GroupSummaryKey {
					group: log.group.clone(),
					token_name: log.token_name.clone(),
					model: log.model.clone(),
					hour: log.hour(),
				})
				.or_default()
				.absorb(&delta);
		}

		maps.logs.push(log);
	}

	/// Drive the flush ticker until shutdown, then flush once more.
	pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
		let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					self.flush().await;
				},
				_ = shutdown.cancelled() => {
					self.flush().await;
					return;
				},
			}
		}
	}

	/// One flush pass. Entries are taken out of the shared maps up front so
	/// new records keep accumulating while the store calls run; anything that
	/// fails is merged back for the next cycle.
	pub async fn flush(&self) {
		let taken = {
			let mut maps = self.maps.lock();
			if maps.is_empty() {
				return;
			}
			std::mem::take(&mut *maps)
		};
		let mut retained = Maps::default();

		for log in taken.logs {
			if let Err(e) = self.store.insert_consume_log(&log).await {
				self.log_flush_error(&e);
				retained.logs.push(log);
			}
		}
		for (group, tally) in taken.groups {
			if let Err(e) = self.store.add_group_usage(&group, &tally).await {
				self.log_flush_error(&e);
				retained.groups.insert(group, tally);
			}
		}
		for (token, tally) in taken.tokens {
			if let Err(e) = self.store.add_token_usage(token, &tally).await {
				self.log_flush_error(&e);
				retained.tokens.insert(token, tally);
			}
		}
		for (channel, tally) in taken.channels {
			if let Err(e) = self.store.add_channel_usage(channel, &tally).await {
				self.log_flush_error(&e);
				retained.channels.insert(channel, tally);
			}
		}
		for (key, delta) in taken.summaries {
			if let Err(e) = self.upsert_summary(&key, &delta).await {
				self.log_flush_error(&e);
				retained.summaries.insert(key, delta);
			}
		}
		for (key, delta) in taken.group_summaries {
			if let Err(e) = self.upsert_group_summary(&key, &delta).await {
				self.log_flush_error(&e);
				retained.group_summaries.insert(key, delta);
			}
		}

		if !retained.is_empty() {
			let mut maps = self.maps.lock();
			maps.logs.extend(retained.logs);
			for (k, v) in retained.groups {
				let t = maps.groups.entry(k).or_default();
				t.amount += v.amount;
				t.count += v.count;
			}
			for (k, v) in retained.tokens {
				let t = maps.tokens.entry(k).or_default();
				t.amount += v.amount;
				t.count += v.count;
			}
			for (k, v) in retained.channels {
				let t = maps.channels.entry(k).or_default();
				t.amount += v.amount;
				t.count += v.count;
			}
			for (k, v) in retained.summaries {
				maps.summaries.entry(k).or_default().absorb(&v);
			}
			for (k, v) in retained.group_summaries {
				maps.group_summaries.entry(k).or_default().absorb(&v);
			}
		}
	}

	/// Additive UPDATE first; INSERT when no row matched; on a duplicate-key
	/// race, retry the UPDATE. Bounded so two racing writers converge.
	async fn upsert_summary(&self, key: &SummaryKey, delta: &SummaryDelta) -> Result<(), StoreError> {
		for _ in 0..UPSERT_ATTEMPTS {
			if self.store.update_summary(key, delta).await? {
				return Ok(());
			}
			match self.store.insert_summary(key, delta).await {
				Ok(()) => return Ok(()),
				Err(StoreError::Duplicate) => continue,
				Err(e) => return Err(e),
			}
		}
		Err(StoreError::Other(anyhow::anyhow!(
			"summary upsert did not converge after {UPSERT_ATTEMPTS} attempts"
		)))
	}

	async fn upsert_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<(), StoreError> {
		for _ in 0..UPSERT_ATTEMPTS {
			if self.store.update_group_summary(key, delta).await? {
				return Ok(());
			}
			match self.store.insert_group_summary(key, delta).await {
				Ok(()) => return Ok(()),
				Err(StoreError::Duplicate) => continue,
				Err(e) => return Err(e),
			}
		}
		Err(StoreError::Other(anyhow::anyhow!(
			"group summary upsert did not converge after {UPSERT_ATTEMPTS} attempts"
		)))
	}

	/// Flush errors are expected during store outages; keep the log quiet.
	fn log_flush_error(&self, err: &StoreError) {
		let mut last = self.last_error_log.lock();
		let now = Instant::now();
		if last.is_none_or(|t| now.duration_since(t) >= ERROR_LOG_INTERVAL) {
			warn!("billing flush failed, entries retained: {err}");
			*last = Some(now);
		}
	}
}
