use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use relay_core::strng;
use rust_decimal::Decimal;

use super::store::{BillingStore, MemStore, StoreError};
use super::*;
use crate::llm::Mode;
use crate::store::Price;

fn test_log(downstream_result: bool, code: u16) -> ConsumeLog {
	let usage = Usage {
		input_tokens: 10,
		output_tokens: 5,
		total_tokens: 15,
		..Default::default()
	};
	ConsumeLog {
		request_id: strng::new(uuid::Uuid::new_v4().to_string()),
		request_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 34, 56).unwrap(),
		retry_at: None,
		first_byte_at: None,
		group: strng::literal!("g1"),
		code,
		channel_id: 7,
		model: strng::literal!("gpt-4o"),
		token_id: 42,
		token_name: strng::literal!("t1"),
		endpoint: strng::literal!("/v1/chat/completions"),
		mode: Mode::ChatCompletions,
		ip: strng::literal!("10.0.0.1"),
		retry_times: 0,
		request_detail: None,
		downstream_result,
		usage,
		price: Price::default(),
		amount: Decimal::new(15, 6),
	}
}

#[test]
fn usage_normalize_totals() {
	// I1: total == input + output after normalization.
	let mut u = Usage {
		input_tokens: 10,
		output_tokens: 5,
		total_tokens: 0,
		..Default::default()
	};
	u.normalize(0);
	assert_eq!(u.total_tokens, 15);

	// Upstream reported only a total: input comes from the precomputed
	// request usage and output is the remainder.
	let mut u = Usage {
		total_tokens: 100,
		..Default::default()
	};
	u.normalize(30);
	assert_eq!(u.input_tokens, 30);
	assert_eq!(u.output_tokens, 70);
	assert_eq!(u.total_tokens, 100);
}

#[test]
fn usage_supersede_keeps_latest_and_accumulates_web_search() {
	let mut u = Usage {
		input_tokens: 1,
		output_tokens: 1,
		total_tokens: 2,
		web_search_count: 1,
		..Default::default()
	};
	u.supersede(Usage {
		web_search_count: 2,
		..Default::default()
	});
	// Empty token counts do not clobber an earlier report.
	assert_eq!(u.input_tokens, 1);
	assert_eq!(u.web_search_count, 3);

	u.supersede(Usage {
		input_tokens: 3,
		output_tokens: 2,
		total_tokens: 5,
		..Default::default()
	});
	assert_eq!(u.total_tokens, 5);
	assert_eq!(u.web_search_count, 3);
}

#[test]
fn hour_timestamp_rejects_unaligned() {
	// I2
	assert!(HourTimestamp::new(3600).is_ok());
	assert!(HourTimestamp::new(3601).is_err());
	assert_eq!(HourTimestamp::truncate(7201).as_secs(), 7200);
	let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 34, 56).unwrap();
	assert_eq!(HourTimestamp::of(at).as_secs() % 3600, 0);
}

#[test]
fn cost_uses_fixed_point_decimals() {
	let price = Price {
		input: Decimal::new(3, 7),  // 0.0000003
		output: Decimal::new(15, 7),
		..Default::default()
	};
	let usage = Usage {
		input_tokens: 1_000_000,
		output_tokens: 1_000_000,
		total_tokens: 2_000_000,
		..Default::default()
	};
	assert_eq!(usage.cost(&price), Decimal::new(18, 1)); // 0.3 + 1.5
}

#[test]
fn cost_bills_cached_tokens_at_cached_rate() {
	let price = Price {
		input: Decimal::new(10, 7),
		output: Decimal::ZERO,
		cached_input: Some(Decimal::new(1, 7)),
		..Default::default()
	};
	let usage = Usage {
		input_tokens: 100,
		cached_tokens: 40,
		..Default::default()
	};
	// 60 uncached at full rate + 40 cached at the discounted rate.
	assert_eq!(usage.cost(&price), Decimal::new(64, 6));
}

#[tokio::test]
async fn record_and_flush_coalesces() {
	let store = Arc::new(MemStore::new());
	let agg = Aggregator::new(store.clone());
	for _ in 0..10 {
		agg.record(test_log(true, 200));
	}
	agg.record(test_log(false, 502));
	agg.flush().await;

	// Channel totals include the failed request; group/token totals do not.
	assert_eq!(store.channel(7).unwrap().count, 11);
	assert_eq!(store.group("g1").unwrap().count, 10);
	assert_eq!(store.token(42).unwrap().count, 10);
	assert_eq!(store.logs().len(), 11);

	let key = SummaryKey {
		channel_id: 7,
		model: strng::literal!("gpt-4o"),
		hour: HourTimestamp::of(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()),
	};
	let row = store.summary(&key).unwrap();
	assert_eq!(row.request_count, 10);
	assert_eq!(row.exception_count, 0);
	assert_eq!(row.usage.input_tokens, 100);
	assert_eq!(row.used_amount, Decimal::new(150, 6));
}

#[tokio::test]
async fn concurrent_records_converge_to_one_row() {
	// I7 / scenario 6: N concurrent records on one (channel, model, hour)
	// leave exactly one summary row with requestCount == N.
	let store = Arc::new(MemStore::new());
	let agg = Aggregator::new(store.clone());
	let mut handles = Vec::new();
	for _ in 0..100 {
		let agg = agg.clone();
		handles.push(tokio::spawn(async move {
			for _ in 0..10 {
				agg.record(test_log(true, 200));
			}
		}));
	}
	for h in handles {
		h.await.unwrap();
	}
	agg.flush().await;
	agg.flush().await; // a second flush must not double-apply

	assert_eq!(store.summary_count(), 1);
	assert_eq!(store.group_summary_count(), 1);
	let key = GroupSummaryKey {
		group: strng::literal!("g1"),
		token_name: strng::literal!("t1"),
		model: strng::literal!("gpt-4o"),
		hour: HourTimestamp::of(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()),
	};
	let row = store.group_summary(&key).unwrap();
	assert_eq!(row.request_count, 1000);
	assert_eq!(row.exception_count, 0);
	assert_eq!(row.used_amount, Decimal::new(15, 6) * Decimal::from(1000));
}

#[tokio::test]
async fn exceptions_are_counted_for_delivered_errors() {
	let store = Arc::new(MemStore::new());
	let agg = Aggregator::new(store.clone());
	agg.record(test_log(true, 200));
	agg.record(test_log(true, 502));
	agg.flush().await;

	let key = SummaryKey {
		channel_id: 7,
		model: strng::literal!("gpt-4o"),
		hour: HourTimestamp::of(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()),
	};
	let row = store.summary(&key).unwrap();
	assert_eq!(row.request_count, 2);
	assert_eq!(row.exception_count, 1);
}

/// A store that fails every write until released.
struct FlakyStore {
	inner: MemStore,
	broken: AtomicBool,
}

impl FlakyStore {
	fn new() -> Self {
		FlakyStore {
			inner: MemStore::new(),
			broken: AtomicBool::new(true),
		}
	}

	fn check(&self) -> Result<(), StoreError> {
		if self.broken.load(Ordering::SeqCst) {
			return Err(StoreError::Other(anyhow::anyhow!("store offline")));
		}
		Ok(())
	}
}

#[async_trait]
impl BillingStore for FlakyStore {
	async fn insert_consume_log(&self, log: &ConsumeLog) -> Result<(), StoreError> {
		self.check()?;
		self.inner.insert_consume_log(log).await
	}
	async fn add_group_usage(&self, group: &str, delta: &Tally) -> Result<(), StoreError> {
		self.check()?;
		self.inner.add_group_usage(group, delta).await
	}
	async fn add_token_usage(&self, token_id: i64, delta: &Tally) -> Result<(), StoreError> {
		self.check()?;
		self.inner.add_token_usage(token_id, delta).await
	}
	async fn add_channel_usage(&self, channel_id: u64, delta: &Tally) -> Result<(), StoreError> {
		self.check()?;
		self.inner.add_channel_usage(channel_id, delta).await
	}
	async fn update_summary(
		&self,
		key: &SummaryKey,
		delta: &SummaryDelta,
	) -> Result<bool, StoreError> {
		self.check()?;
		self.inner.update_summary(key, delta).await
	}
	async fn insert_summary(&self, key: &SummaryKey, delta: &SummaryDelta) -> Result<(), StoreError> {
		self.check()?;
		self.inner.insert_summary(key, delta).await
	}
	async fn update_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<bool, StoreError> {
		self.check()?;
		self.inner.update_group_summary(key, delta).await
	}
	async fn insert_group_summary(
		&self,
		key: &GroupSummaryKey,
		delta: &SummaryDelta,
	) -> Result<(), StoreError> {
		self.check()?;
		self.inner.insert_group_summary(key, delta).await
	}
}

#[tokio::test]
async fn failed_flush_retains_entries_for_next_cycle() {
	let store = Arc::new(FlakyStore::new());
	let agg = Aggregator::new(store.clone());
	agg.record(test_log(true, 200));
	agg.flush().await;
	assert!(store.inner.logs().is_empty());

	store.broken.store(false, Ordering::SeqCst);
	agg.flush().await;
	assert_eq!(store.inner.logs().len(), 1);
	assert_eq!(store.inner.channel(7).unwrap().count, 1);
	assert_eq!(store.inner.summary_count(), 1);
}

#[tokio::test]
async fn shutdown_performs_final_flush() {
	let store = Arc::new(MemStore::new());
	let agg = Aggregator::new(store.clone());
	let shutdown = tokio_util::sync::CancellationToken::new();
	let task = tokio::spawn(agg.clone().run(shutdown.clone()));

	agg.record(test_log(true, 200));
	shutdown.cancel();
	task.await.unwrap();
	assert_eq!(store.logs().len(), 1);
}
