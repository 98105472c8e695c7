//! Round-based scrape driver.
//!
//! Every pending date is fetched concurrently under one process-wide limiter.
//! A round ends when all of its fetches have settled; the orchestrator then
//! reduces the per-date outcomes into two signals:
//! - ip blocked: stop, keep whatever rows were collected
//! - rate limited (and not blocked): sleep, then re-run the dates not yet processed
//! - neither: done; dates that failed for other reasons are dropped

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::telemetry::{self};
use crate::telemetry::ops::scrape::Phase as ScrapePhase;

use super::classify::{classify, FetchOutcome, Signal};
use super::fetch::{ScheduleRequest, ScheduleSource};
use super::filter::{extract_matching, SearchTerm};
use super::types::ScheduleRow;

/// Requests in flight at once, across all rounds.
pub const MAX_IN_FLIGHT: usize = 8;
/// Fixed wait before re-running a rate-limited round.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(20);

#[derive(Clone, Debug)]
pub struct ScrapeJob {
    pub dates: Vec<NaiveDate>,
    pub channel: String,
    pub term: SearchTerm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Done,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundDecision {
    Done,
    Stop,
    Retry,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub ip_blocked: bool,
    pub rate_limited: bool,
}

impl RoundSummary {
    fn raise(&mut self, signal: Signal) {
        match signal {
            Signal::IpBlocked => self.ip_blocked = true,
            Signal::RateLimited => self.rate_limited = true,
        }
    }

    /// Block always wins over rate-limit.
    pub fn decision(&self) -> RoundDecision {
        if self.ip_blocked {
            RoundDecision::Stop
        } else if self.rate_limited {
            RoundDecision::Retry
        } else {
            RoundDecision::Done
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoundRecord {
    pub pending: Vec<NaiveDate>,
    pub summary: RoundSummary,
}

#[derive(Debug)]
pub struct BatchReport {
    pub status: BatchStatus,
    pub rounds: Vec<RoundRecord>,
    pub requested: Vec<NaiveDate>,
    pub processed: BTreeSet<NaiveDate>,
    pub dropped: Vec<NaiveDate>,
    /// Sorted by timestamp, then label.
    pub rows: Vec<ScheduleRow>,
}

/// What one worker hands back to the orchestrator.
#[derive(Debug)]
struct DateResult {
    date: NaiveDate,
    outcome: FetchOutcome,
    /// Set only when the program parsed cleanly.
    rows: Option<Vec<ScheduleRow>>,
}

impl DateResult {
    fn new(date: NaiveDate, outcome: FetchOutcome) -> Self {
        Self { date, outcome, rows: None }
    }
}

struct BatchState {
    requested: BTreeSet<NaiveDate>,
    pending: BTreeSet<NaiveDate>,
    processed: BTreeSet<NaiveDate>,
    results: Vec<ScheduleRow>,
}

impl BatchState {
    fn new(dates: &[NaiveDate]) -> Self {
        let requested: BTreeSet<NaiveDate> = dates.iter().copied().collect();
        Self { pending: requested.clone(), requested, processed: BTreeSet::new(), results: Vec::new() }
    }

    /// Fold one round's results in, sequentially, after the join.
    fn merge_round(&mut self, results: Vec<DateResult>, dispatched: usize) -> RoundSummary {
        let mut summary = RoundSummary::default();
        let settled = results.len();
        for r in results {
            if let Some(signal) = r.outcome.signal() {
                summary.raise(signal);
            }
            match (r.outcome, r.rows) {
                (FetchOutcome::Skipped, _) => summary.skipped += 1,
                (FetchOutcome::Parsed(_), Some(rows)) => {
                    self.results.extend(rows);
                    self.processed.insert(r.date);
                    summary.processed += 1;
                }
                _ => summary.failed += 1,
            }
        }
        // panicked workers never report back
        summary.failed += dispatched.saturating_sub(settled);
        summary
    }

    fn reset_pending(&mut self) {
        self.pending = self.requested.difference(&self.processed).copied().collect();
    }

    fn into_report(self, status: BatchStatus, rounds: Vec<RoundRecord>) -> BatchReport {
        let dropped = self.requested.difference(&self.processed).copied().collect();
        let mut rows = self.results;
        rows.sort_by(|a, b| a.timestamp_utc.cmp(&b.timestamp_utc).then_with(|| a.label.cmp(&b.label)));
        BatchReport {
            status,
            rounds,
            requested: self.requested.into_iter().collect(),
            processed: self.processed,
            dropped,
            rows,
        }
    }
}

pub struct Scraper<S> {
    source: Arc<S>,
    limiter: Arc<Semaphore>,
    backoff: Duration,
}

impl<S: ScheduleSource + 'static> Scraper<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            limiter: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
            backoff: RATE_LIMIT_BACKOFF,
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn run(&self, job: &ScrapeJob) -> BatchReport {
        let log = telemetry::scrape();
        let channel: Arc<str> = Arc::from(job.channel.as_str());
        let term = Arc::new(job.term.clone());

        let mut state = BatchState::new(&job.dates);
        let mut rounds: Vec<RoundRecord> = Vec::new();

        let status = loop {
            let round = rounds.len() + 1;
            let pending: Vec<NaiveDate> = state.pending.iter().copied().collect();
            let span = log.span_kv(&ScrapePhase::Round, [("round", round.to_string()), ("pending", pending.len().to_string())]);

            let results = self.run_round(&pending, &channel, &term).instrument(span).await;
            let summary = state.merge_round(results, pending.len());
            log.round_summary(round, summary.processed, summary.failed, summary.skipped, summary.ip_blocked, summary.rate_limited);

            let decision = summary.decision();
            rounds.push(RoundRecord { pending, summary });

            match decision {
                RoundDecision::Done => break BatchStatus::Done,
                RoundDecision::Stop => {
                    log.error("⛔ IP blocked by the endpoint; stopping without retry");
                    break BatchStatus::Stopped;
                }
                RoundDecision::Retry => {
                    state.reset_pending();
                    log.warn_kv(
                        &format!("⏳ Rate limited; retrying {} dates in {}s", state.pending.len(), self.backoff.as_secs()),
                        [("remaining", state.pending.len().to_string()), ("backoff_secs", self.backoff.as_secs().to_string())],
                    );
                    let span = log.span(&ScrapePhase::Backoff);
                    tokio::time::sleep(self.backoff).instrument(span).await;
                }
            }
        };

        state.into_report(status, rounds)
    }

    async fn run_round(&self, pending: &[NaiveDate], channel: &Arc<str>, term: &Arc<SearchTerm>) -> Vec<DateResult> {
        let log = telemetry::scrape();
        let cancel = CancellationToken::new();
        let mut set = JoinSet::new();

        for &date in pending {
            let span = log.span_kv(&ScrapePhase::Fetch, [("date", date.to_string())]);
            set.spawn(
                fetch_date(
                    Arc::clone(&self.source),
                    Arc::clone(&self.limiter),
                    cancel.clone(),
                    date,
                    Arc::clone(channel),
                    Arc::clone(term),
                )
                .instrument(span),
            );
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(r) => results.push(r),
                Err(e) => log.error_kv("💥 fetch worker failed", [("error", e.to_string())]),
            }
        }
        results
    }
}

async fn fetch_date<S: ScheduleSource + ?Sized>(
    source: Arc<S>,
    limiter: Arc<Semaphore>,
    cancel: CancellationToken,
    date: NaiveDate,
    channel: Arc<str>,
    term: Arc<SearchTerm>,
) -> DateResult {
    let log = telemetry::scrape();

    let Ok(permit) = limiter.acquire().await else {
        return DateResult::new(date, FetchOutcome::Skipped);
    };
    if cancel.is_cancelled() {
        log.debug(format!("↩️ {date}: skipped, round already signalled"));
        return DateResult::new(date, FetchOutcome::Skipped);
    }

    let req = ScheduleRequest::new(date.format("%Y-%m-%d").to_string(), &*channel);
    let outcome = match source.get(&req).await {
        Ok(raw) => classify(&raw, &req.signature),
        Err(e) => FetchOutcome::Transport(e.to_string()),
    };
    // signal before giving the slot back so queued fetches see it
    if outcome.signal().is_some() {
        cancel.cancel();
    }
    drop(permit);

    let kv = || [("date", date.to_string()), ("outcome", outcome.kind().to_string())];
    let rows = match &outcome {
        FetchOutcome::Parsed(html) => {
            let _s = log.span(&ScrapePhase::Parse).entered();
            match extract_matching(html, &term) {
                Ok(rows) => {
                    log.info_kv(&format!("✅ {date}: {} matching rows", rows.len()), [("date", date.to_string()), ("rows", rows.len().to_string())]);
                    Some(rows)
                }
                Err(e) => {
                    log.warn_kv(&format!("⚠️ {date}: unparseable program: {e}"), kv());
                    None
                }
            }
        }
        FetchOutcome::Blocked => { log.error_kv(&format!("⛔ {date}: HTTP 403, IP blocked"), kv()); None }
        FetchOutcome::RateLimited => { log.warn_kv(&format!("⏳ {date}: rate limited"), kv()); None }
        FetchOutcome::Malformed(e) => { log.warn_kv(&format!("⚠️ {date}: malformed response: {e}"), kv()); None }
        FetchOutcome::ServerError(e) => { log.warn_kv(&format!("⚠️ {date}: server error: {e}"), kv()); None }
        FetchOutcome::Transport(e) => { log.warn_kv(&format!("⚠️ {date}: request failed: {e}"), kv()); None }
        FetchOutcome::Empty => { log.info_kv(&format!("ℹ️ {date}: no program"), kv()); None }
        FetchOutcome::Skipped => None,
    };
    DateResult { date, outcome, rows }
}
