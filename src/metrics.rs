//! Usage metrics for the lookup server.
//!
//! A single `Metrics` value is shared by every handler. Each `record_*` call
//! takes the lock once and updates its counters; there is no transaction
//! across calls, so a summary taken mid-request may count the request in the
//! total but not yet in its endpoint. Recording never fails: if the lock is
//! poisoned the sample is dropped.
//!
//! Retention is bounded everywhere: response-time samples are FIFO rings,
//! hourly buckets keep the last week, and per-ZIP popularity is pruned to an
//! approximate top-N once it grows past [`MAX_TRACKED_ZIPS`].

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write;
use std::sync::{LazyLock, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;

use crate::types::LookupResult;

/// Global response-time samples kept
pub const MAX_RESPONSE_SAMPLES: usize = 1000;
/// Response-time samples kept per endpoint
pub const MAX_ENDPOINT_SAMPLES: usize = 100;
/// Distinct ZIPs tracked before pruning
pub const MAX_TRACKED_ZIPS: usize = 1000;
/// Distinct ZIPs kept after pruning
pub const PRUNED_ZIPS: usize = 500;
/// Hourly buckets kept (one week)
pub const MAX_HOURLY_BUCKETS: usize = 168;
/// Entries in each top-N ranking
pub const TOP_N: usize = 10;

/// Grouping key shared by all single-code lookup paths
pub const LOOKUP_ENDPOINT: &str = "/api/lookup/:zip";
/// Grouping key for requests that matched no route
pub const UNMATCHED_ENDPOINT: &str = "unmatched";
const METRIC_PREFIX: &str = "zipfill";

static LOOKUP_PATH_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^/api/lookup/[0-9]+/?$").ok());

/// Collapse per-code lookup paths into one grouping key
pub fn normalize_endpoint(path: &str) -> String {
    match LOOKUP_PATH_RE.as_ref() {
        Some(re) if re.is_match(path) => LOOKUP_ENDPOINT.to_string(),
        _ => path.to_string(),
    }
}

/// Nearest-rank percentile: sorted ascending, index `ceil(p/100 * n) - 1`.
/// Returns 0 for no samples.
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

fn average(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Render uptime using its two largest units, e.g. `2d 3h` or `4m 10s`
pub fn format_uptime(ms: u64) -> String {
    let secs = ms / 1000;
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Calendar-hour bucket key, e.g. `2025-06-01T14`
pub fn hour_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H").to_string()
}

fn push_capped(samples: &mut VecDeque<f64>, value: f64, cap: usize) {
    samples.push_back(value);
    while samples.len() > cap {
        samples.pop_front();
    }
}

/// Highest counts first; equal counts fall back to key order.
fn top_n(counts: &HashMap<String, u64>, n: usize) -> Vec<RankEntry> {
    let mut ranked: Vec<(&String, &u64)> = counts.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .take(n)
        .map(|(key, count)| RankEntry {
            key: key.clone(),
            count: *count,
        })
        .collect()
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Default)]
struct MetricsInner {
    total_requests: u64,
    by_endpoint: BTreeMap<String, u64>,
    by_status: BTreeMap<u16, u64>,
    by_method: BTreeMap<String, u64>,
    response_times: VecDeque<f64>,
    endpoint_times: BTreeMap<String, VecDeque<f64>>,
    total_lookups: u64,
    found_lookups: u64,
    not_found_lookups: u64,
    zip_counts: HashMap<String, u64>,
    state_counts: HashMap<String, u64>,
    hourly: BTreeMap<String, u64>,
}

impl MetricsInner {
    fn bump_hour(&mut self, key: String) {
        if let Some(count) = self.hourly.get_mut(&key) {
            *count += 1;
            return;
        }
        while self.hourly.len() >= MAX_HOURLY_BUCKETS {
            self.hourly.pop_first();
        }
        self.hourly.insert(key, 1);
    }

    fn prune_zips(&mut self) {
        if self.zip_counts.len() <= MAX_TRACKED_ZIPS {
            return;
        }
        let keep: HashMap<String, u64> = top_n(&self.zip_counts, PRUNED_ZIPS)
            .into_iter()
            .map(|e| (e.key, e.count))
            .collect();
        tracing::debug!(
            "Pruned ZIP popularity from {} to {} entries",
            self.zip_counts.len(),
            keep.len()
        );
        self.zip_counts = keep;
    }
}

/// Process-wide request and lookup metrics
pub struct Metrics {
    start_time: DateTime<Utc>,
    inner: Mutex<MetricsInner>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            inner: Mutex::new(MetricsInner::default()),
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Record a completed HTTP request
    pub fn record_request(&self, method: &str, path: &str, status: u16, elapsed_ms: f64) {
        self.record_request_at(Utc::now(), method, path, status, elapsed_ms);
    }

    pub fn record_request_at(
        &self,
        now: DateTime<Utc>,
        method: &str,
        path: &str,
        status: u16,
        elapsed_ms: f64,
    ) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let endpoint = normalize_endpoint(path);

        inner.total_requests += 1;
        *inner.by_endpoint.entry(endpoint.clone()).or_default() += 1;
        *inner.by_status.entry(status).or_default() += 1;
        *inner.by_method.entry(method.to_uppercase()).or_default() += 1;

        inner.bump_hour(hour_key(now));

        push_capped(&mut inner.response_times, elapsed_ms, MAX_RESPONSE_SAMPLES);
        let samples = inner.endpoint_times.entry(endpoint).or_default();
        push_capped(samples, elapsed_ms, MAX_ENDPOINT_SAMPLES);
    }

    /// Record the outcome of one lookup; `None` means not found or invalid
    pub fn record_lookup(&self, zip: &str, result: Option<&LookupResult>) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.total_lookups += 1;

        match result {
            Some(result) => {
                inner.found_lookups += 1;
                *inner.zip_counts.entry(zip.to_string()).or_default() += 1;
                if let Some(first) = result.locations.first() {
                    *inner.state_counts.entry(first.state.clone()).or_default() += 1;
                }
                inner.prune_zips();
            }
            None => inner.not_found_lookups += 1,
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        self.summary_at(Utc::now())
    }

    pub fn summary_at(&self, now: DateTime<Utc>) -> MetricsSummary {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let uptime_ms = (now - self.start_time).num_milliseconds().max(0) as u64;
        let uptime_hours = uptime_ms as f64 / 3_600_000.0;
        let per_hour = if uptime_hours > 0.0 {
            round2(inner.total_requests as f64 / uptime_hours)
        } else {
            0.0
        };

        let samples: Vec<f64> = inner.response_times.iter().copied().collect();

        let hourly: Vec<HourlyBucket> = (0..24)
            .rev()
            .map(|ago| {
                let at = now - Duration::hours(ago);
                let hour = hour_key(at);
                HourlyBucket {
                    label: at.format("%H:00").to_string(),
                    requests: inner.hourly.get(&hour).copied().unwrap_or(0),
                    hour,
                }
            })
            .collect();
        let last_24h: u64 = hourly.iter().map(|b| b.requests).sum();

        let found_rate = if inner.total_lookups > 0 {
            (inner.found_lookups as f64 / inner.total_lookups as f64 * 100.0).round() as u64
        } else {
            0
        };

        let endpoints = inner
            .by_endpoint
            .iter()
            .map(|(endpoint, requests)| {
                let times: Vec<f64> = inner
                    .endpoint_times
                    .get(endpoint)
                    .map(|t| t.iter().copied().collect())
                    .unwrap_or_default();
                EndpointSummary {
                    endpoint: endpoint.clone(),
                    requests: *requests,
                    avg_ms: round2(average(&times)),
                }
            })
            .collect();

        MetricsSummary {
            uptime: UptimeSummary {
                ms: uptime_ms,
                human: format_uptime(uptime_ms),
            },
            requests: RequestSummary {
                total: inner.total_requests,
                per_hour,
                last_24h,
                by_endpoint: inner.by_endpoint.clone(),
                by_status: inner.by_status.clone(),
                by_method: inner.by_method.clone(),
            },
            response_times: ResponseTimeSummary {
                avg: round2(average(&samples)),
                p50: percentile(&samples, 50.0),
                p95: percentile(&samples, 95.0),
                p99: percentile(&samples, 99.0),
                samples: samples.len(),
            },
            endpoints,
            lookups: LookupSummary {
                total: inner.total_lookups,
                found: inner.found_lookups,
                not_found: inner.not_found_lookups,
                found_rate,
                top_zips: top_n(&inner.zip_counts, TOP_N),
                top_states: top_n(&inner.state_counts, TOP_N),
            },
            hourly,
        }
    }

    /// Render counters and gauges in the Prometheus text exposition format
    pub fn exposition(&self) -> String {
        self.exposition_at(Utc::now())
    }

    pub fn exposition_at(&self, now: DateTime<Utc>) -> String {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let samples: Vec<f64> = inner.response_times.iter().copied().collect();
        let uptime_secs = (now - self.start_time).num_seconds().max(0);
        let mut out = String::new();

        header(&mut out, "requests_total", "Total HTTP requests", "counter");
        let _ = writeln!(out, "{}_requests_total {}", METRIC_PREFIX, inner.total_requests);

        header(
            &mut out,
            "requests_by_endpoint_total",
            "HTTP requests by endpoint",
            "counter",
        );
        for (endpoint, count) in &inner.by_endpoint {
            let _ = writeln!(
                out,
                "{}_requests_by_endpoint_total{{endpoint=\"{}\"}} {}",
                METRIC_PREFIX,
                escape_label(endpoint),
                count
            );
        }

        header(
            &mut out,
            "requests_by_status_total",
            "HTTP requests by status code",
            "counter",
        );
        for (status, count) in &inner.by_status {
            let _ = writeln!(
                out,
                "{}_requests_by_status_total{{status=\"{}\"}} {}",
                METRIC_PREFIX, status, count
            );
        }

        header(
            &mut out,
            "response_time_avg_ms",
            "Average response time in milliseconds",
            "gauge",
        );
        let _ = writeln!(
            out,
            "{}_response_time_avg_ms {}",
            METRIC_PREFIX,
            round2(average(&samples))
        );

        header(
            &mut out,
            "response_time_p95_ms",
            "95th percentile response time in milliseconds",
            "gauge",
        );
        let _ = writeln!(
            out,
            "{}_response_time_p95_ms {}",
            METRIC_PREFIX,
            percentile(&samples, 95.0)
        );

        header(&mut out, "lookups_total", "Total ZIP lookups", "counter");
        let _ = writeln!(out, "{}_lookups_total {}", METRIC_PREFIX, inner.total_lookups);

        header(&mut out, "lookups_found_total", "ZIP lookups that matched", "counter");
        let _ = writeln!(out, "{}_lookups_found_total {}", METRIC_PREFIX, inner.found_lookups);

        header(
            &mut out,
            "lookups_not_found_total",
            "ZIP lookups that did not match",
            "counter",
        );
        let _ = writeln!(
            out,
            "{}_lookups_not_found_total {}",
            METRIC_PREFIX, inner.not_found_lookups
        );

        header(&mut out, "uptime_seconds", "Process uptime in seconds", "gauge");
        let _ = writeln!(out, "{}_uptime_seconds {}", METRIC_PREFIX, uptime_secs);

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {}_{} {}", METRIC_PREFIX, name, help);
    let _ = writeln!(out, "# TYPE {}_{} {}", METRIC_PREFIX, name, kind);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub uptime: UptimeSummary,
    pub requests: RequestSummary,
    pub response_times: ResponseTimeSummary,
    pub endpoints: Vec<EndpointSummary>,
    pub lookups: LookupSummary,
    pub hourly: Vec<HourlyBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UptimeSummary {
    pub ms: u64,
    pub human: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub total: u64,
    pub per_hour: f64,
    pub last_24h: u64,
    pub by_endpoint: BTreeMap<String, u64>,
    pub by_status: BTreeMap<u16, u64>,
    pub by_method: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseTimeSummary {
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub endpoint: String,
    pub requests: u64,
    pub avg_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupSummary {
    pub total: u64,
    pub found: u64,
    pub not_found: u64,
    /// Percentage of lookups that matched, rounded to an integer
    pub found_rate: u64,
    pub top_zips: Vec<RankEntry>,
    pub top_states: Vec<RankEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankEntry {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HourlyBucket {
    pub hour: String,
    pub label: String,
    pub requests: u64,
}
