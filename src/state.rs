//! Shared application state injected into every handler.
//!
//! Everything the routes need is constructed once in `main.rs` and cloned
//! cheaply into each request through `Arc`s.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::analysis::round_to;
use crate::insight::InsightAgent;
use crate::llm::{CompletionPolicy, CompletionService};
use crate::memory::HealthMemory;
use crate::models::HealthRecord;
use crate::navbar::NavbarGenerator;
use crate::orchestrator::{AnalysisReport, Orchestrator};
use crate::Config;

/// Number of chat exchanges kept for `GET /chat/history`.
pub const CHAT_HISTORY_LEN: usize = 10;

// ---

/// Upper bounds of the completion latency buckets, in milliseconds. Slower
/// calls land in a final overflow bucket.
pub const LATENCY_BUCKETS_MS: [u64; 5] = [100, 500, 1_000, 5_000, 20_000];

/// Completion success rate above which the service reports itself healthy.
const HEALTHY_SUCCESS_RATE: f64 = 0.95;

/// Completion success rate above which the service is degraded rather than unhealthy.
const DEGRADED_SUCCESS_RATE: f64 = 0.8;

/// The component that issued a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Insight,
    Navbar,
    Chat,
}

impl Agent {
    pub const ALL: [Agent; 3] = [Agent::Insight, Agent::Navbar, Agent::Chat];
}

#[derive(Debug, Default)]
struct AgentCounters {
    calls: AtomicU64,
    successes: AtomicU64,
    fallbacks: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_max_ms: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
}

impl AgentCounters {
    // ---
    fn snapshot(&self) -> AgentSnapshot {
        // ---
        let calls = self.calls.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);
        let rate = |n: u64| (calls > 0).then(|| round_to(n as f64 / calls as f64, 3));

        let buckets = self
            .latency_buckets
            .iter()
            .enumerate()
            .map(|(i, count)| LatencyBucket {
                le_ms: LATENCY_BUCKETS_MS.get(i).copied(),
                count: count.load(Ordering::Relaxed),
            })
            .collect();
        let avg_ms = if calls > 0 {
            round_to(self.latency_total_ms.load(Ordering::Relaxed) as f64 / calls as f64, 1)
        } else {
            0.0
        };

        AgentSnapshot {
            calls,
            successes,
            failures: calls.saturating_sub(successes),
            fallbacks,
            success_rate: rate(successes),
            fallback_rate: rate(fallbacks),
            latency: LatencySnapshot {
                avg_ms,
                max_ms: self.latency_max_ms.load(Ordering::Relaxed),
                buckets,
            },
        }
    }
}

/// Process-wide counters. Lock-free so the analysis path never waits on them.
#[derive(Debug, Default)]
pub struct Metrics {
    uploads: AtomicU64,
    last_upload_ms: AtomicU64,
    agents: [AgentCounters; Agent::ALL.len()],
}

/// One latency bucket. `le_ms` is `None` for the overflow bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyBucket {
    pub le_ms: Option<u64>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySnapshot {
    pub avg_ms: f64,
    pub max_ms: u64,
    pub buckets: Vec<LatencyBucket>,
}

/// Completion outcomes for one [`Agent`]. Rates are `None` until the first call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub success_rate: Option<f64>,
    pub fallback_rate: Option<f64>,
    pub latency: LatencySnapshot,
}

/// Point-in-time copy of [`Metrics`], as served by `GET /metrics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads: u64,
    pub last_upload_time_s: f64,
    pub completion_calls: u64,
    pub completion_failures: u64,
    pub fallbacks: u64,
    pub agents: BTreeMap<Agent, AgentSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Service-wide roll-up of completion outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub success_rate: f64,
    pub total_operations: u64,
}

impl SystemHealth {
    /// Without a completion service every AI path runs on fallbacks, which is
    /// reported as degraded regardless of counts.
    pub fn from_snapshot(snapshot: &MetricsSnapshot, ai_enabled: bool) -> Self {
        // ---
        let total = snapshot.completion_calls;
        let success_rate = if total == 0 {
            1.0
        } else {
            round_to(1.0 - snapshot.completion_failures as f64 / total as f64, 3)
        };

        let status = if !ai_enabled {
            HealthStatus::Degraded
        } else if success_rate > HEALTHY_SUCCESS_RATE {
            HealthStatus::Healthy
        } else if success_rate > DEGRADED_SUCCESS_RATE {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        Self {
            status,
            success_rate,
            total_operations: total,
        }
    }
}

impl Metrics {
    // ---
    pub fn record_upload(&self, at: DateTime<Utc>) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
        self.last_upload_ms
            .store(u64::try_from(at.timestamp_millis()).unwrap_or(0), Ordering::Relaxed);
    }

    /// Count one policy-wrapped completion, including its retries, and its wall time.
    pub fn record_completion(&self, agent: Agent, elapsed: Duration, succeeded: bool) {
        // ---
        let counters = &self.agents[agent as usize];
        counters.calls.fetch_add(1, Ordering::Relaxed);
        if succeeded {
            counters.successes.fetch_add(1, Ordering::Relaxed);
        }

        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        counters.latency_total_ms.fetch_add(ms, Ordering::Relaxed);
        counters.latency_max_ms.fetch_max(ms, Ordering::Relaxed);
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|&le| ms <= le)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        counters.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Count a response served from rule-based or mock content.
    pub fn record_fallback(&self, agent: Agent) {
        self.agents[agent as usize].fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        // ---
        let agents: BTreeMap<Agent, AgentSnapshot> = Agent::ALL
            .into_iter()
            .map(|agent| (agent, self.agents[agent as usize].snapshot()))
            .collect();

        MetricsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            last_upload_time_s: self.last_upload_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            completion_calls: agents.values().map(|a| a.calls).sum(),
            completion_failures: agents.values().map(|a| a.failures).sum(),
            fallbacks: agents.values().map(|a| a.fallbacks).sum(),
            agents,
        }
    }
}

/// One uploaded dataset together with the analysis computed from it.
#[derive(Debug, Clone)]
pub struct StoredDataset {
    pub user_id: String,
    pub filename: Option<String>,
    pub records: Vec<HealthRecord>,
    pub report: AnalysisReport,
}

/// One question/answer pair from `POST /chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatExchange {
    pub message: String,
    pub response: String,
    pub has_context: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    // ---
    pub config: Arc<Config>,
    pub memory: HealthMemory,
    pub orchestrator: Orchestrator,
    pub navbar: NavbarGenerator,
    pub llm: Arc<dyn CompletionService>,
    pub policy: CompletionPolicy,
    pub metrics: Arc<Metrics>,
    pub datasets: Arc<RwLock<HashMap<String, StoredDataset>>>,
    pub user_uploads: Arc<RwLock<HashMap<String, Vec<String>>>>,
    pub chat_history: Arc<RwLock<VecDeque<ChatExchange>>>,
}

impl AppState {
    // ---
    pub fn new(config: Config, memory: HealthMemory, llm: Arc<dyn CompletionService>) -> Self {
        // ---
        let metrics = Arc::new(Metrics::default());
        let policy = config.completion_policy();
        let agent = InsightAgent::new(Arc::clone(&llm), policy, Arc::clone(&metrics));
        let navbar = NavbarGenerator::new(Arc::clone(&llm), policy, Arc::clone(&metrics));

        Self {
            config: Arc::new(config),
            memory,
            orchestrator: Orchestrator::new(agent),
            navbar,
            llm,
            policy,
            metrics,
            datasets: Arc::default(),
            user_uploads: Arc::default(),
            chat_history: Arc::default(),
        }
    }

    /// Store a dataset and append its id to the uploader's list.
    pub async fn store_dataset(&self, data_id: String, dataset: StoredDataset) {
        // ---
        self.user_uploads
            .write()
            .await
            .entry(dataset.user_id.clone())
            .or_default()
            .push(data_id.clone());
        self.datasets.write().await.insert(data_id, dataset);
    }

    pub async fn dataset(&self, data_id: &str) -> Option<StoredDataset> {
        self.datasets.read().await.get(data_id).cloned()
    }

    pub async fn uploads_for(&self, user_id: &str) -> Vec<String> {
        self.user_uploads.read().await.get(user_id).cloned().unwrap_or_default()
    }

    pub async fn push_chat(&self, exchange: ChatExchange) {
        // ---
        let mut history = self.chat_history.write().await;
        if history.len() == CHAT_HISTORY_LEN {
            history.pop_front();
        }
        history.push_back(exchange);
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    //! In-memory application state for handler tests.

    use super::*;
    use crate::memory::{MemoryBank, SessionStore};
    use sqlx::sqlite::SqlitePoolOptions;

    pub async fn state(llm: Arc<dyn CompletionService>) -> AppState {
        // ---
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::schema::create_schema(&pool).await.unwrap();
        let memory = HealthMemory::new(Arc::new(SessionStore::new()), MemoryBank::new(pool));
        AppState::new(Config::default(), memory, llm)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::llm::UnavailableCompletion;

    #[test]
    fn test_metrics_snapshot() {
        // ---
        let metrics = Metrics::default();
        metrics.record_upload(DateTime::from_timestamp(1_700_000_000, 500_000_000).unwrap());
        metrics.record_upload(DateTime::from_timestamp(1_700_000_100, 0).unwrap());
        metrics.record_completion(Agent::Insight, Duration::from_millis(40), false);
        metrics.record_fallback(Agent::Insight);
        metrics.record_completion(Agent::Chat, Duration::from_millis(300), true);

        let snap = metrics.snapshot();
        assert_eq!(snap.uploads, 2);
        assert_eq!(snap.last_upload_time_s, 1_700_000_100.0);
        assert_eq!(snap.completion_calls, 2);
        assert_eq!(snap.completion_failures, 1);
        assert_eq!(snap.fallbacks, 1);

        let insight = &snap.agents[&Agent::Insight];
        assert_eq!(insight.success_rate, Some(0.0));
        assert_eq!(insight.fallback_rate, Some(1.0));
        assert_eq!(snap.agents[&Agent::Chat].success_rate, Some(1.0));
        assert_eq!(snap.agents[&Agent::Navbar].calls, 0);
        assert_eq!(snap.agents[&Agent::Navbar].success_rate, None);
    }

    #[test]
    fn test_completion_latency_buckets() {
        // ---
        let metrics = Metrics::default();
        for ms in [5, 100, 101, 4_000, 60_000] {
            metrics.record_completion(Agent::Navbar, Duration::from_millis(ms), true);
        }

        let latency = metrics.snapshot().agents[&Agent::Navbar].latency.clone();
        let counts: Vec<u64> = latency.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![2, 1, 0, 1, 0, 1]);
        assert_eq!(latency.buckets[0].le_ms, Some(100));
        assert_eq!(latency.buckets[5].le_ms, None);
        assert_eq!(latency.max_ms, 60_000);
        assert_eq!(latency.avg_ms, 12_841.2);
    }

    #[test]
    fn test_system_health_rollup() {
        // ---
        let metrics = Metrics::default();
        let idle = SystemHealth::from_snapshot(&metrics.snapshot(), true);
        assert_eq!(idle.status, HealthStatus::Healthy);
        assert_eq!(idle.success_rate, 1.0);
        assert_eq!(idle.total_operations, 0);

        for _ in 0..9 {
            metrics.record_completion(Agent::Insight, Duration::ZERO, true);
        }
        metrics.record_completion(Agent::Chat, Duration::ZERO, false);
        let health = SystemHealth::from_snapshot(&metrics.snapshot(), true);
        assert_eq!(health.success_rate, 0.9);
        assert_eq!(health.status, HealthStatus::Degraded);

        for _ in 0..5 {
            metrics.record_completion(Agent::Chat, Duration::ZERO, false);
        }
        let health = SystemHealth::from_snapshot(&metrics.snapshot(), true);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.total_operations, 15);

        let offline = SystemHealth::from_snapshot(&Metrics::default().snapshot(), false);
        assert_eq!(offline.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_chat_history_is_bounded() {
        // ---
        let state = tests_support::state(Arc::new(UnavailableCompletion)).await;
        for i in 0..(CHAT_HISTORY_LEN + 3) {
            state
                .push_chat(ChatExchange {
                    message: format!("q{i}"),
                    response: "a".to_string(),
                    has_context: false,
                    timestamp: Utc::now(),
                })
                .await;
        }

        let history = state.chat_history.read().await;
        assert_eq!(history.len(), CHAT_HISTORY_LEN);
        assert_eq!(history.front().unwrap().message, "q3");
    }
}
