use crate::config::{ConfigResolver, KEY_SHOW_BALANCE, KEY_SHOW_DETAIL};
use crate::error::QueryError;
use crate::models::{sort_newest_first, LogEntry, Snapshot, TokenUsage};
use crate::store::SnapshotStore;
use crate::transport::{bearer, Transport, TransportResponse};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

const BALANCE_PATH: &str = "/api/usage/token/";
const LOG_PATH: &str = "/api/log/token";
const BALANCE_FAILED: &str = "failed to query token info, check that the token is correct";
const LOG_FAILED: &str = "failed to query call details, check that the token is correct";

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^sk-[A-Za-z0-9]{48}$").expect("static credential regex"))
}

pub fn is_well_formed_credential(credential: &str) -> bool {
    credential_pattern().is_match(credential)
}

/// Checks that run before any request is issued, in this order.
pub fn validate_request(base_url: &str, credential: &str) -> Result<(), QueryError> {
    if base_url.is_empty() {
        return Err(QueryError::Config);
    }
    if credential.is_empty() {
        return Err(QueryError::EmptyCredential);
    }
    if !is_well_formed_credential(credential) {
        return Err(QueryError::MalformedCredential);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageToggles {
    pub balance: bool,
    pub detail: bool,
}

impl StageToggles {
    pub fn from_resolver(resolver: &ConfigResolver) -> Self {
        Self {
            balance: resolver.toggle(KEY_SHOW_BALANCE),
            detail: resolver.toggle(KEY_SHOW_DETAIL),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceEnvelope {
    #[serde(default)]
    code: Value,
    #[serde(default)]
    message: Value,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct LogEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn read_body<T: DeserializeOwned>(response: &TransportResponse) -> Result<T, String> {
    if !response.is_success() {
        return Err(format!("HTTP status {}", response.status));
    }
    serde_json::from_str(&response.body).map_err(|e| format!("unreadable response: {e}"))
}

/// Runs the balance and log lookups for one endpoint and owns the writes to
/// that endpoint's snapshot.
pub struct QueryEngine {
    transport: Arc<dyn Transport>,
    toggles: StageToggles,
    store: Arc<SnapshotStore>,
}

impl QueryEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        toggles: StageToggles,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            transport,
            toggles,
            store,
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn toggles(&self) -> StageToggles {
        self.toggles
    }

    /// On success the label's snapshot is replaced by the merged result; a
    /// failed stage resets it to empty. Precondition failures and rejected
    /// overlapping queries leave the store untouched.
    pub async fn query(
        &self,
        label: &str,
        base_url: &str,
        credential: &str,
    ) -> Result<Snapshot, QueryError> {
        validate_request(base_url, credential)?;

        let Some(_guard) = self.store.begin_query(label) else {
            tracing::warn!(label, "query rejected, another one is in flight");
            return Err(QueryError::InFlight(label.to_string()));
        };

        let base = base_url.trim_end_matches('/');
        let started = Instant::now();
        let mut snapshot = Snapshot::default();

        if self.toggles.balance {
            match self.fetch_balance(base, credential).await {
                Ok(usage) => snapshot.apply_usage(usage),
                Err(message) => {
                    tracing::warn!(label, %message, "balance stage failed");
                    self.store.reset(label);
                    return Err(QueryError::BalanceQueryFailed(message));
                }
            }
        }

        if self.toggles.detail {
            match self.fetch_logs(base, credential).await {
                Ok(logs) => snapshot.logs = logs,
                Err(message) => {
                    tracing::warn!(label, %message, "log stage failed");
                    self.store.reset(label);
                    return Err(QueryError::LogQueryFailed(message));
                }
            }
        }

        tracing::info!(
            label,
            token_valid = snapshot.token_valid,
            logs = snapshot.logs.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query completed"
        );
        self.store.set(label, snapshot.clone());
        Ok(snapshot)
    }

    async fn fetch_balance(&self, base: &str, credential: &str) -> Result<TokenUsage, String> {
        let url = format!("{base}{BALANCE_PATH}");
        let response = self
            .transport
            .get(&url, &[bearer(credential)])
            .await
            .map_err(|e| e.to_string())?;
        let body: BalanceEnvelope = read_body(&response)?;

        if !is_truthy(&body.code) {
            return Err(body
                .message
                .as_str()
                .filter(|m| !m.is_empty())
                .unwrap_or(BALANCE_FAILED)
                .to_string());
        }
        if body.data.is_null() {
            return Err("response carried no token data".to_string());
        }
        serde_json::from_value(body.data).map_err(|e| format!("unreadable token data: {e}"))
    }

    async fn fetch_logs(&self, base: &str, credential: &str) -> Result<Vec<LogEntry>, String> {
        let url = format!("{base}{LOG_PATH}");
        let response = self
            .transport
            .get(&url, &[bearer(credential)])
            .await
            .map_err(|e| e.to_string())?;
        let body: LogEnvelope = read_body(&response)?;

        if !body.success {
            return Err(LOG_FAILED.to_string());
        }

        let Value::Array(items) = body.data else {
            return Ok(Vec::new());
        };
        let mut logs = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<LogEntry>(item) {
                Ok(entry) => logs.push(entry),
                Err(e) => tracing::warn!(error = %e, "skipping unreadable log entry"),
            }
        }
        sort_newest_first(&mut logs);
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    const TOKEN: &str = "sk-abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUV";
    const BASE: &str = "https://relay.example";

    type Reply = Result<TransportResponse, TransportError>;

    /// Replies keyed by URL path suffix; records every call. When gated, each
    /// call waits for a permit before answering.
    #[derive(Default)]
    struct FakeTransport {
        replies: Mutex<HashMap<&'static str, Reply>>,
        calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
        gate: Option<Semaphore>,
    }

    impl FakeTransport {
        fn gated() -> Self {
            Self {
                gate: Some(Semaphore::new(0)),
                ..Self::default()
            }
        }

        fn reply(self, path: &'static str, status: u16, body: Value) -> Self {
            self.replies.lock().expect("replies").insert(
                path,
                Ok(TransportResponse {
                    status,
                    body: body.to_string(),
                }),
            );
            self
        }

        fn fail(self, path: &'static str, err: TransportError) -> Self {
            self.replies.lock().expect("replies").insert(path, Err(err));
            self
        }

        fn urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("calls")
                .iter()
                .map(|(u, _)| u.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn get(&self, url: &str, headers: &[(String, String)]) -> Reply {
            self.calls
                .lock()
                .expect("calls")
                .push((url.to_string(), headers.to_vec()));
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate open").forget();
            }
            let replies = self.replies.lock().expect("replies");
            replies
                .iter()
                .find(|(path, _)| url.ends_with(*path))
                .map(|(_, reply)| reply.clone())
                .unwrap_or_else(|| Err(TransportError::Network("no route".into())))
        }
    }

    fn balance_ok() -> Value {
        json!({
            "code": true,
            "message": "ok",
            "data": {
                "name": "team-key",
                "unlimited_quota": false,
                "total_granted": 1_000_000,
                "total_used": 250_000,
                "total_available": 750_000,
                "expires_at": 0
            }
        })
    }

    fn logs_ok() -> Value {
        json!({
            "success": true,
            "data": [
                { "id": 1, "created_at": 100, "model_name": "a", "type": 0 },
                { "id": 2, "created_at": 300, "model_name": "b", "type": 0 },
                { "id": 3, "created_at": 200, "model_name": "c", "type": 0 }
            ]
        })
    }

    fn engine(transport: Arc<FakeTransport>, balance: bool, detail: bool) -> QueryEngine {
        QueryEngine::new(
            transport,
            StageToggles { balance, detail },
            Arc::new(SnapshotStore::new()),
        )
    }

    fn populated() -> Snapshot {
        Snapshot {
            token_valid: true,
            token_name: "stale".into(),
            total_granted: 42,
            logs: vec![LogEntry::default()],
            ..Snapshot::default()
        }
    }

    #[tokio::test]
    async fn empty_base_url_is_a_config_error_without_requests() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine(transport.clone(), true, true);
        let err = engine.query("main", "", TOKEN).await.expect_err("config error");
        assert_eq!(err, QueryError::Config);
        assert!(transport.urls().is_empty());
    }

    #[tokio::test]
    async fn empty_credential_is_checked_before_format() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine(transport.clone(), true, true);
        engine.store().set("main", populated());

        let err = engine.query("main", BASE, "").await.expect_err("warning");
        assert_eq!(err, QueryError::EmptyCredential);
        assert!(transport.urls().is_empty());
        assert_eq!(engine.store().get("main"), populated());
    }

    #[tokio::test]
    async fn malformed_credential_makes_no_requests_and_keeps_state() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine(transport.clone(), true, true);
        engine.store().set("main", populated());

        let too_long = format!("{TOKEN}x");
        let bad_prefix = TOKEN.replacen("sk-", "pk-", 1);
        for bad in ["sk-short", &TOKEN[..50], too_long.as_str(), bad_prefix.as_str()] {
            let err = engine.query("main", BASE, bad).await.expect_err("malformed");
            assert_eq!(err, QueryError::MalformedCredential);
        }
        assert!(transport.urls().is_empty());
        assert_eq!(engine.store().get("main"), populated());
    }

    #[tokio::test]
    async fn both_stages_merge_into_one_snapshot() {
        let transport = Arc::new(
            FakeTransport::default()
                .reply(BALANCE_PATH, 200, balance_ok())
                .reply(LOG_PATH, 200, logs_ok()),
        );
        let engine = engine(transport.clone(), true, true);

        let snap = engine
            .query("main", "https://relay.example/", TOKEN)
            .await
            .expect("query");

        assert!(snap.token_valid);
        assert_eq!(snap.token_name, "team-key");
        assert_eq!(snap.total_available, 750_000);
        let times: Vec<_> = snap.logs.iter().map(|l| l.created_at).collect();
        assert_eq!(times, vec![300, 200, 100]);
        assert_eq!(engine.store().get("main"), snap);

        assert_eq!(
            transport.urls(),
            vec![
                "https://relay.example/api/usage/token/".to_string(),
                "https://relay.example/api/log/token".to_string(),
            ]
        );
        let calls = transport.calls.lock().expect("calls");
        assert!(calls
            .iter()
            .all(|(_, h)| h.contains(&("Authorization".into(), format!("Bearer {TOKEN}")))));
    }

    #[tokio::test]
    async fn rejected_balance_resets_and_skips_log_stage() {
        let transport = Arc::new(
            FakeTransport::default()
                .reply(
                    BALANCE_PATH,
                    200,
                    json!({ "code": false, "message": "token expired", "data": null }),
                )
                .reply(LOG_PATH, 200, logs_ok()),
        );
        let engine = engine(transport.clone(), true, true);
        engine.store().set("main", populated());

        let err = engine.query("main", BASE, TOKEN).await.expect_err("fails");
        assert_eq!(err, QueryError::BalanceQueryFailed("token expired".into()));
        assert_eq!(engine.store().get("main"), Snapshot::default());
        assert_eq!(transport.urls().len(), 1);
    }

    #[tokio::test]
    async fn rejected_balance_without_message_uses_generic_text() {
        let transport =
            Arc::new(FakeTransport::default().reply(BALANCE_PATH, 200, json!({ "code": 0 })));
        let engine = engine(transport, true, false);
        let err = engine.query("main", BASE, TOKEN).await.expect_err("fails");
        assert_eq!(err, QueryError::BalanceQueryFailed(BALANCE_FAILED.into()));
    }

    #[tokio::test]
    async fn transport_failures_in_balance_stage_reset_state() {
        for transport in [
            FakeTransport::default().fail(BALANCE_PATH, TransportError::Timeout),
            FakeTransport::default().reply(BALANCE_PATH, 502, json!({ "code": true })),
            FakeTransport::default().reply(BALANCE_PATH, 200, json!("not an envelope")),
        ] {
            let transport = Arc::new(transport.reply(LOG_PATH, 200, logs_ok()));
            let engine = engine(transport.clone(), true, true);
            engine.store().set("main", populated());

            let err = engine.query("main", BASE, TOKEN).await.expect_err("fails");
            assert!(matches!(err, QueryError::BalanceQueryFailed(_)));
            assert_eq!(engine.store().get("main"), Snapshot::default());
            assert!(transport.urls().iter().all(|u| !u.ends_with(LOG_PATH)));
        }
    }

    #[tokio::test]
    async fn log_stage_failure_discards_balance_result() {
        let transport = Arc::new(
            FakeTransport::default()
                .reply(BALANCE_PATH, 200, balance_ok())
                .reply(LOG_PATH, 200, json!({ "success": false, "message": "nope" })),
        );
        let engine = engine(transport, true, true);
        engine.store().set("main", populated());

        let err = engine.query("main", BASE, TOKEN).await.expect_err("fails");
        assert!(matches!(err, QueryError::LogQueryFailed(_)));
        assert_eq!(engine.store().get("main"), Snapshot::default());
    }

    #[tokio::test]
    async fn detail_only_leaves_token_invalid() {
        let transport = Arc::new(FakeTransport::default().reply(
            LOG_PATH,
            200,
            json!({
                "success": true,
                "data": [{
                    "id": 1, "created_at": 10, "model_name": "gpt-4", "type": 0,
                    "prompt_tokens": 5, "completion_tokens": 7, "quota": 120, "other": ""
                }]
            }),
        ));
        let engine = engine(transport.clone(), false, true);

        let snap = engine.query("main", BASE, TOKEN).await.expect("query");
        assert!(!snap.token_valid);
        assert_eq!(snap.logs.len(), 1);
        assert_eq!(snap.logs[0].model_name, "gpt-4");
        assert_eq!(transport.urls(), vec![format!("{BASE}{LOG_PATH}")]);

        let unit = crate::config::DEFAULT_QUOTA_PER_UNIT;
        assert_eq!(crate::views::summary_fields(&snap, unit).name, "unknown");
        let row = crate::views::project_row(&snap.logs[0], unit);
        assert_eq!(row.model, "gpt-4");
        assert_eq!(row.prompt_tokens.as_deref(), Some("5"));
        assert_eq!(row.completion_tokens.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn both_stages_disabled_stores_empty_snapshot() {
        let transport = Arc::new(FakeTransport::default());
        let engine = engine(transport.clone(), false, false);
        engine.store().set("main", populated());

        let snap = engine.query("main", BASE, TOKEN).await.expect("query");
        assert_eq!(snap, Snapshot::default());
        assert_eq!(engine.store().get("main"), Snapshot::default());
        assert!(transport.urls().is_empty());
    }

    #[tokio::test]
    async fn unreadable_log_rows_are_skipped() {
        let transport = Arc::new(FakeTransport::default().reply(
            LOG_PATH,
            200,
            json!({
                "success": true,
                "data": [
                    { "id": 1, "created_at": 5, "model_name": "ok" },
                    { "id": 2, "created_at": "yesterday" }
                ]
            }),
        ));
        let engine = engine(transport, false, true);
        let snap = engine.query("main", BASE, TOKEN).await.expect("query");
        assert_eq!(snap.logs.len(), 1);
        assert_eq!(snap.logs[0].model_name, "ok");
    }

    #[tokio::test]
    async fn rows_with_null_counters_are_kept() {
        let transport = Arc::new(
            FakeTransport::default()
                .reply(
                    BALANCE_PATH,
                    200,
                    json!({
                        "code": true,
                        "data": { "name": "k", "total_granted": 1000, "total_used": null, "expires_at": null }
                    }),
                )
                .reply(
                    LOG_PATH,
                    200,
                    json!({
                        "success": true,
                        "data": [
                            { "id": 1, "created_at": 5, "model_name": "a", "type": 0 },
                            {
                                "id": 2, "created_at": 9, "model_name": "b", "type": null,
                                "use_time": null, "is_stream": null, "prompt_tokens": null,
                                "completion_tokens": null, "quota": null
                            }
                        ]
                    }),
                ),
        );
        let engine = engine(transport, true, true);

        let snap = engine.query("main", BASE, TOKEN).await.expect("query");
        assert!(snap.token_valid);
        assert_eq!(snap.total_granted, 1000);
        assert_eq!(snap.total_used, 0);
        assert_eq!(snap.logs.len(), 2);
        assert_eq!(snap.logs[0].model_name, "b");
        assert_eq!(snap.logs[0].prompt_tokens, 0);
    }

    #[tokio::test]
    async fn querying_one_label_leaves_others_untouched() {
        let transport = Arc::new(
            FakeTransport::default()
                .reply(BALANCE_PATH, 200, balance_ok())
                .reply(LOG_PATH, 200, logs_ok()),
        );
        let engine = engine(transport, true, true);
        engine.store().set("backup", populated());

        engine.query("main", BASE, TOKEN).await.expect("query main");

        assert_eq!(engine.store().get("backup"), populated());
        assert_eq!(engine.store().get("other"), Snapshot::default());
        assert!(!engine.store().contains("other"));
    }

    #[tokio::test]
    async fn overlapping_queries_for_one_label_settle_on_a_single_outcome() {
        let transport = Arc::new(
            FakeTransport::gated()
                .reply(BALANCE_PATH, 200, balance_ok())
                .reply(LOG_PATH, 200, logs_ok()),
        );
        let engine = engine(transport.clone(), true, true);

        let (first, second, _) = tokio::join!(
            engine.query("main", BASE, TOKEN),
            engine.query("main", BASE, TOKEN),
            async {
                tokio::task::yield_now().await;
                if let Some(gate) = &transport.gate {
                    gate.add_permits(2);
                }
            }
        );

        let first = first.expect("first query wins");
        assert_eq!(second, Err(QueryError::InFlight("main".into())));
        assert_eq!(engine.store().get("main"), first);
        assert_eq!(transport.urls().len(), 2);
        assert!(!engine.store().is_querying("main"));
    }

    #[tokio::test]
    async fn different_labels_query_concurrently() {
        let transport = Arc::new(
            FakeTransport::gated()
                .reply(BALANCE_PATH, 200, balance_ok())
                .reply(LOG_PATH, 200, logs_ok()),
        );
        let engine = engine(transport.clone(), true, true);

        let (a, b, _) = tokio::join!(
            engine.query("a", "https://a.example", TOKEN),
            engine.query("b", "https://b.example", TOKEN),
            async {
                tokio::task::yield_now().await;
                if let Some(gate) = &transport.gate {
                    gate.add_permits(4);
                }
            }
        );

        assert!(a.expect("a").token_valid);
        assert!(b.expect("b").token_valid);
        assert_eq!(transport.urls().len(), 4);
    }

    #[test]
    fn toggles_follow_resolver() {
        let resolver = ConfigResolver::new(
            HashMap::from([
                ("SHOW_BALANCE".to_string(), "false".to_string()),
                ("SHOW_DETAIL".to_string(), "true".to_string()),
            ]),
            HashMap::new(),
        );
        assert_eq!(
            StageToggles::from_resolver(&resolver),
            StageToggles {
                balance: false,
                detail: true
            }
        );
    }

    #[test]
    fn truthiness_matches_loose_status_codes() {
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!("ok")));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&Value::Null));
    }

    proptest! {
        #[test]
        fn non_matching_credentials_are_malformed(candidate in "\\PC*") {
            prop_assume!(!candidate.is_empty());
            prop_assume!(!is_well_formed_credential(&candidate));
            prop_assert_eq!(
                validate_request(BASE, &candidate),
                Err(QueryError::MalformedCredential)
            );
        }

        #[test]
        fn generated_well_formed_credentials_pass(body in "[A-Za-z0-9]{48}") {
            let candidate = format!("sk-{body}");
            prop_assert_eq!(validate_request(BASE, &candidate), Ok(()));
        }
    }
}
