use crate::adapters::{copy_with_fallback, Clipboard, CopyOutcome, Downloader};
use crate::error::AppError;
use crate::models::{newest_first, LogEntry, Snapshot};
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::cmp::Ordering;
use std::path::PathBuf;

pub const UNKNOWN: &str = "unknown";

pub fn render_quota(quota: i64, digits: usize, per_unit: f64) -> String {
    format!("${:.*}", digits, quota as f64 / per_unit)
}

pub fn format_timestamp(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryFields {
    pub name: String,
    pub granted: String,
    pub available: String,
    pub used: String,
    pub expires: String,
}

/// Financial fields only render for a validated token; unlimited tokens show
/// fixed wording instead of amounts.
pub fn summary_fields(snapshot: &Snapshot, per_unit: f64) -> SummaryFields {
    let amount = |literal: &str, value: i64| {
        if snapshot.unlimited_quota {
            literal.to_string()
        } else if !snapshot.token_valid {
            UNKNOWN.to_string()
        } else {
            render_quota(value, 3, per_unit)
        }
    };

    let expires = if snapshot.expires_at == 0 {
        "never expires".to_string()
    } else if !snapshot.token_valid {
        UNKNOWN.to_string()
    } else {
        format_timestamp(snapshot.expires_at)
    };

    SummaryFields {
        name: if snapshot.token_name.is_empty() {
            UNKNOWN.to_string()
        } else {
            snapshot.token_name.clone()
        },
        granted: amount("unlimited", snapshot.total_granted),
        available: amount("unlimited", snapshot.total_available),
        used: amount("not computed", snapshot.total_used),
        expires,
    }
}

pub fn summary_text(snapshot: &Snapshot, per_unit: f64) -> String {
    let f = summary_fields(snapshot, per_unit);
    format!(
        "Token name: {}\nTotal quota: {}\nRemaining quota: {}\nUsed quota: {}\nExpires at: {}",
        f.name, f.granted, f.available, f.used, f.expires
    )
}

/// Copies the summary, degrading to a manual-copy outcome when the clipboard
/// refuses. Only validated tokens have a summary worth copying.
pub fn copy_summary(
    snapshot: &Snapshot,
    per_unit: f64,
    clipboard: &dyn Clipboard,
) -> Option<CopyOutcome> {
    if !snapshot.token_valid {
        return None;
    }
    Some(copy_with_fallback(clipboard, &summary_text(snapshot, per_unit)))
}

/// Human explanation of how a row's cost was derived from the pricing
/// multipliers in `other`.
pub fn price_explanation(entry: &LogEntry) -> Option<String> {
    let ratios = entry.price_ratios()?;
    let group = ratios.group_ratio.unwrap_or(1.0);

    if let Some(price) = ratios.model_price.filter(|p| *p != -1.0) {
        return Some(format!(
            "model price ${price} * group ratio {group} = ${}",
            price * group
        ));
    }

    let model_ratio = ratios.model_ratio?;
    let completion_ratio = ratios.completion_ratio.unwrap_or(1.0);
    let input_price = model_ratio * 2.0;
    let completion_price = model_ratio * 2.0 * completion_ratio;
    let total = (entry.prompt_tokens as f64 / 1_000_000.0 * input_price
        + entry.completion_tokens as f64 / 1_000_000.0 * completion_price)
        * group;
    Some(format!(
        "prompt {} tokens / 1M tokens * ${input_price} + completion {} tokens / 1M tokens * ${completion_price} * group {group} = ${total:.6}",
        entry.prompt_tokens, entry.completion_tokens
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRow {
    pub time: String,
    pub token_name: String,
    pub model: String,
    pub billable: bool,
    pub use_time: Option<String>,
    pub prompt_tokens: Option<String>,
    pub completion_tokens: Option<String>,
    pub cost: Option<String>,
    pub detail: String,
    pub price_explanation: Option<String>,
}

pub fn project_row(entry: &LogEntry, per_unit: f64) -> LogRow {
    let opaque = entry.is_opaque_job();
    let billable = entry.has_billing();

    let use_time = (!opaque).then(|| {
        let stream = if entry.is_stream { "stream" } else { "non-stream" };
        format!("{} s {stream}", entry.use_time)
    });
    let prompt_tokens = (!opaque && billable).then(|| entry.prompt_tokens.to_string());
    let completion_tokens = (!opaque && billable && entry.completion_tokens > 0)
        .then(|| entry.completion_tokens.to_string());
    let cost = billable.then(|| render_quota(entry.quota, 6, per_unit));

    LogRow {
        time: format_timestamp(entry.created_at),
        token_name: entry.token_name.clone(),
        model: entry.model_name.clone(),
        billable,
        use_time,
        prompt_tokens,
        completion_tokens,
        cost,
        detail: entry.content.clone(),
        price_explanation: price_explanation(entry),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Time,
    TokenName,
    Model,
    UseTime,
    Prompt,
    Completion,
    Quota,
}

impl SortKey {
    pub const ALL: [SortKey; 7] = [
        SortKey::Time,
        SortKey::TokenName,
        SortKey::Model,
        SortKey::UseTime,
        SortKey::Prompt,
        SortKey::Completion,
        SortKey::Quota,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SortKey::Time => "time",
            SortKey::TokenName => "token",
            SortKey::Model => "model",
            SortKey::UseTime => "use time",
            SortKey::Prompt => "prompt",
            SortKey::Completion => "completion",
            SortKey::Quota => "quota",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    fn compare(self, a: &LogEntry, b: &LogEntry) -> Ordering {
        match self {
            // Ascending by time is the exact reverse of the stored order.
            SortKey::Time => newest_first(b, a),
            SortKey::TokenName => a.token_name.cmp(&b.token_name),
            SortKey::Model => a.model_name.cmp(&b.model_name),
            SortKey::UseTime => a.use_time.cmp(&b.use_time),
            SortKey::Prompt => a.prompt_tokens.cmp(&b.prompt_tokens),
            SortKey::Completion => a.completion_tokens.cmp(&b.completion_tokens),
            SortKey::Quota => a.quota.cmp(&b.quota),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableQuery {
    pub filter: String,
    pub sort: SortKey,
    pub descending: bool,
    pub page: usize,
    pub page_size: usize,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            filter: String::new(),
            sort: SortKey::Time,
            descending: true,
            page: 0,
            page_size: crate::config::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePage {
    pub rows: Vec<LogRow>,
    /// Rows left after filtering, across all pages.
    pub total: usize,
    pub page: usize,
    pub pages: usize,
}

fn matches_filter(entry: &LogEntry, needle: &str) -> bool {
    [&entry.model_name, &entry.token_name, &entry.content]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

/// Filters, sorts and pages the loaded logs. Out-of-range pages clamp to the
/// last page.
pub fn build_table(logs: &[LogEntry], query: &TableQuery, per_unit: f64) -> TablePage {
    let needle = query.filter.trim().to_lowercase();
    let mut selected: Vec<&LogEntry> = logs
        .iter()
        .filter(|e| needle.is_empty() || matches_filter(e, &needle))
        .collect();

    selected.sort_by(|a, b| {
        let ord = query.sort.compare(a, b);
        if query.descending {
            ord.reverse()
        } else {
            ord
        }
    });

    let page_size = query.page_size.max(1);
    let total = selected.len();
    let pages = total.div_ceil(page_size).max(1);
    let page = query.page.min(pages - 1);

    let rows = selected
        .into_iter()
        .skip(page * page_size)
        .take(page_size)
        .map(|e| project_row(e, per_unit))
        .collect();

    TablePage {
        rows,
        total,
        page,
        pages,
    }
}

pub const CSV_HEADER: [&str; 7] = [
    "Time",
    "Model",
    "Use Time",
    "Prompt",
    "Completion",
    "Quota",
    "Details",
];

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// UTF-8 CSV of the loaded logs, BOM-prefixed so spreadsheet tools pick the
/// right encoding. An empty slice yields the header row alone.
pub fn csv_bytes(logs: &[LogEntry]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .from_writer(BOM.to_vec());
    writer.write_record(CSV_HEADER)?;
    for log in logs {
        writer.write_record([
            format_timestamp(log.created_at),
            log.model_name.clone(),
            log.use_time.to_string(),
            log.prompt_tokens.to_string(),
            log.completion_tokens.to_string(),
            log.quota.to_string(),
            log.content.clone(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::ExportFailed(e.to_string()))
}

/// Hands the CSV of the currently loaded logs to the download adapter. Any
/// failure comes back as `ExportFailed` for the caller to surface.
pub fn export_csv(
    logs: &[LogEntry],
    downloader: &dyn Downloader,
    filename: &str,
) -> Result<PathBuf, AppError> {
    let bytes = csv_bytes(logs)?;
    downloader.download(&bytes, filename).map_err(|e| {
        tracing::error!(error = %e, filename, "csv export failed");
        match e {
            AppError::ExportFailed(_) => e,
            other => AppError::ExportFailed(other.to_string()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_QUOTA_PER_UNIT;
    use crate::models::LogId;
    use std::sync::Mutex;

    const UNIT: f64 = DEFAULT_QUOTA_PER_UNIT;

    fn row(id: i64, created_at: i64, model: &str, kind: i64) -> LogEntry {
        LogEntry {
            id: LogId::Number(id),
            created_at,
            model_name: model.into(),
            kind,
            prompt_tokens: 5,
            completion_tokens: 7,
            quota: 120,
            use_time: 3,
            ..LogEntry::default()
        }
    }

    #[test]
    fn summary_of_valid_token_scales_amounts() {
        let snap = Snapshot {
            token_valid: true,
            token_name: "team".into(),
            total_granted: 1_000_000,
            total_available: 750_000,
            total_used: 250_000,
            ..Snapshot::default()
        };
        let text = summary_text(&snap, UNIT);
        assert_eq!(
            text,
            "Token name: team\nTotal quota: $2.000\nRemaining quota: $1.500\nUsed quota: $0.500\nExpires at: never expires"
        );
    }

    #[test]
    fn summary_of_unlimited_token_uses_literals() {
        let snap = Snapshot {
            token_valid: true,
            unlimited_quota: true,
            ..Snapshot::default()
        };
        let fields = summary_fields(&snap, UNIT);
        assert_eq!(fields.name, UNKNOWN);
        assert_eq!(fields.granted, "unlimited");
        assert_eq!(fields.available, "unlimited");
        assert_eq!(fields.used, "not computed");
    }

    #[test]
    fn summary_of_unvalidated_token_hides_amounts() {
        let snap = Snapshot {
            total_granted: 500_000,
            expires_at: 1_700_000_000,
            ..Snapshot::default()
        };
        let fields = summary_fields(&snap, UNIT);
        assert_eq!(fields.granted, UNKNOWN);
        assert_eq!(fields.expires, UNKNOWN);
    }

    #[test]
    fn divisor_is_configurable() {
        assert_eq!(render_quota(1000, 3, 1000.0), "$1.000");
        assert_eq!(render_quota(120, 6, UNIT), "$0.000240");
    }

    #[test]
    fn copy_summary_requires_valid_token() {
        struct Recording(Mutex<Vec<String>>);
        impl Clipboard for Recording {
            fn copy(&self, text: &str) -> Result<(), AppError> {
                self.0.lock().expect("lock").push(text.to_string());
                Ok(())
            }
        }

        let clipboard = Recording(Mutex::new(Vec::new()));
        assert_eq!(copy_summary(&Snapshot::default(), UNIT, &clipboard), None);

        let snap = Snapshot {
            token_valid: true,
            token_name: "k".into(),
            ..Snapshot::default()
        };
        assert_eq!(
            copy_summary(&snap, UNIT, &clipboard),
            Some(CopyOutcome::Copied)
        );
        let copied = clipboard.0.lock().expect("lock");
        assert_eq!(copied.len(), 1);
        assert!(copied[0].starts_with("Token name: k"));
    }

    #[test]
    fn billable_rows_show_token_counts_and_cost() {
        let projected = project_row(&row(1, 10, "gpt-4", 0), UNIT);
        assert_eq!(projected.model, "gpt-4");
        assert_eq!(projected.prompt_tokens.as_deref(), Some("5"));
        assert_eq!(projected.completion_tokens.as_deref(), Some("7"));
        assert_eq!(projected.cost.as_deref(), Some("$0.000240"));
        assert_eq!(projected.use_time.as_deref(), Some("3 s non-stream"));
    }

    #[test]
    fn non_billable_rows_hide_counts_and_cost() {
        let projected = project_row(&row(1, 10, "gpt-4", 1), UNIT);
        assert_eq!(projected.prompt_tokens, None);
        assert_eq!(projected.completion_tokens, None);
        assert_eq!(projected.cost, None);
        assert!(projected.use_time.is_some());
    }

    #[test]
    fn midjourney_rows_suppress_per_token_columns() {
        let projected = project_row(&row(1, 10, "mj_imagine", 2), UNIT);
        assert_eq!(projected.use_time, None);
        assert_eq!(projected.prompt_tokens, None);
        assert_eq!(projected.completion_tokens, None);
        assert!(projected.cost.is_some());
    }

    #[test]
    fn zero_completion_is_hidden() {
        let mut entry = row(1, 10, "gpt-4", 0);
        entry.completion_tokens = 0;
        assert_eq!(project_row(&entry, UNIT).completion_tokens, None);
    }

    #[test]
    fn price_explanation_prefers_fixed_model_price() {
        let entry = LogEntry {
            other: r#"{"model_price":0.02,"group_ratio":2}"#.into(),
            ..LogEntry::default()
        };
        assert_eq!(
            price_explanation(&entry).as_deref(),
            Some("model price $0.02 * group ratio 2 = $0.04")
        );
    }

    #[test]
    fn price_explanation_from_ratios() {
        let entry = LogEntry {
            prompt_tokens: 1_000_000,
            completion_tokens: 500_000,
            other: r#"{"model_ratio":1.5,"model_price":-1,"completion_ratio":2,"group_ratio":1}"#
                .into(),
            ..LogEntry::default()
        };
        let text = price_explanation(&entry).expect("explanation");
        assert!(text.starts_with("prompt 1000000 tokens / 1M tokens * $3"));
        assert!(text.ends_with("= $6.000000"));
    }

    #[test]
    fn unparseable_other_keeps_the_row_renderable() {
        let entry = LogEntry {
            content: "raw detail".into(),
            other: "{not json".into(),
            kind: 0,
            ..LogEntry::default()
        };
        let projected = project_row(&entry, UNIT);
        assert_eq!(projected.detail, "raw detail");
        assert_eq!(projected.price_explanation, None);
        assert_eq!(price_explanation(&LogEntry::default()), None);
    }

    #[test]
    fn table_filters_sorts_and_pages() {
        let logs = vec![
            row(1, 300, "gpt-4o", 0),
            row(2, 200, "claude-3", 0),
            row(3, 100, "gpt-3.5", 0),
        ];

        let page = build_table(
            &logs,
            &TableQuery {
                filter: "GPT".into(),
                ..TableQuery::default()
            },
            UNIT,
        );
        assert_eq!(page.total, 2);
        let models: Vec<_> = page.rows.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["gpt-4o", "gpt-3.5"]);

        let page = build_table(
            &logs,
            &TableQuery {
                sort: SortKey::Model,
                descending: false,
                page_size: 2,
                page: 5,
                ..TableQuery::default()
            },
            UNIT,
        );
        assert_eq!(page.pages, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.rows[0].model, "gpt-4o");
    }

    #[test]
    fn time_sort_ascending_reverses_stored_order() {
        let logs = vec![row(5, 200, "a", 0), row(2, 200, "b", 0), row(1, 100, "c", 0)];
        let page = build_table(
            &logs,
            &TableQuery {
                descending: false,
                ..TableQuery::default()
            },
            UNIT,
        );
        let models: Vec<_> = page.rows.iter().map(|r| r.model.as_str()).collect();
        assert_eq!(models, vec!["c", "b", "a"]);
    }

    #[test]
    fn sort_key_cycles_through_all_columns() {
        let mut key = SortKey::Time;
        for _ in 0..SortKey::ALL.len() {
            key = key.next();
        }
        assert_eq!(key, SortKey::Time);
    }

    #[test]
    fn empty_export_is_bom_plus_header() {
        let bytes = csv_bytes(&[]).expect("csv");
        assert!(bytes.starts_with(BOM));
        let text = std::str::from_utf8(&bytes[BOM.len()..]).expect("utf8");
        assert_eq!(text, "Time,Model,Use Time,Prompt,Completion,Quota,Details\r\n");
    }

    #[test]
    fn export_quotes_content_with_commas() {
        let mut entry = row(1, 10, "gpt-4", 0);
        entry.content = "a,b \"quoted\"".into();
        let bytes = csv_bytes(&[entry]).expect("csv");
        let text = String::from_utf8(bytes).expect("utf8");
        let data_line = text.lines().nth(1).expect("data row");
        assert!(data_line.contains(",gpt-4,3,5,7,120,"));
        assert!(data_line.ends_with("\"a,b \"\"quoted\"\"\""));
    }

    #[test]
    fn failing_downloader_becomes_export_failed() {
        struct Broken;
        impl Downloader for Broken {
            fn download(&self, _bytes: &[u8], _filename: &str) -> Result<PathBuf, AppError> {
                Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )))
            }
        }

        let err = export_csv(&[], &Broken, "data.csv").expect_err("export fails");
        assert!(matches!(err, AppError::ExportFailed(_)));
    }

    #[test]
    fn export_hands_loaded_logs_to_downloader() {
        struct Capture(Mutex<Option<(Vec<u8>, String)>>);
        impl Downloader for Capture {
            fn download(&self, bytes: &[u8], filename: &str) -> Result<PathBuf, AppError> {
                *self.0.lock().expect("lock") = Some((bytes.to_vec(), filename.to_string()));
                Ok(PathBuf::from(filename))
            }
        }

        let capture = Capture(Mutex::new(None));
        export_csv(&[row(1, 10, "gpt-4", 0)], &capture, "data.csv").expect("export");
        let (bytes, name) = capture.0.lock().expect("lock").clone().expect("captured");
        assert_eq!(name, "data.csv");
        assert_eq!(String::from_utf8_lossy(&bytes).lines().count(), 2);
    }
}
