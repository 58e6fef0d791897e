use crate::endpoints::EndpointMap;
use crate::service::StageToggles;
use crate::views::TableQuery;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    Confirm(ConfirmAction),
    ErrorDialog,
    InfoDialog,
    ManualCopy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Token,
    Table,
    Filter,
}

#[derive(Debug, Clone)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub ts: String,
    pub level: LogLevel,
    pub event: String,
    pub detail: String,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub running: bool,
    pub status: String,
    pub screen: Screen,
    pub previous_screen: Screen,
    pub confirm_selected: usize,
    pub endpoints: EndpointMap,
    pub active_label: Option<String>,
    pub token_input: String,
    pub reveal_token: bool,
    pub focus: Focus,
    pub table: TableQuery,
    pub selected_row: usize,
    pub toggles: StageToggles,
    pub show_github: bool,
    pub activity: HashMap<String, Vec<ActivityEntry>>,
    pub max_activity: usize,
    pub error_message: String,
    pub info_message: String,
    pub manual_copy_text: String,
}

impl AppState {
    pub fn new(endpoints: EndpointMap, toggles: StageToggles, show_github: bool) -> Self {
        let active_label = endpoints.default_label().map(str::to_string);
        Self {
            running: true,
            status: "ready".into(),
            screen: Screen::Dashboard,
            previous_screen: Screen::Dashboard,
            confirm_selected: 0,
            endpoints,
            active_label,
            token_input: String::new(),
            reveal_token: false,
            focus: Focus::Token,
            table: TableQuery::default(),
            selected_row: 0,
            toggles,
            show_github,
            activity: HashMap::new(),
            max_activity: 50,
            error_message: String::new(),
            info_message: String::new(),
            manual_copy_text: String::new(),
        }
    }

    /// Moves the active tab by `step`, wrapping. Only view state changes;
    /// cached snapshots are read, never written.
    pub fn cycle_endpoint(&mut self, step: isize) {
        let count = self.endpoints.len();
        if count == 0 {
            return;
        }
        let current = self
            .active_label
            .as_deref()
            .and_then(|l| self.endpoints.position(l))
            .unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(count as isize) as usize;
        if let Some(label) = self.endpoints.label_at(next) {
            self.select_endpoint(label.to_string());
        }
    }

    pub fn select_endpoint(&mut self, label: String) {
        if self.active_label.as_deref() == Some(label.as_str()) {
            return;
        }
        self.active_label = Some(label);
        self.table.page = 0;
        self.selected_row = 0;
    }

    pub fn masked_token(&self) -> String {
        if self.reveal_token || self.token_input.len() <= 6 {
            return self.token_input.clone();
        }
        let visible: String = self.token_input.chars().take(6).collect();
        let hidden = self.token_input.chars().count().saturating_sub(6);
        format!("{visible}{}", "*".repeat(hidden))
    }

    pub fn append_activity(
        &mut self,
        label: &str,
        level: LogLevel,
        event: &str,
        detail: &str,
        duration: Option<Duration>,
    ) {
        if label.is_empty() {
            return;
        }

        let entry = ActivityEntry {
            ts: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            event: event.to_string(),
            detail: detail.to_string(),
            duration,
        };

        let logs = self.activity.entry(label.to_string()).or_default();
        logs.push(entry);
        if logs.len() > self.max_activity {
            let trim = logs.len() - self.max_activity;
            logs.drain(0..trim);
        }
    }
}
