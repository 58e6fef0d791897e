use crate::adapters::{Clipboard, CopyOutcome, Downloader};
use crate::config::AppSettings;
use crate::error::{AppError, QueryError, Severity};
use crate::models::Snapshot;
use crate::service::{validate_request, QueryEngine};
use crate::ui::app::{AppState, ConfirmAction, Focus, LogLevel, Screen};
use crate::views::{build_table, copy_summary, export_csv, summary_fields, TablePage};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::Terminal;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const PROJECT_LINK: &str = "github.com/FloatingDream528/neko-api-key-tool";

const COLOR_ACCENT: Color = Color::Cyan;
const COLOR_INFO: Color = Color::Green;
const COLOR_MUTED: Color = Color::DarkGray;
const COLOR_HEADER: Color = Color::White;

/// Everything the event loop needs besides its own state.
pub struct TuiContext {
    pub engine: Arc<QueryEngine>,
    pub settings: AppSettings,
    pub api_server: String,
    pub clipboard: Box<dyn Clipboard>,
    pub downloader: Box<dyn Downloader>,
}

struct QueryJob {
    started_at: Instant,
    handle: JoinHandle<Result<Snapshot, QueryError>>,
}

pub async fn run_tui(ctx: TuiContext, mut state: AppState) -> Result<(), AppError> {
    state.table.page_size = ctx.settings.page_size;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let loop_result = run_loop(&mut terminal, &ctx, &mut state).await;

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    loop_result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ctx: &TuiContext,
    state: &mut AppState,
) -> Result<(), AppError> {
    let mut jobs: HashMap<String, QueryJob> = HashMap::new();
    let tick = Duration::from_millis(200);

    while state.running {
        let finished: Vec<String> = jobs
            .iter()
            .filter(|(_, job)| job.handle.is_finished())
            .map(|(label, _)| label.clone())
            .collect();
        for label in finished {
            if let Some(job) = jobs.remove(&label) {
                process_query_job(state, &label, job).await;
            }
        }

        let snapshot = active_snapshot(state, ctx);
        terminal.draw(|f| render(f, ctx, state, &snapshot))?;

        if event::poll(tick)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                handle_key(key.code, key.modifiers, state, ctx, &mut jobs);
            }
        }
    }

    Ok(())
}

fn active_snapshot(state: &AppState, ctx: &TuiContext) -> Snapshot {
    state
        .active_label
        .as_deref()
        .map(|label| ctx.engine.store().get(label))
        .unwrap_or_default()
}

fn active_page(state: &AppState, ctx: &TuiContext, snapshot: &Snapshot) -> TablePage {
    build_table(&snapshot.logs, &state.table, ctx.settings.quota_per_unit)
}

fn handle_key(
    code: KeyCode,
    modifiers: KeyModifiers,
    state: &mut AppState,
    ctx: &TuiContext,
    jobs: &mut HashMap<String, QueryJob>,
) {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        open_quit_confirm(state);
        return;
    }

    match state.screen.clone() {
        Screen::Dashboard => match state.focus {
            Focus::Token => handle_token_key(code, state, ctx, jobs),
            Focus::Filter => handle_filter_key(code, state),
            Focus::Table => handle_table_key(code, state, ctx, jobs),
        },
        Screen::Confirm(action) => match code {
            KeyCode::Esc => state.screen = state.previous_screen.clone(),
            KeyCode::Left => state.confirm_selected = 0,
            KeyCode::Right => state.confirm_selected = 1,
            KeyCode::Enter => {
                if state.confirm_selected == 0 {
                    state.screen = state.previous_screen.clone();
                    return;
                }
                match action {
                    ConfirmAction::Quit => state.running = false,
                }
            }
            _ => {}
        },
        Screen::ErrorDialog | Screen::InfoDialog | Screen::ManualCopy => {
            if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                state.screen = state.previous_screen.clone();
            }
        }
    }
}

fn handle_token_key(
    code: KeyCode,
    state: &mut AppState,
    ctx: &TuiContext,
    jobs: &mut HashMap<String, QueryJob>,
) {
    match code {
        KeyCode::Enter => submit_query(state, ctx, jobs),
        KeyCode::Tab | KeyCode::Esc => state.focus = Focus::Table,
        KeyCode::Left => state.cycle_endpoint(-1),
        KeyCode::Right => state.cycle_endpoint(1),
        KeyCode::Backspace => {
            state.token_input.pop();
        }
        KeyCode::Char(c) if !c.is_whitespace() => state.token_input.push(c),
        _ => {}
    }
}

fn handle_filter_key(code: KeyCode, state: &mut AppState) {
    match code {
        KeyCode::Enter | KeyCode::Esc | KeyCode::Tab => state.focus = Focus::Table,
        KeyCode::Backspace => {
            state.table.filter.pop();
            state.table.page = 0;
            state.selected_row = 0;
        }
        KeyCode::Char(c) => {
            state.table.filter.push(c);
            state.table.page = 0;
            state.selected_row = 0;
        }
        _ => {}
    }
}

fn handle_table_key(
    code: KeyCode,
    state: &mut AppState,
    ctx: &TuiContext,
    jobs: &mut HashMap<String, QueryJob>,
) {
    let snapshot = active_snapshot(state, ctx);
    let page = active_page(state, ctx, &snapshot);

    match code {
        KeyCode::Char('q') => open_quit_confirm(state),
        KeyCode::Tab | KeyCode::Char('i') => state.focus = Focus::Token,
        KeyCode::Char('/') => state.focus = Focus::Filter,
        KeyCode::Left | KeyCode::Char('[') => state.cycle_endpoint(-1),
        KeyCode::Right | KeyCode::Char(']') => state.cycle_endpoint(1),
        KeyCode::Enter | KeyCode::Char('r') => submit_query(state, ctx, jobs),
        KeyCode::Up => state.selected_row = state.selected_row.saturating_sub(1),
        KeyCode::Down => {
            if state.selected_row + 1 < page.rows.len() {
                state.selected_row += 1;
            }
        }
        KeyCode::PageDown | KeyCode::Char('n') => {
            if page.page + 1 < page.pages {
                state.table.page = page.page + 1;
                state.selected_row = 0;
            }
        }
        KeyCode::PageUp | KeyCode::Char('p') => {
            state.table.page = page.page.saturating_sub(1);
            state.selected_row = 0;
        }
        KeyCode::Char('s') => {
            state.table.sort = state.table.sort.next();
            state.status = format!("sorted by {}", state.table.sort.label());
        }
        KeyCode::Char('o') => state.table.descending = !state.table.descending,
        KeyCode::Char('v') => state.reveal_token = !state.reveal_token,
        KeyCode::Char('c') => {
            match copy_summary(&snapshot, ctx.settings.quota_per_unit, ctx.clipboard.as_ref()) {
                None => state.status = "Query a valid token before copying its info.".into(),
                Some(outcome) => apply_copy_outcome(state, outcome, "token info"),
            }
        }
        KeyCode::Char('y') => {
            if let Some(row) = page.rows.get(state.selected_row) {
                let outcome =
                    crate::adapters::copy_with_fallback(ctx.clipboard.as_ref(), &row.model);
                apply_copy_outcome(state, outcome, "model name");
            }
        }
        KeyCode::Char('d') => {
            if let Some(row) = page.rows.get(state.selected_row) {
                let mut lines = vec![format!("Details: {}", row.detail)];
                match &row.price_explanation {
                    Some(price) => lines.push(format!("Pricing: {price}")),
                    None => lines.push("Pricing: not available".into()),
                }
                show_info(state, lines.join("\n"));
            }
        }
        KeyCode::Char('x') => {
            match export_csv(
                &snapshot.logs,
                ctx.downloader.as_ref(),
                &ctx.settings.export_filename,
            ) {
                Ok(path) => {
                    state.status = format!(
                        "Exported {} rows to {}",
                        snapshot.logs.len(),
                        path.display()
                    )
                }
                Err(e) => show_error(state, format!("{e}. Please try again later.")),
            }
        }
        _ => {}
    }
}

fn apply_copy_outcome(state: &mut AppState, outcome: CopyOutcome, what: &str) {
    match outcome {
        CopyOutcome::Copied => state.status = format!("Copied {what} to clipboard."),
        CopyOutcome::Manual(text) => {
            state.manual_copy_text = text;
            state.previous_screen = Screen::Dashboard;
            state.screen = Screen::ManualCopy;
        }
    }
}

fn submit_query(state: &mut AppState, ctx: &TuiContext, jobs: &mut HashMap<String, QueryJob>) {
    let label = state.active_label.clone().unwrap_or_default();
    let base_url = state.endpoints.resolve_base_url(&label, &ctx.api_server);

    if let Err(err) = validate_request(&base_url, &state.token_input) {
        notify_query_error(state, &label, &err);
        return;
    }
    if jobs.contains_key(&label) {
        notify_query_error(state, &label, &QueryError::InFlight(label.clone()));
        return;
    }

    state.status = format!("Querying '{label}'...");
    state.append_activity(&label, LogLevel::Info, "query_started", &base_url, None);

    let engine = Arc::clone(&ctx.engine);
    let credential = state.token_input.clone();
    let task_label = label.clone();
    let handle =
        tokio::spawn(async move { engine.query(&task_label, &base_url, &credential).await });
    jobs.insert(
        label,
        QueryJob {
            started_at: Instant::now(),
            handle,
        },
    );
}

async fn process_query_job(state: &mut AppState, label: &str, job: QueryJob) {
    let elapsed = job.started_at.elapsed();
    match job.handle.await {
        Ok(Ok(snapshot)) => {
            let detail = format!("{} log rows", snapshot.logs.len());
            state.append_activity(label, LogLevel::Info, "query_succeeded", &detail, Some(elapsed));
            state.status = format!("Query for '{label}' finished: {detail}.");
            if state.active_label.as_deref() == Some(label) {
                state.table.page = 0;
                state.selected_row = 0;
            }
        }
        Ok(Err(err)) => {
            notify_query_error(state, label, &err);
        }
        Err(e) => {
            let message = format!("Background query task failed: {e}");
            state.append_activity(label, LogLevel::Error, "query_failed", &message, Some(elapsed));
            show_error(state, message);
        }
    }
}

fn notify_query_error(state: &mut AppState, label: &str, err: &QueryError) {
    let message = err.to_string();
    match err.severity() {
        Severity::Warning => {
            state.append_activity(label, LogLevel::Warn, "query_skipped", &message, None);
            state.status = message;
        }
        Severity::Error => {
            state.append_activity(label, LogLevel::Error, "query_failed", &message, None);
            state.status = if err.resets_snapshot() {
                format!("'{label}' cleared after failed query")
            } else {
                "query not sent".into()
            };
            show_error(state, message);
        }
    }
}

fn open_quit_confirm(state: &mut AppState) {
    if matches!(state.screen, Screen::Confirm(_)) {
        return;
    }
    state.previous_screen = state.screen.clone();
    state.screen = Screen::Confirm(ConfirmAction::Quit);
    state.confirm_selected = 0;
}

fn show_error(state: &mut AppState, message: String) {
    state.error_message = message;
    state.previous_screen = Screen::Dashboard;
    state.screen = Screen::ErrorDialog;
}

fn show_info(state: &mut AppState, message: String) {
    state.info_message = message;
    state.previous_screen = Screen::Dashboard;
    state.screen = Screen::InfoDialog;
}

fn render(
    f: &mut ratatui::Frame,
    ctx: &TuiContext,
    state: &AppState,
    snapshot: &Snapshot,
) {
    let store = ctx.engine.store();
    let show_tabs = state.endpoints.len() > 1;
    let mut constraints = vec![Constraint::Length(3)];
    if show_tabs {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Length(3));
    if state.toggles.balance {
        constraints.push(Constraint::Length(7));
    }
    constraints.push(Constraint::Min(6));
    constraints.push(Constraint::Length(3));

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(f.area());
    let mut slot = 0;
    let mut next = || {
        let area = root[slot];
        slot += 1;
        area
    };

    let mut header = format!(" token-meter  ·  {} ", state.status);
    if state.show_github {
        header.push_str(&format!(" ·  {PROJECT_LINK} "));
    }
    f.render_widget(
        Paragraph::new(header)
            .block(Block::default().borders(Borders::ALL).title(" Token Query "))
            .style(Style::default().fg(COLOR_HEADER)),
        next(),
    );

    if show_tabs {
        let titles: Vec<Line> = state
            .endpoints
            .labels()
            .map(|label| {
                if store.is_querying(label) {
                    Line::from(format!("{label} …"))
                } else if store.contains(label) {
                    Line::from(label.to_string())
                } else {
                    Line::from(Span::styled(label.to_string(), Style::default().fg(COLOR_MUTED)))
                }
            })
            .collect();
        let selected = state
            .active_label
            .as_deref()
            .and_then(|l| state.endpoints.position(l))
            .unwrap_or(0);
        let tabs = Tabs::new(titles)
            .select(selected)
            .block(Block::default().borders(Borders::ALL).title(" Endpoints "))
            .highlight_style(
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            );
        f.render_widget(tabs, next());
    }

    let token_style = if state.focus == Focus::Token {
        Style::default().fg(COLOR_ACCENT)
    } else {
        Style::default()
    };
    let token_line = if state.token_input.is_empty() {
        Span::styled(
            "sk-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx",
            Style::default().fg(COLOR_MUTED),
        )
    } else {
        Span::styled(state.masked_token(), token_style)
    };
    let querying = state
        .active_label
        .as_deref()
        .is_some_and(|label| store.is_querying(label));
    let token_title = if querying {
        " Token (querying…) "
    } else {
        " Token (Enter to query) "
    };
    f.render_widget(
        Paragraph::new(Line::from(token_line)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(token_style)
                .title(token_title),
        ),
        next(),
    );

    if state.toggles.balance {
        render_token_info(f, next(), ctx, snapshot);
    }

    let body = next();
    if state.toggles.detail {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(72), Constraint::Percentage(28)])
            .split(body);
        render_log_table(f, columns[0], ctx, state, snapshot);
        render_activity(f, columns[1], state);
    } else {
        render_activity(f, body, state);
    }

    f.render_widget(
        Paragraph::new(footer_text(state))
            .block(Block::default().borders(Borders::ALL))
            .style(Style::default().fg(COLOR_MUTED)),
        next(),
    );

    match &state.screen {
        Screen::Dashboard => {}
        Screen::Confirm(action) => render_confirm(f, state, action),
        Screen::ErrorDialog => render_error(f, state),
        Screen::InfoDialog => render_info(f, state),
        Screen::ManualCopy => render_manual_copy(f, state),
    }
}

fn render_token_info(f: &mut ratatui::Frame, area: Rect, ctx: &TuiContext, snapshot: &Snapshot) {
    let fields = summary_fields(snapshot, ctx.settings.quota_per_unit);
    let value_style = if snapshot.token_valid {
        Style::default().fg(COLOR_INFO).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(COLOR_MUTED)
    };
    let line = |label: &str, value: String| {
        Line::from(vec![
            Span::raw(format!("{label:<17}")),
            Span::styled(value, value_style),
        ])
    };
    let panel = Paragraph::new(vec![
        line("Token name", fields.name),
        line("Total quota", fields.granted),
        line("Remaining quota", fields.available),
        line("Used quota", fields.used),
        line("Expires at", fields.expires),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Token Info (c to copy) "),
    );
    f.render_widget(panel, area);
}

fn render_log_table(
    f: &mut ratatui::Frame,
    area: Rect,
    ctx: &TuiContext,
    state: &AppState,
    snapshot: &Snapshot,
) {
    let page = active_page(state, ctx, snapshot);
    let rows = page
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let style = if idx == state.selected_row && state.focus == Focus::Table {
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let model_style = if row.billable {
                Style::default().fg(COLOR_ACCENT)
            } else {
                Style::default()
            };
            Row::new(vec![
                Cell::from(row.time.clone()),
                Cell::from(row.token_name.clone()),
                Cell::from(Span::styled(row.model.clone(), model_style)),
                Cell::from(row.use_time.clone().unwrap_or_default()),
                Cell::from(row.prompt_tokens.clone().unwrap_or_default()),
                Cell::from(row.completion_tokens.clone().unwrap_or_default()),
                Cell::from(row.cost.clone().unwrap_or_default()),
                Cell::from(row.detail.clone()),
            ])
            .style(style)
        })
        .collect::<Vec<_>>();

    let direction = if state.table.descending { "desc" } else { "asc" };
    let filter = if state.table.filter.is_empty() && state.focus != Focus::Filter {
        String::new()
    } else {
        format!(" · filter: {}", state.table.filter)
    };
    let title = format!(
        " Call Details · {} items total · page {}/{} · sort {} {}{} ",
        page.total,
        page.page + 1,
        page.pages,
        state.table.sort.label(),
        direction,
        filter
    );

    let table = Table::new(
        rows,
        [
            Constraint::Length(19),
            Constraint::Length(12),
            Constraint::Length(22),
            Constraint::Length(16),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Length(11),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec![
            "Time",
            "Token",
            "Model",
            "Use Time",
            "Prompt",
            "Completion",
            "Cost",
            "Details",
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn render_activity(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    let lines: Vec<Line> = state
        .active_label
        .as_deref()
        .and_then(|label| state.activity.get(label))
        .map(|entries| {
            entries
                .iter()
                .rev()
                .map(|entry| {
                    let color = match entry.level {
                        LogLevel::Info => COLOR_INFO,
                        LogLevel::Warn => Color::Yellow,
                        LogLevel::Error => Color::Red,
                    };
                    let took = entry
                        .duration
                        .map(|d| format!(" ({} ms)", d.as_millis()))
                        .unwrap_or_default();
                    Line::from(vec![
                        Span::styled(format!("{} ", entry.ts), Style::default().fg(COLOR_MUTED)),
                        Span::styled(entry.event.clone(), Style::default().fg(color)),
                        Span::raw(format!(" {}{}", entry.detail, took)),
                    ])
                })
                .collect()
        })
        .unwrap_or_default();

    f.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title(" Activity ")),
        area,
    );
}

fn footer_text(state: &AppState) -> &'static str {
    match (&state.screen, state.focus) {
        (Screen::Dashboard, Focus::Token) => {
            "type token | Enter query | Left/Right endpoint | Tab/Esc table | Ctrl+C quit"
        }
        (Screen::Dashboard, Focus::Filter) => "type filter | Enter/Esc done",
        (Screen::Dashboard, Focus::Table) => {
            "Left/Right endpoint | Enter query | Up/Down row | n/p page | s sort | o order | / filter | c copy info | y copy model | d details | x export | i token | q quit"
        }
        (Screen::Confirm(_), _) => "Left/Right choose | Enter confirm | Esc cancel",
        _ => "Enter/Esc close",
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn render_confirm(f: &mut ratatui::Frame, state: &AppState, action: &ConfirmAction) {
    let area = centered_rect(56, 30, f.area());
    f.render_widget(Clear, area);

    let (title, message) = match action {
        ConfirmAction::Quit => ("Confirm Quit", "Exit token-meter? Cached results are not kept."),
    };

    let cancel_style = if state.confirm_selected == 0 {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    let confirm_style = if state.confirm_selected == 1 {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let content = Paragraph::new(vec![
        Line::from(message),
        Line::from(""),
        Line::from(vec![
            Span::styled("[Cancel (Esc)]", cancel_style),
            Span::raw("   "),
            Span::styled("[Confirm (Enter)]", confirm_style),
        ]),
        Line::from("Use Left/Right to choose"),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", title)),
    )
    .alignment(Alignment::Center);

    f.render_widget(content, area);
}

fn render_error(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(vec![
        Line::from(state.error_message.clone()),
        Line::from(""),
        Line::from("Press Enter or Esc"),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title(" Error "))
    .style(Style::default().fg(Color::Red));
    f.render_widget(content, area);
}

fn render_info(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(70, 40, f.area());
    f.render_widget(Clear, area);
    let mut lines: Vec<Line> = state
        .info_message
        .lines()
        .map(|l| Line::from(l.to_string()))
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from("Press Enter or Esc"));
    let content = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Details "))
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(content, area);
}

fn render_manual_copy(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(70, 45, f.area());
    f.render_widget(Clear, area);
    let mut lines = vec![
        Line::from(Span::styled(
            "Clipboard unavailable, copy the text below manually:",
            Style::default().fg(Color::Yellow),
        )),
        Line::from(""),
    ];
    lines.extend(
        state
            .manual_copy_text
            .lines()
            .map(|l| Line::from(l.to_string())),
    );
    lines.push(Line::from(""));
    lines.push(Line::from("Press Enter or Esc"));
    let content = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" Manual Copy "));
    f.render_widget(content, area);
}
