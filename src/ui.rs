use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parking_lot::Mutex;
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::api::TaskApi;
use crate::editor::LineEditor;
use crate::insight::InsightPanel;
use crate::llm::InsightRequester;
use crate::models::{parse_due_input, PopupMode, Priority, Severity, Task, TaskId, Tone};
use crate::session::EditSession;
use crate::store::TaskStore;

const TICK: Duration = Duration::from_millis(100);
pub const MSG_BAD_DUE_DATE: &str = "Invalid due date. Use YYYY-MM-DDTHH:MM or leave it empty.";

/// Add-task form contents carried across the three prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    pub title: String,
    pub priority: Priority,
}

pub struct App<A, R> {
    store: Arc<TaskStore<A>>,
    insight: Arc<InsightPanel<R>>,
    runtime: Handle,
    pub list_state: ListState,
    // The highlighted row follows this task when refreshes move it
    selected_id: Option<TaskId>,
    pub popup_mode: PopupMode,
    pub input: LineEditor,
    pub draft: Draft,
    // A draft whose submission failed, offered again on the next 'a'
    failed_draft: Arc<Mutex<Option<Draft>>>,
    pub should_quit: bool,
}

impl<A, R> App<A, R>
where
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    pub fn new(store: Arc<TaskStore<A>>, insight: Arc<InsightPanel<R>>, runtime: Handle) -> Self {
        App {
            store,
            insight,
            runtime,
            list_state: ListState::default(),
            selected_id: None,
            popup_mode: PopupMode::None,
            input: LineEditor::default(),
            draft: Draft::default(),
            failed_draft: Arc::new(Mutex::new(None)),
            should_quit: false,
        }
    }

    pub fn refresh_data(&self) {
        let store = self.store.clone();
        self.runtime.spawn(async move {
            let _ = store.list_tasks().await;
        });
    }

    pub fn selected_task(&self) -> Option<Task> {
        self.selected_id.and_then(|id| self.store.task(id))
    }

    pub fn next_item(&mut self) {
        let tasks = self.store.tasks();
        self.sync_selection(&tasks);
        let len = tasks.len();
        let i = match self.list_state.selected() {
            _ if len == 0 => None,
            Some(i) if i + 1 < len => Some(i + 1),
            _ => Some(0),
        };
        self.select_row(&tasks, i);
    }

    pub fn previous_item(&mut self) {
        let tasks = self.store.tasks();
        self.sync_selection(&tasks);
        let len = tasks.len();
        let i = match self.list_state.selected() {
            _ if len == 0 => None,
            Some(0) | None => Some(len - 1),
            Some(i) => Some(i - 1),
        };
        self.select_row(&tasks, i);
    }

    fn select_row(&mut self, tasks: &[Task], index: Option<usize>) {
        self.list_state.select(index);
        self.selected_id = index.and_then(|i| tasks.get(i)).map(|t| t.id);
    }

    // Re-derives the highlighted row from the selected task. If that task is
    // gone, the row index is clamped and whatever sits there is selected.
    fn sync_selection(&mut self, tasks: &[Task]) {
        let by_id = self
            .selected_id
            .and_then(|id| tasks.iter().position(|t| t.id == id));
        let index = match by_id {
            Some(i) => Some(i),
            None if tasks.is_empty() => None,
            None => Some(self.list_state.selected().unwrap_or(0).min(tasks.len() - 1)),
        };
        self.select_row(tasks, index);
    }

    /// Runs once per loop iteration: expires notifications, keeps the
    /// selection in range and closes the edit prompt once its session ended.
    pub fn tick(&mut self) {
        self.store.notifications().expire_due();

        let tasks = self.store.tasks();
        self.sync_selection(&tasks);

        if self.popup_mode == PopupMode::EditTitle && self.store.edit_session() == EditSession::Idle {
            self.close_popup();
        }
    }

    pub fn open_add_popup(&mut self) {
        self.draft = self.failed_draft.lock().take().unwrap_or_default();
        self.input = LineEditor::new(self.draft.title.clone());
        self.popup_mode = PopupMode::NewTaskTitle;
    }

    pub fn begin_edit_selected(&mut self) {
        if let Some(task) = self.selected_task() {
            self.store.begin_edit(&task);
            self.input = LineEditor::new(task.title);
            self.popup_mode = PopupMode::EditTitle;
        }
    }

    pub fn close_popup(&mut self) {
        self.popup_mode = PopupMode::None;
        self.input.clear();
    }

    pub fn toggle_selected(&self) {
        if let Some(task) = self.selected_task() {
            let store = self.store.clone();
            self.runtime.spawn(async move {
                let _ = store.toggle_completed(&task).await;
            });
        }
    }

    pub fn delete_selected(&self) {
        if let Some(task) = self.selected_task() {
            let store = self.store.clone();
            self.runtime.spawn(async move {
                let _ = store.delete_task(task.id).await;
            });
        }
    }

    pub fn generate_insight(&self) {
        let insight = self.insight.clone();
        let history = self.store.tasks();
        self.runtime.spawn(async move {
            insight.generate(&history).await;
        });
    }

    fn submit_draft(&mut self, due_input: &str) {
        let due_date = if due_input.trim().is_empty() {
            None
        } else {
            match parse_due_input(due_input) {
                Some(due) => Some(due),
                None => {
                    self.store.notifications().warning(MSG_BAD_DUE_DATE);
                    return;
                }
            }
        };

        let draft = std::mem::take(&mut self.draft);
        let store = self.store.clone();
        let failed_draft = self.failed_draft.clone();
        self.runtime.spawn(async move {
            if store
                .add_task(&draft.title, draft.priority.clone(), due_date)
                .await
                .is_err()
            {
                *failed_draft.lock() = Some(draft);
            }
        });
        self.close_popup();
    }

    fn save_edit(&self) {
        let store = self.store.clone();
        self.runtime.spawn(async move {
            let _ = store.save_edit().await;
        });
    }

    // Moving the selection while editing switches the session to the newly
    // selected task; the old working title is dropped.
    fn edit_neighbour(&mut self, down: bool) {
        if down {
            self.next_item();
        } else {
            self.previous_item();
        }
        self.begin_edit_selected();
    }

    fn handle_text_input(&mut self, key: KeyCode) -> bool {
        match key {
            KeyCode::Char(c) => self.input.insert_char(c),
            KeyCode::Backspace => self.input.delete_char(),
            KeyCode::Delete => self.input.delete_forward(),
            KeyCode::Left => self.input.move_cursor_left(),
            KeyCode::Right => self.input.move_cursor_right(),
            KeyCode::Home => self.input.move_to_start_of_line(),
            KeyCode::End => self.input.move_to_end_of_line(),
            _ => return false,
        }
        true
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        match self.popup_mode {
            PopupMode::None => self.handle_normal_key(key),
            PopupMode::NewTaskTitle => match key {
                KeyCode::Esc => self.close_popup(),
                KeyCode::Enter => {
                    self.draft.title = self.input.content().to_string();
                    if self.input.is_blank() {
                        // Let the store reject it so the warning is consistent
                        self.submit_draft("");
                    } else {
                        self.input.clear();
                        self.popup_mode = PopupMode::NewTaskPriority;
                    }
                }
                other => {
                    self.handle_text_input(other);
                }
            },
            PopupMode::NewTaskPriority => match key {
                KeyCode::Esc => self.close_popup(),
                KeyCode::Char('h') | KeyCode::Char('1') => self.pick_priority(Priority::High),
                KeyCode::Char('m') | KeyCode::Char('2') => self.pick_priority(Priority::Medium),
                KeyCode::Char('l') | KeyCode::Char('3') => self.pick_priority(Priority::Low),
                KeyCode::Enter => {
                    let current = self.draft.priority.clone();
                    self.pick_priority(current);
                }
                _ => {}
            },
            PopupMode::NewTaskDueDate => match key {
                KeyCode::Esc => self.close_popup(),
                KeyCode::Enter => {
                    let due_input = self.input.content().to_string();
                    self.submit_draft(&due_input);
                }
                other => {
                    self.handle_text_input(other);
                }
            },
            PopupMode::EditTitle => match key {
                KeyCode::Esc => {
                    self.store.cancel_edit();
                    self.close_popup();
                }
                KeyCode::Enter => self.save_edit(),
                KeyCode::Up => self.edit_neighbour(false),
                KeyCode::Down => self.edit_neighbour(true),
                other => {
                    if self.handle_text_input(other) {
                        self.store.set_edit_title(self.input.content());
                    }
                }
            },
        }
    }

    fn pick_priority(&mut self, priority: Priority) {
        self.draft.priority = priority;
        self.input.clear();
        self.popup_mode = PopupMode::NewTaskDueDate;
    }

    fn handle_normal_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.next_item(),
            KeyCode::Up | KeyCode::Char('k') => self.previous_item(),
            KeyCode::Char('r') => self.refresh_data(),
            KeyCode::Char('a') => self.open_add_popup(),
            KeyCode::Char(' ') => self.toggle_selected(),
            KeyCode::Char('d') => self.delete_selected(),
            KeyCode::Char('e') | KeyCode::Enter => self.begin_edit_selected(),
            KeyCode::Char('i') => self.generate_insight(),
            KeyCode::Char('x') => self.store.notifications().dismiss(),
            _ => {}
        }
    }
}

pub fn run_tui<A, R>(app: &mut App<A, R>) -> Result<()>
where
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    app.refresh_data();
    let res = run_app(&mut terminal, app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = &res {
        log::error!("TUI exited with error: {:?}", err);
    }
    res
}

fn run_app<B, A, R>(terminal: &mut Terminal<B>, app: &mut App<A, R>) -> Result<()>
where
    B: Backend,
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    loop {
        app.tick();
        terminal.draw(|f| ui(f, app))?;

        if event::poll(TICK)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Error => Color::Red,
        Tone::Warning => Color::Yellow,
        Tone::Primary => Color::Blue,
        Tone::Neutral => Color::Gray,
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
        Severity::Info => Color::Cyan,
    }
}

pub fn ui<A, R>(f: &mut Frame, app: &mut App<A, R>)
where
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(6),
            Constraint::Length(3),
        ])
        .split(f.area());

    let header = Paragraph::new("Personal AI Task Manager")
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    render_tasks(f, app, chunks[1]);
    render_insight(f, app, chunks[2]);
    render_notification(f, app, chunks[3]);

    match app.popup_mode {
        PopupMode::NewTaskTitle => render_prompt(f, "Add New Task", "Task title:", &app.input),
        PopupMode::NewTaskPriority => {
            let options: Vec<String> = Priority::ALL
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{}. {} ({})", i + 1, p.label(), p.code().to_lowercase()))
                .collect();
            let text = format!(
                "Priority for '{}':\n\n{}\n\nENTER keeps {}\nPress ESC to cancel",
                app.draft.title,
                options.join("\n"),
                app.draft.priority.label()
            );
            render_popup(f, "Priority", text);
        }
        PopupMode::NewTaskDueDate => render_prompt(
            f,
            "Due Date (Optional)",
            "YYYY-MM-DDTHH:MM, empty for none:",
            &app.input,
        ),
        // Title editing happens inline in the list
        PopupMode::EditTitle | PopupMode::None => {}
    }
}

fn render_tasks<A, R>(f: &mut Frame, app: &mut App<A, R>, area: Rect)
where
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let tasks = app.store.tasks();
    app.sync_selection(&tasks);
    let session = app.store.edit_session();
    let title = format!("Task List ({} Pending)", app.store.pending_count());
    let block = Block::default().borders(Borders::ALL).title(title);

    if tasks.is_empty() {
        let text = if app.store.is_loading() {
            "Loading tasks..."
        } else {
            "No tasks found. Press 'a' to add a new one!"
        };
        f.render_widget(
            Paragraph::new(text).block(block).style(Style::default().fg(Color::Gray)),
            chunks[0],
        );
    } else {
        let items: Vec<ListItem> = tasks
            .iter()
            .map(|task| task_line(task, &session, &app.input))
            .collect();
        let title_suffix = if app.store.is_loading() { " refreshing..." } else { "" };
        let list = List::new(items)
            .block(block.title_bottom(title_suffix))
            .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            .highlight_symbol(">> ");
        f.render_stateful_widget(list, chunks[0], &mut app.list_state);
    }

    let info_text = match app.selected_task() {
        Some(task) => format!(
            "Task: {}\nPriority: {}\nDue: {}\nCompleted: {}\n{}{}\n\nControls:\n• a: Add  • space: Toggle\n• e/Enter: Edit title  • d: Delete\n• i: Insight  • r: Refresh\n• x: Dismiss message  • q: Quit",
            task.title,
            task.priority_label(),
            task.due_label(),
            if task.completed { "yes" } else { "no" },
            if task.is_recurring { "Recurring\n" } else { "" },
            task.description,
        ),
        None => "No task selected\n\nControls:\n• ↑/↓: Navigate\n• a: Add\n• r: Refresh\n• i: Insight\n• q: Quit".to_string(),
    };
    let info = Paragraph::new(info_text)
        .block(Block::default().borders(Borders::ALL).title("Task Info"))
        .wrap(Wrap { trim: false })
        .style(Style::default().fg(Color::White));
    f.render_widget(info, chunks[1]);
}

fn task_line<'a>(task: &'a Task, session: &EditSession, input: &'a LineEditor) -> ListItem<'a> {
    let checkbox = if task.completed { "[x] " } else { "[ ] " };
    let mut spans = vec![Span::raw(checkbox)];

    if session.is_editing(task.id) {
        let (before, under, after) = input.split_at_cursor();
        spans.push(Span::styled(before, Style::default().fg(Color::White)));
        spans.push(Span::styled(
            under.map(String::from).unwrap_or_else(|| " ".to_string()),
            Style::default().bg(Color::Cyan).fg(Color::Black),
        ));
        spans.push(Span::styled(after, Style::default().fg(Color::White)));
        spans.push(Span::styled("  (Enter: save, Esc: cancel)", Style::default().fg(Color::Gray)));
        return ListItem::new(Line::from(spans));
    }

    let mut title_style = Style::default().fg(Color::White);
    if task.completed {
        title_style = title_style.fg(Color::Gray).add_modifier(Modifier::CROSSED_OUT);
    }
    spans.push(Span::styled(task.title.as_str(), title_style));
    spans.push(Span::styled(
        format!("  {}", task.priority_label()),
        Style::default().fg(tone_color(task.priority.tone())),
    ));
    spans.push(Span::styled(
        format!("  {}", task.due_label()),
        Style::default().fg(Color::Gray),
    ));
    if task.is_recurring {
        spans.push(Span::styled(
            "  (Recurring)",
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn render_insight<A, R>(f: &mut Frame, app: &App<A, R>, area: Rect)
where
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    let state = app.insight.state();
    let title = if app.insight.is_loading() {
        "AI Behavioral Insights (analyzing...)"
    } else {
        "AI Behavioral Insights"
    };
    let paragraph = Paragraph::new(state.text().to_string())
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Yellow));
    f.render_widget(paragraph, area);
}

fn render_notification<A, R>(f: &mut Frame, app: &App<A, R>, area: Rect)
where
    A: TaskApi + 'static,
    R: InsightRequester + 'static,
{
    let block = Block::default().borders(Borders::ALL);
    let paragraph = match app.store.notifications().visible() {
        Some(entry) => Paragraph::new(entry.message)
            .style(Style::default().fg(severity_color(entry.severity)))
            .block(block.title(entry.severity.to_string())),
        None => Paragraph::new("").block(block),
    };
    f.render_widget(paragraph, area);
}

fn render_prompt(f: &mut Frame, title: &str, label: &str, input: &LineEditor) {
    let (before, under, after) = input.split_at_cursor();
    let lines = vec![
        Line::from(label.to_string()),
        Line::from(""),
        Line::from(vec![
            Span::raw(before.to_string()),
            Span::styled(
                under.map(String::from).unwrap_or_else(|| " ".to_string()),
                Style::default().bg(Color::Cyan).fg(Color::Black),
            ),
            Span::raw(after.to_string()),
        ]),
        Line::from(""),
        Line::from("Press ENTER to continue, ESC to cancel"),
    ];
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);
    let paragraph = Paragraph::new(lines)
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(paragraph, area);
}

fn render_popup(f: &mut Frame, title: &str, text: String) {
    let area = centered_rect(50, 40, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(text)
        .block(Block::default().title(title.to_string()).borders(Borders::ALL))
        .alignment(Alignment::Center)
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    f.render_widget(content, area);
}

// Helper function to create centered rectangles for popups
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
