//! Terminal UI for the graph dashboard
//!
//! A series list with a live text filter on the left and a line chart of up
//! to [`MAX_SELECTED`] selected series on the right, built with ratatui.

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::models::Series;

/// Maximum number of series drawn at once
pub const MAX_SELECTED: usize = 5;

const SERIES_COLORS: [Color; MAX_SELECTED] = [
    Color::Cyan,
    Color::Yellow,
    Color::Magenta,
    Color::Green,
    Color::LightRed,
];

/// Application state for the graph dashboard
pub struct GraphApp {
    pub series: Vec<Series>,
    pub last_update: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    source: String,
    filter: String,
    cursor: usize,
    selected: Vec<String>,
}

impl GraphApp {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            series: Vec::new(),
            last_update: None,
            error_message: None,
            source: source.into(),
            filter: String::new(),
            cursor: 0,
            selected: Vec::new(),
        }
    }

    /// Replace the displayed snapshot after a successful poll
    pub fn update(&mut self, series: Vec<Series>, at: DateTime<Utc>) {
        self.series = series;
        self.last_update = Some(at);
        self.error_message = None;
        self.clamp_cursor();
    }

    /// Mark the last poll as failed; the previous snapshot stays visible
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    /// Series whose name contains the filter text, case-insensitively
    pub fn visible(&self) -> Vec<&Series> {
        let needle = self.filter.to_lowercase();
        self.series
            .iter()
            .filter(|s| needle.is_empty() || s.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Select or deselect the series under the cursor
    ///
    /// Selection is capped at [`MAX_SELECTED`]; further series are ignored.
    pub fn toggle_current(&mut self) {
        let Some(name) = self.visible().get(self.cursor).map(|s| s.name.clone()) else {
            return;
        };
        if let Some(pos) = self.selected.iter().position(|n| *n == name) {
            self.selected.remove(pos);
        } else if self.selected.len() < MAX_SELECTED {
            self.selected.push(name);
        }
    }

    /// Handle keyboard input; returns `true` to quit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Esc => return true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
            KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down => {
                self.cursor += 1;
                self.clamp_cursor();
            }
            KeyCode::Enter => self.toggle_current(),
            KeyCode::Backspace => {
                self.filter.pop();
                self.clamp_cursor();
            }
            KeyCode::Char(c) => {
                self.filter.push(c);
                self.cursor = 0;
            }
            _ => {}
        }
        false
    }

    fn clamp_cursor(&mut self) {
        let len = self.visible().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    /// Render the UI
    pub fn render(&self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // Header
                Constraint::Min(10),   // List + chart
                Constraint::Length(3), // Footer
            ])
            .split(f.area());

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
            .split(chunks[1]);

        self.render_header(f, chunks[0]);
        self.render_list(f, body[0]);
        self.render_chart(f, body[1]);
        self.render_footer(f, chunks[2]);
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let last_update = self
            .last_update
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "Never".to_string());

        let status = match &self.error_message {
            Some(error) => Line::from(Span::styled(
                format!("Last update failed: {}", error),
                Style::default().fg(Color::Red),
            )),
            None => Line::from(Span::styled(
                format!("{} series", self.series.len()),
                Style::default().fg(Color::DarkGray),
            )),
        };

        let lines = vec![
            Line::from(vec![
                Span::styled(
                    "Metrics Viewer",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(" - "),
                Span::styled(self.source.clone(), Style::default().fg(Color::Yellow)),
                Span::raw("  |  Last update: "),
                Span::styled(last_update, Style::default().fg(Color::Green)),
            ]),
            status,
        ];

        let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL));
        f.render_widget(paragraph, area);
    }

    fn render_list(&self, f: &mut Frame, area: Rect) {
        let visible = self.visible();
        let items: Vec<ListItem> = visible
            .iter()
            .map(|series| {
                let style = match self.selected.iter().position(|n| *n == series.name) {
                    Some(i) => Style::default()
                        .fg(SERIES_COLORS[i])
                        .add_modifier(Modifier::BOLD),
                    None if series.samples.is_empty() => Style::default().fg(Color::DarkGray),
                    None => Style::default(),
                };
                ListItem::new(Line::from(Span::styled(series.name.clone(), style)))
            })
            .collect();

        let title = if self.filter.is_empty() {
            "Series".to_string()
        } else {
            format!("Series (filter: {})", self.filter)
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

        let mut state = ListState::default();
        if !visible.is_empty() {
            state.select(Some(self.cursor));
        }
        f.render_stateful_widget(list, area, &mut state);
    }

    fn render_chart(&self, f: &mut Frame, area: Rect) {
        let now = self.last_update.unwrap_or_else(Utc::now);
        let drawn: Vec<(&Series, Vec<(f64, f64)>)> = self
            .selected
            .iter()
            .filter_map(|name| self.series.iter().find(|s| s.name == *name))
            .map(|s| (s, chart_points(s, now)))
            .collect();

        let block = Block::default().borders(Borders::ALL).title("Graph");
        if drawn.is_empty() {
            let hint = Paragraph::new("Select up to 5 series with Enter").block(block);
            f.render_widget(hint, area);
            return;
        }

        let (x_bounds, y_bounds) = bounds(drawn.iter().flat_map(|(_, points)| points.iter()));
        let datasets: Vec<Dataset> = drawn
            .iter()
            .enumerate()
            .map(|(i, (series, points))| {
                Dataset::default()
                    .name(series.name.clone())
                    .marker(symbols::Marker::Braille)
                    .graph_type(GraphType::Line)
                    .style(Style::default().fg(SERIES_COLORS[i % MAX_SELECTED]))
                    .data(points)
            })
            .collect();

        let chart = Chart::new(datasets)
            .block(block)
            .x_axis(
                Axis::default()
                    .title("seconds ago")
                    .bounds(x_bounds)
                    .labels(vec![
                        Span::raw(format!("{:.0}", -x_bounds[0])),
                        Span::raw("0"),
                    ]),
            )
            .y_axis(
                Axis::default()
                    .bounds(y_bounds)
                    .labels(vec![
                        Span::raw(format_value(y_bounds[0])),
                        Span::raw(format_value(y_bounds[1])),
                    ]),
            );
        f.render_widget(chart, area);
    }

    fn render_footer(&self, f: &mut Frame, area: Rect) {
        let help = Line::from(Span::styled(
            "Type to filter | Up/Down to move | Enter to select (max 5) | Esc to quit",
            Style::default().fg(Color::DarkGray),
        ));
        let paragraph = Paragraph::new(help).block(Block::default().borders(Borders::ALL));
        f.render_widget(paragraph, area);
    }
}

/// Chart coordinates: x is seconds relative to `now` (negative is past)
pub fn chart_points(series: &Series, now: DateTime<Utc>) -> Vec<(f64, f64)> {
    series
        .samples
        .iter()
        .filter(|s| s.value.is_finite())
        .map(|s| {
            let age = (s.timestamp - now).num_milliseconds() as f64 / 1000.0;
            (age, s.value)
        })
        .collect()
}

/// Axis bounds covering every point, padded when the range is empty
fn bounds<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> ([f64; 2], [f64; 2]) {
    let mut x = [f64::INFINITY, f64::NEG_INFINITY];
    let mut y = [f64::INFINITY, f64::NEG_INFINITY];
    for &(px, py) in points {
        x = [x[0].min(px), x[1].max(px)];
        y = [y[0].min(py), y[1].max(py)];
    }
    if !x[0].is_finite() {
        return ([-1.0, 0.0], [0.0, 1.0]);
    }
    if x[0] == x[1] {
        x[0] -= 1.0;
    }
    if y[0] == y[1] {
        y = [y[0] - 1.0, y[1] + 1.0];
    }
    (x, y)
}

fn format_value(v: f64) -> String {
    if v.abs() >= 1000.0 || v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}
