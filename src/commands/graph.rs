//! Graph command implementation
//!
//! Runs the polling loop in a background task and renders its snapshots in a
//! ratatui dashboard until the user quits.

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};

use metrics_viewer::{
    cache::StalenessCache,
    clock,
    config::ViewerConfig,
    provider::{self, PollUpdate, SnapshotSource},
    ui::GraphApp,
};

/// Execute the graph command
pub async fn execute(config: ViewerConfig) -> Result<()> {
    let clock = clock::system();
    let source = config
        .snapshot_source()?
        .map(|s| Arc::new(s) as Arc<dyn SnapshotSource>);
    let provider = provider::new(&config, source, clock.clone())?;
    let staleness = StalenessCache::with_max_stale(config.max_stale(), clock.clone());

    let cancel = super::shutdown_token();
    let (tx, rx) = mpsc::channel(1);
    let app = GraphApp::new(provider.describe());
    let poller = tokio::spawn(provider::run_polling(
        provider,
        staleness,
        clock,
        config.interval(),
        tx,
        cancel.clone(),
    ));

    let result = run_dashboard(app, rx);

    cancel.cancel();
    if let Err(e) = poller.await {
        tracing::warn!(error = %e, "Polling task failed");
    }
    result
}

/// Run the dashboard until the user quits
fn run_dashboard(mut app: GraphApp, mut rx: mpsc::Receiver<PollUpdate>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = loop {
        let disconnected = loop {
            match rx.try_recv() {
                Ok(update) => apply_update(&mut app, update),
                Err(TryRecvError::Empty) => break false,
                Err(TryRecvError::Disconnected) => break true,
            }
        };
        if disconnected {
            break Ok(());
        }

        if let Err(e) = terminal.draw(|f| app.render(f)) {
            break Err(e.into());
        }

        match event::poll(Duration::from_millis(100)) {
            Ok(true) => match event::read() {
                Ok(Event::Key(key)) => {
                    if app.handle_key(key) {
                        break Ok(());
                    }
                }
                Ok(_) => {}
                Err(e) => break Err(e.into()),
            },
            Ok(false) => {}
            Err(e) => break Err(e.into()),
        }
    };

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn apply_update(app: &mut GraphApp, update: PollUpdate) {
    match update {
        PollUpdate::Snapshot { series, at } => app.update(series, at),
        PollUpdate::Failed { error, kind } => app.set_error(format!("{}: {}", kind, error)),
    }
}
