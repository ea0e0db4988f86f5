use anyhow::Result;

mod app;
mod config;
mod conversation;
mod gemini;
mod handler;
mod tui;
mod ui;

use app::App;
use config::Config;
use tui::{EventHandler, Tui};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = Config::ensure_exists();
    let config = Config::load().unwrap_or_default();

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(&config, events.sender());

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}
