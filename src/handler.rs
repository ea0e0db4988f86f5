use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, InputMode};
use crate::conversation::{Command, PACING_DELAY};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
        AppEvent::FollowUpReady {
            epoch,
            kind,
            result,
        } => {
            app.conversation.apply_follow_up(epoch, kind, result);
            app.follow_transcript();
        }
        AppEvent::BuilderReady { epoch, result } => {
            app.conversation.apply_builder_list(epoch, result);
            app.follow_transcript();
        }
        AppEvent::ContinuationReady { epoch, result } => {
            app.conversation.apply_continuation(epoch, result);
            app.follow_transcript();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }
    if key.code == KeyCode::Char('r') && key.modifiers.contains(KeyModifiers::CONTROL) {
        restart(app);
        return;
    }

    if app.show_settings {
        handle_settings_key(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        KeyCode::Char('i') | KeyCode::Enter => app.input_mode = InputMode::Editing,

        KeyCode::Char('r') => restart(app),

        KeyCode::Char('s') => app.open_settings(),

        KeyCode::Char('c') => {
            if !app.conversation.builder_result().is_empty() {
                copy_to_clipboard(app.conversation.builder_result());
                app.mark_copied();
            }
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Char('G') => app.follow_transcript(),

        // Result panel scrolling
        KeyCode::Char('J') => app.scroll_result_down(1),
        KeyCode::Char('K') => app.scroll_result_up(1),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Enter => submit_input(app),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if app.cursor < app.input.chars().count() {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => app.cursor = app.cursor.saturating_sub(1),
        KeyCode::Right => {
            app.cursor = (app.cursor + 1).min(app.input.chars().count());
        }
        KeyCode::Home => app.cursor = 0,
        KeyCode::End => app.cursor = app.input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

fn handle_settings_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_settings(),
        KeyCode::Enter => {
            app.keys.set(&app.settings_input);
            app.close_settings();
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.keys.clear();
            app.settings_input.clear();
            app.settings_cursor = 0;
        }
        KeyCode::Backspace => {
            if app.settings_cursor > 0 {
                app.settings_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.settings_input, app.settings_cursor);
                app.settings_input.remove(byte_pos);
            }
        }
        KeyCode::Left => app.settings_cursor = app.settings_cursor.saturating_sub(1),
        KeyCode::Right => {
            app.settings_cursor = (app.settings_cursor + 1).min(app.settings_input.chars().count());
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.settings_input, app.settings_cursor);
            app.settings_input.insert(byte_pos, c);
            app.settings_cursor += 1;
        }
        _ => {}
    }
}

/// Submit the input line into the conversation. The busy guard is the input
/// surface's responsibility: while a call is in flight nothing is submitted.
fn submit_input(app: &mut App) {
    if app.conversation.busy() {
        return;
    }
    let text = app.input.trim().to_string();
    if text.is_empty() {
        return;
    }
    app.input.clear();
    app.cursor = 0;

    let command = app.conversation.submit(&text);
    app.follow_transcript();
    if let Some(command) = command {
        spawn_command(app, command);
    }
}

fn restart(app: &mut App) {
    app.conversation.restart();
    app.chat_scroll = 0;
    app.result_scroll = 0;
    app.follow_transcript();
}

/// Run a command returned by the conversation on a background task and feed
/// the outcome back through the event channel. The epoch travels with the
/// result so an outcome from before a restart is discarded on arrival.
fn spawn_command(app: &App, command: Command) {
    let client = app.gemini.clone();
    let tx = app.events_tx.clone();

    match command {
        Command::FollowUp {
            kind,
            answers,
            epoch,
        } => {
            tokio::spawn(async move {
                tokio::time::sleep(PACING_DELAY).await;
                let result = client.follow_up_question(kind, &answers).await;
                let _ = tx.send(AppEvent::FollowUpReady {
                    epoch,
                    kind,
                    result,
                });
            });
        }
        Command::BuilderList { answers, epoch } => {
            tokio::spawn(async move {
                let result = client.builder_requests(&answers).await;
                let _ = tx.send(AppEvent::BuilderReady { epoch, result });
            });
        }
        Command::Continuation {
            answers,
            text,
            epoch,
        } => {
            tokio::spawn(async move {
                let result = client.continue_chat(&answers, &text).await;
                let _ = tx.send(AppEvent::ContinuationReady { epoch, result });
            });
        }
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_result = app
        .result_area
        .map(|r| point_in_rect(x, y, r))
        .unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            if in_chat {
                app.scroll_chat_down(3);
            } else if in_result {
                app.scroll_result_down(3);
            }
        }
        MouseEventKind::ScrollUp => {
            if in_chat {
                app.scroll_chat_up(3);
            } else if in_result {
                app.scroll_result_up(3);
            }
        }
        _ => {}
    }
}

fn copy_to_clipboard(text: &str) {
    use std::io::Write;
    use std::process::{Command, Stdio};

    for program in ["pbcopy", "wl-copy", "xclip"] {
        let mut command = Command::new(program);
        if program == "xclip" {
            command.args(["-selection", "clipboard"]);
        }
        if let Ok(mut child) = command.stdin(Stdio::piped()).spawn() {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(text.as_bytes());
            }
            return;
        }
    }
}
