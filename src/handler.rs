use std::path::Path;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::info;

use crate::app::{App, InputMode, Screen};
use crate::conversation::Message;
use crate::openai::OpenAIClient;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global quit, works in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.screen {
        Screen::SubjectSelect => handle_subject_select(app, key),
        Screen::Chat => match app.input_mode {
            InputMode::Normal => handle_chat_normal(app, key),
            InputMode::Editing => handle_chat_editing(app, key),
        },
    }
}

fn handle_subject_select(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('j') | KeyCode::Down => app.subject_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.subject_nav_up(),
        KeyCode::Enter => {
            if let Some(subject) = app.selected_subject() {
                app.choose_subject(subject);
            }
        }
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    // Model picker swallows keys while open
    if app.show_model_picker {
        match key.code {
            KeyCode::Esc => app.show_model_picker = false,
            KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
            KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
            KeyCode::Enter => app.select_model(),
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_to_bottom(),

        // Session actions
        KeyCode::Char('n') => app.new_chat(),
        KeyCode::Char('s') => app.change_subject(),
        KeyCode::Char('M') => app.open_model_picker(),

        // Back to typing
        KeyCode::Char('i') | KeyCode::Char('/') => {
            app.input_mode = InputMode::Editing;
            app.cursor = app.input.chars().count();
        }

        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit(app),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
}

/// One turn: build the user message (text, or `/image <path> [caption]`),
/// append and trim the history, and dispatch the request. Refused while a
/// request is outstanding.
fn submit(app: &mut App) {
    let raw = app.input.trim().to_string();
    if raw.is_empty() || !app.can_submit() {
        return;
    }
    app.input.clear();
    app.cursor = 0;

    let message = if let Some(rest) = raw.strip_prefix("/image") {
        match build_image_message(app, rest.trim()) {
            Some(message) => message,
            None => return, // a notice was pushed instead
        }
    } else {
        Message::user_text(&raw)
    };

    let snapshot = app.queue_user_message(message);
    let client = app.client.clone();
    let model = app.model.clone();
    app.pending = Some(tokio::spawn(async move {
        client.chat(&model, &snapshot).await
    }));
}

/// Read and encode the image named by the command. Any failure lands in the
/// transcript through the one inline error path.
fn build_image_message(app: &mut App, args: &str) -> Option<Message> {
    let (path, caption) = parse_image_command(args);
    if path.is_empty() {
        app.push_notice("Usage: /image <path> [caption]");
        return None;
    }
    if !OpenAIClient::supports_images(&app.model) {
        app.push_notice(
            "Image turns need the gpt-4o model. Press 'M' to switch, then try again.",
        );
        return None;
    }

    match std::fs::read(path) {
        Ok(bytes) => {
            info!(path, bytes = bytes.len(), "attaching image");
            Some(Message::user_image(&bytes, mime_for_path(path), caption))
        }
        Err(e) => {
            app.push_notice(&format!("Oops! Something went wrong: {}", e));
            None
        }
    }
}

/// Split `/image` arguments into the path token and the optional caption rest.
fn parse_image_command(args: &str) -> (&str, Option<&str>) {
    match args.split_once(char::is_whitespace) {
        Some((path, caption)) => {
            let caption = caption.trim();
            (path, (!caption.is_empty()).then_some(caption))
        }
        None => (args, None),
    }
}

fn mime_for_path(path: &str) -> &'static str {
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        // The API accepts jpeg for everything else we let through
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_command_splits_path_and_caption() {
        let (path, caption) = parse_image_command("homework.png I don't get step 3");
        assert_eq!(path, "homework.png");
        assert_eq!(caption, Some("I don't get step 3"));
    }

    #[test]
    fn image_command_without_caption() {
        let (path, caption) = parse_image_command("scan.jpg");
        assert_eq!(path, "scan.jpg");
        assert_eq!(caption, None);
    }

    #[test]
    fn image_command_empty_args() {
        let (path, caption) = parse_image_command("");
        assert_eq!(path, "");
        assert_eq!(caption, None);
    }

    #[test]
    fn mime_follows_extension_with_jpeg_fallback() {
        assert_eq!(mime_for_path("a/b/problem.PNG"), "image/png");
        assert_eq!(mime_for_path("scan.jpeg"), "image/jpeg");
        assert_eq!(mime_for_path("weird.webp"), "image/jpeg");
        assert_eq!(mime_for_path("noext"), "image/jpeg");
    }

    #[test]
    fn char_index_maps_to_byte_index() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }
}
