/*
Small helpers shared by the server modules.
*/

use chrono::Utc;

const PREVIEW_CHARS: usize = 50;

pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// first 50 characters of a message, for log lines
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}
