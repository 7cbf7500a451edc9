//! Reply shaping for Discord message limits
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

/// Discord message content limit
pub const MESSAGE_LIMIT: usize = 2000;

/// Characters taken by a "```\n" ... "\n```" fence
const FENCE_OVERHEAD: usize = 8;

/// Split text into message-sized pieces, preferring newline boundaries.
///
/// Never splits inside a UTF-8 character. Lines longer than `limit` are cut
/// at the last char boundary that fits.
pub fn split_reply(text: &str, limit: usize) -> Vec<String> {
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for line in text.split('\n') {
        let needed = if current.is_empty() { line.len() } else { line.len() + 1 };
        if current.len() + needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            continue;
        }

        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }

        let mut rest = line;
        while rest.len() > limit {
            let cut = floor_char_boundary(rest, limit);
            pieces.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        current.push_str(rest);
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Wrap command output in code fences, one fenced block per message
pub fn fenced_output(output: &str) -> Vec<String> {
    let trimmed = output.trim_end();
    if trimmed.is_empty() {
        return vec!["*(no output)*".to_string()];
    }
    split_reply(trimmed, MESSAGE_LIMIT - FENCE_OVERHEAD)
        .into_iter()
        .map(|piece| format!("```\n{piece}\n```"))
        .collect()
}

/// Cut text to `limit` bytes, marking the cut with an ellipsis
pub fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let end = floor_char_boundary(text, limit.saturating_sub(3));
    format!("{}...", &text[..end])
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
