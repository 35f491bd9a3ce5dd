//! Small text helpers shared by logging call sites.

/// First `max_chars` characters of `text`, never splitting a character.
pub fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

/// `preview` plus a trailing "..." when the text was cut.
pub fn preview_ellipsis(text: &str, max_chars: usize) -> String {
    let head = preview(text, max_chars);
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head.to_string()
    }
}
