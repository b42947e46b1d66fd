//! Rendering of bot messages.
//!
//! All messages use Telegram's HTML parse mode, so every piece of user or
//! registry text is escaped before it is embedded. Long messages are split
//! into chunks that stay under the platform limit.

use chrono::{DateTime, Utc};

use crate::types::display_time;

/// Maximum characters per outgoing message chunk.
pub const MESSAGE_CHUNK_LIMIT: usize = 4000;

/// Escape the characters that are structural in HTML markup.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Render a titled block: bold title, blank line, one escaped line per entry.
pub fn format_block<S: AsRef<str>>(title: &str, lines: &[S]) -> String {
    let mut block = format!("<b>{}</b>\n\n", escape_html(title));
    for line in lines {
        block.push_str(&escape_html(line.as_ref()));
        block.push('\n');
    }
    block
}

/// Italic "Retrieved at" footer appended to lookup results.
pub fn retrieved_footer(at: DateTime<Utc>) -> String {
    format!("\n<i>Retrieved at {} UTC</i>", display_time(at))
}

/// Non-blank lines of a raw reply, with carriage returns removed.
pub fn non_blank_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Longest HTML entity `escape_html` produces, in bytes.
const MAX_ENTITY_LEN: usize = 6;

/// Split `text` into ordered chunks of at most `limit` characters.
///
/// Chunks break after a newline whenever possible, so markup on a single
/// line stays intact. A line longer than `limit` is sliced by characters,
/// never inside an HTML entity such as `&amp;`. Concatenating the chunks
/// always yields the original text.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len <= limit {
            current.push_str(line);
            current_len = line_len;
            continue;
        }

        for ch in line.chars() {
            if current_len == limit {
                let carry = match open_entity_start(&current) {
                    Some(idx) => current.split_off(idx),
                    None => String::new(),
                };
                chunks.push(std::mem::take(&mut current));
                current_len = carry.chars().count();
                current = carry;
            }
            current.push(ch);
            current_len += 1;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Byte index of a trailing `&` whose entity is not closed yet.
///
/// Returns `None` at the start of the chunk so slicing always progresses.
fn open_entity_start(chunk: &str) -> Option<usize> {
    let idx = chunk.rfind('&')?;
    let tail = &chunk[idx..];
    if idx > 0 && tail.len() < MAX_ENTITY_LEN && !tail.contains(';') {
        Some(idx)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>Tom & \"Jerry's\"</b>"),
            "&lt;b&gt;Tom &amp; &quot;Jerry&#x27;s&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_format_block() {
        let block = format_block("WHOIS for a<b>.com", &["Registrar: A & B", "x"]);
        assert_eq!(
            block,
            "<b>WHOIS for a&lt;b&gt;.com</b>\n\nRegistrar: A &amp; B\nx\n"
        );
    }

    #[test]
    fn test_retrieved_footer() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            retrieved_footer(at),
            "\n<i>Retrieved at 2024-01-02 03:04:05 UTC</i>"
        );
    }

    #[test]
    fn test_non_blank_lines() {
        assert_eq!(
            non_blank_lines("a\r\n\n   \n  b  \n"),
            vec!["a", "  b  "]
        );
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        assert_eq!(chunk_message("hello", 4000), vec!["hello"]);
        assert_eq!(chunk_message("", 4000), vec![""]);
    }

    #[test]
    fn test_chunk_9000_chars_without_newlines() {
        let text = "a".repeat(9000);
        let chunks = chunk_message(&text, MESSAGE_CHUNK_LIMIT);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_CHUNK_LIMIT));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_9000_chars_on_line_boundaries() {
        let line = format!("{}\n", "b".repeat(29));
        let text = line.repeat(300);
        assert_eq!(text.chars().count(), 9000);

        let chunks = chunk_message(&text, MESSAGE_CHUNK_LIMIT);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_CHUNK_LIMIT));
        assert!(chunks.iter().all(|c| c.ends_with('\n')));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_counts_characters_not_bytes() {
        let text = "é".repeat(10);
        let chunks = chunk_message(&text, 4);
        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
    }

    #[test]
    fn test_chunk_mixed_long_line() {
        let text = format!("short\n{}\ntail", "c".repeat(10));
        let chunks = chunk_message(&text, 6);
        assert!(chunks.iter().all(|c| c.chars().count() <= 6));
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks[0], "short\n");
    }

    #[test]
    fn test_chunk_keeps_entities_whole() {
        let text = format!("{}&amp;{}", "a".repeat(3998), "b".repeat(10));
        let chunks = chunk_message(&text, MESSAGE_CHUNK_LIMIT);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(3998));
        assert!(chunks[1].starts_with("&amp;"));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_chunk_closed_entity_at_boundary_stays() {
        let text = format!("{}&lt;{}", "a".repeat(6), "b".repeat(4));
        let chunks = chunk_message(&text, 10);

        assert_eq!(chunks, vec!["aaaaaa&lt;", "bbbb"]);
    }
}
