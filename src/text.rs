//! Text helpers for chat delivery.
//!
//! Everything here counts in `char`s, never bytes, so multi-byte output from the CLI
//! (box drawing, emoji, CJK) is never split mid-codepoint.

use strip_ansi_escapes::strip;

/// Remove ANSI escape sequences and carriage returns so chat clients render plain text.
pub fn sanitize(raw: &str) -> String {
    // `strip` discards every C0 control except '\n', so tabs are carried around it.
    raw.split('\t')
        .map(|segment| String::from_utf8_lossy(&strip(segment.as_bytes())).replace('\r', ""))
        .collect::<Vec<_>>()
        .join("\t")
}

/// Split `text` into consecutive pieces of at most `max_chars` characters.
///
/// Concatenating the pieces yields `text` again. A zero limit returns the whole text as
/// one piece rather than looping forever.
pub fn chunk(text: &str, max_chars: usize) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![text];
    }

    let mut pieces = Vec::new();
    let mut start = 0usize;
    let mut count = 0usize;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&text[start..]);
    pieces
}

/// Returns a prefix of the string up to `max_chars` characters.
pub fn safe_prefix(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Wrap non-blank text in a fenced code block.
pub fn wrap_code_block(text: &str) -> String {
    if text.trim().is_empty() {
        return text.to_string();
    }
    format!("```\n{text}\n```")
}

/// Human-readable elapsed time used by quiet-mode progress notices (`1m 5s`, `42s`).
pub fn format_elapsed(secs: u64) -> String {
    let minutes = secs / 60;
    let seconds = secs % 60;
    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_color_codes_and_carriage_returns() {
        assert_eq!(sanitize("\x1b[31mred\x1b[0m\r\nnext"), "red\nnext");
    }

    #[test]
    fn sanitize_preserves_tabs() {
        assert_eq!(sanitize("a\tb\x1b[1m\tc"), "a\tb\tc");
    }

    #[test]
    fn sanitize_keeps_tool_glyphs() {
        let line = "\n⏺ Bash({\"command\":\"ls\"})\n  ⎿ Running…\n";
        assert_eq!(sanitize(line), line);
    }

    #[test]
    fn chunk_splits_large_payload_into_fixed_pieces() {
        let payload = "x".repeat(100_000);
        let pieces = chunk(&payload, 39_000);
        let lengths: Vec<usize> = pieces.iter().map(|p| p.chars().count()).collect();
        assert_eq!(lengths, vec![39_000, 39_000, 22_000]);
        assert_eq!(pieces.concat(), payload);
    }

    #[test]
    fn chunk_counts_characters_not_bytes() {
        let payload = "é".repeat(5);
        let pieces = chunk(&payload, 2);
        assert_eq!(pieces, vec!["éé", "éé", "é"]);
    }

    #[test]
    fn chunk_handles_empty_and_exact_sizes() {
        assert!(chunk("", 10).is_empty());
        assert_eq!(chunk("abcd", 4), vec!["abcd"]);
        assert_eq!(chunk("abcd", 0), vec!["abcd"]);
    }

    #[test]
    fn safe_prefix_respects_boundaries() {
        assert_eq!(safe_prefix("héllo", 2), "hé");
        assert_eq!(safe_prefix("hi", 10), "hi");
        assert_eq!(safe_prefix("hi", 0), "");
    }

    #[test]
    fn wrap_code_block_skips_blank_text() {
        assert_eq!(wrap_code_block("  \n"), "  \n");
        assert_eq!(wrap_code_block("ls"), "```\nls\n```");
    }

    #[test]
    fn format_elapsed_switches_to_minutes() {
        assert_eq!(format_elapsed(42), "42s");
        assert_eq!(format_elapsed(65), "1m 5s");
    }
}
