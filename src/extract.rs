//! Snippet extraction from richer document content.
//!
//! Computation nodes may store a bare snippet or a snippet embedded in
//! markdown-like text. Extraction picks the fenced block tagged with a
//! recognized language, otherwise the first fenced block, otherwise the
//! whole trimmed content.

/// Language tags recognized as the execution language (compared ASCII case-insensitively).
pub const LANGUAGE_ALIASES: &[&str] = &["python", "python3", "py"];

/// A fenced block found in the content.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FencedBlock<'a> {
    lang: &'a str,
    body: String,
}

/// Extract the runnable snippet from `content`.
///
/// Never fails. Empty or whitespace-only input yields an empty string,
/// which the validator rejects as "no code provided".
pub fn extract_code(content: &str) -> String {
    let blocks = fenced_blocks(content);

    let chosen = blocks
        .iter()
        .find(|b| is_target_language(b.lang))
        .or_else(|| blocks.first());

    match chosen {
        Some(block) => {
            tracing::debug!(blocks = blocks.len(), lang = block.lang, "Extracted fenced block");
            block.body.trim().to_string()
        }
        None => content.trim().to_string(),
    }
}

fn is_target_language(lang: &str) -> bool {
    LANGUAGE_ALIASES
        .iter()
        .any(|alias| alias.eq_ignore_ascii_case(lang))
}

/// Opening or closing fence: `(fence char, fence length, info string)`.
fn parse_fence(line: &str) -> Option<(char, usize, &str)> {
    let trimmed = line.trim_start();
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|&c| c == ch).count();
    if len < 3 {
        return None;
    }
    // Fence chars are ASCII, so `len` is also a byte offset.
    Some((ch, len, trimmed[len..].trim()))
}

fn fenced_blocks(content: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let Some((ch, len, info)) = parse_fence(line) else {
            continue;
        };
        // Only the first word of the info string is the language tag.
        let lang = info.split_whitespace().next().unwrap_or("");

        let mut body = String::new();
        for inner in lines.by_ref() {
            if let Some((close_ch, close_len, rest)) = parse_fence(inner) {
                if close_ch == ch && close_len >= len && rest.is_empty() {
                    break;
                }
            }
            body.push_str(inner);
            body.push('\n');
        }

        blocks.push(FencedBlock { lang, body });
    }

    blocks
}
