//! Extraction of migrated source code from free-text LLM completions.

use std::sync::LazyLock;

use regex::Regex;

/// Marker the migration prompt allows the model to use for elided regions.
/// Must appear on a line of its own; `merge` resolves it against the
/// pre-migration snapshot.
pub const SKIP_MARKER: &str = "# <migrator:skipped>";

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```([A-Za-z0-9_+-]*)\s*$").expect("fence regex"));

#[derive(Debug, Clone)]
struct FencedBlock {
    lang: String,
    content: String,
}

/// Extract the rewritten file content from a completion.
///
/// Preference order: all ```python blocks joined in order, then the first
/// fenced block of any language, then the whole completion body. Completions
/// are free text; models frequently prepend prose around the code block, so
/// the surrounding text is discarded whenever a fence is present.
pub fn extract_code(completion: &str) -> String {
    let blocks = fenced_blocks(completion);

    let python: Vec<&FencedBlock> = blocks
        .iter()
        .filter(|block| block.lang == "python" || block.lang == "py")
        .collect();

    let code = if !python.is_empty() {
        python
            .iter()
            .map(|block| block.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    } else if let Some(first) = blocks.first() {
        first.content.clone()
    } else {
        completion.trim().to_string()
    };

    ensure_trailing_newline(code)
}

/// True if any line of `code` is a skip marker.
pub fn has_skip_markers(code: &str) -> bool {
    code.lines().any(|line| line.trim() == SKIP_MARKER)
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(caps) = FENCE_RE.captures(line) {
            match current.take() {
                Some((lang, lines)) => blocks.push(FencedBlock {
                    lang,
                    content: lines.join("\n"),
                }),
                None => {
                    let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                    current = Some((lang.to_ascii_lowercase(), Vec::new()));
                }
            }
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }

    // An unterminated fence still counts: take everything to the end.
    if let Some((lang, lines)) = current {
        blocks.push(FencedBlock {
            lang,
            content: lines.join("\n"),
        });
    }

    blocks
}

fn ensure_trailing_newline(mut code: String) -> String {
    if !code.ends_with('\n') {
        code.push('\n');
    }
    code
}
