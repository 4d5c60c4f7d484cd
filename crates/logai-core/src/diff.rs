//! Unified diff grammar check and helpers for model-generated patches.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DiffViolation {
    #[error("patch is empty")]
    Empty,
    #[error("missing '---' header line")]
    MissingOldHeader,
    #[error("missing '+++' header line")]
    MissingNewHeader,
    #[error("missing '@@' hunk marker")]
    MissingHunk,
    #[error("no added or removed lines")]
    NoChanges,
}

/// Check that `text` is a well-formed unified diff: a `---`/`+++` header
/// pair, at least one `@@` hunk marker and at least one `+`/`-` line that is
/// not a header.
pub fn validate_unified_diff(text: &str) -> Result<(), DiffViolation> {
    if text.trim().is_empty() {
        return Err(DiffViolation::Empty);
    }
    let mut old_header = false;
    let mut new_header = false;
    let mut hunk = false;
    let mut changes = false;
    for line in text.lines() {
        if line.starts_with("---") {
            old_header = true;
        } else if line.starts_with("+++") {
            new_header = true;
        } else if line.starts_with("@@") {
            hunk = true;
        } else if line.starts_with('+') || line.starts_with('-') {
            changes = true;
        }
    }
    if !old_header {
        Err(DiffViolation::MissingOldHeader)
    } else if !new_header {
        Err(DiffViolation::MissingNewHeader)
    } else if !hunk {
        Err(DiffViolation::MissingHunk)
    } else if !changes {
        Err(DiffViolation::NoChanges)
    } else {
        Ok(())
    }
}

/// Pull the diff out of a model reply: a ```diff / ```patch fence first,
/// then any fence whose body looks like a diff, then raw text starting at
/// the first `---` line.
pub fn extract_diff(reply: &str) -> Option<String> {
    for tag in ["```diff", "```patch"] {
        if let Some(body) = fenced_body(reply, tag) {
            return Some(body);
        }
    }
    if let Some(body) = fenced_body(reply, "```")
        && body.lines().any(|l| l.starts_with("---"))
    {
        return Some(body);
    }
    let start = reply
        .lines()
        .position(|l| l.starts_with("---"))?;
    let mut body = reply.lines().skip(start).collect::<Vec<_>>().join("\n");
    body.push('\n');
    Some(body)
}

fn fenced_body(text: &str, opener: &str) -> Option<String> {
    let start = text.find(opener)?;
    let after = &text[start + opener.len()..];
    // Skip the rest of the opener line (language tag, spaces).
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    let block = &body[..end];
    if block.trim().is_empty() {
        None
    } else {
        Some(block.to_string())
    }
}

/// Target file of the first file header: the `+++` path without its `b/`
/// prefix, or the `---` path when the file is being deleted.
pub fn target_file(diff: &str) -> Option<String> {
    let header_path = |line: &str, marker: &str, prefix: &str| -> Option<String> {
        let raw = line.strip_prefix(marker)?.trim();
        // Drop a trailing timestamp separated by a tab.
        let raw = raw.split('\t').next().unwrap_or(raw).trim();
        if raw.is_empty() || raw == "/dev/null" {
            return None;
        }
        Some(raw.strip_prefix(prefix).unwrap_or(raw).to_string())
    };
    diff.lines()
        .find_map(|l| header_path(l, "+++", "b/"))
        .or_else(|| diff.lines().find_map(|l| header_path(l, "---", "a/")))
}
