//! Message normalization: interpolated values collapse to placeholder tokens
//! so messages differing only in ids, counts or quoted input share a pattern.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static DOUBLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"\n]*""#).expect("valid regex"));

// Only quotes that open a token, so apostrophes inside words survive.
static SINGLE_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|[^\w])'[^'\n]*'").expect("valid regex"));

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});

static HEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:0[xX][0-9a-fA-F]+|[0-9a-fA-F]{8,})\b").expect("valid regex")
});

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

pub const STR_TOKEN: &str = "<str>";
pub const UUID_TOKEN: &str = "<uuid>";
pub const HEX_TOKEN: &str = "<hex>";
pub const NUM_TOKEN: &str = "<num>";

/// Replace quoted literals, UUIDs, hex values and digit runs with placeholder
/// tokens and collapse whitespace.
pub fn normalize_message(message: &str) -> String {
    let out = DOUBLE_QUOTED.replace_all(message, STR_TOKEN);
    let out = SINGLE_QUOTED.replace_all(&out, |caps: &Captures<'_>| {
        format!("{}{}", &caps[1], STR_TOKEN)
    });
    let out = UUID.replace_all(&out, UUID_TOKEN);
    let out = HEX.replace_all(&out, |caps: &Captures<'_>| {
        // A long run of plain digits is still a number.
        if caps[0].bytes().all(|b| b.is_ascii_digit()) {
            NUM_TOKEN.to_string()
        } else {
            HEX_TOKEN.to_string()
        }
    });
    let out = DIGITS.replace_all(&out, NUM_TOKEN);
    WHITESPACE.replace_all(out.trim(), " ").into_owned()
}
