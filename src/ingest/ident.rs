//! SQL-safe identifiers derived from CSV headers and file names.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Column identifiers are cut to this many characters.
pub const MAX_COLUMN_IDENT_LEN: usize = 50;
/// Table base names are cut to this many characters.
pub const MAX_TABLE_BASE_LEN: usize = 30;

static DISALLOWED_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());
static UNDERSCORE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Lowercase `input` and reduce it to `[a-z0-9_]`, at most `max_len`
/// characters. Returns an empty string when nothing usable remains.
///
/// The result never starts with a digit and never starts or ends with `_`
/// unless the leading `_` was added to shield a digit. Normalizing an
/// already-normalized identifier returns it unchanged.
pub fn normalize_identifier(input: &str, max_len: usize) -> String {
    let lowered = input.trim().to_lowercase();
    let replaced = DISALLOWED_RUN.replace_all(&lowered, "_");
    let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
    let stripped = collapsed.trim_matches('_');
    if stripped.is_empty() {
        return String::new();
    }

    let prefixed = if stripped.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", stripped)
    } else {
        stripped.to_string()
    };

    let truncated: String = prefixed.chars().take(max_len).collect();
    truncated.trim_end_matches('_').to_string()
}

/// Normalize every header into a distinct column identifier.
///
/// Blank headers become `col_<position>` (1-based). A name that is already
/// taken gets the smallest free `_<k>` suffix, `k >= 2`.
pub fn unique_identifiers<S: AsRef<str>>(headers: &[S]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(headers.len());
    headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let mut base = normalize_identifier(header.as_ref(), MAX_COLUMN_IDENT_LEN);
            if base.is_empty() {
                base = format!("col_{}", idx + 1);
            }

            let mut candidate = base.clone();
            let mut suffix = 2;
            while used.contains(&candidate) {
                candidate = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Table base name from an uploaded file name: last path segment, without
/// its extension, normalized; `csv` when nothing usable remains.
pub fn table_base_name(file_name: &str) -> String {
    let segment = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    let stem = match segment.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => stem,
        _ => segment,
    };

    let normalized = normalize_identifier(stem, MAX_TABLE_BASE_LEN);
    if normalized.is_empty() {
        String::from("csv")
    } else {
        normalized
    }
}
