//! Version string extraction and comparison for dependency checks.

use std::cmp::Ordering;

/// Marker for versions that could not be determined
pub const UNKNOWN_VERSION: &str = "unknown";

/// Pull a version out of tool output such as `git version 2.43.0`.
///
/// Lines are scanned for the first token that looks like a dotted version
/// (after dropping a leading `v` and trailing punctuation). Failing that, the
/// first purely numeric token is used. Otherwise the version is unknown.
pub fn parse_version_output(output: &str) -> String {
    let tokens = output.lines().flat_map(|line| line.split_whitespace());

    let mut first_numeric: Option<String> = None;
    for raw in tokens {
        let token = clean_token(raw);
        if token.len() >= 3 && token.contains('.') {
            return token.to_string();
        }
        if first_numeric.is_none() && !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            first_numeric = Some(token.to_string());
        }
    }

    first_numeric.unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

fn clean_token(raw: &str) -> &str {
    let token = raw.trim_matches(|c: char| c == '(' || c == '"' || c == '\'');
    let token = token
        .strip_prefix('v')
        .or_else(|| token.strip_prefix('V'))
        .unwrap_or(token);
    token.trim_end_matches(|c: char| c.is_ascii_punctuation())
}

/// Compare two version strings component by component.
///
/// Components are split on `.`, `-` and `+`; numeric components compare as
/// numbers, anything else lexically. Missing trailing components count as 0,
/// so `1.2` == `1.2.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let split = |s: &str| -> Vec<String> {
        s.trim()
            .trim_start_matches(['v', 'V'])
            .split(['.', '-', '+'])
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };
    let left = split(a);
    let right = split(b);

    for i in 0..left.len().max(right.len()) {
        let l = left.get(i).map(String::as_str).unwrap_or("0");
        let r = right.get(i).map(String::as_str).unwrap_or("0");
        let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Whether `installed` satisfies `required`. Unknown versions on either side
/// are treated as compatible.
pub fn is_version_compatible(installed: &str, required: &str) -> bool {
    if installed.is_empty() || installed == UNKNOWN_VERSION || required.is_empty() {
        return true;
    }
    compare_versions(installed, required) != Ordering::Less
}
