//! Filesystem glob expansion for `copy_files` patterns.
//!
//! Each `/`-separated component of a pattern may use shell wildcards:
//! - `*` matches zero or more characters
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` match one character from the set or range
//! - `[!abc]` or `[^abc]` match one character NOT in the set
//!
//! Wildcards never cross a `/`. Names starting with `.` only match when the
//! pattern component itself starts with `.`. A trailing `/` restricts matches
//! to directories. Zero matches is not an error.

use std::path::{Component, Path, PathBuf};

/// Upper bound on recursive match calls per name, so adversarial patterns
/// like `*a*a*a*a*b` cannot blow up on long file names.
const MAX_MATCH_CALLS: usize = 100_000;

/// Check if a pattern component contains glob metacharacters.
pub fn contains_glob(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// Match a single file name against a single pattern component.
pub fn glob_match(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    let pat: Vec<char> = pattern.chars().collect();
    let input: Vec<char> = name.chars().collect();
    let calls = std::cell::Cell::new(0usize);
    match_bounded(&pat, 0, &input, 0, &calls)
}

/// Expand `pattern` relative to `base` and return the matching paths, sorted.
///
/// Absolute patterns ignore `base`.
pub fn expand(base: &Path, pattern: &str) -> Vec<PathBuf> {
    let dirs_only = pattern.ends_with('/');
    let pattern_path = Path::new(pattern);

    let mut candidates = vec![if pattern_path.is_absolute() {
        PathBuf::new()
    } else {
        base.to_path_buf()
    }];

    let components: Vec<Component<'_>> = pattern_path.components().collect();
    if components.is_empty() {
        return Vec::new();
    }

    for (idx, component) in components.iter().enumerate() {
        let last = idx + 1 == components.len();
        let mut next = Vec::new();

        match component {
            Component::Normal(os) => {
                let part = os.to_string_lossy();
                for dir in &candidates {
                    if contains_glob(&part) {
                        next.extend(matching_entries(dir, &part));
                    } else {
                        next.push(dir.join(os));
                    }
                }
            }
            other => {
                // Root, prefix, `.` and `..` are taken literally.
                next.extend(candidates.iter().map(|dir| dir.join(other.as_os_str())));
            }
        }

        next.retain(|p| {
            if last && !dirs_only {
                p.symlink_metadata().is_ok()
            } else {
                p.is_dir()
            }
        });
        candidates = next;
        if candidates.is_empty() {
            break;
        }
    }

    candidates.sort();
    candidates
}

fn matching_entries(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| glob_match(pattern, &e.file_name().to_string_lossy()))
        .map(|e| dir.join(e.file_name()))
        .collect()
}

fn match_bounded(
    pattern: &[char],
    pi: usize,
    input: &[char],
    ii: usize,
    calls: &std::cell::Cell<usize>,
) -> bool {
    let count = calls.get() + 1;
    calls.set(count);
    if count > MAX_MATCH_CALLS {
        return false;
    }

    if pi >= pattern.len() {
        return ii >= input.len();
    }

    match pattern[pi] {
        '*' => {
            let mut next_pi = pi;
            while next_pi < pattern.len() && pattern[next_pi] == '*' {
                next_pi += 1;
            }
            if next_pi >= pattern.len() {
                return true;
            }
            (ii..=input.len()).any(|start| match_bounded(pattern, next_pi, input, start, calls))
        }
        '?' => ii < input.len() && match_bounded(pattern, pi + 1, input, ii + 1, calls),
        '[' => {
            if ii >= input.len() {
                return false;
            }
            match parse_char_class(&pattern[pi..], input[ii]) {
                Some((true, consumed)) => match_bounded(pattern, pi + consumed, input, ii + 1, calls),
                Some((false, _)) => false,
                // Unterminated class: `[` is a literal.
                None => input[ii] == '[' && match_bounded(pattern, pi + 1, input, ii + 1, calls),
            }
        }
        c => ii < input.len() && input[ii] == c && match_bounded(pattern, pi + 1, input, ii + 1, calls),
    }
}

/// Parse the class starting at `pattern[0] == '['`.
///
/// Returns `(matches, consumed)` or `None` when there is no closing `]`.
fn parse_char_class(pattern: &[char], ch: char) -> Option<(bool, usize)> {
    let mut i = 1;
    let negated = matches!(pattern.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < pattern.len() {
        let c = pattern[i];
        // `]` directly after the opening bracket is a literal member.
        if c == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;

        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            if pattern[i] <= ch && ch <= pattern[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if c == ch {
                matched = true;
            }
            i += 1;
        }
    }
    None
}
