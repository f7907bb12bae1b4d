// src/core/pubsub/glob.rs

//! Glob matching for pattern subscriptions.

/// Matches a channel name against a glob-style pattern.
///
/// Supports `*` (any run, including empty), `?` (exactly one UTF-8 character),
/// `[...]`, `[^...]`, ranges such as `[a-z]`, and `\` escapes.
/// The matcher is iterative so hostile patterns cannot overflow the stack.
pub fn glob_match(pattern: &[u8], string: &[u8]) -> bool {
    let mut p_idx = 0;
    let mut s_idx = 0;
    // Pattern index just after the last `*`, and where the string resumes on backtrack.
    let mut star_p_idx = None;
    let mut star_s_idx = None;

    while s_idx < string.len() {
        let step = match pattern.get(p_idx) {
            Some(b'?') => Some((1, utf8_width(&string[s_idx..]))),
            Some(b'*') => {
                star_p_idx = Some(p_idx + 1);
                star_s_idx = Some(s_idx);
                Some((1, 0))
            }
            Some(b'[') => parse_char_set(&pattern[p_idx..], string[s_idx]).map(|len| (len, 1)),
            Some(b'\\') if p_idx + 1 < pattern.len() => {
                (pattern[p_idx + 1] == string[s_idx]).then_some((2, 1))
            }
            Some(&p_char) if p_char == string[s_idx] => Some((1, 1)),
            _ => None,
        };

        match step {
            Some((p_len, s_len)) => {
                p_idx += p_len;
                s_idx += s_len;
            }
            None => match (star_p_idx, star_s_idx) {
                // Let the last `*` swallow one more byte and retry.
                (Some(p), Some(s)) => {
                    p_idx = p;
                    s_idx = s + 1;
                    star_s_idx = Some(s + 1);
                }
                _ => return false,
            },
        }
    }

    while p_idx < pattern.len() && pattern[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == pattern.len()
}

/// Returns how many bytes the UTF-8 character starting at `s[0]` occupies.
/// Invalid or truncated sequences count as a single byte.
fn utf8_width(s: &[u8]) -> usize {
    let width = match s[0] {
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF7 => 4,
        _ => 1,
    };
    if width > s.len() || !s[1..width].iter().all(|b| b & 0xC0 == 0x80) {
        1
    } else {
        width
    }
}

/// Checks `char_to_match` against the set starting at `pattern_segment[0] == b'['`.
/// Returns the length of the set (including brackets) on a match.
fn parse_char_set(pattern_segment: &[u8], char_to_match: u8) -> Option<usize> {
    if pattern_segment.len() < 3 || pattern_segment[0] != b'[' {
        return None;
    }

    let mut p_idx = 1;
    let negated = if pattern_segment.get(p_idx) == Some(&b'^') {
        p_idx += 1;
        true
    } else {
        false
    };

    let mut matched = false;
    while p_idx < pattern_segment.len() && pattern_segment[p_idx] != b']' {
        let p_char = pattern_segment[p_idx];

        if p_idx + 2 < pattern_segment.len()
            && pattern_segment[p_idx + 1] == b'-'
            && pattern_segment[p_idx + 2] != b']'
        {
            let end_range = pattern_segment[p_idx + 2];
            let (lo, hi) = if p_char <= end_range {
                (p_char, end_range)
            } else {
                (end_range, p_char)
            };
            if (lo..=hi).contains(&char_to_match) {
                matched = true;
            }
            p_idx += 3;
        } else {
            if p_char == char_to_match {
                matched = true;
            }
            p_idx += 1;
        }
    }

    // An unterminated set never matches.
    if p_idx < pattern_segment.len() && (matched != negated) {
        Some(p_idx + 1)
    } else {
        None
    }
}
