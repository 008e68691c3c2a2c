//! Textual repairs for near-JSON model output.
//!
//! Every pass is string-literal aware: brackets, commas and comment markers inside
//! quoted strings are left alone.

/// Upper bound on stray-item relocation passes.
pub const MAX_STRAY_PASSES: usize = 20;

/// Strip comments, drop trailing commas, then relocate stray array items.
pub fn repair_common(text: &str) -> String {
    relocate_stray_items(&remove_trailing_commas(&strip_comments(text)))
}

/// Remove `// ...` line comments and `/* ... */` block comments.
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Delete commas that directly precede a closing `}` or `]`.
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            out.push(c);
            if c == '\\' {
                if let Some(&escaped) = chars.get(i + 1) {
                    out.push(escaped);
                    i += 1;
                }
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Move quoted items emitted after an array's closing bracket back inside it.
///
/// `["a","b"],"c"]` becomes `["a","b","c"]`, and `{"k": ["a"], "b"}` becomes
/// `{"k": ["a", "b"]}`. Applied until stable or [`MAX_STRAY_PASSES`] is reached.
pub fn relocate_stray_items(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_STRAY_PASSES {
        match relocate_once(&current) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn relocate_once(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            match b {
                b'\\' => i += 1,
                b'"' => in_string = false,
                _ => {}
            }
            i += 1;
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' => {
                stack.pop();
            }
            b']' => {
                stack.pop();
                // Inside an enclosing array, `], "x"` is a legal sibling
                if stack.last() != Some(&b'[') {
                    if let Some(fixed) = relocate_at(text, i) {
                        return Some(fixed);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn relocate_at(text: &str, close: usize) -> Option<String> {
    let bytes = text.as_bytes();
    let mut pos = close + 1;
    let mut item_ends: Vec<usize> = Vec::new();

    loop {
        let comma = skip_whitespace(bytes, pos);
        if bytes.get(comma) != Some(&b',') {
            break;
        }
        let quote = skip_whitespace(bytes, comma + 1);
        if bytes.get(quote) != Some(&b'"') {
            break;
        }
        let end = string_end(bytes, quote)?;
        item_ends.push(end);
        pos = end;
    }

    let terminator = bytes.get(skip_whitespace(bytes, pos)).copied();
    let keep = match terminator {
        Some(b']') | Some(b'}') => item_ends.len(),
        // The last string is a key, the ones before it are strays
        Some(b':') => item_ends.len().saturating_sub(1),
        _ => 0,
    };
    if keep == 0 {
        return None;
    }

    let last_end = item_ends[keep - 1];
    let closes_later = terminator == Some(b']') && keep == item_ends.len();

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..close]);
    out.push_str(&text[close + 1..last_end]);
    if !closes_later {
        out.push(']');
    }
    out.push_str(&text[last_end..]);
    Some(out)
}

fn skip_whitespace(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Index just past the closing quote of the string starting at `start`.
fn string_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}
