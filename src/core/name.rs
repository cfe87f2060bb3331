//! Purpose: Derive filesystem- and socket-safe tokens from free-form module names.
//! Exports: `sanitize`.
//! Role: Shared by address and discovery-path defaults so both agree on one token.
//! Invariants: Total and idempotent; output only holds `[a-z0-9~./-]`.
//! Invariants: An empty output is valid here; callers decide whether it is usable.

fn is_separator(ch: char) -> bool {
    matches!(ch, ' ' | '&' | '_' | '=' | '+' | ':')
}

fn is_path_safe(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '~' | '-' | '.' | '/')
}

pub fn sanitize(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for ch in lowered.chars() {
        let ch = if is_separator(ch) { '-' } else { ch };
        if !is_path_safe(ch) {
            continue;
        }
        if ch == '-' && out.ends_with('-') {
            continue;
        }
        out.push(ch);
    }
    out
}
