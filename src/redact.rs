//! Credential redaction for diagnostic output.
//!
//! Every string that may carry a secret (proxy command lines, `ssh` stderr, command text) goes
//! through [`redact`] before it reaches a `tracing` event or an error message.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

const MARKER: &str = "[REDACTED]";

/// Maximum length of a redacted line before it is truncated.
const MAX_LINE_LENGTH: usize = 2048;

struct Pattern {
    regex: Regex,
    replacement: &'static str,
}

static PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    [
        // private key blocks
        (
            r"(?s)-----BEGIN[^-]*PRIVATE KEY-----.*?-----END[^-]*PRIVATE KEY-----",
            MARKER,
        ),
        // native client proxy strings carry the password inline
        (r#"(-pw\s+)("[^"]*"|'[^']*'|\S+)"#, "${1}[REDACTED]"),
        // askpass helpers named inline, e.g. in a bastion proxy command
        (r#"\b(SSH_ASKPASS=)('[^']*'|"[^"]*"|\S+)"#, "${1}[REDACTED]"),
        // sshpass style
        (r"(\bsshpass\s+-p\s*)\S+", "${1}[REDACTED]"),
        // key=value / key: value
        (
            r#"(?i)\b(password|passwd|pwd|passphrase|secret|bastion_password)(\s*[:=]\s*)("[^"]*"|'[^']*'|[^\s"',]+)"#,
            "${1}${2}[REDACTED]",
        ),
        // Junos configuration hashes
        (
            r#"(?i)(encrypted-password|secret|pre-shared-key\s+ascii-text)\s+"[^"]*""#,
            "${1} \"[REDACTED]\"",
        ),
    ]
    .iter()
    .map(|(pattern, replacement)| Pattern {
        regex: Regex::new(pattern).expect("redaction pattern"),
        replacement,
    })
    .collect()
});

static DETECT: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(PATTERNS.iter().map(|p| p.regex.as_str())).expect("redaction set"));

/// Mask credentials and key material in `input`.
///
/// Returns the input unchanged (and unallocated) when nothing sensitive is found. Over-long
/// lines are truncated.
pub fn redact(input: &str) -> Cow<'_, str> {
    let matched: Vec<usize> = DETECT.matches(input).into_iter().collect();

    let mut out = if matched.is_empty() {
        Cow::Borrowed(input)
    } else {
        let mut result = input.to_owned();
        for idx in matched {
            let pattern = &PATTERNS[idx];
            result = pattern
                .regex
                .replace_all(&result, pattern.replacement)
                .into_owned();
        }
        Cow::Owned(result)
    };

    if out.len() > MAX_LINE_LENGTH {
        let mut cut = MAX_LINE_LENGTH;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out = Cow::Owned(format!("{}... [truncated]", &out[..cut]));
    }

    out
}

/// Replace every occurrence of a known secret value.
///
/// Used where the secret is known up front, e.g. when reporting a proxy command that was built
/// with an embedded password.
pub(crate) fn scrub<'a>(input: &'a str, secret: &str) -> Cow<'a, str> {
    if secret.is_empty() || !input.contains(secret) {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(input.replace(secret, MARKER))
    }
}
