//! Quoting for strings we generate for other interpreters.
//!
//! Three consumers read text we write: `/bin/sh` (askpass scripts, `ProxyCommand` lines on
//! POSIX), the Windows command line (native client proxy commands) and PowerShell (the Windows
//! askpass script). Each has its own quoting rules.

use std::borrow::Cow;

/// Quote `s` for a POSIX shell.
///
/// Strings made only of safe characters are returned as-is.
pub(crate) fn posix(s: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(s))
}

/// Quote `s` as a single argument on a Windows command line.
pub(crate) fn windows(s: &str) -> Cow<'_, str> {
    shell_escape::windows::escape(Cow::Borrowed(s))
}

/// Quote `s` as a PowerShell single-quoted string literal.
///
/// Inside single quotes PowerShell only treats the quote characters themselves specially, and
/// a quote is written by doubling it. PowerShell also accepts the typographic single quotes as
/// delimiters, so those are doubled too.
pub(crate) fn powershell(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('\'');
    for ch in s.chars() {
        if matches!(ch, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            quoted.push(ch);
        }
        quoted.push(ch);
    }
    quoted.push('\'');
    quoted
}
