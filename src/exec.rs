//! Command vetting, output cleanup and failure classification.

use super::Error;

use std::error::Error as _;

use once_cell::sync::Lazy;
use regex::Regex;

/// Exit status reported for a command that did not finish within the timeout.
pub const TIMEOUT_STATUS: i32 = 124;

const METACHARACTERS: &[char] = &[';', '&', '|', '>', '<', '`', '$', '(', ')'];

/// The outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Output with the echoed command and prompts removed.
    pub stdout: String,
    /// Standard error, or the transport error when the command never ran.
    pub stderr: String,
    /// 0 on success, 1 when the device reported a CLI error or the transport failed,
    /// [`TIMEOUT_STATUS`] on timeout.
    pub exit_status: i32,
}

impl CommandResult {
    /// Whether `exit_status` is 0.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Build a result from what the device printed.
    pub(crate) fn from_output(command: &str, stdout: &[u8], stderr: &[u8]) -> Self {
        let stdout = clean_output(&String::from_utf8_lossy(stdout), command);
        let stderr = String::from_utf8_lossy(stderr).trim().replace("\r\n", "\n");

        let exit_status = match failure(&stdout).or_else(|| failure(&stderr)) {
            Some(phrase) => {
                tracing::debug!(command, phrase, "device reported a CLI error");
                1
            }
            None => 0,
        };

        Self {
            stdout,
            stderr,
            exit_status,
        }
    }

    /// A result standing in for a command that could not be run.
    pub(crate) fn from_error(err: &Error) -> Self {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        let exit_status = match err {
            Error::Timeout { .. } => TIMEOUT_STATUS,
            _ => 1,
        };

        Self {
            stdout: String::new(),
            stderr: crate::redact::redact(&message).into_owned(),
            exit_status,
        }
    }
}

/// Check that `command` is a single plain CLI command.
///
/// Anything a shell on the far side could interpret (separators, redirections, substitutions,
/// line breaks) is refused, as are backslash escapes other than `\n`, `\r` and `\t`. Commands
/// are returned trimmed.
pub fn sanitize_command(command: &str) -> Result<&str, Error> {
    let reject = |reason| Error::UnsafeCommand {
        command: crate::redact::redact(command).into_owned(),
        reason,
    };

    let trimmed = command.trim();
    if trimmed.is_empty() {
        return Err(reject("command is empty"));
    }

    if trimmed.contains(['\n', '\r']) {
        return Err(reject("command contains a line break"));
    }
    if trimmed.chars().any(|c| c.is_control() && c != '\t') {
        return Err(reject("command contains a control character"));
    }
    if trimmed.contains(METACHARACTERS) {
        return Err(reject("command contains a shell metacharacter"));
    }

    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        if c == '\\' && !matches!(chars.next(), Some('n' | 'r' | 't')) {
            return Err(reject("command contains an unsupported escape sequence"));
        }
    }

    Ok(trimmed)
}

// `user@host>`, a bare `>`/`#`/`%`, or a routing-engine banner such as `{master:0}`
static PROMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\{[\w:\-]+\}|(?:[\w.\-]+@[\w.\-]+)?[>#%])\s*$").expect("prompt pattern")
});

/// Strip what an interactive CLI adds around a command's output.
///
/// Line endings are normalized. Leading and trailing lines that are blank, hold only a prompt,
/// or echo `command` (bare or after a prompt) are dropped; the body in between is kept as-is.
pub fn clean_output(raw: &str, command: &str) -> String {
    let raw = raw.replace("\r\n", "\n").replace('\r', "");
    let command = command.trim();

    let echoed = if command.is_empty() {
        None
    } else {
        Regex::new(&format!(
            r"^\s*(?:(?:[\w.\-]+@[\w.\-]+)?[>#%]\s*)?{}\s*$",
            regex::escape(command)
        ))
        .ok()
    };
    let is_noise = |line: &str| {
        line.trim().is_empty()
            || PROMPT.is_match(line)
            || echoed.as_ref().map_or(false, |echoed| echoed.is_match(line))
    };

    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.iter().position(|l| !is_noise(*l));
    let end = lines.iter().rposition(|l| !is_noise(*l));
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

static FAILURES: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        // anchored: configuration text such as descriptions may contain "error:" mid-line
        ("error:", r"(?im)^\s*error:"),
        ("syntax error", r"(?i)syntax error"),
        ("invalid command", r"(?i)invalid command"),
        ("unknown command", r"(?i)unknown command"),
        ("missing argument", r"(?i)missing argument"),
    ]
    .iter()
    .map(|(phrase, pattern)| (*phrase, Regex::new(pattern).expect("failure pattern")))
    .collect()
});

fn failure(output: &str) -> Option<&'static str> {
    FAILURES
        .iter()
        .find(|(_, regex)| regex.is_match(output))
        .map(|(phrase, _)| *phrase)
}

/// 1 if `output` carries one of the Junos CLI error phrasings, 0 otherwise.
pub fn classify(output: &str) -> i32 {
    if failure(output).is_some() {
        1
    } else {
        0
    }
}
