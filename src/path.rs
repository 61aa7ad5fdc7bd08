//! A read-only pseudo filesystem over CLI commands.
//!
//! Junos has no shell to read files from, so paths are mapped onto `show` commands:
//!
//! * `/config/<rest>` reads `show configuration <rest>`
//! * `/operational/<rest>` reads `show <rest>`
//! * anything else is passed to `show` as-is

use super::CommandResult;

/// The CLI command that backs `path`.
pub(crate) fn command_for(path: &str) -> String {
    let path = path.trim();
    let command = if let Some(rest) = section(path, "/config") {
        format!("show configuration {}", rest)
    } else if let Some(rest) = section(path, "/operational") {
        format!("show {}", rest)
    } else {
        format!("show {}", path)
    };
    command.trim_end().to_owned()
}

fn section<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

/// The result of reading one pseudo path. See [`Connection::open_path`](crate::Connection::open_path).
#[derive(Debug, Clone)]
pub struct PathHandle {
    path: String,
    command: String,
    content: Option<String>,
}

impl PathHandle {
    pub(crate) fn new(path: &str, command: String, result: Result<CommandResult, crate::Error>) -> Self {
        let content = match result {
            Ok(result) if result.success() => Some(result.stdout),
            Ok(result) => {
                tracing::debug!(path, status = result.exit_status, "path read failed");
                None
            }
            Err(err) => {
                tracing::debug!(path, error = %err, "path read failed");
                None
            }
        };

        Self {
            path: path.to_owned(),
            command,
            content,
        }
    }

    /// The path as given.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The command the path maps to.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Output of the mapped command. Empty when it failed.
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Whether the mapped command succeeded and produced output.
    pub fn exists(&self) -> bool {
        !self.content().trim().is_empty()
    }
}
