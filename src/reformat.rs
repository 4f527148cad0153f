// src/reformat.rs

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

/// Source formatter applied before and after docstrings are inserted.
pub trait Reformatter {
    /// Returns the formatted code, or `code` unchanged when formatting fails.
    fn reformat(&self, code: &str) -> String;
}

/// Leaves the code as it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Reformatter for Passthrough {
    fn reformat(&self, code: &str) -> String {
        code.to_string()
    }
}

/// Pipes code through an external command such as `yapf --style=google`.
///
/// The command reads the code on stdin and writes the result on stdout.
#[derive(Debug, Clone)]
pub struct CommandReformatter {
    program: String,
    args: Vec<String>,
}

impl CommandReformatter {
    /// Splits `command_line` on whitespace. Returns `None` for a blank line.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn run(&self, code: &str) -> Result<String, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format!("cannot start '{}': {}", self.program, e))?;

        // stdin is dropped at the end of this block so the formatter sees EOF.
        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| "stdin was not captured".to_string())?;
            if let Err(e) = stdin.write_all(code.as_bytes()) {
                drop(stdin);
                // Reap the child so it does not linger as a zombie.
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("cannot write to '{}': {}", self.program, e));
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format!("'{}' did not finish: {}", self.program, e))?;
        if !output.status.success() {
            return Err(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| format!("'{}' wrote invalid UTF-8: {}", self.program, e))
    }
}

impl Reformatter for CommandReformatter {
    fn reformat(&self, code: &str) -> String {
        match self.run(code) {
            Ok(formatted) => {
                debug!(program = %self.program, "code reformatted");
                formatted
            }
            Err(reason) => {
                warn!(%reason, "reformat failed, keeping code as is");
                code.to_string()
            }
        }
    }
}

/// Picks the reformatter for an optional command line.
pub fn from_command(command_line: Option<&str>) -> Box<dyn Reformatter> {
    match command_line.and_then(CommandReformatter::parse) {
        Some(command) => Box::new(command),
        None => Box::new(Passthrough),
    }
}
