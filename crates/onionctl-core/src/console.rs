//! Operator console: yes/no confirmation gate and free-text follow-ups.
//!
//! Parsing is kept in pure functions ([`parse_yes_no`], [`parse_port`]); the
//! [`Console`] trait supplies the prompt loops on top of two primitives so the
//! same logic runs against a terminal or a scripted byte buffer.

use std::io::{BufRead, Write};

use tracing::warn;

use crate::error::{ProvisionError, Result};

const YES: &[&str] = &["y", "yes"];
const NO: &[&str] = &["n", "no"];

/// Map a console answer to a boolean. Surrounding whitespace and case are ignored.
pub fn parse_yes_no(answer: &str) -> Result<bool> {
    let normalized = answer.trim().to_ascii_lowercase();
    if YES.contains(&normalized.as_str()) {
        Ok(true)
    } else if NO.contains(&normalized.as_str()) {
        Ok(false)
    } else {
        Err(ProvisionError::Input(format!(
            "expected y/yes or n/no, got '{}'",
            answer.trim()
        )))
    }
}

/// Parse a TCP port. Empty input selects `default`; anything unparsable falls
/// back to `default` as well, with a warning.
pub fn parse_port(answer: &str, default: u16) -> u16 {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return default;
    }
    match trimmed.parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            warn!("invalid port number: {trimmed}, defaulting to {default}");
            default
        }
    }
}

pub trait Console {
    /// Show `prompt` and read one line without its terminator.
    /// End of input is [`ProvisionError::EndOfInput`].
    fn read_line(&mut self, prompt: &str) -> Result<String>;

    /// Print a line to the operator.
    fn say(&mut self, text: &str) -> Result<()>;

    /// Ask until the answer is a recognised yes/no token.
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let prompt = format!("{question} [y/n]: ");
        loop {
            let answer = self.read_line(&prompt)?;
            match parse_yes_no(&answer) {
                Ok(value) => return Ok(value),
                Err(_) => self.say("Please answer with y or n.")?,
            }
        }
    }

    /// Ask a free-text question; empty input selects `default`.
    fn ask(&mut self, question: &str, default: &str) -> Result<String> {
        let answer = self.read_line(&format!("{question} (default: {default}): "))?;
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            Ok(default.to_string())
        } else {
            Ok(trimmed.to_string())
        }
    }

    fn ask_port(&mut self, question: &str, default: u16) -> Result<u16> {
        let answer = self.read_line(&format!("{question} (default: {default}): "))?;
        Ok(parse_port(&answer, default))
    }

    /// Capture multi-line text. Blank lines before the first content line are
    /// ignored; afterwards an empty line or end of input finishes the block.
    fn read_block(&mut self, intro: &str) -> Result<Vec<String>> {
        self.say(intro)?;
        let mut lines = Vec::new();
        loop {
            let line = match self.read_line("") {
                Ok(line) => line,
                Err(ProvisionError::EndOfInput) => break,
                Err(e) => return Err(e),
            };
            if line.trim().is_empty() {
                if lines.is_empty() {
                    continue;
                }
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }
}

// ---------------------------------------------------------------------------
// LineConsole
// ---------------------------------------------------------------------------

/// Line-oriented console over any reader/writer pair.
pub struct LineConsole<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> LineConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl LineConsole<std::io::StdinLock<'static>, std::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stdout())
    }
}

impl<R: BufRead, W: Write> Console for LineConsole<R, W> {
    fn read_line(&mut self, prompt: &str) -> Result<String> {
        if !prompt.is_empty() {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;
        }
        let mut line = String::new();
        let read = self.input.read_line(&mut line)?;
        if read == 0 {
            return Err(ProvisionError::EndOfInput);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    fn say(&mut self, text: &str) -> Result<()> {
        writeln!(self.output, "{text}")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
