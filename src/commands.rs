//! Console command parsing.

use std::fmt;
use std::path::PathBuf;

pub const HELP_TEXT: &str = r#"
Available commands:
  help                  Show this help
  state                 Show the session state

  login <password>      Queue an extra handshake
  ql <length>           Announce a content length
  qc <text>             Send a single query
  qb <file>             Send a file as a chunked query

  quit, exit            Exit the console
"#;

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Login(String),
    QueryLength(u16),
    Query(String),
    QueryFile(PathBuf),
    State,
    Help,
    Quit,
}

/// Why a console line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Usage(&'static str),
    InvalidLength(String),
    Unknown(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Usage(usage) => write!(f, "Usage: {}", usage),
            ParseError::InvalidLength(arg) => {
                write!(f, "invalid length '{}' (expected 0-65535)", arg)
            }
            ParseError::Unknown(cmd) => {
                write!(f, "Unknown command: {}. Type 'help' for help.", cmd)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<ReplCommand>, ParseError> {
    let line = line.trim();
    let Some((cmd, rest)) = split_command(line) else {
        return Ok(None);
    };

    let command = match cmd.to_lowercase().as_str() {
        "help" | "?" => ReplCommand::Help,
        "quit" | "exit" | "q" => ReplCommand::Quit,
        "state" => ReplCommand::State,

        "login" => match rest {
            "" => return Err(ParseError::Usage("login <password>")),
            password => ReplCommand::Login(password.to_string()),
        },

        "ql" => {
            let mut args = rest.split_whitespace();
            match (args.next(), args.next()) {
                (Some(arg), None) => {
                    let len = arg
                        .parse()
                        .map_err(|_| ParseError::InvalidLength(arg.to_string()))?;
                    ReplCommand::QueryLength(len)
                }
                _ => return Err(ParseError::Usage("ql <length>")),
            }
        }

        // Text runs to the end of the line, inner spaces included.
        "qc" => match rest {
            "" => return Err(ParseError::Usage("qc <text>")),
            text => ReplCommand::Query(text.to_string()),
        },

        "qb" => match rest {
            "" => return Err(ParseError::Usage("qb <file>")),
            path => ReplCommand::QueryFile(PathBuf::from(path)),
        },

        _ => return Err(ParseError::Unknown(cmd.to_string())),
    };

    Ok(Some(command))
}

fn split_command(line: &str) -> Option<(&str, &str)> {
    if line.is_empty() {
        return None;
    }
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => Some((cmd, rest.trim())),
        None => Some((line, "")),
    }
}
