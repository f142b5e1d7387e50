//! Typed commands parsed from inbound text lines
//!
//! Every routed line becomes a [`Command`] before the router touches any
//! state, so each variant carries exactly the fields legal for it and the
//! dispatch table lives in one place.

use std::fmt;

/// Maximum length of a handle or group name, in bytes
pub const MAX_NAME_LEN: usize = 32;

/// A message or file destination, tagged by its sigil (`@` user, `#` group)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    User(String),
    Group(String),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::User(handle) => write!(f, "@{}", handle),
            Destination::Group(name) => write!(f, "#{}", name),
        }
    }
}

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `@<handle>:<text>`: private message
    Private { to: String, text: String },
    /// `#<group>:<text>`: group message
    Group { group: String, text: String },
    /// `/creategroup <name>`
    CreateGroup { name: String },
    /// `/joingroup <name>`
    JoinGroup { name: String },
    /// `/sendfile <destination> <filename> <length>`; the declared number of
    /// raw payload bytes follows this line on the wire
    SendFile {
        dest: Destination,
        filename: String,
        length: u64,
    },
}

/// Why a line failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// `@`/`#` form with an empty target name
    EmptyTarget,
    /// `@`/`#` form without a `:` separator
    MissingSeparator,
    /// A `/` command with the wrong number of arguments
    BadArity { command: &'static str, usage: &'static str },
    /// Handle or group name fails validation
    BadName(String),
    /// `/sendfile` length is not a non-negative integer
    BadLength(String),
    /// A `/` command this server does not know
    UnknownCommand(String),
    /// A line with no recognized prefix; there is no broadcast fallback
    Unrecognized,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::EmptyTarget => write!(f, "destination name is empty"),
            ParseError::MissingSeparator => write!(f, "expected ':' after the destination"),
            ParseError::BadArity { command, usage } => {
                write!(f, "{} usage: {}", command, usage)
            }
            ParseError::BadName(name) => write!(f, "invalid name '{}'", name),
            ParseError::BadLength(value) => {
                write!(f, "'{}' is not a valid byte length", value)
            }
            ParseError::UnknownCommand(cmd) => write!(f, "unknown command '{}'", cmd),
            ParseError::Unrecognized => write!(
                f,
                "unrecognized input; use @user:, #group:, /creategroup, /joingroup or /sendfile"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Validate a handle or group name.
///
/// Names are 1 to [`MAX_NAME_LEN`] bytes, contain no whitespace, and must not
/// begin with a routing sigil.
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.chars().any(char::is_whitespace)
        && !name.starts_with(['@', '#', '/'])
}

/// Parse one trimmed text line into a [`Command`].
pub fn parse(line: &str) -> Result<Command, ParseError> {
    if let Some(rest) = line.strip_prefix('@') {
        let (to, text) = split_addressed(rest)?;
        return Ok(Command::Private { to, text });
    }

    if let Some(rest) = line.strip_prefix('#') {
        let (group, text) = split_addressed(rest)?;
        return Ok(Command::Group { group, text });
    }

    if line.starts_with('/') {
        return parse_slash_command(line);
    }

    Err(ParseError::Unrecognized)
}

/// Split `<name>:<text>` on the first `:`.
fn split_addressed(rest: &str) -> Result<(String, String), ParseError> {
    let (name, text) = rest.split_once(':').ok_or(ParseError::MissingSeparator)?;
    if name.is_empty() {
        return Err(ParseError::EmptyTarget);
    }
    if !valid_name(name) {
        return Err(ParseError::BadName(name.to_string()));
    }
    Ok((name.to_string(), text.to_string()))
}

fn parse_slash_command(line: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    match tokens[0] {
        "/creategroup" => {
            let name = single_name_arg(&tokens, "/creategroup", "/creategroup <name>")?;
            Ok(Command::CreateGroup { name })
        }
        "/joingroup" => {
            let name = single_name_arg(&tokens, "/joingroup", "/joingroup <name>")?;
            Ok(Command::JoinGroup { name })
        }
        "/sendfile" => parse_sendfile(&tokens),
        other => Err(ParseError::UnknownCommand(other.to_string())),
    }
}

fn single_name_arg(
    tokens: &[&str],
    command: &'static str,
    usage: &'static str,
) -> Result<String, ParseError> {
    if tokens.len() != 2 {
        return Err(ParseError::BadArity { command, usage });
    }
    let name = tokens[1];
    if !valid_name(name) {
        return Err(ParseError::BadName(name.to_string()));
    }
    Ok(name.to_string())
}

fn parse_sendfile(tokens: &[&str]) -> Result<Command, ParseError> {
    const USAGE: &str = "/sendfile <@user|#group> <filename> <length>";

    if tokens.len() != 4 {
        return Err(ParseError::BadArity {
            command: "/sendfile",
            usage: USAGE,
        });
    }

    let dest = parse_destination(tokens[1])?;
    let filename = tokens[2].to_string();
    let length: u64 = tokens[3]
        .parse()
        .map_err(|_| ParseError::BadLength(tokens[3].to_string()))?;

    Ok(Command::SendFile {
        dest,
        filename,
        length,
    })
}

fn parse_destination(token: &str) -> Result<Destination, ParseError> {
    let (name, tag): (&str, fn(String) -> Destination) =
        if let Some(name) = token.strip_prefix('@') {
            (name, Destination::User)
        } else if let Some(name) = token.strip_prefix('#') {
            (name, Destination::Group)
        } else {
            return Err(ParseError::BadName(token.to_string()));
        };

    if name.is_empty() {
        return Err(ParseError::EmptyTarget);
    }
    if !valid_name(name) {
        return Err(ParseError::BadName(name.to_string()));
    }
    Ok(tag(name.to_string()))
}
