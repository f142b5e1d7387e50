//! Error handling for the chat relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Registration rejected: handle already in use
    DuplicateHandle(String),
    /// Registration rejected: handle fails validation
    InvalidHandle(String),
    /// Group creation rejected: name already taken
    GroupAlreadyExists(String),
    /// No group with that name
    GroupNotFound(String),
    /// Sender is not a member of the group
    NotAMember(String),
    /// Private message or file destination does not resolve to a live session
    RecipientNotFound(String),
    /// Unparsable or out-of-bounds control line
    MalformedCommand(String),
    /// Byte stream violated the framing rules
    Framing(String),
    /// Read/write error or abrupt close
    Transport(String),
    /// Registration rejected: server at capacity
    ResourceLimit(String),
}

impl RelayError {
    /// Create a duplicate handle error
    pub fn duplicate_handle<T: Into<String>>(handle: T) -> Self {
        RelayError::DuplicateHandle(handle.into())
    }

    /// Create an invalid handle error
    pub fn invalid_handle<T: Into<String>>(handle: T) -> Self {
        RelayError::InvalidHandle(handle.into())
    }

    /// Create a group already exists error
    pub fn group_exists<T: Into<String>>(name: T) -> Self {
        RelayError::GroupAlreadyExists(name.into())
    }

    /// Create a group not found error
    pub fn group_not_found<T: Into<String>>(name: T) -> Self {
        RelayError::GroupNotFound(name.into())
    }

    /// Create a not-a-member error
    pub fn not_a_member<T: Into<String>>(name: T) -> Self {
        RelayError::NotAMember(name.into())
    }

    /// Create a recipient not found error
    pub fn recipient_not_found<T: Into<String>>(handle: T) -> Self {
        RelayError::RecipientNotFound(handle.into())
    }

    /// Create a malformed command error
    pub fn malformed<T: Into<String>>(msg: T) -> Self {
        RelayError::MalformedCommand(msg.into())
    }

    /// Create a framing error
    pub fn framing<T: Into<String>>(msg: T) -> Self {
        RelayError::Framing(msg.into())
    }

    /// Create a transport error
    pub fn transport<T: Into<String>>(msg: T) -> Self {
        RelayError::Transport(msg.into())
    }

    /// Create a resource limit error
    pub fn resource_limit<T: Into<String>>(msg: T) -> Self {
        RelayError::ResourceLimit(msg.into())
    }

    /// Whether this error terminates the connection.
    ///
    /// Everything else is reported to the offending session as an error line
    /// and the connection stays open.
    pub fn closes_connection(&self) -> bool {
        matches!(
            self,
            RelayError::DuplicateHandle(_)
                | RelayError::InvalidHandle(_)
                | RelayError::Framing(_)
                | RelayError::Transport(_)
                | RelayError::ResourceLimit(_)
        )
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::DuplicateHandle(handle) => {
                write!(f, "handle '{}' is already in use", handle)
            }
            RelayError::InvalidHandle(handle) => write!(f, "invalid handle '{}'", handle),
            RelayError::GroupAlreadyExists(name) => {
                write!(f, "group '{}' already exists", name)
            }
            RelayError::GroupNotFound(name) => write!(f, "group '{}' not found", name),
            RelayError::NotAMember(name) => {
                write!(f, "you are not a member of group '{}'", name)
            }
            RelayError::RecipientNotFound(handle) => {
                write!(f, "no user '{}' is connected", handle)
            }
            RelayError::MalformedCommand(msg) => write!(f, "malformed command: {}", msg),
            RelayError::Framing(msg) => write!(f, "framing error: {}", msg),
            RelayError::Transport(msg) => write!(f, "transport error: {}", msg),
            RelayError::ResourceLimit(msg) => write!(f, "resource limit exceeded: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport(format!("IO error: {}", err))
    }
}
