//! Core data types shared across the runtime.

use std::str::FromStr;

/// Identifier for one registered breakpoint; unique for the process
/// lifetime.
pub type BreakpointId = i64;

/// A breakpoint registered against a workflow element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: BreakpointId,
    /// Element identifier within the file.
    pub name: String,
    /// Normalized (lowercased, absolute, forward-slash) local path.
    pub path: String,
    /// True once the server has actually stopped on this breakpoint.
    pub verified: bool,
}

/// One breakpoint registration request from the session layer.
#[derive(Debug, Clone)]
pub struct BreakpointSpec {
    /// Element identifier to break on.
    pub name: String,
    /// URI of the file the element lives in.
    pub uri: String,
}

/// One decoded stack frame.
///
/// Frame ids are 1-based and reassigned on every decode pass. The wire
/// format carries no numeric line, only an element name, so `line` is
/// always 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    pub id: i64,
    pub line: i64,
    /// Element identifier at this frame.
    pub name: String,
    /// Local path of the file at this frame.
    pub file: String,
}

/// A flat variable. Nested structures are not supported, so
/// `variables_reference` is always 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub r#type: String,
    pub value: String,
    pub variables_reference: i64,
}

/// How to reach the workflow debug server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Plain TCP sockets, the only transport the server speaks.
    #[default]
    Sockets,
}

impl FromStr for TransportKind {
    type Err = eyre::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sockets" => Ok(Self::Sockets),
            other => Err(eyre::eyre!("invalid transport kind {other}")),
        }
    }
}
