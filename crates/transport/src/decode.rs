//! Line-grammar decoder for workflow debug server messages.
//!
//! Every payload is a newline-separated record whose first line names the
//! message kind. The decoder turns a complete payload into a
//! [`ServerMessage`] without consulting any session state; path
//! translation and event decisions belong to the runtime layer.
//!
//! Grammar per kind:
//!
//! ```text
//! end
//! vars\n<N>\n<var-record>{N}
//! stack\n(<file>\n<element>\n)*
//! next\n<serverPath>\n<element>\n<N>\n<var-record>{N}\n(<file>\n<element>\n)*
//! exc\n<message>\n<N>\n<var-record>{N}\n(<file>\n<element>\n)*
//! ```
//!
//! A var-record is `name:globalFlag:type:value` where the value may itself
//! contain `:`. Records with fewer than four fields are dropped. An
//! unparseable variable count hides both the variables and any stack
//! section that would follow it.

/// One variable record from a `vars`/`next`/`exc` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarRecord {
    pub name: String,
    /// True when the scope flag marks the record as a global.
    pub global: bool,
    pub r#type: String,
    /// Trailing-whitespace-trimmed value; `string`-typed values are
    /// already wrapped in literal double quotes.
    pub value: String,
}

/// One (file, element) stack pair as transmitted; the file is still in
/// the server's path space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub file: String,
    pub element: String,
}

/// A decoded message from the workflow debug server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// The session is over.
    End,
    /// An exception was thrown.
    Exc {
        message: String,
        variables: Vec<VarRecord>,
        frames: Vec<RawFrame>,
    },
    /// Execution advanced to a new element.
    Next {
        /// Server-side path of the file now executing.
        path: String,
        /// Current element identifier; absent when the message was
        /// truncated before the element line.
        element: Option<String>,
        variables: Vec<VarRecord>,
        frames: Vec<RawFrame>,
    },
    /// A fresh variable snapshot.
    Vars { variables: Vec<VarRecord> },
    /// A fresh stack snapshot.
    Stack { frames: Vec<RawFrame> },
}

/// Decode one complete payload. Payloads with an unknown kind yield
/// `None` and are ignored by the caller.
pub fn decode_message(payload: &[u8]) -> Option<ServerMessage> {
    let text = String::from_utf8_lossy(payload);
    let lines: Vec<&str> = text.split('\n').collect();

    // split always yields at least one element
    match lines[0] {
        "end" => Some(ServerMessage::End),
        "exc" => {
            let message = lines.get(1).copied().unwrap_or("").to_string();
            let (variables, stack_start) = parse_variables(&lines, 2);
            let frames = parse_frames(&lines, stack_start);
            Some(ServerMessage::Exc {
                message,
                variables,
                frames,
            })
        }
        "next" => {
            let path = lines.get(1).copied().unwrap_or("").to_string();
            let element = lines.get(2).map(|s| s.to_string());
            let (variables, stack_start) = parse_variables(&lines, 3);
            let frames = parse_frames(&lines, stack_start);
            Some(ServerMessage::Next {
                path,
                element,
                variables,
                frames,
            })
        }
        "vars" => {
            let (variables, _) = parse_variables(&lines, 1);
            Some(ServerMessage::Vars { variables })
        }
        "stack" => Some(ServerMessage::Stack {
            frames: parse_frames(&lines, Some(1)),
        }),
        other => {
            tracing::debug!(kind = other, "unknown message kind");
            None
        }
    }
}

/// Parse the variable-count-then-records section whose count sits at
/// `count_index`. Returns the records and the line index where the stack
/// section starts, `None` when the count did not parse.
fn parse_variables(lines: &[&str], count_index: usize) -> (Vec<VarRecord>, Option<usize>) {
    let Some(count) = lines
        .get(count_index)
        .and_then(|s| s.trim().parse::<usize>().ok())
    else {
        return (Vec::new(), None);
    };

    let mut records = Vec::new();
    for line in lines.iter().skip(count_index + 1).take(count) {
        let tokens: Vec<&str> = line.split(':').collect();
        if tokens.len() < 4 {
            continue;
        }
        let r#type = tokens[2].to_string();
        let mut value = tokens[3..].join(":").trim_end().to_string();
        if r#type == "string" {
            value = format!("\"{value}\"");
        }
        records.push(VarRecord {
            name: tokens[0].to_string(),
            global: tokens[1] == "1",
            r#type,
            value,
        });
    }

    (records, Some(count_index + count + 1))
}

/// Consume (file, element) line pairs starting at `start`, stopping when
/// fewer than two lines remain.
fn parse_frames(lines: &[&str], start: Option<usize>) -> Vec<RawFrame> {
    let Some(start) = start else {
        return Vec::new();
    };

    let mut frames = Vec::new();
    let mut i = start;
    while i + 1 < lines.len() {
        frames.push(RawFrame {
            file: lines[i].trim().to_string(),
            element: lines[i + 1].trim().to_string(),
        });
        i += 2;
    }
    frames
}
