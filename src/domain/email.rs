use std::fmt;

/// Per-session message identifier as handed out by the mailbox search.
pub type MessageId = u32;

/// Marker appended to bodies cut at [`MAX_BODY_CHARS`].
pub const TRUNCATION_MARKER: &str = "... [truncated]";
pub const MAX_BODY_CHARS: usize = 3000;

pub const NO_SUBJECT: &str = "No Subject";
pub const UNKNOWN_HEADER: &str = "(unknown)";

/// One message exactly as the transport returned it.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    Attachment,
    PlainText,
    Html,
    Other,
}

/// A leaf MIME part.
#[derive(Debug, Clone)]
pub struct Part {
    pub content_type: String,
    pub kind: PartKind,
    pub charset: Option<String>,
    /// Transfer-decoded payload, or why transfer decoding failed.
    pub payload: Result<Vec<u8>, String>,
}

#[derive(Debug, Clone)]
pub enum Structure {
    Single(Part),
    /// Leaf parts of a multipart message in document order.
    Multipart(Vec<Part>),
}

#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub structure: Structure,
}

/// Bounded body text handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractedBody {
    Text(String),
    /// No usable text was found.
    Empty,
}

impl ExtractedBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Empty => None,
        }
    }
}

impl fmt::Display for ExtractedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Empty => f.write_str("Empty message body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryResult {
    pub subject: String,
    pub sender: String,
    pub date: String,
    pub summary: String,
}
