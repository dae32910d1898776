/// Input schemas for exported conversation archives, and the normalized model
/// the rest of the pipeline works on.
///
/// Two export layouts are accepted, both as a top-level JSON array:
///
/// - **graph form**: each conversation carries a `mapping` of node id to node,
///   where nodes point at their `parent` and `children` and optionally hold a
///   `message`. A `current_node` names the leaf of the active branch.
/// - **flat form**: each conversation carries an ordered `messages` array.
///
/// Parsing is two-staged. `Raw*` structs mirror the wire format loosely (every
/// optional field defaulted) and [`parse_conversation`] validates them into a
/// [`Conversation`], so one malformed conversation never poisons the file.
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ConvertError;

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// A point in time as found in the export.
///
/// Exports store seconds since the epoch as floats, but a field may also be
/// `null`, missing, or garbage. Garbage is kept verbatim so it can be reported
/// and replaced by a placeholder when rendering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Timestamp {
    #[default]
    Absent,
    At(DateTime<Utc>),
    Invalid(String),
}

impl Timestamp {
    pub fn from_secs(secs: f64) -> Self {
        if !secs.is_finite() {
            return Self::Invalid(secs.to_string());
        }
        let whole = secs.floor();
        let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
        match DateTime::from_timestamp(whole as i64, nanos) {
            Some(dt) => Self::At(dt),
            None => Self::Invalid(secs.to_string()),
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::At(dt) => Some(*dt),
            _ => None,
        }
    }

    /// `Ok(None)` when absent, `Err` when present but not convertible.
    pub fn resolve(&self) -> Result<Option<DateTime<Utc>>, ConvertError> {
        match self {
            Self::Absent => Ok(None),
            Self::At(dt) => Ok(Some(*dt)),
            Self::Invalid(raw) => Err(ConvertError::Timestamp(raw.clone())),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => Self::Absent,
            Value::Number(n) => match n.as_f64() {
                Some(secs) => Self::from_secs(secs),
                None => Self::Invalid(n.to_string()),
            },
            Value::String(s) => {
                if let Ok(secs) = s.trim().parse::<f64>() {
                    Self::from_secs(secs)
                } else if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
                    Self::At(dt.with_timezone(&Utc))
                } else {
                    Self::Invalid(s)
                }
            }
            other => Self::Invalid(other.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Normalized model
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "tool" => Self::Tool,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Heading label: users are "User", every other speaker is "Assistant".
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            _ => "Assistant",
        }
    }
}

/// One unit of message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),
    ImageAssetPointer {
        pointer: String,
        size_bytes: u64,
        width: u32,
        height: u32,
    },
    /// A content kind this crate does not know how to render.
    Unsupported { kind: String },
}

#[derive(Deserialize)]
struct ImagePart {
    asset_pointer: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

impl ContentItem {
    /// Interpret one element of a `parts`/`content` array.
    ///
    /// Strings are text. Objects are dispatched on their `content_type`; kinds
    /// without a handler become [`ContentItem::Unsupported`].
    pub fn from_part(part: &Value) -> Self {
        let obj = match part {
            Value::String(s) => return Self::Text(s.clone()),
            Value::Object(obj) => obj,
            Value::Null => return Self::Unsupported { kind: "null".into() },
            Value::Bool(_) => return Self::Unsupported { kind: "bool".into() },
            Value::Number(_) => return Self::Unsupported { kind: "number".into() },
            Value::Array(_) => return Self::Unsupported { kind: "array".into() },
        };

        let kind = obj
            .get("content_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        match kind {
            "text" => match obj.get("text").and_then(Value::as_str) {
                Some(text) => Self::Text(text.to_string()),
                None => Self::Unsupported { kind: kind.into() },
            },
            "image_asset_pointer" => match serde_json::from_value::<ImagePart>(part.clone()) {
                Ok(img) => Self::ImageAssetPointer {
                    pointer: img.asset_pointer,
                    size_bytes: img.size_bytes,
                    width: img.width,
                    height: img.height,
                },
                Err(_) => Self::Unsupported { kind: kind.into() },
            },
            other => Self::Unsupported { kind: other.into() },
        }
    }

    /// Whether rendering this item produces any output.
    pub fn is_renderable(&self) -> bool {
        match self {
            Self::Text(text) => !text.trim().is_empty(),
            Self::ImageAssetPointer { .. } => true,
            Self::Unsupported { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentItem>,
    pub create_time: Timestamp,
    /// Model identifier that produced the message, when known.
    pub model: Option<String>,
    /// Marked by the exporter as not shown in the conversation UI.
    pub hidden: bool,
}

impl Message {
    pub fn is_renderable(&self) -> bool {
        !self.hidden && self.content.iter().any(ContentItem::is_renderable)
    }
}

/// One entry of a conversation's message graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageGraph {
    pub nodes: HashMap<String, Node>,
    /// Leaf of the active branch, if the export recorded one.
    pub current_node: Option<String>,
}

/// The two ways an export can store a conversation's messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Thread {
    Graph(MessageGraph),
    Flat(Vec<Message>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub title: String,
    pub create_time: Timestamp,
    pub update_time: Timestamp,
    pub id: String,
    pub thread: Thread,
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawConversation {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    create_time: Timestamp,
    #[serde(default)]
    update_time: Timestamp,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    current_node: Option<String>,
    #[serde(default)]
    mapping: Option<HashMap<String, RawNode>>,
    #[serde(default)]
    messages: Option<Vec<RawFlatMessage>>,
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    message: Option<RawGraphMessage>,
}

#[derive(Deserialize)]
struct RawGraphMessage {
    author: RawAuthor,
    content: RawGraphContent,
    #[serde(default)]
    create_time: Timestamp,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Deserialize)]
struct RawAuthor {
    role: String,
}

#[derive(Deserialize)]
struct RawGraphContent {
    content_type: String,
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Deserialize, Default)]
struct RawMetadata {
    #[serde(default)]
    model_slug: Option<String>,
    #[serde(default)]
    is_visually_hidden_from_conversation: bool,
}

#[derive(Deserialize)]
struct RawFlatMessage {
    role: String,
    #[serde(default)]
    create_time: Timestamp,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    model: Option<String>,
}

impl From<RawGraphMessage> for Message {
    fn from(raw: RawGraphMessage) -> Self {
        let content = match raw.content.content_type.as_str() {
            "text" | "multimodal_text" => {
                raw.content.parts.iter().map(ContentItem::from_part).collect()
            }
            other => vec![ContentItem::Unsupported { kind: other.into() }],
        };
        Self {
            role: Role::parse(&raw.author.role),
            content,
            create_time: raw.create_time,
            model: raw.metadata.model_slug,
            hidden: raw.metadata.is_visually_hidden_from_conversation,
        }
    }
}

impl From<RawFlatMessage> for Message {
    fn from(raw: RawFlatMessage) -> Self {
        let content = match &raw.content {
            Value::Array(parts) => parts.iter().map(ContentItem::from_part).collect(),
            Value::Null => Vec::new(),
            single => vec![ContentItem::from_part(single)],
        };
        Self {
            role: Role::parse(&raw.role),
            content,
            create_time: raw.create_time,
            model: raw.model,
            hidden: false,
        }
    }
}

impl TryFrom<RawConversation> for Conversation {
    type Error = ConvertError;

    fn try_from(raw: RawConversation) -> Result<Self, Self::Error> {
        let title = raw
            .title
            .ok_or_else(|| ConvertError::Schema("conversation has no 'title'".into()))?;

        let thread = match (raw.mapping, raw.messages) {
            (Some(mapping), None) if !mapping.is_empty() => {
                let nodes = mapping
                    .into_iter()
                    .map(|(id, node)| {
                        let node = Node {
                            id: id.clone(),
                            parent: node.parent,
                            children: node.children,
                            message: node.message.map(Message::from),
                        };
                        (id, node)
                    })
                    .collect();
                Thread::Graph(MessageGraph {
                    nodes,
                    current_node: raw.current_node,
                })
            }
            (None, Some(messages)) if !messages.is_empty() => {
                Thread::Flat(messages.into_iter().map(Message::from).collect())
            }
            (Some(_), Some(_)) => {
                return Err(ConvertError::Schema(format!(
                    "conversation {title:?} has both 'mapping' and 'messages'"
                )));
            }
            _ => {
                return Err(ConvertError::Schema(format!(
                    "conversation {title:?} has no 'mapping' or 'messages'"
                )));
            }
        };

        Ok(Self {
            title,
            create_time: raw.create_time,
            update_time: raw.update_time,
            id: raw.conversation_id.or(raw.id).unwrap_or_default(),
            thread,
        })
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read an export file and return its conversations, still unparsed.
///
/// Every error here concerns the file as a whole and is fatal to the run.
pub fn read_export(path: &Path) -> Result<Vec<Value>, ConvertError> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ConvertError::InputNotFound {
            path: path.to_path_buf(),
        },
        _ => ConvertError::io(format!("failed to read {}", path.display()), e),
    })?;

    let root: Value =
        serde_json::from_slice(&bytes).map_err(|source| ConvertError::MalformedInput {
            path: path.to_path_buf(),
            source,
        })?;

    match root {
        Value::Array(items) => Ok(items),
        _ => Err(ConvertError::Schema(format!(
            "root JSON element of {} should be a list of conversations",
            path.display()
        ))),
    }
}

/// Validate one element of the export array into a [`Conversation`].
pub fn parse_conversation(value: Value) -> Result<Conversation, ConvertError> {
    let raw: RawConversation =
        serde_json::from_value(value).map_err(|e| ConvertError::Schema(e.to_string()))?;
    Conversation::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_conversation_parses() {
        let conv = parse_conversation(json!({
            "title": "Hi There",
            "create_time": 1704067200,
            "messages": [{"role": "user", "content": ["Hello"]}]
        }))
        .unwrap();

        assert_eq!(conv.title, "Hi There");
        assert_eq!(conv.id, "");
        assert_eq!(
            conv.create_time.instant().unwrap().to_rfc3339(),
            "2024-01-01T00:00:00+00:00"
        );
        assert_eq!(conv.update_time, Timestamp::Absent);
        let Thread::Flat(messages) = conv.thread else {
            panic!("expected flat thread");
        };
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, vec![ContentItem::Text("Hello".into())]);
    }

    #[test]
    fn graph_conversation_parses_nodes_and_metadata() {
        let conv = parse_conversation(json!({
            "title": "Graph",
            "create_time": 1704067200.5,
            "update_time": null,
            "conversation_id": "abc",
            "id": "ignored",
            "current_node": "b",
            "mapping": {
                "root": {"id": "root", "parent": null, "children": ["b"], "message": null},
                "b": {
                    "id": "b",
                    "parent": "root",
                    "children": [],
                    "message": {
                        "author": {"role": "assistant"},
                        "content": {"content_type": "text", "parts": ["Hi", "there"]},
                        "metadata": {"model_slug": "gpt-4o"}
                    }
                }
            }
        }))
        .unwrap();

        assert_eq!(conv.id, "abc");
        let Thread::Graph(graph) = conv.thread else {
            panic!("expected graph thread");
        };
        assert_eq!(graph.current_node.as_deref(), Some("b"));
        let msg = graph.nodes["b"].message.as_ref().unwrap();
        assert_eq!(msg.model.as_deref(), Some("gpt-4o"));
        assert_eq!(msg.content.len(), 2);
        assert!(graph.nodes["root"].message.is_none());
    }

    #[test]
    fn content_parts_dispatch_on_kind() {
        let image = ContentItem::from_part(&json!({
            "content_type": "image_asset_pointer",
            "asset_pointer": "file-service://file-1",
            "size_bytes": 2048,
            "width": 640,
            "height": 480
        }));
        assert_eq!(
            image,
            ContentItem::ImageAssetPointer {
                pointer: "file-service://file-1".into(),
                size_bytes: 2048,
                width: 640,
                height: 480,
            }
        );

        let unknown = ContentItem::from_part(&json!({"content_type": "audio_transcription"}));
        assert_eq!(
            unknown,
            ContentItem::Unsupported {
                kind: "audio_transcription".into()
            }
        );
        assert!(!unknown.is_renderable());
    }

    #[test]
    fn non_text_graph_content_is_unsupported() {
        let conv = parse_conversation(json!({
            "title": "t",
            "mapping": {
                "a": {
                    "message": {
                        "author": {"role": "tool"},
                        "content": {"content_type": "execution_output", "text": "42"}
                    }
                }
            }
        }))
        .unwrap();
        let Thread::Graph(graph) = conv.thread else {
            panic!("expected graph thread");
        };
        let msg = graph.nodes["a"].message.as_ref().unwrap();
        assert_eq!(msg.role, Role::Tool);
        assert!(!msg.is_renderable());
    }

    #[test]
    fn missing_thread_is_a_schema_error() {
        let err = parse_conversation(json!({"title": "t"})).unwrap_err();
        assert!(matches!(err, ConvertError::Schema(_)));

        let err = parse_conversation(json!({"title": "t", "messages": []})).unwrap_err();
        assert!(matches!(err, ConvertError::Schema(_)));

        let err = parse_conversation(json!({"messages": [{"role": "user"}]})).unwrap_err();
        assert!(matches!(err, ConvertError::Schema(_)));
    }

    #[test]
    fn bad_timestamps_are_kept_for_reporting() {
        let ts: Timestamp = serde_json::from_value(json!("yesterday")).unwrap();
        assert_eq!(ts, Timestamp::Invalid("yesterday".into()));
        assert!(matches!(ts.resolve(), Err(ConvertError::Timestamp(_))));

        let ts: Timestamp = serde_json::from_value(json!("2024-01-01T00:00:00Z")).unwrap();
        assert!(ts.instant().is_some());

        let ts: Timestamp = serde_json::from_value(json!(null)).unwrap();
        assert!(matches!(ts.resolve(), Ok(None)));
    }

    #[test]
    fn roles_are_case_insensitive() {
        assert_eq!(Role::parse("USER"), Role::User);
        assert_eq!(Role::parse("User").label(), "User");
        assert_eq!(Role::parse("assistant").label(), "Assistant");
        assert_eq!(Role::parse("critic").label(), "Assistant");
    }

    #[test]
    fn read_export_reports_file_level_errors() {
        let dir = tempfile::TempDir::new().unwrap();

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            read_export(&missing),
            Err(ConvertError::InputNotFound { .. })
        ));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "[{").unwrap();
        assert!(matches!(
            read_export(&broken),
            Err(ConvertError::MalformedInput { .. })
        ));

        let object = dir.path().join("object.json");
        fs::write(&object, r#"{"title": "x"}"#).unwrap();
        assert!(matches!(read_export(&object), Err(ConvertError::Schema(_))));

        let ok = dir.path().join("ok.json");
        fs::write(&ok, r#"[{"title": "x"}, 3]"#).unwrap();
        assert_eq!(read_export(&ok).unwrap().len(), 2);
    }
}
