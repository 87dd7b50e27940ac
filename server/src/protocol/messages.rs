use serde::{Deserialize, Serialize};

/// Kind of change carried by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// First event on every stream; tells the client its own source id
    Initial,
    Add,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Initial => "initial",
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

/// A to-do entry as it appears on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    #[serde(rename = "todo")]
    pub content: String,
}

impl TodoItem {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// A change to one user's to-do list, fanned out to that user's observers.
///
/// `source` names the client that made the change so it can skip its own echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub source: String,
    pub kind: ChangeKind,
    pub item: Option<TodoItem>,
}

impl ChangeEvent {
    pub fn initial(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kind: ChangeKind::Initial,
            item: None,
        }
    }

    pub fn add(source: impl Into<String>, item: TodoItem) -> Self {
        Self::with_item(source, ChangeKind::Add, item)
    }

    pub fn update(source: impl Into<String>, item: TodoItem) -> Self {
        Self::with_item(source, ChangeKind::Update, item)
    }

    pub fn delete(source: impl Into<String>, item: TodoItem) -> Self {
        Self::with_item(source, ChangeKind::Delete, item)
    }

    fn with_item(source: impl Into<String>, kind: ChangeKind, item: TodoItem) -> Self {
        Self {
            source: source.into(),
            kind,
            item: Some(item),
        }
    }

    /// Event body: `{source}` for `initial`, `{source, todoItem}` otherwise
    pub fn payload(&self) -> ChangePayload {
        ChangePayload {
            source: self.source.clone(),
            todo_item: self.item.clone(),
        }
    }

    /// WebSocket envelope `{"event": <kind>, "data": <payload>}`
    pub fn envelope(&self) -> SocketEnvelope {
        SocketEnvelope {
            event: self.kind,
            data: self.payload(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePayload {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub todo_item: Option<TodoItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEnvelope {
    pub event: ChangeKind,
    pub data: ChangePayload,
}
