//! Per-user to-do lists

use crate::protocol::TodoItem;
use dashmap::DashMap;
use indexmap::IndexMap;
use md5::{Digest, Md5};
use std::time::{SystemTime, UNIX_EPOCH};

/// Keyed collection of to-do items per user, in insertion order
#[derive(Debug, Default)]
pub struct TodoStore {
    lists: DashMap<String, IndexMap<String, String>>,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, user_id: &str) -> Vec<TodoItem> {
        self.lists
            .get(user_id)
            .map(|list| {
                list.iter()
                    .map(|(id, content)| TodoItem::new(id.clone(), content.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Append an item. Blank content is ignored and yields `None`.
    pub fn add(&self, user_id: &str, content: &str) -> Option<TodoItem> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }

        let id = generate_todo_id(content);
        self.lists
            .entry(user_id.to_string())
            .or_default()
            .insert(id.clone(), content.to_string());
        Some(TodoItem::new(id, content))
    }

    pub fn update(&self, user_id: &str, id: &str, content: &str) -> Option<TodoItem> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }

        let mut list = self.lists.get_mut(user_id)?;
        let slot = list.get_mut(id)?;
        *slot = content.to_string();
        Some(TodoItem::new(id, content))
    }

    pub fn delete(&self, user_id: &str, id: &str) -> Option<TodoItem> {
        let mut list = self.lists.get_mut(user_id)?;
        let content = list.shift_remove(id)?;
        Some(TodoItem::new(id, content))
    }
}

/// Hex MD5 over the current time in nanoseconds and the item text
fn generate_todo_id(content: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    let mut hasher = Md5::new();
    hasher.update(nanos.to_string().as_bytes());
    hasher.update(content.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_list_in_order() {
        let store = TodoStore::new();
        let first = store.add("alice", "  buy milk ").unwrap();
        let second = store.add("alice", "walk dog").unwrap();

        assert_eq!(first.content, "buy milk");
        assert_eq!(first.id.len(), 32);
        assert_eq!(store.list("alice"), vec![first, second]);
        assert!(store.list("bob").is_empty());
    }

    #[test]
    fn test_blank_content_is_rejected() {
        let store = TodoStore::new();
        assert!(store.add("alice", "   ").is_none());
        assert!(store.list("alice").is_empty());
    }

    #[test]
    fn test_update() {
        let store = TodoStore::new();
        let item = store.add("alice", "draft").unwrap();

        let updated = store.update("alice", &item.id, "final").unwrap();
        assert_eq!(updated, TodoItem::new(item.id.clone(), "final"));
        assert_eq!(store.list("alice"), vec![updated]);

        assert!(store.update("alice", "missing", "x").is_none());
        assert!(store.update("bob", &item.id, "x").is_none());
    }

    #[test]
    fn test_delete_keeps_order_of_rest() {
        let store = TodoStore::new();
        let a = store.add("alice", "a").unwrap();
        let b = store.add("alice", "b").unwrap();
        let c = store.add("alice", "c").unwrap();

        assert_eq!(store.delete("alice", &b.id), Some(b.clone()));
        assert_eq!(store.list("alice"), vec![a, c]);
        assert!(store.delete("alice", &b.id).is_none());
    }

    #[test]
    fn test_lists_are_per_user() {
        let store = TodoStore::new();
        let item = store.add("alice", "secret").unwrap();
        assert!(store.delete("bob", &item.id).is_none());
        assert_eq!(store.list("alice").len(), 1);
    }
}
