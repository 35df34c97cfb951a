//! Per-session memoization of capability results.
//!
//! Normalization backends may be non-deterministic, so the first label
//! produced for an exact thought text is pinned for the rest of the session.
//! The thought memo is therefore unbounded and lives until the session ends.
//! The same structure memoizes action embeddings by action text, bounded.

use std::collections::{HashMap, VecDeque};

/// Insertion-ordered memo. When bounded, the oldest entry is dropped at capacity.
#[derive(Debug, Clone)]
pub struct MemoCache<V> {
    capacity: Option<usize>,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V: Clone> MemoCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// A memo that never evicts.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).cloned()
    }

    /// Insert unless the key is already pinned. Returns the pinned value.
    pub fn pin(&mut self, key: &str, value: V) -> V {
        if let Some(existing) = self.entries.get(key) {
            return existing.clone();
        }
        if let Some(capacity) = self.capacity {
            if self.entries.len() == capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key.to_string());
        }
        self.entries.insert(key.to_string(), value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reduce a raw label to lowercase words, punctuation stripped, at most `max_words` long.
///
/// Returns `None` when nothing is left.
pub fn canonical_label(raw: &str, max_words: usize) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c.to_lowercase().collect::<String>()
            } else {
                " ".to_string()
            }
        })
        .collect();
    let words: Vec<&str> = cleaned.split_whitespace().take(max_words).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Thought text to canonical intent label.
pub type ThoughtCache = MemoCache<String>;

/// Action text to embedding vector.
pub type EmbeddingCache = MemoCache<Vec<f32>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_is_pinned() {
        let mut cache = ThoughtCache::new(8);
        assert_eq!(cache.pin("search XYZ", "find product".into()), "find product");
        assert_eq!(cache.pin("search XYZ", "lookup item".into()), "find product");
        assert_eq!(cache.get("search XYZ").as_deref(), Some("find product"));
    }

    #[test]
    fn test_canonical_label() {
        assert_eq!(
            canonical_label("  Find Product, by ID! ", 5).as_deref(),
            Some("find product by id")
        );
        assert_eq!(
            canonical_label("one two three four five six", 5).as_deref(),
            Some("one two three four five")
        );
        assert_eq!(canonical_label("?!", 5), None);
    }

    #[test]
    fn test_canonical_label_lowercases_unicode() {
        assert_eq!(canonical_label("Ärger über Öl", 5), canonical_label("ärger über öl", 5));
        assert_eq!(canonical_label("ÉTAT Ärger", 5).as_deref(), Some("état ärger"));
    }

    #[test]
    fn test_unbounded_keeps_every_entry() {
        let mut cache = ThoughtCache::unbounded();
        cache.pin("first", "label 0".into());
        for i in 0..1000 {
            cache.pin(&format!("thought {i}"), format!("label {}", i + 1));
        }
        assert_eq!(cache.len(), 1001);
        assert_eq!(cache.get("first").as_deref(), Some("label 0"));
        assert_eq!(cache.pin("first", "other".into()), "label 0");
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut cache = EmbeddingCache::new(2);
        cache.pin("a", vec![1.0]);
        cache.pin("b", vec![2.0]);
        cache.pin("c", vec![3.0]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c"), Some(vec![3.0]));
    }
}
