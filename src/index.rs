//! Multi-key reference index.
//!
//! Each reference-list template indexes its references three ways: by name,
//! by content, and by the (name, content) pair. Every key maps to the ordered
//! positions of the references carrying it, so a list longer than one marks a
//! duplicate group for that key.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefIndex {
    by_name: HashMap<String, Vec<usize>>,
    by_content: HashMap<String, Vec<usize>>,
    by_pair: HashMap<(String, String), Vec<usize>>,
}

impl RefIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the reference at `pos` under all three keys.
    pub fn insert(&mut self, name: &str, content: &str, pos: usize) {
        self.by_name.entry(name.to_string()).or_default().push(pos);
        self.by_content
            .entry(content.to_string())
            .or_default()
            .push(pos);
        self.by_pair
            .entry((name.to_string(), content.to_string()))
            .or_default()
            .push(pos);
    }

    /// Forgets the reference at `pos` under all three keys.
    pub fn remove(&mut self, name: &str, content: &str, pos: usize) {
        remove_position(&mut self.by_name, name, pos);
        remove_position(&mut self.by_content, content, pos);
        remove_position(&mut self.by_pair, &(name.to_string(), content.to_string()), pos);
    }

    /// Moves the reference at `pos` from `old_name` to `new_name`.
    pub fn rename(&mut self, old_name: &str, new_name: &str, content: &str, pos: usize) {
        remove_position(&mut self.by_name, old_name, pos);
        remove_position(
            &mut self.by_pair,
            &(old_name.to_string(), content.to_string()),
            pos,
        );
        self.by_name.entry(new_name.to_string()).or_default().push(pos);
        self.by_pair
            .entry((new_name.to_string(), content.to_string()))
            .or_default()
            .push(pos);
    }

    pub fn by_name(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn by_content(&self, content: &str) -> &[usize] {
        self.by_content
            .get(content)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn by_pair(&self, name: &str, content: &str) -> &[usize] {
        self.by_pair
            .get(&(name.to_string(), content.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        !self.by_name(name).is_empty()
    }

    /// Number of distinct names currently indexed.
    pub fn name_count(&self) -> usize {
        self.by_name.len()
    }
}

fn remove_position<K, Q>(map: &mut HashMap<K, Vec<usize>>, key: &Q, pos: usize)
where
    K: std::borrow::Borrow<Q> + std::hash::Hash + Eq,
    Q: std::hash::Hash + Eq + ?Sized,
{
    if let Some(positions) = map.get_mut(key) {
        positions.retain(|&p| p != pos);
        if positions.is_empty() {
            map.remove(key);
        }
    }
}
