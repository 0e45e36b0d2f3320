use std::collections::HashMap;

use tracing::trace;

/// One distinct literal value and its home in the data segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolEntry {
    /// Source spelling of the first occurrence.
    pub text: String,
    pub value: i32,
    /// Word offset from `GP`.
    pub offset: u32,
}

/// Deduplicating table of numeric literals, owned by one compilation.
///
/// Offsets are handed out in first-insertion order, so the data segment
/// layout depends only on the order in which the program mentions literals.
#[derive(Debug, Default)]
pub struct LiteralPool {
    entries: Vec<PoolEntry>,
    by_value: HashMap<i32, u32>,
}

impl LiteralPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the offset of `value`, adding it to the pool on first sight.
    ///
    /// Two literals with the same value share one cell even when their source
    /// text differs (`007` and `7`).
    pub fn lookup_or_insert(&mut self, text: &str, value: i32) -> u32 {
        if let Some(&offset) = self.by_value.get(&value) {
            return offset;
        }

        let offset = self.entries.len() as u32;
        trace!(text, value, offset, "literal pooled");
        self.entries.push(PoolEntry {
            text: text.to_string(),
            value,
            offset,
        });
        self.by_value.insert(value, offset);
        offset
    }

    /// Number of distinct values, which is also the data segment size in words.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    /// End the populate phase. No literal can be added afterwards.
    pub fn freeze(self) -> FrozenPool {
        FrozenPool {
            entries: self.entries,
        }
    }
}

/// A pool whose contents are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrozenPool {
    entries: Vec<PoolEntry>,
}

impl FrozenPool {
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    /// Values in offset order. Consumes the pool, so it can be iterated once.
    pub fn into_values(self) -> impl Iterator<Item = i32> {
        self.entries.into_iter().map(|e| e.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_value_maps_to_same_offset() {
        let mut pool = LiteralPool::new();
        let a = pool.lookup_or_insert("7", 7);
        let b = pool.lookup_or_insert("3", 3);
        let c = pool.lookup_or_insert("7", 7);

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(c, a);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_dedup_is_by_value_not_text() {
        let mut pool = LiteralPool::new();
        let a = pool.lookup_or_insert("007", 7);
        let b = pool.lookup_or_insert("7", 7);

        assert_eq!(a, b);
        assert_eq!(pool.entries()[0].text, "007");
    }

    #[test]
    fn test_frozen_values_follow_insertion_order() {
        let mut pool = LiteralPool::new();
        for v in [5, -1, 5, 0, 12] {
            pool.lookup_or_insert(&v.to_string(), v);
        }

        let frozen = pool.freeze();
        assert_eq!(frozen.size(), 4);
        assert_eq!(frozen.into_values().collect::<Vec<_>>(), vec![5, -1, 0, 12]);
    }

    #[test]
    fn test_empty_pool() {
        let frozen = LiteralPool::new().freeze();
        assert_eq!(frozen.size(), 0);
        assert_eq!(frozen.into_values().count(), 0);
    }
}
