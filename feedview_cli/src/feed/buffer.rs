//! Bounded, ordered entry buffer
//!
//! Holds the retained window of entries, oldest at head and newest at tail.
//! Live entries enter at the tail and push overflow out of the head. Backfill
//! pages enter at the head and push overflow out of the tail, so a freshly
//! fetched page is always kept whole.

use feedview_common::{constants::LIVE_CURSOR, Entry, EntryKey};
use std::collections::{HashSet, VecDeque};

/// Which end of the buffer lost entries to the cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionSide {
    Head,
    Tail,
}

/// Result of a tail append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Inserted; `evicted` entries left the head
    Inserted { evicted: usize },
    /// The identity key was already present
    Duplicate,
}

/// Result of a head prepend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrependOutcome {
    pub inserted: usize,
    pub duplicates: usize,
    /// Entries dropped from the tail
    pub evicted: usize,
}

/// Buffer of entries bounded by `max_entries`
#[derive(Debug)]
pub struct BufferStore {
    entries: VecDeque<Entry>,
    keys: HashSet<EntryKey>,
    max_entries: usize,
    top_cursor: Option<String>,
    no_more_older: bool,
}

impl BufferStore {
    /// `max_entries` must be non-zero; `FeedSettings` validates it
    pub fn new(max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            entries: VecDeque::with_capacity(max_entries.min(1024)),
            keys: HashSet::new(),
            max_entries,
            top_cursor: None,
            no_more_older: false,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &VecDeque<Entry> {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.keys.contains(key)
    }

    /// Find an entry by identity key
    pub fn find(&self, key: &EntryKey) -> Option<&Entry> {
        if !self.keys.contains(key) {
            return None;
        }
        self.entries.iter().find(|e| e.has_key(key))
    }

    pub fn head(&self) -> Option<&Entry> {
        self.entries.front()
    }

    pub fn head_key(&self) -> Option<EntryKey> {
        self.entries.front().map(Entry::key)
    }

    /// Backward pagination token, `None` until one is known
    pub fn top_cursor(&self) -> Option<&str> {
        self.top_cursor.as_deref()
    }

    /// Override the backward pagination token with one handed out by the backend
    pub fn set_top_cursor(&mut self, cursor: String) {
        if !cursor.is_empty() {
            self.top_cursor = Some(cursor);
        }
    }

    /// Resume token for the live feed
    pub fn bottom_cursor(&self) -> String {
        self.entries
            .back()
            .map(|e| e.id.clone())
            .unwrap_or_else(|| LIVE_CURSOR.to_string())
    }

    pub fn no_more_older(&self) -> bool {
        self.no_more_older
    }

    pub fn set_no_more_older(&mut self, flag: bool) {
        self.no_more_older = flag;
    }

    /// Append a live entry at the tail, evicting from the head past the cap
    pub fn append_tail(&mut self, entry: Entry) -> AppendOutcome {
        let key = entry.key();
        if self.keys.contains(&key) {
            tracing::debug!("Dropping duplicate live entry {}", key);
            return AppendOutcome::Duplicate;
        }

        let was_empty = self.entries.is_empty();
        self.keys.insert(key);
        self.entries.push_back(entry);

        let mut evicted = 0;
        while self.entries.len() > self.max_entries {
            if let Some(old) = self.entries.pop_front() {
                self.keys.remove(&old.key());
                evicted += 1;
            }
        }

        if was_empty || evicted > 0 {
            self.top_cursor = self.entries.front().map(|e| e.id.clone());
        }

        if evicted > 0 {
            // Older history exists again once head entries are discarded
            self.no_more_older = false;
            tracing::debug!(
                "Evicted {} entries from head (cap {}), top cursor now {:?}",
                evicted,
                self.max_entries,
                self.top_cursor
            );
        }

        AppendOutcome::Inserted { evicted }
    }

    /// Prepend an ascending page of older entries, truncating the tail past the cap
    pub fn prepend_head(&mut self, page: Vec<Entry>) -> PrependOutcome {
        let mut outcome = PrependOutcome::default();

        let mut fresh = Vec::with_capacity(page.len());
        for entry in page {
            let key = entry.key();
            if self.keys.insert(key) {
                fresh.push(entry);
            } else {
                outcome.duplicates += 1;
            }
        }
        outcome.inserted = fresh.len();

        for entry in fresh.into_iter().rev() {
            self.entries.push_front(entry);
        }

        while self.entries.len() > self.max_entries {
            if let Some(newest) = self.entries.pop_back() {
                self.keys.remove(&newest.key());
                outcome.evicted += 1;
            }
        }

        if outcome.inserted > 0 {
            self.top_cursor = self.entries.front().map(|e| e.id.clone());
        }

        if outcome.duplicates > 0 {
            tracing::debug!("Dropped {} duplicate backfill entries", outcome.duplicates);
        }
        if outcome.evicted > 0 {
            tracing::debug!(
                "Evicted {} entries from tail after backfill (cap {})",
                outcome.evicted,
                self.max_entries
            );
        }

        outcome
    }

    /// Drop every entry and both cursors
    pub fn reset(&mut self) {
        self.entries.clear();
        self.keys.clear();
        self.top_cursor = None;
        self.no_more_older = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> Entry {
        Entry::new("w1", id, id.parse().unwrap_or(0))
    }

    fn ids(store: &BufferStore) -> Vec<&str> {
        store.entries().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_prepend_into_empty_buffer() {
        let mut store = BufferStore::new(3);
        let outcome = store.prepend_head(vec![entry("1"), entry("2"), entry("3")]);

        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.evicted, 0);
        assert_eq!(ids(&store), vec!["1", "2", "3"]);
        assert_eq!(store.top_cursor(), Some("1"));
    }

    #[test]
    fn test_tail_overflow_evicts_head() {
        let mut store = BufferStore::new(3);
        store.prepend_head(vec![entry("1"), entry("2"), entry("3")]);
        store.set_no_more_older(true);

        let outcome = store.append_tail(entry("4"));

        assert_eq!(outcome, AppendOutcome::Inserted { evicted: 1 });
        assert_eq!(ids(&store), vec!["2", "3", "4"]);
        assert_eq!(store.top_cursor(), Some("2"));
        assert!(!store.no_more_older());
        assert!(!store.contains(&EntryKey::new("w1", "1")));
    }

    #[test]
    fn test_head_overflow_evicts_tail() {
        let mut store = BufferStore::new(3);
        for id in ["2", "3", "4"] {
            store.append_tail(entry(id));
        }

        let outcome = store.prepend_head(vec![entry("0"), entry("1")]);

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.evicted, 2);
        assert_eq!(ids(&store), vec!["0", "1", "2"]);
        assert_eq!(store.top_cursor(), Some("0"));
        assert_eq!(store.bottom_cursor(), "2");
    }

    #[test]
    fn test_duplicates_are_rejected_on_both_paths() {
        let mut store = BufferStore::new(10);
        store.append_tail(entry("5"));
        store.append_tail(entry("6"));

        assert_eq!(store.append_tail(entry("6")), AppendOutcome::Duplicate);

        let outcome = store.prepend_head(vec![entry("4"), entry("5"), entry("4")]);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 2);
        assert_eq!(ids(&store), vec!["4", "5", "6"]);

        // Same id from another worker is a different entry
        store.append_tail(Entry::new("w2", "6", 6));
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_cursors_follow_boundaries() {
        let mut store = BufferStore::new(5);
        assert_eq!(store.top_cursor(), None);
        assert_eq!(store.bottom_cursor(), LIVE_CURSOR);

        store.append_tail(entry("7"));
        assert_eq!(store.top_cursor(), Some("7"));
        store.append_tail(entry("8"));
        assert_eq!(store.top_cursor(), Some("7"));
        assert_eq!(store.bottom_cursor(), "8");

        store.set_top_cursor("6".to_string());
        store.set_top_cursor(String::new());
        assert_eq!(store.top_cursor(), Some("6"));

        store.reset();
        assert!(store.is_empty());
        assert_eq!(store.top_cursor(), None);
        assert_eq!(store.bottom_cursor(), LIVE_CURSOR);
    }

    #[test]
    fn test_cap_and_uniqueness_hold_over_mixed_sequence() {
        let mut store = BufferStore::new(4);
        let mut next_live = 100;
        let mut next_old = 99;

        for step in 0..50 {
            if step % 3 == 0 {
                let page: Vec<Entry> = (0..3)
                    .map(|_| {
                        next_old -= 1;
                        entry(&next_old.to_string())
                    })
                    .collect::<Vec<_>>()
                    .into_iter()
                    .rev()
                    .collect();
                store.prepend_head(page);
            } else {
                next_live += 1;
                store.append_tail(entry(&next_live.to_string()));
            }

            assert!(store.len() <= 4);
            let unique: HashSet<EntryKey> = store.entries().iter().map(Entry::key).collect();
            assert_eq!(unique.len(), store.len());
            let stamps: Vec<i64> = store.entries().iter().map(|e| e.timestamp).collect();
            assert!(stamps.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", stamps);
        }
    }

    #[test]
    fn test_find_by_key() {
        let mut store = BufferStore::new(3);
        store.prepend_head(vec![entry("1"), entry("2")]);

        let key = EntryKey::new("w1", "2");
        assert_eq!(store.find(&key).map(|e| e.timestamp), Some(2));
        assert!(store.find(&EntryKey::new("w1", "9")).is_none());
    }
}
