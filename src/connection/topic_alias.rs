// Copyright (c) 2024 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;

/// Topic alias table for the send direction.
///
/// Keeps a bidirectional mapping between topic names and alias numbers with
/// a per-entry use counter. Capacity is the topic-alias-maximum the peer
/// advertised; aliases run from 1 to that maximum.
///
/// The table is laid out as a slot array indexed by alias number plus a
/// reverse hash map, so lookups in either direction stay cheap while
/// [`Self::lru_alias`] scans only the slot array.
#[derive(Debug, Clone)]
pub struct TopicAliasSend {
    /// Slot `alias - 1` holds the mapped topic and its last-use tick.
    slots: Vec<Option<(String, u64)>>,

    /// Reverse index from topic name to alias number.
    by_topic: HashMap<String, u16>,

    /// Monotonic use counter; larger means more recently used.
    tick: u64,
}

impl TopicAliasSend {
    /// Create a table with capacity `maximum` aliases.
    #[must_use]
    pub fn new(maximum: u16) -> Self {
        Self {
            slots: vec![None; maximum as usize],
            by_topic: HashMap::new(),
            tick: 0,
        }
    }

    /// Get the largest alias number this table may hold.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn maximum(&self) -> u16 {
        self.slots.len() as u16
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Install or update the mapping `topic` -> `alias` and mark it used.
    ///
    /// An alias out of the 1..=maximum range is ignored; callers validate
    /// the range beforehand and treat it as a protocol error.
    pub fn insert_or_update(&mut self, topic: &str, alias: u16) {
        if alias == 0 || alias > self.maximum() {
            return;
        }
        let tick = self.next_tick();
        let slot = &mut self.slots[(alias - 1) as usize];
        if let Some((old_topic, _)) = slot.take() {
            self.by_topic.remove(&old_topic);
        }
        *slot = Some((topic.to_string(), tick));
        self.by_topic.insert(topic.to_string(), alias);
    }

    /// Look up the topic mapped to `alias`.
    #[must_use]
    pub fn find_topic(&self, alias: u16) -> Option<&str> {
        if alias == 0 || alias > self.maximum() {
            return None;
        }
        self.slots[(alias - 1) as usize]
            .as_ref()
            .map(|(topic, _)| topic.as_str())
    }

    /// Look up the alias mapped to `topic` and mark it used.
    #[must_use]
    pub fn find_alias(&mut self, topic: &str) -> Option<u16> {
        let alias = *self.by_topic.get(topic)?;
        let tick = self.next_tick();
        if let Some((_, last_used)) = &mut self.slots[(alias - 1) as usize] {
            *last_used = tick;
        }
        Some(alias)
    }

    /// Get the alias number to (re)use for a new mapping: the lowest vacant
    /// alias if any remains, otherwise the least recently used one.
    ///
    /// Returns `None` only when the table has zero capacity.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn lru_alias(&self) -> Option<u16> {
        if self.slots.is_empty() {
            return None;
        }
        let mut lru_alias = 1_u16;
        let mut lru_tick = u64::MAX;
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                None => return Some(index as u16 + 1),
                Some((_, last_used)) => {
                    if *last_used < lru_tick {
                        lru_tick = *last_used;
                        lru_alias = index as u16 + 1;
                    }
                }
            }
        }
        Some(lru_alias)
    }

    /// Drop all mappings.
    pub fn clear(&mut self) {
        self.slots.fill(None);
        self.by_topic.clear();
        self.tick = 0;
    }
}

/// Topic alias table for the receive direction.
///
/// Capacity is the topic-alias-maximum this endpoint advertised. An
/// incoming publish with an alias and a non-empty topic installs the
/// mapping; an alias with an empty topic resolves through it.
#[derive(Debug, Clone)]
pub struct TopicAliasRecv {
    slots: Vec<Option<String>>,
}

impl TopicAliasRecv {
    /// Create a table with capacity `maximum` aliases.
    #[must_use]
    pub fn new(maximum: u16) -> Self {
        Self {
            slots: vec![None; maximum as usize],
        }
    }

    /// Get the largest alias number this table may hold.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn maximum(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Install or overwrite the mapping `alias` -> `topic`.
    ///
    /// Returns false if `alias` is out of range.
    pub fn insert(&mut self, alias: u16, topic: &str) -> bool {
        if alias == 0 || alias > self.maximum() {
            return false;
        }
        self.slots[(alias - 1) as usize] = Some(topic.to_string());
        true
    }

    /// Resolve `alias` to its mapped topic.
    #[must_use]
    pub fn find_topic(&self, alias: u16) -> Option<&str> {
        if alias == 0 || alias > self.maximum() {
            return None;
        }
        self.slots[(alias - 1) as usize].as_deref()
    }

    /// Drop all mappings.
    pub fn clear(&mut self) {
        self.slots.fill(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_prefers_vacant_alias() {
        let mut table = TopicAliasSend::new(3);
        assert_eq!(table.lru_alias(), Some(1));
        table.insert_or_update("a", 1);
        assert_eq!(table.lru_alias(), Some(2));
        table.insert_or_update("b", 2);
        table.insert_or_update("c", 3);
        // Table full now, alias 1 is the least recently used.
        assert_eq!(table.lru_alias(), Some(1));
    }

    #[test]
    fn test_send_lru_follows_use() {
        let mut table = TopicAliasSend::new(2);
        table.insert_or_update("a", 1);
        table.insert_or_update("b", 2);
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(table.find_alias("a"), Some(1));
        assert_eq!(table.lru_alias(), Some(2));
    }

    #[test]
    fn test_send_remap_drops_old_topic() {
        let mut table = TopicAliasSend::new(1);
        table.insert_or_update("a", 1);
        table.insert_or_update("b", 1);
        assert_eq!(table.find_alias("a"), None);
        assert_eq!(table.find_topic(1), Some("b"));
    }

    #[test]
    fn test_recv_install_and_resolve() {
        let mut table = TopicAliasRecv::new(2);
        assert!(table.insert(1, "sensor/1"));
        assert_eq!(table.find_topic(1), Some("sensor/1"));
        assert_eq!(table.find_topic(2), None);
        assert!(!table.insert(3, "out/of/range"));
        assert!(!table.insert(0, "zero"));
    }

    #[test]
    fn test_zero_capacity() {
        let table = TopicAliasSend::new(0);
        assert_eq!(table.lru_alias(), None);
        let recv = TopicAliasRecv::new(0);
        assert_eq!(recv.find_topic(1), None);
    }
}
