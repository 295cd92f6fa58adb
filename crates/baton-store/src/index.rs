//! Inverted attribute index: `(key, term) → sequences`.
//!
//! Terms are the string forms from `AttrValue::index_terms`, so a list
//! attribute is indexed once per element. Posting lists are appended in
//! sequence order and stay sorted.

use std::collections::HashMap;

use baton_contracts::record::{keys, Record};

#[derive(Debug, Default, Clone)]
pub struct AttributeIndex {
    postings: HashMap<String, HashMap<String, Vec<u64>>>,
}

impl AttributeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: &Record) {
        let seq = record.sequence;
        self.add(keys::RECORD_ID, record.record_id.to_string(), seq);
        self.add(keys::RECORD_KIND, record.kind.clone(), seq);
        if let Some(parent) = record.parent_id {
            self.add(keys::RECORD_PARENT_ID, parent.to_string(), seq);
        }
        for (key, value) in &record.attributes {
            for term in value.index_terms() {
                self.add(key, term, seq);
            }
        }
    }

    fn add(&mut self, key: &str, term: String, seq: u64) {
        let list = self
            .postings
            .entry(key.to_string())
            .or_default()
            .entry(term)
            .or_default();
        // A list attribute may repeat a term within one record.
        if list.last() != Some(&seq) {
            list.push(seq);
        }
    }

    pub fn lookup(&self, key: &str, term: &str) -> &[u64] {
        self.postings
            .get(key)
            .and_then(|terms| terms.get(term))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Sequences below `limit` carrying every `(key, term)` pair, or `None`
    /// when `terms` is empty and nothing can be narrowed.
    pub fn candidates(&self, terms: &[(String, String)], limit: u64) -> Option<Vec<u64>> {
        let mut lists: Vec<&[u64]> = terms.iter().map(|(k, t)| self.lookup(k, t)).collect();
        if lists.is_empty() {
            return None;
        }
        lists.sort_by_key(|l| l.len());

        let result = lists[0]
            .iter()
            .copied()
            .take_while(|seq| *seq < limit)
            .filter(|seq| lists[1..].iter().all(|l| l.binary_search(seq).is_ok()))
            .collect();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use baton_contracts::{
        ids::RecordId,
        record::{AttrValue, Attributes},
    };

    use super::*;

    fn record(seq: u64, kind: &str, attrs: &[(&str, AttrValue)]) -> Record {
        Record {
            record_id: RecordId::new(),
            sequence: seq,
            kind: kind.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<Attributes>(),
            events: vec![],
            parent_id: None,
            timestamp: Utc::now(),
            prev_hash: String::new(),
            this_hash: String::new(),
        }
    }

    fn terms(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, t)| (k.to_string(), t.to_string())).collect()
    }

    #[test]
    fn intersects_postings() {
        let mut index = AttributeIndex::new();
        index.insert(&record(0, "gate", &[("gate.decision", "fail".into())]));
        index.insert(&record(1, "gate", &[("gate.decision", "pass".into())]));
        index.insert(&record(2, "handoff", &[("gate.decision", "fail".into())]));
        index.insert(&record(3, "gate", &[("gate.decision", "fail".into())]));

        let found = index.candidates(&terms(&[("record.kind", "gate"), ("gate.decision", "fail")]), 10);
        assert_eq!(found, Some(vec![0, 3]));
    }

    #[test]
    fn limit_hides_later_records() {
        let mut index = AttributeIndex::new();
        for seq in 0..5 {
            index.insert(&record(seq, "insight", &[]));
        }
        assert_eq!(index.candidates(&terms(&[("record.kind", "insight")]), 3), Some(vec![0, 1, 2]));
    }

    #[test]
    fn list_elements_are_indexed_once() {
        let mut index = AttributeIndex::new();
        let triggers = AttrValue::List(vec!["a".into(), "b".into(), "a".into()]);
        index.insert(&record(0, "capability", &[("capability.triggers", triggers)]));
        assert_eq!(index.lookup("capability.triggers", "a"), &[0]);
        assert_eq!(index.lookup("capability.triggers", "b"), &[0]);
    }

    #[test]
    fn no_terms_means_no_narrowing() {
        let index = AttributeIndex::new();
        assert_eq!(index.candidates(&[], 10), None);
        assert_eq!(index.candidates(&terms(&[("x", "y")]), 10), Some(vec![]));
    }
}
