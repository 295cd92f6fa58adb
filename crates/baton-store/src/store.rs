//! In-memory, append-only implementation of `RecordSink`.
//!
//! Records live in an arena ordered by sequence. A record's parent always
//! has a lower sequence, so hierarchy walks never loop. The write lock is
//! held only while a record is hashed and pushed; queries clone the arena
//! under the read lock and evaluate without holding it.
//!
//! Records committed after a query takes its snapshot are not visible to
//! that query. Events appended to a visible record after the snapshot are.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use baton_contracts::{
    error::{BatonError, BatonResult},
    ids::RecordId,
    record::{Attributes, Record, RecordEvent, TimeRange},
};
use baton_core::traits::{PendingRecord, RecordSink};

use crate::{
    chain::{hash_record, verify_chain, GENESIS_HASH},
    eval::Evaluator,
    index::AttributeIndex,
    parser::Query,
};

/// Attribute keys under this prefix are computed, never stored.
const RESERVED_PREFIX: &str = "record.";

// ── Arena entries ────────────────────────────────────────────────────────────

pub(crate) struct Entry {
    /// The hashed part of the record. `record.events` is always empty here.
    pub(crate) record: Record,
    pub(crate) parent_seq: Option<usize>,
    events: Mutex<Vec<RecordEvent>>,
}

impl Entry {
    fn new(mut record: Record, parent_seq: Option<usize>) -> Self {
        let events = std::mem::take(&mut record.events);
        Self {
            record,
            parent_seq,
            events: Mutex::new(events),
        }
    }

    fn to_record(&self) -> BatonResult<Record> {
        let events = self.events.lock().map_err(|_| poisoned("record events"))?;
        let mut record = self.record.clone();
        record.events = events.clone();
        Ok(record)
    }
}

#[derive(Default)]
struct State {
    entries: Vec<Arc<Entry>>,
    by_id: HashMap<RecordId, usize>,
    children: HashMap<RecordId, Vec<usize>>,
    index: AttributeIndex,
    last_hash: String,
}

impl State {
    fn empty() -> Self {
        Self {
            last_hash: GENESIS_HASH.to_string(),
            ..Self::default()
        }
    }

    /// Push an already-hashed record and index it.
    fn push(&mut self, record: Record, parent_seq: Option<usize>) {
        let seq = self.entries.len();
        self.index.insert(&record);
        self.by_id.insert(record.record_id, seq);
        if let Some(parent) = record.parent_id {
            self.children.entry(parent).or_default().push(seq);
        }
        self.last_hash = record.this_hash.clone();
        self.entries.push(Arc::new(Entry::new(record, parent_seq)));
    }

    fn seq_of(&self, id: RecordId) -> BatonResult<usize> {
        self.by_id.get(&id).copied().ok_or_else(|| not_found(id))
    }
}

/// A serialized, self-verifying copy of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub records: Vec<Record>,
    /// `this_hash` of the last record, or `GENESIS_HASH` when empty.
    pub terminal_hash: String,
    pub exported_at: DateTime<Utc>,
}

// ── Store ────────────────────────────────────────────────────────────────────

/// The knowledge store.
///
/// Share it as `Arc<KnowledgeStore>`; every method takes `&self`.
pub struct KnowledgeStore {
    state: RwLock<State>,
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = self.state.read().ok().map(|state| state.entries.len());
        f.debug_struct("KnowledgeStore")
            .field("records", &records)
            .finish_non_exhaustive()
    }
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::empty()),
        }
    }

    pub fn len(&self) -> BatonResult<usize> {
        Ok(self.read()?.entries.len())
    }

    pub fn is_empty(&self) -> BatonResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn get(&self, id: RecordId) -> BatonResult<Record> {
        let entry = {
            let state = self.read()?;
            let seq = state.seq_of(id)?;
            Arc::clone(&state.entries[seq])
        };
        entry.to_record()
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Parse and run `expression` over records whose timestamp is in `range`.
    ///
    /// A malformed expression fails with `Query` before anything is read.
    pub fn query(&self, expression: &str, range: TimeRange) -> BatonResult<Vec<Record>> {
        let query = Query::parse(expression)?;
        self.query_compiled(&query, range)
    }

    /// Run a pre-parsed query. Results are in sequence order.
    pub fn query_compiled(&self, query: &Query, range: TimeRange) -> BatonResult<Vec<Record>> {
        let terms = query.expr.required_terms();
        let (entries, candidates) = {
            let state = self.read()?;
            let entries = state.entries.clone();
            let limit = entries.len() as u64;
            (entries, state.index.candidates(&terms, limit))
        };

        let seqs: Vec<usize> = match candidates {
            Some(list) => list.into_iter().map(|s| s as usize).collect(),
            None => (0..entries.len()).collect(),
        };
        let scanned = seqs.len();

        let mut evaluator = Evaluator::new(&entries, query.hier_slots);
        let mut results = Vec::new();
        for seq in seqs {
            if range.contains(entries[seq].record.timestamp) && evaluator.matches(&query.expr, seq) {
                results.push(entries[seq].to_record()?);
            }
        }

        debug!(
            query = %query.source,
            snapshot = entries.len(),
            scanned,
            matched = results.len(),
            "query evaluated"
        );
        Ok(results)
    }

    // ── Hierarchy ────────────────────────────────────────────────────────────

    /// Direct children, in sequence order.
    pub fn children(&self, id: RecordId) -> BatonResult<Vec<Record>> {
        let entries: Vec<Arc<Entry>> = {
            let state = self.read()?;
            state.seq_of(id)?;
            state
                .children
                .get(&id)
                .map(|seqs| seqs.iter().map(|s| Arc::clone(&state.entries[*s])).collect())
                .unwrap_or_default()
        };
        entries.iter().map(|e| e.to_record()).collect()
    }

    /// Parent, grandparent, and so on up to the root. Nearest first.
    pub fn ancestors(&self, id: RecordId) -> BatonResult<Vec<Record>> {
        let entries: Vec<Arc<Entry>> = {
            let state = self.read()?;
            let mut cursor = state.entries[state.seq_of(id)?].parent_seq;
            let mut chain = Vec::new();
            while let Some(seq) = cursor {
                let entry = &state.entries[seq];
                chain.push(Arc::clone(entry));
                cursor = entry.parent_seq;
            }
            chain
        };
        entries.iter().map(|e| e.to_record()).collect()
    }

    /// Every record below `id`, in sequence order.
    pub fn descendants(&self, id: RecordId) -> BatonResult<Vec<Record>> {
        let entries: Vec<Arc<Entry>> = {
            let state = self.read()?;
            state.seq_of(id)?;
            let mut found = Vec::new();
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                for seq in state.children.get(&current).into_iter().flatten() {
                    found.push(*seq);
                    stack.push(state.entries[*seq].record.record_id);
                }
            }
            found.sort_unstable();
            found.into_iter().map(|s| Arc::clone(&state.entries[s])).collect()
        };
        entries.iter().map(|e| e.to_record()).collect()
    }

    // ── Integrity and persistence ────────────────────────────────────────────

    /// Recompute every hash and check the chain links.
    pub fn verify_integrity(&self) -> BatonResult<bool> {
        let records: Vec<Record> = {
            let state = self.read()?;
            state.entries.iter().map(|e| e.record.clone()).collect()
        };
        Ok(verify_chain(&records))
    }

    pub fn export_snapshot(&self) -> BatonResult<StoreSnapshot> {
        let (entries, terminal_hash) = {
            let state = self.read()?;
            (state.entries.clone(), state.last_hash.clone())
        };
        let records = entries
            .iter()
            .map(|e| e.to_record())
            .collect::<BatonResult<Vec<_>>>()?;
        Ok(StoreSnapshot {
            records,
            terminal_hash,
            exported_at: Utc::now(),
        })
    }

    pub fn export_json(&self) -> BatonResult<String> {
        let snapshot = self.export_snapshot()?;
        serde_json::to_string_pretty(&snapshot).map_err(|e| BatonError::StoreWrite {
            reason: format!("snapshot does not serialize: {e}"),
        })
    }

    /// Rebuild a store from a snapshot.
    ///
    /// Fails with `StoreWrite` if the chain does not verify, the terminal
    /// hash does not match, or a parent is missing or comes later.
    pub fn import_snapshot(snapshot: StoreSnapshot) -> BatonResult<Self> {
        if !verify_chain(&snapshot.records) {
            warn!(records = snapshot.records.len(), "snapshot chain does not verify");
            return Err(BatonError::StoreWrite {
                reason: "snapshot hash chain does not verify".to_string(),
            });
        }
        let last = snapshot
            .records
            .last()
            .map_or(GENESIS_HASH, |r| r.this_hash.as_str());
        if last != snapshot.terminal_hash {
            return Err(BatonError::StoreWrite {
                reason: format!(
                    "snapshot terminal hash {} does not match last record hash {last}",
                    snapshot.terminal_hash
                ),
            });
        }

        let count = snapshot.records.len();
        let mut state = State::empty();
        for record in snapshot.records {
            if state.by_id.contains_key(&record.record_id) {
                return Err(BatonError::StoreWrite {
                    reason: format!("snapshot repeats record {}", record.record_id),
                });
            }
            let parent_seq = match record.parent_id {
                Some(parent) => Some(state.by_id.get(&parent).copied().ok_or_else(|| {
                    BatonError::StoreWrite {
                        reason: format!(
                            "record {} references parent {parent} that does not precede it",
                            record.record_id
                        ),
                    }
                })?),
                None => None,
            };
            state.push(record, parent_seq);
        }

        info!(records = count, terminal_hash = %state.last_hash, "snapshot imported");
        Ok(Self {
            state: RwLock::new(state),
        })
    }

    pub fn import_json(json: &str) -> BatonResult<Self> {
        let snapshot: StoreSnapshot =
            serde_json::from_str(json).map_err(|e| BatonError::StoreWrite {
                reason: format!("snapshot does not parse: {e}"),
            })?;
        Self::import_snapshot(snapshot)
    }

    /// Write every record as one JSON line. Returns the number written.
    pub fn flush_to(&self, path: impl AsRef<Path>) -> BatonResult<usize> {
        let path = path.as_ref();
        let snapshot = self.export_snapshot()?;
        let io_err = |e: std::io::Error| BatonError::StoreWrite {
            reason: format!("cannot write {}: {e}", path.display()),
        };

        let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
        for record in &snapshot.records {
            serde_json::to_writer(&mut out, record).map_err(|e| BatonError::StoreWrite {
                reason: format!("record {} does not serialize: {e}", record.record_id),
            })?;
            out.write_all(b"\n").map_err(io_err)?;
        }
        out.flush().map_err(io_err)?;

        info!(
            path = %path.display(),
            records = snapshot.records.len(),
            terminal_hash = %snapshot.terminal_hash,
            "store flushed"
        );
        Ok(snapshot.records.len())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn read(&self) -> BatonResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| poisoned("store"))
    }

    fn write(&self) -> BatonResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| poisoned("store"))
    }
}

// ── RecordSink impl ──────────────────────────────────────────────────────────

impl RecordSink for KnowledgeStore {
    /// Hash, append, and index a new record.
    ///
    /// Timestamps strictly increase with sequence, so time ranges and
    /// sequence order agree.
    fn emit(
        &self,
        kind: &str,
        attributes: Attributes,
        parent_id: Option<RecordId>,
    ) -> BatonResult<RecordId> {
        let mut state = self.write()?;
        let (record, parent_seq) = stage(&state, &[], kind, attributes, parent_id)?;
        let id = record.record_id;
        state.push(record, parent_seq);
        Ok(id)
    }

    /// Append every record under one write lock. If any record is rejected
    /// nothing is appended.
    fn emit_all(&self, records: Vec<PendingRecord>) -> BatonResult<Vec<RecordId>> {
        let mut state = self.write()?;
        let mut staged: Vec<(Record, Option<usize>)> = Vec::with_capacity(records.len());
        for pending in records {
            let next = stage(
                &state,
                &staged,
                &pending.kind,
                pending.attributes,
                pending.parent_id,
            )?;
            staged.push(next);
        }

        let ids: Vec<RecordId> = staged.iter().map(|(r, _)| r.record_id).collect();
        for (record, parent_seq) in staged {
            state.push(record, parent_seq);
        }
        Ok(ids)
    }

    fn append_event(
        &self,
        record_id: RecordId,
        name: &str,
        attributes: Attributes,
    ) -> BatonResult<()> {
        let entry = {
            let state = self.read()?;
            let seq = state.seq_of(record_id).map_err(|_| BatonError::StoreWrite {
                reason: format!("record {record_id} does not exist"),
            })?;
            Arc::clone(&state.entries[seq])
        };

        let mut events = entry.events.lock().map_err(|_| poisoned("record events"))?;
        let timestamp = match events.last() {
            Some(last) if last.timestamp > Utc::now() => last.timestamp,
            _ => Utc::now(),
        };
        events.push(RecordEvent {
            name: name.to_string(),
            timestamp,
            attributes,
        });
        debug!(record_id = %record_id, event = name, count = events.len(), "event appended");
        Ok(())
    }
}

/// Build the next record after `state` and the already `staged` records,
/// without changing anything.
fn stage(
    state: &State,
    staged: &[(Record, Option<usize>)],
    kind: &str,
    attributes: Attributes,
    parent_id: Option<RecordId>,
) -> BatonResult<(Record, Option<usize>)> {
    if kind.is_empty() {
        return Err(BatonError::StoreWrite {
            reason: "record kind must not be empty".to_string(),
        });
    }
    if let Some(key) = attributes.keys().find(|k| k.starts_with(RESERVED_PREFIX)) {
        return Err(BatonError::StoreWrite {
            reason: format!("attribute '{key}' uses the reserved '{RESERVED_PREFIX}' prefix"),
        });
    }

    let parent_seq = match parent_id {
        Some(parent) => match state.by_id.get(&parent) {
            Some(&seq) => Some(seq),
            None => {
                warn!(kind, parent = %parent, "emit rejected: unknown parent");
                return Err(BatonError::StoreWrite {
                    reason: format!("parent record {parent} does not exist"),
                });
            }
        },
        None => None,
    };

    let (last_timestamp, prev_hash) = match staged.last() {
        Some((r, _)) => (Some(r.timestamp), r.this_hash.clone()),
        None => (
            state.entries.last().map(|e| e.record.timestamp),
            state.last_hash.clone(),
        ),
    };
    let now = Utc::now();
    let timestamp = match last_timestamp {
        Some(last) if last >= now => last + Duration::nanoseconds(1),
        _ => now,
    };

    let mut record = Record {
        record_id: RecordId::new(),
        sequence: (state.entries.len() + staged.len()) as u64,
        kind: kind.to_string(),
        attributes,
        events: Vec::new(),
        parent_id,
        timestamp,
        prev_hash,
        this_hash: String::new(),
    };
    record.this_hash = hash_record(&record)?;

    debug!(
        kind,
        record_id = %record.record_id,
        sequence = record.sequence,
        parent = ?parent_id,
        "record staged"
    );
    Ok((record, parent_seq))
}

fn not_found(id: RecordId) -> BatonError {
    BatonError::NotFound {
        entity: "record",
        id: id.to_string(),
    }
}

fn poisoned(what: &str) -> BatonError {
    BatonError::StoreWrite {
        reason: format!("{what} lock poisoned"),
    }
}
