//! Insight recording and retrieval through the store's query language.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::info;
use uuid::Uuid;

use baton_contracts::{
    error::{BatonError, BatonResult},
    ids::{InsightId, RecordId},
    insight::{clamp_confidence, EvidenceKind, EvidenceRef, Insight, InsightType},
    record::{keys, AttrValue, Attributes, Record, TimeRange},
};
use baton_core::traits::RecordSink;
use baton_store::KnowledgeStore;

/// Render `s` as a query string literal.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Conjunction of insight constraints. The empty filter matches every insight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsightFilter {
    pub insight_type: Option<InsightType>,
    pub min_confidence: Option<f64>,
    pub evidence: Option<EvidenceRef>,
    pub evidence_kind: Option<EvidenceKind>,
    pub range: TimeRange,
}

impl InsightFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, insight_type: InsightType) -> Self {
        self.insight_type = Some(insight_type);
        self
    }

    pub fn min_confidence(mut self, min: f64) -> Self {
        self.min_confidence = Some(clamp_confidence(min));
        self
    }

    /// Insights citing exactly this reference.
    pub fn citing(mut self, evidence: EvidenceRef) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Insights citing at least one reference of this kind.
    pub fn with_evidence_kind(mut self, kind: EvidenceKind) -> Self {
        self.evidence_kind = Some(kind);
        self
    }

    pub fn within(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn to_query(&self) -> String {
        let mut clauses = vec![format!("record.kind = {}", quote(keys::KIND_INSIGHT))];
        if let Some(t) = self.insight_type {
            clauses.push(format!("{} = {}", keys::INSIGHT_TYPE, quote(t.as_str())));
        }
        if let Some(min) = self.min_confidence {
            clauses.push(format!("{} >= {}", keys::INSIGHT_CONFIDENCE, min));
        }
        if let Some(ev) = &self.evidence {
            clauses.push(format!("{} = {}", keys::INSIGHT_EVIDENCE, quote(&ev.to_string())));
        }
        if let Some(kind) = self.evidence_kind {
            clauses.push(format!(
                "{} =~ {}",
                keys::INSIGHT_EVIDENCE,
                quote(&format!("^{}:", kind.as_str()))
            ));
        }
        clauses.join(" && ")
    }
}

/// Records insights into a store and reads them back as typed values.
pub struct InsightQuerier {
    store: Arc<KnowledgeStore>,
}

impl InsightQuerier {
    pub fn new(store: Arc<KnowledgeStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    /// Emit an `insight` record, optionally under the record it explains.
    pub fn record_insight(
        &self,
        insight: &Insight,
        parent_id: Option<RecordId>,
    ) -> BatonResult<RecordId> {
        let evidence: Vec<String> = insight.evidence.iter().map(ToString::to_string).collect();
        let mut attrs = Attributes::new();
        attrs.insert(keys::INSIGHT_ID.into(), insight.id.to_string().into());
        attrs.insert(keys::INSIGHT_TYPE.into(), insight.insight_type.as_str().into());
        attrs.insert(keys::INSIGHT_SUMMARY.into(), insight.summary.as_str().into());
        attrs.insert(keys::INSIGHT_CONFIDENCE.into(), insight.confidence().into());
        attrs.insert(keys::INSIGHT_EVIDENCE.into(), AttrValue::List(evidence));
        attrs.insert(
            keys::INSIGHT_RECORDED_AT.into(),
            insight
                .recorded_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .into(),
        );

        let record_id = self.store.emit(keys::KIND_INSIGHT, attrs, parent_id)?;
        info!(
            insight_id = %insight.id,
            insight_type = %insight.insight_type,
            confidence = insight.confidence(),
            record_id = %record_id,
            "insight recorded"
        );
        Ok(record_id)
    }

    /// Matching insights in the order they were recorded.
    pub fn query(&self, filter: &InsightFilter) -> BatonResult<Vec<Insight>> {
        self.store
            .query(&filter.to_query(), filter.range)?
            .iter()
            .map(insight_from_record)
            .collect()
    }

    pub fn by_type(&self, insight_type: InsightType) -> BatonResult<Vec<Insight>> {
        self.query(&InsightFilter::new().of_type(insight_type))
    }

    pub fn with_min_confidence(&self, min: f64) -> BatonResult<Vec<Insight>> {
        self.query(&InsightFilter::new().min_confidence(min))
    }

    pub fn citing(&self, evidence: &EvidenceRef) -> BatonResult<Vec<Insight>> {
        self.query(&InsightFilter::new().citing(evidence.clone()))
    }

    pub fn get(&self, id: InsightId) -> BatonResult<Insight> {
        let expr = format!(
            "record.kind = {} && {} = {}",
            quote(keys::KIND_INSIGHT),
            keys::INSIGHT_ID,
            quote(&id.to_string())
        );
        let records = self.store.query(&expr, TimeRange::all())?;
        match records.first() {
            Some(record) => insight_from_record(record),
            None => Err(BatonError::NotFound {
                entity: "insight",
                id: id.to_string(),
            }),
        }
    }
}

fn malformed(record: &Record, detail: impl std::fmt::Display) -> BatonError {
    BatonError::SchemaValidation {
        reason: format!("record {} is not a valid insight: {detail}", record.record_id),
    }
}

fn string_attr<'a>(record: &'a Record, key: &str) -> BatonResult<&'a str> {
    record
        .attributes
        .get(key)
        .and_then(AttrValue::as_str)
        .ok_or_else(|| malformed(record, format!("missing string attribute '{key}'")))
}

/// Rebuild a typed insight from its record.
pub fn insight_from_record(record: &Record) -> BatonResult<Insight> {
    let id = string_attr(record, keys::INSIGHT_ID)?;
    let id = Uuid::parse_str(id)
        .map(InsightId)
        .map_err(|e| malformed(record, format!("bad id '{id}': {e}")))?;

    let type_str = string_attr(record, keys::INSIGHT_TYPE)?;
    let insight_type = InsightType::parse(type_str)
        .ok_or_else(|| malformed(record, format!("unknown type '{type_str}'")))?;

    let summary = string_attr(record, keys::INSIGHT_SUMMARY)?;
    let confidence = record
        .attributes
        .get(keys::INSIGHT_CONFIDENCE)
        .and_then(AttrValue::as_f64)
        .ok_or_else(|| malformed(record, "missing confidence"))?;

    let recorded_at = string_attr(record, keys::INSIGHT_RECORDED_AT)?;
    let recorded_at = DateTime::parse_from_rfc3339(recorded_at)
        .map_err(|e| malformed(record, format!("bad timestamp '{recorded_at}': {e}")))?
        .with_timezone(&Utc);

    let evidence = match record.attributes.get(keys::INSIGHT_EVIDENCE) {
        Some(AttrValue::List(items)) => items
            .iter()
            .map(|s| EvidenceRef::parse(s))
            .collect::<BatonResult<Vec<_>>>()?,
        Some(_) => return Err(malformed(record, "evidence is not a list")),
        None => Vec::new(),
    };

    let mut insight = Insight::new(insight_type, summary, confidence);
    insight.id = id;
    insight.evidence = evidence;
    insight.recorded_at = recorded_at;
    Ok(insight)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ev(s: &str) -> EvidenceRef {
        EvidenceRef::parse(s).unwrap()
    }

    fn querier() -> InsightQuerier {
        InsightQuerier::new(Arc::new(KnowledgeStore::new()))
    }

    #[test]
    fn recorded_insight_reads_back_equal() {
        let q = querier();
        let insight = Insight::new(InsightType::Lesson, "retry storms follow cache flushes", 0.82)
            .with_evidence(ev("trace:4bf92f3577b34da6"))
            .with_evidence(ev("url:https://status.example.com/incidents/42"));
        q.record_insight(&insight, None).unwrap();

        assert_eq!(q.get(insight.id).unwrap(), insight);
        assert!(matches!(q.get(InsightId::new()), Err(BatonError::NotFound { .. })));
    }

    #[test]
    fn filters_by_type_confidence_and_evidence() {
        let q = querier();
        let a = Insight::new(InsightType::Observation, "p99 latency doubled", 0.9)
            .with_evidence(ev("trace:aaa"));
        let b = Insight::new(InsightType::Decision, "roll back release 812", 0.6)
            .with_evidence(ev("handoff:h-1"));
        let c = Insight::new(InsightType::Observation, "disk pressure on db-3", 0.4);
        for insight in [&a, &b, &c] {
            q.record_insight(insight, None).unwrap();
        }

        let ids = |found: Vec<Insight>| found.into_iter().map(|i| i.id).collect::<Vec<_>>();
        assert_eq!(ids(q.by_type(InsightType::Observation).unwrap()), vec![a.id, c.id]);
        assert_eq!(ids(q.with_min_confidence(0.6).unwrap()), vec![a.id, b.id]);
        assert_eq!(ids(q.citing(&ev("handoff:h-1")).unwrap()), vec![b.id]);
        assert_eq!(
            ids(q
                .query(
                    &InsightFilter::new()
                        .of_type(InsightType::Observation)
                        .with_evidence_kind(EvidenceKind::Trace)
                )
                .unwrap()),
            vec![a.id]
        );
        assert_eq!(ids(q.query(&InsightFilter::new()).unwrap()).len(), 3);
    }

    #[test]
    fn insights_hang_under_their_subject() {
        let q = querier();
        let root = q.store().emit(keys::KIND_HANDOFF, Attributes::new(), None).unwrap();
        let insight = Insight::new(InsightType::Lesson, "x", 0.5);
        let record = q.record_insight(&insight, Some(root)).unwrap();
        assert_eq!(q.store().ancestors(record).unwrap()[0].record_id, root);
    }

    #[test]
    fn evidence_with_quotes_is_escaped_in_queries() {
        let q = querier();
        let tricky = EvidenceRef::new(EvidenceKind::Url, r#"https://x.test/?q="a\b""#).unwrap();
        let insight = Insight::new(InsightType::Observation, "odd link", 0.5).with_evidence(tricky.clone());
        q.record_insight(&insight, None).unwrap();
        assert_eq!(q.citing(&tricky).unwrap().len(), 1);
    }

    #[test]
    fn non_insight_record_is_rejected() {
        let store = KnowledgeStore::new();
        let id = store.emit(keys::KIND_INSIGHT, Attributes::new(), None).unwrap();
        let err = insight_from_record(&store.get(id).unwrap()).unwrap_err();
        assert!(matches!(err, BatonError::SchemaValidation { .. }));
    }

    #[test]
    fn filter_renders_a_conjunction() {
        let filter = InsightFilter::new()
            .of_type(InsightType::Decision)
            .min_confidence(0.75);
        assert_eq!(
            filter.to_query(),
            r#"record.kind = "insight" && insight.type = "decision" && insight.confidence >= 0.75"#
        );
    }

    proptest! {
        #[test]
        fn prop_quoted_strings_match_verbatim(text in r#"[a-z"\\ ]{0,16}"#) {
            let store = KnowledgeStore::new();
            let mut attrs = Attributes::new();
            attrs.insert("t.v".into(), text.clone().into());
            store.emit("row", attrs, None).unwrap();

            let found = store.query(&format!("t.v = {}", quote(&text)), TimeRange::all()).unwrap();
            prop_assert_eq!(found.len(), 1);
        }
    }
}
