//! The in-memory capability catalog and the discovery ranking.
//!
//! Capabilities and patterns live in one arena indexed by position. Edges
//! reference arena positions, never nested values. Only `outgoing` comes from
//! the manifest; `incoming` is derived from it when the catalog is built and
//! is never authored.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use baton_contracts::{
    capability::{Capability, Maturity, PatternEntry, RelationKind},
    error::{BatonError, BatonResult},
    ids::CapabilityId,
    insight::clamp_confidence,
};

use crate::{
    manifest::CapabilityManifest,
    trigger::{normalize, NormalizedTrigger},
};

#[derive(Debug, Clone)]
pub enum Node {
    Capability {
        capability: Capability,
        triggers: Vec<NormalizedTrigger>,
    },
    Pattern(PatternEntry),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Capability { capability, .. } => &capability.capability_id.0,
            Node::Pattern(p) => &p.id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    kind: RelationKind,
    node: usize,
}

/// How a trigger phrase matched the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    /// One contains the other.
    Substring,
    Exact,
}

/// How the matching trigger relates to the caller's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ContextMatch {
    Plain,
    /// Tagged trigger, with no context given or no context on the trigger.
    Tagged,
    /// Tagged trigger whose context equals the one given.
    Matched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMatch {
    pub capability_id: CapabilityId,
    pub confidence: f64,
    pub maturity: Maturity,
    pub match_kind: MatchKind,
    pub context_match: ContextMatch,
    /// The trigger that produced this match, as authored.
    pub trigger: String,
}

impl DiscoveryMatch {
    /// Ranking order: best first.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .match_kind
            .cmp(&self.match_kind)
            .then(other.context_match.cmp(&self.context_match))
            .then(other.confidence.total_cmp(&self.confidence))
            .then_with(|| self.capability_id.cmp(&other.capability_id))
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    version: String,
    nodes: Vec<Node>,
    by_id: HashMap<String, usize>,
    outgoing: Vec<Vec<Edge>>,
    incoming: Vec<Vec<Edge>>,
}

impl Catalog {
    pub fn new(manifest: CapabilityManifest) -> BatonResult<Self> {
        manifest.validate()?;

        let mut nodes = Vec::with_capacity(manifest.capabilities.len() + manifest.patterns.len());
        for capability in manifest.capabilities {
            let triggers = capability
                .triggers
                .iter()
                .filter_map(NormalizedTrigger::new)
                .collect();
            nodes.push(Node::Capability {
                capability,
                triggers,
            });
        }
        nodes.extend(manifest.patterns.into_iter().map(Node::Pattern));

        let by_id: HashMap<String, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id().to_string(), i))
            .collect();

        let mut outgoing = vec![Vec::new(); nodes.len()];
        let mut incoming = vec![Vec::new(); nodes.len()];
        for rel in &manifest.relations {
            // Endpoints were checked by `validate`.
            if let (Some(&from), Some(&to)) = (by_id.get(&rel.from), by_id.get(&rel.to)) {
                outgoing[from].push(Edge { kind: rel.kind, node: to });
                incoming[to].push(Edge { kind: rel.kind, node: from });
            }
        }

        debug!(
            version = %manifest.version,
            nodes = nodes.len(),
            relations = manifest.relations.len(),
            "catalog built"
        );
        Ok(Self {
            version: manifest.version,
            nodes,
            by_id,
            outgoing,
            incoming,
        })
    }

    pub fn from_toml_str(s: &str) -> BatonResult<Self> {
        Self::new(CapabilityManifest::from_toml_str(s)?)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Capabilities in manifest order.
    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Capability { capability, .. } => Some(capability),
            Node::Pattern(_) => None,
        })
    }

    pub fn capability(&self, id: &str) -> Option<&Capability> {
        match self.node(id)? {
            Node::Capability { capability, .. } => Some(capability),
            Node::Pattern(_) => None,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.by_id.get(id).map(|&i| &self.nodes[i])
    }

    /// Relations authored from `id`.
    pub fn relations_from(&self, id: &str) -> Vec<(RelationKind, &str)> {
        self.edges(&self.outgoing, id)
    }

    /// Relations pointing at `id`, from the derived reverse index.
    pub fn relations_to(&self, id: &str) -> Vec<(RelationKind, &str)> {
        self.edges(&self.incoming, id)
    }

    fn edges<'a>(&'a self, table: &'a [Vec<Edge>], id: &str) -> Vec<(RelationKind, &'a str)> {
        self.by_id
            .get(id)
            .map(|&i| {
                table[i]
                    .iter()
                    .map(|e| (e.kind, self.nodes[e.node].id()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn advance_maturity(&mut self, id: &str, next: Maturity) -> BatonResult<()> {
        let index = self.by_id.get(id).copied();
        match index.map(|i| &mut self.nodes[i]) {
            Some(Node::Capability { capability, .. }) => capability.advance_maturity(next),
            _ => Err(BatonError::NotFound {
                entity: "capability",
                id: id.to_string(),
            }),
        }
    }

    /// Rank capabilities whose triggers match `query`.
    ///
    /// A trigger matches when the normalized phrase equals the normalized
    /// query or either contains the other. When `context` is given, tagged
    /// triggers carrying a different context are skipped. Each capability
    /// is ranked by its best trigger. Capabilities below `min_confidence`
    /// are never returned; the floor is clamped to `[0, 1]` and NaN counts
    /// as no floor.
    pub fn discover(
        &self,
        query: &str,
        context: Option<&str>,
        min_confidence: f64,
    ) -> Vec<DiscoveryMatch> {
        let min_confidence = clamp_confidence(min_confidence);
        let query = normalize(query);
        if query.is_empty() {
            return Vec::new();
        }
        let context = context.map(normalize).filter(|c| !c.is_empty());

        let mut matches: Vec<DiscoveryMatch> = self
            .nodes
            .iter()
            .filter_map(|node| match node {
                Node::Capability {
                    capability,
                    triggers,
                } if capability.confidence >= min_confidence => {
                    best_trigger(triggers, &query, context.as_deref()).map(|(kind, ctx, trigger)| {
                        DiscoveryMatch {
                            capability_id: capability.capability_id.clone(),
                            confidence: capability.confidence,
                            maturity: capability.maturity,
                            match_kind: kind,
                            context_match: ctx,
                            trigger: trigger.original.clone(),
                        }
                    })
                }
                _ => None,
            })
            .collect();
        matches.sort_by(DiscoveryMatch::rank);

        debug!(
            query = %query,
            context = ?context,
            min_confidence,
            matched = matches.len(),
            "capability discovery"
        );
        matches
    }
}

fn best_trigger<'a>(
    triggers: &'a [NormalizedTrigger],
    query: &str,
    context: Option<&str>,
) -> Option<(MatchKind, ContextMatch, &'a NormalizedTrigger)> {
    let mut best: Option<(MatchKind, ContextMatch, &NormalizedTrigger)> = None;
    for trigger in triggers {
        let kind = if trigger.phrase == query {
            MatchKind::Exact
        } else if trigger.phrase.contains(query) || query.contains(trigger.phrase.as_str()) {
            MatchKind::Substring
        } else {
            continue;
        };

        let ctx = match (trigger.tagged, context, trigger.context.as_deref()) {
            (false, _, _) => ContextMatch::Plain,
            (true, Some(wanted), Some(tag)) if wanted == tag => ContextMatch::Matched,
            (true, Some(_), Some(_)) => continue,
            (true, _, _) => ContextMatch::Tagged,
        };

        if best.map_or(true, |(k, c, _)| (kind, ctx) > (k, c)) {
            best = Some((kind, ctx, trigger));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use baton_contracts::capability::Trigger;

    use super::*;

    fn tagged(phrase: &str, context: &str) -> Trigger {
        Trigger::Tagged {
            phrase: phrase.into(),
            context: Some(context.into()),
        }
    }

    fn plain(phrase: &str) -> Trigger {
        Trigger::Plain(phrase.into())
    }

    fn catalog(caps: Vec<Capability>) -> Catalog {
        Catalog::new(CapabilityManifest {
            version: "test".into(),
            capabilities: caps,
            patterns: vec![],
            relations: vec![],
        })
        .unwrap()
    }

    fn ids(matches: &[DiscoveryMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.capability_id.0.as_str()).collect()
    }

    // ── Ranking ──────────────────────────────────────────────────────────────

    fn regex_catalog() -> Catalog {
        catalog(vec![
            Capability::new("parse.regex-helpers", "parsing", Maturity::Stable)
                .with_trigger(plain("regex parsing"))
                .with_confidence(0.95),
            Capability::new("refactor.structured-output", "refactoring", Maturity::Beta)
                .with_trigger(tagged("replace regex parsing of LLM output", "refactoring"))
                .with_confidence(0.7),
            Capability::new("lint.regex", "linting", Maturity::Stable)
                .with_trigger(plain("replace regex parsing of llm output"))
                .with_confidence(0.9),
        ])
    }

    #[test]
    fn tagged_context_match_outranks_plain_substring() {
        let found = regex_catalog().discover("replace regex parsing", Some("refactoring"), 0.0);
        assert_eq!(
            ids(&found),
            vec!["refactor.structured-output", "parse.regex-helpers", "lint.regex"]
        );
        assert_eq!(found[0].context_match, ContextMatch::Matched);
        assert_eq!(found[0].match_kind, MatchKind::Substring);
    }

    #[test]
    fn tagged_trigger_outranks_plain_without_context() {
        let found = regex_catalog().discover("replace regex parsing", None, 0.0);
        assert_eq!(found[0].capability_id.0, "refactor.structured-output");
        assert_eq!(found[0].context_match, ContextMatch::Tagged);
        // Remaining plain matches fall back to confidence.
        assert_eq!(ids(&found)[1..], ["parse.regex-helpers", "lint.regex"]);
    }

    #[test]
    fn mismatched_context_filters_tagged_triggers() {
        let found = regex_catalog().discover("replace regex parsing", Some("testing"), 0.0);
        assert_eq!(ids(&found), vec!["parse.regex-helpers", "lint.regex"]);
    }

    #[test]
    fn exact_beats_substring_and_context() {
        let found = regex_catalog().discover("Replace regex parsing of LLM output!", Some("refactoring"), 0.0);
        assert_eq!(found[0].capability_id.0, "refactor.structured-output");
        assert_eq!(found[0].match_kind, MatchKind::Exact);

        let found = regex_catalog().discover("regex parsing", None, 0.0);
        assert_eq!(found[0].capability_id.0, "parse.regex-helpers");
        assert_eq!(found[0].match_kind, MatchKind::Exact);
    }

    #[test]
    fn query_containing_the_trigger_matches() {
        let found = regex_catalog().discover("help with regex parsing in the service", None, 0.0);
        assert_eq!(ids(&found), vec!["parse.regex-helpers"]);
    }

    #[test]
    fn min_confidence_is_a_hard_floor() {
        let found = regex_catalog().discover("replace regex parsing", None, 0.8);
        assert!(found.iter().all(|m| m.confidence >= 0.8));
        assert!(!ids(&found).contains(&"refactor.structured-output"));
    }

    #[test]
    fn out_of_range_floors_are_clamped() {
        let cat = regex_catalog();
        let all = ids(&cat.discover("replace regex parsing", None, 0.0)).len();
        assert_eq!(all, 3);
        assert_eq!(cat.discover("replace regex parsing", None, f64::NAN).len(), all);
        assert_eq!(cat.discover("replace regex parsing", None, -3.0).len(), all);
        assert_eq!(cat.discover("replace regex parsing", None, f64::NEG_INFINITY).len(), all);

        let strict = catalog(vec![Capability::new("certain", "x", Maturity::Stable)
            .with_trigger(plain("deploy"))
            .with_confidence(1.0)]);
        assert_eq!(ids(&strict.discover("deploy", None, 7.5)), vec!["certain"]);
        assert_eq!(ids(&strict.discover("deploy", None, f64::INFINITY)), vec!["certain"]);
    }

    #[test]
    fn ties_break_on_capability_id() {
        let cat = catalog(vec![
            Capability::new("b", "x", Maturity::Beta).with_trigger(plain("deploy")),
            Capability::new("a", "x", Maturity::Beta).with_trigger(plain("deploy")),
        ]);
        assert_eq!(ids(&cat.discover("deploy", None, 0.0)), vec!["a", "b"]);
    }

    #[test]
    fn empty_query_matches_nothing() {
        assert!(regex_catalog().discover("  ?! ", None, 0.0).is_empty());
    }

    // ── Relations ────────────────────────────────────────────────────────────

    #[test]
    fn reverse_relations_are_derived() {
        let toml = r#"
version = "1"
[[capabilities]]
capability_id = "refactor.structured-output"
category = "refactoring"
maturity = "beta"
triggers = ["structured output"]
[[capabilities]]
capability_id = "schema.validate"
category = "validation"
maturity = "stable"
triggers = ["validate json"]
[[patterns]]
id = "regex-llm-parsing"
kind = "anti_pattern"
[[relations]]
from = "refactor.structured-output"
kind = "avoids"
to = "regex-llm-parsing"
[[relations]]
from = "refactor.structured-output"
kind = "depends_on"
to = "schema.validate"
"#;
        let cat = Catalog::from_toml_str(toml).unwrap();
        assert_eq!(
            cat.relations_from("refactor.structured-output"),
            vec![
                (RelationKind::Avoids, "regex-llm-parsing"),
                (RelationKind::DependsOn, "schema.validate"),
            ]
        );
        assert_eq!(
            cat.relations_to("regex-llm-parsing"),
            vec![(RelationKind::Avoids, "refactor.structured-output")]
        );
        assert!(cat.relations_from("regex-llm-parsing").is_empty());
        assert!(cat.relations_to("unknown").is_empty());
        assert!(matches!(cat.node("regex-llm-parsing"), Some(Node::Pattern(_))));
        assert!(cat.capability("regex-llm-parsing").is_none());
    }

    #[test]
    fn maturity_advances_through_the_catalog() {
        let mut cat = regex_catalog();
        cat.advance_maturity("refactor.structured-output", Maturity::Stable).unwrap();
        assert_eq!(
            cat.capability("refactor.structured-output").unwrap().maturity,
            Maturity::Stable
        );
        assert!(matches!(
            cat.advance_maturity("refactor.structured-output", Maturity::Beta),
            Err(BatonError::MaturityRegression { .. })
        ));
        assert!(matches!(
            cat.advance_maturity("nope", Maturity::Stable),
            Err(BatonError::NotFound { .. })
        ));
    }
}
