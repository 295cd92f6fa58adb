//! Publishing a catalog into the knowledge store.

use tracing::info;

use baton_contracts::{
    capability::Capability,
    error::BatonResult,
    ids::RecordId,
    record::{keys, AttrValue, Attributes, Record, TimeRange},
};
use baton_core::traits::RecordSink;
use baton_store::KnowledgeStore;

use crate::{catalog::Catalog, query::quote, trigger::normalize};

/// Emit one `capability` record per capability, in manifest order.
///
/// Triggers are stored normalized so `capability.triggers = "..."` queries
/// use the same form as discovery.
pub fn publish(
    catalog: &Catalog,
    sink: &dyn RecordSink,
    parent_id: Option<RecordId>,
) -> BatonResult<Vec<RecordId>> {
    let ids = catalog
        .capabilities()
        .map(|cap| sink.emit(keys::KIND_CAPABILITY, capability_attributes(catalog, cap), parent_id))
        .collect::<BatonResult<Vec<_>>>()?;

    info!(
        manifest_version = catalog.version(),
        capabilities = ids.len(),
        "catalog published"
    );
    Ok(ids)
}

fn capability_attributes(catalog: &Catalog, cap: &Capability) -> Attributes {
    let id = cap.capability_id.0.as_str();
    let triggers: Vec<String> = cap
        .triggers
        .iter()
        .map(|t| normalize(t.phrase()))
        .filter(|t| !t.is_empty())
        .collect();

    let mut attrs = Attributes::new();
    attrs.insert(keys::CAPABILITY_ID.into(), id.into());
    attrs.insert(keys::CAPABILITY_TRIGGERS.into(), AttrValue::List(triggers));
    attrs.insert(keys::CAPABILITY_CATEGORY.into(), cap.category.as_str().into());
    attrs.insert(keys::CAPABILITY_MATURITY.into(), cap.maturity.as_str().into());
    attrs.insert(keys::CAPABILITY_CONFIDENCE.into(), cap.confidence.into());
    attrs.insert(
        keys::CAPABILITY_MANIFEST_VERSION.into(),
        catalog.version().into(),
    );

    let relations: Vec<String> = catalog
        .relations_from(id)
        .into_iter()
        .map(|(kind, to)| format!("{kind}:{to}"))
        .collect();
    if !relations.is_empty() {
        attrs.insert(keys::CAPABILITY_RELATIONS.into(), AttrValue::List(relations));
    }
    attrs
}

/// Capability records of one manifest version, optionally in one category.
pub fn published(
    store: &KnowledgeStore,
    manifest_version: &str,
    category: Option<&str>,
) -> BatonResult<Vec<Record>> {
    let mut expr = format!(
        "record.kind = {} && {} = {}",
        quote(keys::KIND_CAPABILITY),
        keys::CAPABILITY_MANIFEST_VERSION,
        quote(manifest_version)
    );
    if let Some(category) = category {
        expr.push_str(&format!(" && {} = {}", keys::CAPABILITY_CATEGORY, quote(category)));
    }
    store.query(&expr, TimeRange::all())
}
