//! # Correlator Engine
//!
//! The pluggable correlation pipeline. A concrete correlator supplies raw
//! correlation rules ([`CorrelatorEngine::raw_correlate`]) and cheap entity
//! preconditions; the provided [`CorrelatorEngine::correlate`] composes them
//! with the shared stages:
//!
//! 1. logic preprocessing over the unfiltered working set, catching exact
//!    duplicate sightings (same adapter type and native id seen by two
//!    adapter instances),
//! 2. a prefilter that drops entities no rule could ever match,
//! 3. post-processing of the raw result stream: resolution against the
//!    working set, `strongly_unbound_with` suppression, deduplication, and
//! 4. a final pass deducing correlations between two known records that each
//!    independently matched the same unseen third record.
//!
//! The output is a lazy, forward-only, non-restartable stream; all working
//! state (indices, dedup set, deduction buffer) is local to one invocation.

use crate::correlation::{CorrelationOutcome, CorrelationReason, CorrelationResult};
use crate::model::{AdapterRecord, Entity};
use anyhow::{bail, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Cheap predicate over an entity's full adapter record set, used by the
/// prefilter. Predicates must not panic on malformed data; a record missing
/// the fields a predicate inspects simply fails it.
pub type EntityPrecondition = fn(&[AdapterRecord]) -> bool;

/// A correlation ruleset.
///
/// Implementations encode one family of matching rules (e.g. static device
/// attributes, user identities). The engine drives them through
/// [`correlate`](Self::correlate); implementations never post-process their
/// own results.
pub trait CorrelatorEngine {
    /// Produce raw correlation candidates over the prefiltered working set.
    ///
    /// No validation is applied here: a result may reference a record the
    /// caller has no visibility into, and duplicates across rules are fine.
    /// Both are sorted out during post-processing. Items that are not
    /// correlations ([`CorrelationOutcome::Warning`]) pass through untouched.
    fn raw_correlate<'a>(
        &'a self,
        entities: &[&Entity],
    ) -> Box<dyn Iterator<Item = CorrelationOutcome> + 'a>;

    /// Preconditions for the prefilter; an entity is kept if any holds.
    fn correlation_preconditions(&self) -> Vec<EntityPrecondition>;

    /// Domain veto over a single raw result before resolution. The default
    /// accepts everything.
    #[allow(unused_variables)]
    fn post_process(
        &self,
        first_name: &str,
        first_id: &str,
        second_name: &str,
        second_id: &str,
        data: &Value,
        reason: &CorrelationReason,
    ) -> bool {
        true
    }

    /// Run the full correlation pipeline over `entities`.
    ///
    /// The returned stream yields each surviving correlation once per unique
    /// pair. A fatal engine invariant violation (see [`preprocess_entities`]
    /// and first-side resolution) surfaces as a final `Err` item, after which
    /// the stream is exhausted.
    fn correlate<'a>(&'a self, entities: &'a [Entity]) -> Correlations<'a>
    where
        Self: Sized,
    {
        Correlations::new(self, entities)
    }
}

/// Keep only entities for which at least one precondition holds, preserving
/// input order. Entities whose records satisfy no precondition can never
/// participate in a rule and are dropped silently.
pub fn prefilter_entities<'a>(
    entities: &'a [Entity],
    preconditions: &[EntityPrecondition],
) -> Vec<&'a Entity> {
    entities
        .iter()
        .filter(|entity| preconditions.iter().any(|holds| holds(&entity.adapters)))
        .collect()
}

/// Find adapter records reported by two different instances of the same
/// adapter type under the same vendor-native id. Such records are two
/// sightings of the literal same vendor entity, a correlation with certainty
/// 1.0 and no heuristic involved.
///
/// Two records sharing the `plugin_unique_name` as well would be a duplicate
/// in the caller's supply, not a correlation; that is a caller programming
/// error and fails the pass.
pub fn preprocess_entities(entities: &[Entity]) -> Result<Vec<CorrelationResult>> {
    let mut records: Vec<&AdapterRecord> = entities
        .iter()
        .flat_map(|entity| entity.adapters.iter())
        .filter(|record| !record.is_tag())
        .collect();

    // Stable sort so equal (plugin_name, id) records become adjacent.
    records.sort_by(|a, b| {
        (a.plugin_name.as_str(), a.data.id.as_str())
            .cmp(&(b.plugin_name.as_str(), b.data.id.as_str()))
    });

    let mut results = Vec::new();
    for pair in records.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if a.plugin_name != b.plugin_name || a.data.id != b.data.id {
            continue;
        }
        if a.plugin_unique_name == b.plugin_unique_name {
            bail!("two exact adapter records were supplied: {} and {}", a, b);
        }
        results.push(CorrelationResult::new(
            (a.plugin_unique_name.clone(), a.data.id.clone()),
            (b.plugin_unique_name.clone(), b.data.id.clone()),
            json!({
                "Reason": "The same device is seen by two instances of the same adapter"
            }),
            CorrelationReason::Logic,
        ));
    }
    Ok(results)
}

enum Phase {
    Main,
    Deduction,
    Done,
}

/// The lazy output stream of one [`CorrelatorEngine::correlate`] invocation.
///
/// Forward-only and non-restartable: consuming the results twice requires
/// re-invoking `correlate`.
pub struct Correlations<'a> {
    engine: &'a dyn CorrelatorEngine,
    by_plugin_name: FxHashMap<(&'a str, &'a str), (&'a Entity, &'a AdapterRecord)>,
    by_unique_name: FxHashMap<(&'a str, &'a str), (&'a Entity, &'a AdapterRecord)>,
    // Over the unfiltered working set; the logic pass runs before the
    // prefilter, so its results may live in entities the prefilter dropped.
    by_unique_name_unfiltered: FxHashMap<(&'a str, &'a str), (&'a Entity, &'a AdapterRecord)>,
    inner: Box<dyn Iterator<Item = CorrelationOutcome> + 'a>,
    seen: FxHashSet<[(String, String); 2]>,
    unavailable: Vec<[(String, String); 2]>,
    deduced: std::vec::IntoIter<CorrelationResult>,
    phase: Phase,
    pending_err: Option<anyhow::Error>,
}

impl<'a> Correlations<'a> {
    fn new(engine: &'a dyn CorrelatorEngine, entities: &'a [Entity]) -> Self {
        let mut pending_err = None;
        let logic_results = match preprocess_entities(entities) {
            Ok(results) => results,
            Err(err) => {
                pending_err = Some(err);
                Vec::new()
            }
        };

        let preconditions = engine.correlation_preconditions();
        let filtered = prefilter_entities(entities, &preconditions);
        info!(entities = filtered.len(), "correlating working set");

        let mut by_plugin_name = FxHashMap::default();
        let mut by_unique_name = FxHashMap::default();
        for &entity in &filtered {
            for record in &entity.adapters {
                if record.is_tag() {
                    continue;
                }
                let id = record.data.id.as_str();
                by_plugin_name.insert((record.plugin_name.as_str(), id), (entity, record));
                by_unique_name.insert((record.plugin_unique_name.as_str(), id), (entity, record));
            }
        }

        let mut by_unique_name_unfiltered = FxHashMap::default();
        for entity in entities {
            for record in &entity.adapters {
                if record.is_tag() {
                    continue;
                }
                let key = (record.plugin_unique_name.as_str(), record.data.id.as_str());
                by_unique_name_unfiltered.insert(key, (entity, record));
            }
        }

        let raw = engine.raw_correlate(&filtered);
        let inner = Box::new(
            logic_results
                .into_iter()
                .map(CorrelationOutcome::Correlation)
                .chain(raw),
        );

        Self {
            engine,
            by_plugin_name,
            by_unique_name,
            by_unique_name_unfiltered,
            inner,
            seen: FxHashSet::default(),
            unavailable: Vec::new(),
            deduced: Vec::new().into_iter(),
            phase: Phase::Main,
            pending_err,
        }
    }

    /// Resolve, rewrite, and filter one raw correlation. `Ok(None)` means the
    /// result was consumed without being yielded (vetoed, suppressed,
    /// duplicate, or buffered for deduction).
    fn post_process_result(
        &mut self,
        mut result: CorrelationResult,
    ) -> Result<Option<CorrelationResult>> {
        let [(first_name, first_id), (second_name, second_id)] =
            result.associated_adapters.clone();

        if !self.engine.post_process(
            &first_name,
            &first_id,
            &second_name,
            &second_id,
            &result.data,
            &result.reason,
        ) {
            return Ok(None);
        }

        // The first side is always a record the engine itself offered for
        // comparison; for raw results that means a record of the filtered
        // working set, and failing to resolve it there is an engine bug, not
        // bad input. Logic results come from the pass over the unfiltered
        // set, so they resolve against the unfiltered index.
        let first = if result.reason.is_logic() {
            self.by_unique_name_unfiltered
                .get(&(first_name.as_str(), first_id.as_str()))
                .copied()
        } else {
            self.by_unique_name
                .get(&(first_name.as_str(), first_id.as_str()))
                .copied()
        };
        let Some((first_entity, _)) = first else {
            bail!(
                "correlation basis {}/{} is not part of the working set",
                first_name,
                first_id
            );
        };

        // Logic results carry instance-precise addressing on both sides;
        // heuristic ones only know the logical adapter type of the match.
        let second = if result.reason.is_logic() {
            self.by_unique_name_unfiltered
                .get(&(second_name.as_str(), second_id.as_str()))
                .copied()
        } else {
            self.by_plugin_name
                .get(&(second_name.as_str(), second_id.as_str()))
                .copied()
        };

        let Some((_, second_record)) = second else {
            // The match references a record the caller cannot see. Two
            // independent matches against the same unseen record are still
            // informative, so buffer it for the deduction pass.
            self.unavailable.push(result.associated_adapters);
            return Ok(None);
        };

        result.associated_adapters[1] =
            (second_record.plugin_unique_name.clone(), second_id.clone());

        // An explicit "never merge these" override beats any rule match.
        if first_entity.is_strongly_unbound_with(&second_record.plugin_name, &second_id) {
            return Ok(None);
        }

        if !self.seen.insert(result.sorted_pair()) {
            debug!(%result, "skipping correlation already made this pass");
            return Ok(None);
        }
        Ok(Some(result))
    }
}

impl Iterator for Correlations<'_> {
    type Item = Result<CorrelationOutcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending_err.take() {
            self.phase = Phase::Done;
            return Some(Err(err));
        }

        loop {
            match self.phase {
                Phase::Done => return None,
                Phase::Main => {
                    let Some(outcome) = self.inner.next() else {
                        let buffered = std::mem::take(&mut self.unavailable);
                        self.deduced = deduce_from_unavailable(buffered).into_iter();
                        self.phase = Phase::Deduction;
                        continue;
                    };
                    let result = match outcome {
                        CorrelationOutcome::Warning(warning) => {
                            return Some(Ok(CorrelationOutcome::Warning(warning)));
                        }
                        CorrelationOutcome::Correlation(result) => result,
                    };
                    match self.post_process_result(result) {
                        Ok(Some(result)) => {
                            return Some(Ok(CorrelationOutcome::Correlation(result)));
                        }
                        Ok(None) => continue,
                        Err(err) => {
                            self.phase = Phase::Done;
                            return Some(Err(err));
                        }
                    }
                }
                Phase::Deduction => match self.deduced.next() {
                    Some(result) => {
                        return Some(Ok(CorrelationOutcome::Correlation(result)));
                    }
                    None => {
                        self.phase = Phase::Done;
                        return None;
                    }
                },
            }
        }
    }
}

/// Deduce correlations between known records that each matched the same
/// unseen record.
///
/// Each buffered pair is `[basis, unresolved match]`. Sorting by the
/// unresolved side makes equal matches adjacent, so a single sweep finds
/// every `basis -> X`, `basis2 -> X` pair and turns it into a
/// `basis <-> basis2` correlation through the common unseen X. The same
/// basis can reach X through several rules; those buffered entries are
/// identical and must collapse to one, or the sweep would pair a record
/// with itself.
fn deduce_from_unavailable(
    mut unavailable: Vec<[(String, String); 2]>,
) -> Vec<CorrelationResult> {
    unavailable.sort_by(|a, b| a[1].cmp(&b[1]).then_with(|| a[0].cmp(&b[0])));
    unavailable.dedup();

    let mut deduced = Vec::new();
    for pair in unavailable.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a[1] != b[1] || a[0] == b[0] {
            continue;
        }
        let reason = format!(
            "{}/{} is a nonexistent device correlated to both {}/{} and {}/{}",
            a[1].0, a[1].1, a[0].0, a[0].1, b[0].0, b[0].1
        );
        deduced.push(CorrelationResult::new(
            a[0].clone(),
            b[0].clone(),
            json!({ "Reason": reason }),
            CorrelationReason::NonexistentDeduction,
        ));
    }
    deduced
}
