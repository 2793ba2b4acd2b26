//! # Bucketing Engine
//!
//! Sorts a candidate set and partitions it into small buckets of mutually
//! comparable records, then runs full comparator rules only within (or
//! across) those buckets. This turns an otherwise quadratic comparison
//! problem into a near-linear sweep plus small pairwise passes.
//!
//! Because the candidate list is sorted first, only adjacent pairs are
//! admission-tested: records that would admit each other but end up
//! non-adjacent after sorting are never bucketed together. That approximation
//! is deliberate; the choice of sort keys is what makes it sound for a given
//! rule.

use crate::correlation::{CorrelationReason, CorrelationResult};
use serde_json::Value;
use tracing::debug;

/// Key extractor used to order candidates ahead of the sweep. Keys must agree
/// with the admission comparators: records an admission comparator accepts
/// must sort adjacently.
pub type SortKeyFn<R> = fn(&R) -> String;

/// Pairwise predicate over candidate records.
pub type PairComparator<R> = fn(&R, &R) -> bool;

/// Per-record predicate used to split a bucket into precondition-satisfying
/// candidates and the rest.
pub type RecordPredicate<R> = fn(&R) -> bool;

/// Addressing hooks the bucketing engine needs to turn a matching pair into a
/// [`CorrelationResult`].
pub trait Correlatable {
    /// Addressing for the record offered as the basis of comparison. Always
    /// instance-precise (`plugin_unique_name`).
    fn base_addressing(&self) -> (String, String);

    /// Addressing for the record found by the rule. Only type-precise
    /// (`plugin_name`); post-processing resolves the instance.
    fn match_addressing(&self) -> (String, String);
}

/// Lazy sweep over a sorted candidate list, yielding maximal admission-contiguous
/// runs of at least two records. Single-record runs can produce no pair and
/// are never yielded.
pub struct Buckets<R> {
    records: std::vec::IntoIter<R>,
    admission: Vec<PairComparator<R>>,
    bucket: Vec<R>,
    pairs_seen: usize,
    total: usize,
    log_every: usize,
}

impl<R> Buckets<R> {
    /// Stably sort `records` by the reverse-applied `sort_keys` (least
    /// significant key first), then set up the adjacent-pair sweep.
    pub fn new(
        mut records: Vec<R>,
        sort_keys: &[SortKeyFn<R>],
        admission: &[PairComparator<R>],
    ) -> Self {
        for key in sort_keys.iter().rev() {
            records.sort_by_key(|record| key(record));
        }

        let total = records.len();
        let mut records = records.into_iter();
        let bucket = records.next().map(|first| vec![first]).unwrap_or_default();

        Self {
            records,
            admission: admission.to_vec(),
            bucket,
            pairs_seen: 0,
            total,
            log_every: (total / 100).max(100),
        }
    }
}

impl<R> Iterator for Buckets<R> {
    type Item = Vec<R>;

    fn next(&mut self) -> Option<Vec<R>> {
        for next in self.records.by_ref() {
            self.pairs_seen += 1;
            if self.pairs_seen % self.log_every == 0 {
                debug!(pair = self.pairs_seen, total = self.total, "bucket sweep progress");
            }

            let admitted = {
                let prev = self.bucket.last().expect("sweep bucket is never empty");
                self.admission.iter().all(|compare| compare(prev, &next))
            };
            if admitted {
                self.bucket.push(next);
            } else {
                let full = std::mem::replace(&mut self.bucket, vec![next]);
                if full.len() > 1 {
                    return Some(full);
                }
            }
        }

        if self.bucket.len() > 1 {
            return Some(std::mem::take(&mut self.bucket));
        }
        None
    }
}

fn create_result<R: Correlatable>(
    first: &R,
    second: &R,
    data: &Value,
    reason: &CorrelationReason,
) -> CorrelationResult {
    CorrelationResult::new(
        first.base_addressing(),
        second.match_addressing(),
        data.clone(),
        reason.clone(),
    )
}

/// Compare every pair across `left × right` (Cartesian product).
fn process_product<R: Correlatable>(
    left: &[R],
    right: &[R],
    comparators: &[PairComparator<R>],
    data: &Value,
    reason: &CorrelationReason,
    out: &mut Vec<CorrelationResult>,
) {
    for first in left {
        for second in right {
            if comparators.iter().all(|compare| compare(first, second)) {
                out.push(create_result(first, second, data, reason));
            }
        }
    }
}

/// Compare every unordered pair within `bucket` (no self-pairs).
fn process_combinations<R: Correlatable>(
    bucket: &[R],
    comparators: &[PairComparator<R>],
    data: &Value,
    reason: &CorrelationReason,
    out: &mut Vec<CorrelationResult>,
) {
    for i in 0..bucket.len() {
        for j in (i + 1)..bucket.len() {
            let (first, second) = (&bucket[i], &bucket[j]);
            if comparators.iter().all(|compare| compare(first, second)) {
                out.push(create_result(first, second, data, reason));
            }
        }
    }
}

/// Run one correlation rule over a candidate set.
///
/// The candidates are sorted and swept into buckets via `admission`. Within
/// each bucket, a pair becomes a [`CorrelationResult`] iff every comparator
/// in `comparators` accepts it. When `preconditions` is non-empty the bucket
/// is first split into records satisfying any precondition and the rest;
/// pairs are then drawn from `candidates × rest` and from within the
/// candidate group, so two records that both lack the precondition are never
/// compared. Comparator panics propagate; rule correctness is the caller's
/// contract.
pub fn bucket_correlate<R: Correlatable + 'static>(
    records: Vec<R>,
    sort_keys: &[SortKeyFn<R>],
    admission: &[PairComparator<R>],
    preconditions: &[RecordPredicate<R>],
    comparators: &[PairComparator<R>],
    data: Value,
    reason: CorrelationReason,
) -> impl Iterator<Item = CorrelationResult> + 'static {
    let preconditions = preconditions.to_vec();
    let comparators = comparators.to_vec();

    Buckets::new(records, sort_keys, admission).flat_map(move |bucket| {
        let mut results = Vec::new();
        if preconditions.is_empty() {
            process_combinations(&bucket, &comparators, &data, &reason, &mut results);
        } else {
            let (candidates, rest): (Vec<R>, Vec<R>) = bucket
                .into_iter()
                .partition(|record| preconditions.iter().any(|holds| holds(record)));
            process_product(&candidates, &rest, &comparators, &data, &reason, &mut results);
            process_combinations(&candidates, &comparators, &data, &reason, &mut results);
        }
        results
    })
}
