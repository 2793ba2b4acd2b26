//! # Static Device Correlator
//!
//! Correlates device records on static adapter data: hostname + IP overlap,
//! OS + MAC + IP overlap, scanner sightings, and device serials. Each rule is
//! one bucketed pass over a normalized candidate set; rules can be toggled
//! individually through [`DeviceRuleConfig`].

use crate::bucket::bucket_correlate;
use crate::config::DeviceRuleConfig;
use crate::correlation::{CorrelationOutcome, CorrelationReason, CorrelationResult, STATIC_ANALYSIS};
use crate::engine::{CorrelatorEngine, EntityPrecondition};
use crate::model::Entity;
use crate::rules::{self, DeviceCandidate};
use serde_json::{json, Value};
use tracing::{error, info};

/// Device correlation over static adapter data.
#[derive(Debug, Default)]
pub struct StaticDeviceCorrelator {
    config: DeviceRuleConfig,
}

impl StaticDeviceCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DeviceRuleConfig) -> Self {
        Self { config }
    }

    /// Same hostname and overlapping IPs.
    fn correlate_hostname_ip(
        candidates: &[DeviceCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating devices by hostname and IP");
        let records = candidates
            .iter()
            .filter(|c| rules::has_hostname(c) && rules::has_ips(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[rules::hostname_key],
            &[rules::same_hostname],
            &[],
            &[rules::is_different_plugin, rules::ips_match],
            json!({"Reason": "They have the same hostname and IPs"}),
            CorrelationReason::static_analysis(),
        )
    }

    /// Same OS type, overlapping MACs and overlapping IPs.
    fn correlate_os_mac_ip(
        candidates: &[DeviceCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating devices by OS, MAC and IP");
        let records = candidates
            .iter()
            .filter(|c| rules::has_os_type(c) && rules::has_macs(c) && rules::has_ips(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[rules::os_type_key],
            &[rules::same_os_type],
            &[],
            &[rules::is_different_plugin, rules::macs_match, rules::ips_match],
            json!({"Reason": "They have the same OS, MAC and IPs"}),
            CorrelationReason::static_analysis(),
        )
    }

    /// Scanner sightings against managed records, by MAC and IP overlap.
    ///
    /// Scanners report assets they do not manage, so a hostname or OS match
    /// cannot be required. The candidate set is one bucket with a scanner
    /// precondition split: two non-scanner records are never compared here,
    /// the attribute rules above cover those.
    fn correlate_scanners(
        candidates: &[DeviceCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating scanner devices by MAC and IP");
        let records = candidates
            .iter()
            .filter(|c| rules::has_macs(c) && rules::has_ips(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[],
            &[],
            &[rules::is_scanner],
            &[rules::is_different_plugin, rules::macs_match, rules::ips_match],
            json!({"Reason": "They have the same MAC and IPs"}),
            CorrelationReason::scanner_analysis(),
        )
    }

    /// Same device serial, provided the hostnames do not contradict.
    fn correlate_serial(
        candidates: &[DeviceCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating devices by serial");
        let records = candidates
            .iter()
            .filter(|c| rules::has_serial(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[rules::serial_key],
            &[rules::same_serial],
            &[],
            &[rules::is_different_plugin, rules::hostnames_do_not_contradict],
            json!({"Reason": "They have the same serial"}),
            CorrelationReason::static_analysis(),
        )
    }
}

impl CorrelatorEngine for StaticDeviceCorrelator {
    fn raw_correlate<'a>(
        &'a self,
        entities: &[&Entity],
    ) -> Box<dyn Iterator<Item = CorrelationOutcome> + 'a> {
        let candidates = rules::normalize_candidates(entities);

        let mut passes: Vec<Box<dyn Iterator<Item = CorrelationResult>>> = Vec::new();
        if self.config.correlate_by_hostname_ip {
            passes.push(Box::new(Self::correlate_hostname_ip(&candidates)));
        }
        if self.config.correlate_by_os_mac_ip {
            passes.push(Box::new(Self::correlate_os_mac_ip(&candidates)));
        }
        if self.config.correlate_scanners {
            passes.push(Box::new(Self::correlate_scanners(&candidates)));
        }
        if self.config.correlate_by_serial {
            passes.push(Box::new(Self::correlate_serial(&candidates)));
        }

        Box::new(
            passes
                .into_iter()
                .flatten()
                .map(CorrelationOutcome::Correlation),
        )
    }

    fn correlation_preconditions(&self) -> Vec<EntityPrecondition> {
        vec![
            rules::entity_has_hostname,
            rules::entity_has_mac_or_ip,
            rules::entity_has_serial,
        ]
    }

    fn post_process(
        &self,
        first_name: &str,
        first_id: &str,
        second_name: &str,
        second_id: &str,
        _data: &Value,
        reason: &CorrelationReason,
    ) -> bool {
        // A static rule matching a record against its own adapter means a
        // rule's comparators are broken; drop it loudly.
        if let CorrelationReason::Heuristic(kind) = reason {
            if kind == STATIC_ANALYSIS && first_name == second_name {
                error!(
                    "self-correlation from a static rule: {}/{} <-> {}/{}",
                    first_name, first_id, second_name, second_id
                );
                return false;
            }
        }
        true
    }
}
