//! # Device Comparators
//!
//! Normalization and comparator rules over device records. Comparisons are
//! extremely hot (every pair in every bucket), so each adapter record is
//! flattened once per pass into a [`DeviceCandidate`] with uppercased sort
//! fields and precomputed IP/MAC sets; comparators then stay allocation-free.

use crate::bucket::Correlatable;
use crate::model::{AdapterRecord, Entity, NetworkInterface};
use std::collections::BTreeSet;

/// A flattened, normalized view of one adapter record.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub plugin_name: String,
    pub id: String,
    /// Uppercased.
    pub hostname: Option<String>,
    /// Uppercased; empty OS types are treated as absent.
    pub os_type: Option<String>,
    /// Uppercased.
    pub serial: Option<String>,
    pub is_scanner: bool,
    /// All IPs across every network interface; `None` when there are none.
    pub ips: Option<BTreeSet<String>>,
    /// All MACs across every network interface, uppercased with separators
    /// stripped; `None` when there are none.
    pub macs: Option<BTreeSet<String>>,
    base: (String, String),
    matched: (String, String),
}

impl DeviceCandidate {
    pub fn from_record(record: &AdapterRecord) -> Self {
        let data = &record.data;
        let mut ips = BTreeSet::new();
        let mut macs = BTreeSet::new();
        for nic in &data.network_interfaces {
            ips.extend(nic.ips.iter().filter(|ip| !ip.is_empty()).cloned());
            if let Some(mac) = nic.mac.as_deref().filter(|mac| !mac.is_empty()) {
                macs.insert(normalize_mac(mac));
            }
        }

        Self {
            plugin_name: record.plugin_name.clone(),
            id: data.id.clone(),
            hostname: data.hostname.as_deref().map(str::to_uppercase),
            os_type: data
                .os
                .as_ref()
                .and_then(|os| os.os_type.as_deref())
                .filter(|os_type| !os_type.is_empty())
                .map(str::to_uppercase),
            serial: data.device_serial.as_deref().map(str::to_uppercase),
            is_scanner: data.is_scanner,
            ips: (!ips.is_empty()).then_some(ips),
            macs: (!macs.is_empty()).then_some(macs),
            base: record.base_addressing(),
            matched: record.match_addressing(),
        }
    }
}

impl Correlatable for DeviceCandidate {
    fn base_addressing(&self) -> (String, String) {
        self.base.clone()
    }

    fn match_addressing(&self) -> (String, String) {
        self.matched.clone()
    }
}

/// Flatten every adapter record (tag records included) of the working set
/// into normalized candidates, in input order.
pub fn normalize_candidates(entities: &[&Entity]) -> Vec<DeviceCandidate> {
    entities
        .iter()
        .flat_map(|entity| entity.adapters.iter())
        .map(DeviceCandidate::from_record)
        .collect()
}

/// Uppercase a MAC and strip `:`/`-` separators so adapters reporting
/// different formats still compare equal.
pub fn normalize_mac(mac: &str) -> String {
    mac.to_uppercase().replace(['-', ':'], "")
}

// Sort keys. Absent fields sort as the empty string; the matching filter
// predicates keep them out of the candidate set before sorting matters.

pub fn hostname_key(candidate: &DeviceCandidate) -> String {
    candidate.hostname.clone().unwrap_or_default()
}

pub fn os_type_key(candidate: &DeviceCandidate) -> String {
    candidate.os_type.clone().unwrap_or_default()
}

pub fn serial_key(candidate: &DeviceCandidate) -> String {
    candidate.serial.clone().unwrap_or_default()
}

// Filter predicates selecting the records a rule can work with at all.

pub fn has_hostname(candidate: &DeviceCandidate) -> bool {
    candidate.hostname.is_some()
}

pub fn has_os_type(candidate: &DeviceCandidate) -> bool {
    candidate.os_type.is_some()
}

pub fn has_serial(candidate: &DeviceCandidate) -> bool {
    candidate.serial.is_some()
}

pub fn has_ips(candidate: &DeviceCandidate) -> bool {
    candidate.ips.is_some()
}

pub fn has_macs(candidate: &DeviceCandidate) -> bool {
    candidate.macs.is_some()
}

pub fn is_scanner(candidate: &DeviceCandidate) -> bool {
    candidate.is_scanner
}

// Pair comparators.

pub fn is_different_plugin(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    a.plugin_name != b.plugin_name
}

pub fn same_hostname(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    match (&a.hostname, &b.hostname) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

pub fn same_os_type(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    match (&a.os_type, &b.os_type) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

pub fn same_serial(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    match (&a.serial, &b.serial) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn one_is_subset(first: Option<&BTreeSet<String>>, second: Option<&BTreeSet<String>>) -> bool {
    match (first, second) {
        (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => {
            a.is_subset(b) || b.is_subset(a)
        }
        _ => false,
    }
}

/// Adapters rarely see every NIC of an asset, so IP sets match when either is
/// a subset of the other.
pub fn ips_match(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    one_is_subset(a.ips.as_ref(), b.ips.as_ref())
}

pub fn macs_match(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    one_is_subset(a.macs.as_ref(), b.macs.as_ref())
}

/// Hostnames contradict only when both records carry one and the short names
/// differ; one record reporting an FQDN and the other the bare short name do
/// not contradict.
pub fn hostnames_do_not_contradict(a: &DeviceCandidate, b: &DeviceCandidate) -> bool {
    match (&a.hostname, &b.hostname) {
        (Some(x), Some(y)) => short_hostname(x) == short_hostname(y),
        _ => true,
    }
}

fn short_hostname(hostname: &str) -> &str {
    hostname.split('.').next().unwrap_or(hostname)
}

// Entity-level preconditions for the prefilter.

pub fn entity_has_hostname(adapters: &[AdapterRecord]) -> bool {
    adapters.iter().any(|record| record.data.hostname.is_some())
}

pub fn entity_has_mac_or_ip(adapters: &[AdapterRecord]) -> bool {
    adapters.iter().any(|record| {
        record.data.network_interfaces.iter().any(nic_has_mac_or_ip)
    })
}

fn nic_has_mac_or_ip(nic: &NetworkInterface) -> bool {
    nic.ips.iter().any(|ip| !ip.is_empty())
        || nic.mac.as_deref().is_some_and(|mac| !mac.is_empty())
}

pub fn entity_has_serial(adapters: &[AdapterRecord]) -> bool {
    adapters
        .iter()
        .any(|record| record.data.device_serial.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OsInfo, RecordData};

    fn candidate(plugin: &str, id: &str) -> DeviceCandidate {
        DeviceCandidate::from_record(&AdapterRecord::new(
            plugin,
            format!("{plugin}_1"),
            RecordData::new(id),
        ))
    }

    fn candidate_with(plugin: &str, id: &str, data: impl FnOnce(&mut RecordData)) -> DeviceCandidate {
        let mut record_data = RecordData::new(id);
        data(&mut record_data);
        DeviceCandidate::from_record(&AdapterRecord::new(
            plugin,
            format!("{plugin}_1"),
            record_data,
        ))
    }

    #[test]
    fn test_normalize_mac_strips_separators() {
        assert_eq!(normalize_mac("aa:bb:cc:dd:ee:ff"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "AABBCCDDEEFF");
        assert_eq!(normalize_mac("aabbccddeeff"), "AABBCCDDEEFF");
    }

    #[test]
    fn test_candidate_uppercases_sortable_fields() {
        let c = candidate_with("esx_adapter", "vm-1", |data| {
            data.hostname = Some("ubuntuLolol".to_string());
            data.os = Some(OsInfo {
                os_type: Some("linux".to_string()),
            });
            data.device_serial = Some("xDDDD123DDDDx".to_string());
        });

        assert_eq!(c.hostname.as_deref(), Some("UBUNTULOLOL"));
        assert_eq!(c.os_type.as_deref(), Some("LINUX"));
        assert_eq!(c.serial.as_deref(), Some("XDDDD123DDDDX"));
    }

    #[test]
    fn test_empty_os_type_is_absent() {
        let c = candidate_with("esx_adapter", "vm-1", |data| {
            data.os = Some(OsInfo {
                os_type: Some(String::new()),
            });
        });
        assert!(c.os_type.is_none());
    }

    #[test]
    fn test_ip_sets_match_on_subset_either_way() {
        let a = candidate_with("a", "1", |data| {
            data.network_interfaces = vec![NetworkInterface {
                ips: vec!["1.1.1.1".to_string(), "2.2.2.2".to_string()],
                mac: None,
            }];
        });
        let b = candidate_with("b", "2", |data| {
            data.network_interfaces = vec![NetworkInterface {
                ips: vec!["1.1.1.1".to_string()],
                mac: None,
            }];
        });
        let c = candidate_with("c", "3", |data| {
            data.network_interfaces = vec![NetworkInterface {
                ips: vec!["3.3.3.3".to_string()],
                mac: None,
            }];
        });

        assert!(ips_match(&a, &b));
        assert!(ips_match(&b, &a));
        assert!(!ips_match(&a, &c));
        // Records without IPs never match anything.
        assert!(!ips_match(&a, &candidate("d", "4")));
    }

    #[test]
    fn test_macs_collected_across_interfaces() {
        let a = candidate_with("a", "1", |data| {
            data.network_interfaces = vec![
                NetworkInterface {
                    ips: vec![],
                    mac: Some("aa:bb:cc:dd:ee:ff".to_string()),
                },
                NetworkInterface {
                    ips: vec![],
                    mac: Some("11-22-33-44-55-66".to_string()),
                },
            ];
        });
        let b = candidate_with("b", "2", |data| {
            data.network_interfaces = vec![NetworkInterface {
                ips: vec![],
                mac: Some("AABBCCDDEEFF".to_string()),
            }];
        });

        assert!(macs_match(&a, &b));
    }

    #[test]
    fn test_hostname_contradiction() {
        let fqdn = candidate_with("a", "1", |data| {
            data.hostname = Some("host1.corp.example".to_string());
        });
        let short = candidate_with("b", "2", |data| {
            data.hostname = Some("HOST1".to_string());
        });
        let other = candidate_with("c", "3", |data| {
            data.hostname = Some("HOST2".to_string());
        });

        assert!(hostnames_do_not_contradict(&fqdn, &short));
        assert!(!hostnames_do_not_contradict(&short, &other));
        assert!(hostnames_do_not_contradict(&short, &candidate("d", "4")));
    }

    #[test]
    fn test_entity_preconditions() {
        let bare = AdapterRecord::new("a", "a_1", RecordData::new("1"));
        assert!(!entity_has_hostname(std::slice::from_ref(&bare)));
        assert!(!entity_has_mac_or_ip(std::slice::from_ref(&bare)));
        assert!(!entity_has_serial(std::slice::from_ref(&bare)));

        let mut data = RecordData::new("2");
        data.network_interfaces = vec![NetworkInterface {
            ips: vec!["1.1.1.1".to_string()],
            mac: None,
        }];
        let with_ip = AdapterRecord::new("a", "a_1", data);
        assert!(entity_has_mac_or_ip(&[bare, with_ip]));
    }
}
