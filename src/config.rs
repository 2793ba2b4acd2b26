//! # Correlator Configuration
//!
//! Per-rule toggles for the bundled correlators. Defaults reflect the rules
//! that are safe on any dataset; opt-in rules are documented where they are
//! gated.

/// Rule toggles for [`StaticDeviceCorrelator`](crate::device_correlator::StaticDeviceCorrelator).
#[derive(Debug, Clone)]
pub struct DeviceRuleConfig {
    /// Correlate records sharing a hostname and overlapping IPs.
    pub correlate_by_hostname_ip: bool,
    /// Correlate records sharing an OS type, overlapping MACs and overlapping
    /// IPs.
    pub correlate_by_os_mac_ip: bool,
    /// Correlate scanner records with managed records by MAC and IP overlap.
    pub correlate_scanners: bool,
    /// Correlate records sharing a device serial.
    pub correlate_by_serial: bool,
}

impl Default for DeviceRuleConfig {
    fn default() -> Self {
        Self {
            correlate_by_hostname_ip: true,
            correlate_by_os_mac_ip: true,
            correlate_scanners: true,
            correlate_by_serial: true,
        }
    }
}

/// Rule toggles for [`StaticUserCorrelator`](crate::user_correlator::StaticUserCorrelator).
#[derive(Debug, Clone)]
pub struct UserRuleConfig {
    /// Correlate user records sharing a mail address.
    pub correlate_by_mail: bool,
    /// Correlate user records whose AD user principal name matches another
    /// record's mail address.
    pub correlate_by_upn: bool,
    /// Correlate user records by AD display name, falling back to the
    /// username when a record has no display name. Pairs directories that
    /// expose the same account under different identifiers (AD and Azure
    /// AD).
    pub correlate_by_display_name: bool,
    /// Correlate on the local part of the mail address alone. Off by default:
    /// `jdoe@corp-a.example` and `jdoe@corp-b.example` are usually different
    /// people.
    pub correlate_by_email_prefix: bool,
}

impl Default for UserRuleConfig {
    fn default() -> Self {
        Self {
            correlate_by_mail: true,
            correlate_by_upn: true,
            correlate_by_display_name: true,
            correlate_by_email_prefix: false,
        }
    }
}
