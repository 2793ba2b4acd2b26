//! # Static User Correlator
//!
//! Correlates user records on identity attributes: mail addresses, AD user
//! principal names, AD display names (with a username fallback), and
//! (opt-in) the local part of the mail address. Mail values are validated
//! and lowercased before any comparison; records whose mail does not look
//! like an address are left out of the pass.

use crate::bucket::{bucket_correlate, Correlatable};
use crate::config::UserRuleConfig;
use crate::correlation::{CorrelationOutcome, CorrelationReason, CorrelationResult};
use crate::engine::{CorrelatorEngine, EntityPrecondition};
use crate::model::{AdapterRecord, Entity};
use serde_json::json;
use tracing::{debug, info};

/// A flattened, normalized view of one user record.
#[derive(Debug, Clone)]
pub struct UserCandidate {
    pub plugin_name: String,
    /// Lowercased, shape-validated mail address.
    pub mail: Option<String>,
    /// Lowercased, shape-validated AD user principal name. UPNs are mail
    /// shaped in practice; ones that are not are dropped like invalid mail.
    pub upn: Option<String>,
    /// Lowercased, trimmed.
    pub username: Option<String>,
    /// Lowercased, trimmed.
    pub display_name: Option<String>,
    base: (String, String),
    matched: (String, String),
}

impl UserCandidate {
    pub fn from_record(record: &AdapterRecord) -> Self {
        Self {
            plugin_name: record.plugin_name.clone(),
            mail: record.data.mail.as_deref().and_then(normalize_mail),
            upn: record
                .data
                .ad_user_principal_name
                .as_deref()
                .and_then(normalize_mail),
            username: record.data.username.as_deref().and_then(normalize_name),
            display_name: record
                .data
                .ad_display_name
                .as_deref()
                .and_then(normalize_name),
            base: record.base_addressing(),
            matched: record.match_addressing(),
        }
    }

    /// The identity used by the principal-name rule: the UPN when the record
    /// has one, the mail address otherwise. A record's UPN and another
    /// record's mail addressing the same mailbox is exactly the match this
    /// rule exists for.
    fn principal_identity(&self) -> Option<&str> {
        self.upn.as_deref().or(self.mail.as_deref())
    }

    /// The identity used by the display-name rule: the AD display name when
    /// the record has one, the username otherwise. AD and Azure AD expose
    /// the same account under different identifiers; this is the join.
    fn display_identity(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.username.as_deref())
    }
}

impl Correlatable for UserCandidate {
    fn base_addressing(&self) -> (String, String) {
        self.base.clone()
    }

    fn match_addressing(&self) -> (String, String) {
        self.matched.clone()
    }
}

/// Trim, shape-check, and lowercase a mail address. Values that are not mail
/// shaped (no `@`, empty local part, domain without a dot) are rejected;
/// adapters routinely put display names or placeholders in mail fields.
pub fn normalize_mail(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let (local, domain) = trimmed.split_once('@')?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        debug!(value = trimmed, "ignoring value that is not mail shaped");
        return None;
    }
    Some(trimmed.to_lowercase())
}

fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_lowercase())
}

fn mail_key(candidate: &UserCandidate) -> String {
    candidate.mail.clone().unwrap_or_default()
}

fn principal_key(candidate: &UserCandidate) -> String {
    candidate
        .principal_identity()
        .map(str::to_string)
        .unwrap_or_default()
}

fn prefix_key(candidate: &UserCandidate) -> String {
    mail_prefix(candidate).map(str::to_string).unwrap_or_default()
}

fn mail_prefix(candidate: &UserCandidate) -> Option<&str> {
    candidate
        .mail
        .as_deref()
        .and_then(|mail| mail.split('@').next())
}

fn display_name_key(candidate: &UserCandidate) -> String {
    candidate.display_name.clone().unwrap_or_default()
}

fn display_identity_key(candidate: &UserCandidate) -> String {
    candidate
        .display_identity()
        .map(str::to_string)
        .unwrap_or_default()
}

fn has_mail(candidate: &UserCandidate) -> bool {
    candidate.mail.is_some()
}

fn has_principal_identity(candidate: &UserCandidate) -> bool {
    candidate.principal_identity().is_some()
}

fn has_display_name(candidate: &UserCandidate) -> bool {
    candidate.display_name.is_some()
}

fn has_display_identity(candidate: &UserCandidate) -> bool {
    candidate.display_identity().is_some()
}

fn is_different_plugin(a: &UserCandidate, b: &UserCandidate) -> bool {
    a.plugin_name != b.plugin_name
}

fn same_mail(a: &UserCandidate, b: &UserCandidate) -> bool {
    match (&a.mail, &b.mail) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn same_principal_identity(a: &UserCandidate, b: &UserCandidate) -> bool {
    match (a.principal_identity(), b.principal_identity()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn same_mail_prefix(a: &UserCandidate, b: &UserCandidate) -> bool {
    match (mail_prefix(a), mail_prefix(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn same_display_name(a: &UserCandidate, b: &UserCandidate) -> bool {
    match (&a.display_name, &b.display_name) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn same_display_identity(a: &UserCandidate, b: &UserCandidate) -> bool {
    match (a.display_identity(), b.display_identity()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn entity_has_mail(adapters: &[AdapterRecord]) -> bool {
    adapters.iter().any(|record| record.data.mail.is_some())
}

fn entity_has_upn(adapters: &[AdapterRecord]) -> bool {
    adapters
        .iter()
        .any(|record| record.data.ad_user_principal_name.is_some())
}

fn entity_has_username(adapters: &[AdapterRecord]) -> bool {
    adapters.iter().any(|record| record.data.username.is_some())
}

fn entity_has_display_name(adapters: &[AdapterRecord]) -> bool {
    adapters
        .iter()
        .any(|record| record.data.ad_display_name.is_some())
}

/// User correlation over identity attributes.
#[derive(Debug, Default)]
pub struct StaticUserCorrelator {
    config: UserRuleConfig,
}

impl StaticUserCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: UserRuleConfig) -> Self {
        Self { config }
    }

    fn correlate_mail(
        candidates: &[UserCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating users by mail");
        let records = candidates.iter().filter(|c| has_mail(c)).cloned().collect();
        bucket_correlate(
            records,
            &[mail_key],
            &[same_mail],
            &[],
            &[is_different_plugin],
            json!({"Reason": "They have the same email"}),
            CorrelationReason::static_analysis(),
        )
    }

    fn correlate_principal_name(
        candidates: &[UserCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating users by user principal name");
        let records = candidates
            .iter()
            .filter(|c| has_principal_identity(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[principal_key],
            &[same_principal_identity],
            &[],
            &[is_different_plugin],
            json!({"Reason": "They have the same user principal name"}),
            CorrelationReason::static_analysis(),
        )
    }

    fn correlate_display_name(
        candidates: &[UserCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating users by AD display name");
        let records = candidates
            .iter()
            .filter(|c| has_display_name(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[display_name_key],
            &[same_display_name],
            &[],
            &[is_different_plugin],
            json!({"Reason": "They have the same AD display name"}),
            CorrelationReason::static_analysis(),
        )
    }

    fn correlate_display_name_username(
        candidates: &[UserCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating users by AD display name and username");
        let records = candidates
            .iter()
            .filter(|c| has_display_identity(c))
            .cloned()
            .collect();
        bucket_correlate(
            records,
            &[display_identity_key],
            &[same_display_identity],
            &[],
            &[is_different_plugin],
            json!({"Reason": "They have the same AD display name or username"}),
            CorrelationReason::static_analysis(),
        )
    }

    fn correlate_mail_prefix(
        candidates: &[UserCandidate],
    ) -> impl Iterator<Item = CorrelationResult> + 'static {
        info!("correlating users by email prefix");
        let records = candidates.iter().filter(|c| has_mail(c)).cloned().collect();
        bucket_correlate(
            records,
            &[prefix_key],
            &[same_mail_prefix],
            &[],
            &[is_different_plugin],
            json!({"Reason": "They have the same email prefix"}),
            CorrelationReason::static_analysis(),
        )
    }
}

impl CorrelatorEngine for StaticUserCorrelator {
    fn raw_correlate<'a>(
        &'a self,
        entities: &[&Entity],
    ) -> Box<dyn Iterator<Item = CorrelationOutcome> + 'a> {
        let candidates: Vec<UserCandidate> = entities
            .iter()
            .flat_map(|entity| entity.adapters.iter())
            .map(UserCandidate::from_record)
            .collect();

        let mut passes: Vec<Box<dyn Iterator<Item = CorrelationResult>>> = Vec::new();
        if self.config.correlate_by_mail {
            passes.push(Box::new(Self::correlate_mail(&candidates)));
        }
        if self.config.correlate_by_upn {
            passes.push(Box::new(Self::correlate_principal_name(&candidates)));
        }
        if self.config.correlate_by_display_name {
            passes.push(Box::new(Self::correlate_display_name(&candidates)));
            passes.push(Box::new(Self::correlate_display_name_username(&candidates)));
        }
        if self.config.correlate_by_email_prefix {
            passes.push(Box::new(Self::correlate_mail_prefix(&candidates)));
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
            entity_has_mail,
            entity_has_upn,
            entity_has_username,
            entity_has_display_name,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordData;

    fn user(plugin: &str, id: &str, build: impl FnOnce(&mut RecordData)) -> Entity {
        let mut data = RecordData::new(id);
        build(&mut data);
        Entity::new(vec![AdapterRecord::new(
            plugin,
            format!("{plugin}_1"),
            data,
        )])
    }

    fn raw_results(correlator: &StaticUserCorrelator, entities: &[Entity]) -> Vec<CorrelationResult> {
        let refs: Vec<&Entity> = entities.iter().collect();
        correlator
            .raw_correlate(&refs)
            .filter_map(|outcome| outcome.as_correlation().cloned())
            .collect()
    }

    #[test]
    fn test_normalize_mail() {
        assert_eq!(
            normalize_mail(" JDoe@Corp.Example "),
            Some("jdoe@corp.example".to_string())
        );
        assert_eq!(normalize_mail("John Doe"), None);
        assert_eq!(normalize_mail("@corp.example"), None);
        assert_eq!(normalize_mail("jdoe@localhost"), None);
    }

    #[test]
    fn test_mail_rule_matches_case_insensitively() {
        let correlator = StaticUserCorrelator::new();
        let entities = vec![
            user("ad_adapter", "CN=JDOE", |d| {
                d.mail = Some("JDoe@corp.example".to_string());
            }),
            user("okta_adapter", "okta-1", |d| {
                d.mail = Some("jdoe@corp.example".to_string());
            }),
        ];

        let results = raw_results(&correlator, &entities);
        assert!(!results.is_empty());
        assert!(results
            .iter()
            .all(|r| r.reason == CorrelationReason::static_analysis()));
    }

    #[test]
    fn test_upn_matches_other_records_mail() {
        let correlator = StaticUserCorrelator::with_config(UserRuleConfig {
            correlate_by_mail: false,
            ..UserRuleConfig::default()
        });
        let entities = vec![
            user("ad_adapter", "CN=JDOE", |d| {
                d.ad_user_principal_name = Some("jdoe@corp.example".to_string());
            }),
            user("okta_adapter", "okta-1", |d| {
                d.mail = Some("JDOE@CORP.EXAMPLE".to_string());
            }),
        ];

        let results = raw_results(&correlator, &entities);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].data,
            json!({"Reason": "They have the same user principal name"})
        );
    }

    #[test]
    fn test_email_prefix_rule_is_off_by_default() {
        let entities = vec![
            user("ad_adapter", "CN=JDOE", |d| {
                d.mail = Some("jdoe@corp-a.example".to_string());
            }),
            user("okta_adapter", "okta-1", |d| {
                d.mail = Some("jdoe@corp-b.example".to_string());
            }),
        ];

        assert!(raw_results(&StaticUserCorrelator::new(), &entities).is_empty());

        let opted_in = StaticUserCorrelator::with_config(UserRuleConfig {
            correlate_by_email_prefix: true,
            ..UserRuleConfig::default()
        });
        let results = raw_results(&opted_in, &entities);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].data,
            json!({"Reason": "They have the same email prefix"})
        );
    }

    #[test]
    fn test_display_name_matches_across_directories() {
        let correlator = StaticUserCorrelator::new();
        let entities = vec![
            user("ad_adapter", "CN=JDOE", |d| {
                d.ad_display_name = Some("John Doe".to_string());
            }),
            user("azure_ad_adapter", "az-1", |d| {
                d.ad_display_name = Some("john doe ".to_string());
            }),
        ];

        let results = raw_results(&correlator, &entities);
        assert!(!results.is_empty());
        assert_eq!(
            results[0].data,
            json!({"Reason": "They have the same AD display name"})
        );
    }

    #[test]
    fn test_username_stands_in_for_a_missing_display_name() {
        let correlator = StaticUserCorrelator::new();
        let entities = vec![
            user("ad_adapter", "CN=JDOE", |d| {
                d.ad_display_name = Some("jdoe".to_string());
            }),
            user("linux_ssh_adapter", "box-1", |d| {
                d.username = Some("JDOE".to_string());
            }),
        ];

        let results = raw_results(&correlator, &entities);
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].data,
            json!({"Reason": "They have the same AD display name or username"})
        );
    }

    #[test]
    fn test_display_name_rules_can_be_disabled() {
        let correlator = StaticUserCorrelator::with_config(UserRuleConfig {
            correlate_by_display_name: false,
            ..UserRuleConfig::default()
        });
        let entities = vec![
            user("ad_adapter", "CN=JDOE", |d| {
                d.ad_display_name = Some("John Doe".to_string());
            }),
            user("azure_ad_adapter", "az-1", |d| {
                d.ad_display_name = Some("John Doe".to_string());
            }),
        ];

        assert!(raw_results(&correlator, &entities).is_empty());
    }

    #[test]
    fn test_invalid_mail_never_matches() {
        let correlator = StaticUserCorrelator::new();
        let entities = vec![
            user("ad_adapter", "CN=A", |d| {
                d.mail = Some("not a mail".to_string());
            }),
            user("okta_adapter", "okta-1", |d| {
                d.mail = Some("not a mail".to_string());
            }),
        ];

        assert!(raw_results(&correlator, &entities).is_empty());
    }
}
