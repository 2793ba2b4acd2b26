//! # Data Model
//!
//! Core data structures for entity correlation: adapter records (one vendor
//! adapter's sighting of an asset), entities (the caller's current grouping of
//! sightings), and caller-attached tags.
//!
//! Everything here is a read-only snapshot for the duration of one correlation
//! pass; the engine never mutates caller input.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// How an [`AdapterRecord`] relates to the plugin that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Association {
    /// A direct sighting reported by the adapter instance itself.
    Adapter,
    /// Derived data attached by another plugin. Correlations involving a tag
    /// record are attributed to the underlying adapter record it annotates,
    /// never to the tagging plugin.
    Tag {
        /// `(plugin_unique_name, native id)` of the adapter record this tag
        /// annotates.
        associated_adapter: (String, String),
        /// Logical plugin type of the associated adapter.
        adapter_plugin_name: String,
    },
}

/// Normalized payload of one adapter record.
///
/// The field set is the common device/user schema shared by all adapters;
/// comparator rules read whichever subset applies to their entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    /// Vendor-native identifier (hostname+domain, serial, cloud instance id).
    pub id: String,
    pub hostname: Option<String>,
    pub os: Option<OsInfo>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    pub device_serial: Option<String>,
    /// Set for records produced by network scanners, which sight assets they
    /// do not manage.
    #[serde(default)]
    pub is_scanner: bool,
    pub username: Option<String>,
    pub mail: Option<String>,
    pub ad_user_principal_name: Option<String>,
    pub ad_display_name: Option<String>,
}

impl RecordData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// One network interface as reported by an adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    #[serde(default)]
    pub ips: Vec<String>,
    pub mac: Option<String>,
}

/// Operating system descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    #[serde(rename = "type")]
    pub os_type: Option<String>,
}

/// One vendor adapter's view of one real-world entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterRecord {
    /// Logical adapter type, e.g. `"active_directory"`.
    pub plugin_name: String,
    /// Specific running instance of the adapter. Multiple instances of the
    /// same adapter type may run side by side.
    pub plugin_unique_name: String,
    pub data: RecordData,
    pub association: Association,
}

impl AdapterRecord {
    /// Create a direct adapter sighting.
    pub fn new(
        plugin_name: impl Into<String>,
        plugin_unique_name: impl Into<String>,
        data: RecordData,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            plugin_unique_name: plugin_unique_name.into(),
            data,
            association: Association::Adapter,
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.association, Association::Tag { .. })
    }

    /// Addressing used when this record is the basis of a comparison.
    ///
    /// Tag records address through the adapter record they annotate.
    pub fn base_addressing(&self) -> (String, String) {
        match &self.association {
            Association::Adapter => (self.plugin_unique_name.clone(), self.data.id.clone()),
            Association::Tag {
                associated_adapter, ..
            } => associated_adapter.clone(),
        }
    }

    /// Addressing used when this record is the one found by a rule.
    ///
    /// Heuristic rules only know the logical plugin type of the match, not
    /// which running instance produced it; the instance is resolved during
    /// post-processing.
    pub fn match_addressing(&self) -> (String, String) {
        match &self.association {
            Association::Adapter => (self.plugin_name.clone(), self.data.id.clone()),
            Association::Tag {
                associated_adapter,
                adapter_plugin_name,
            } => (adapter_plugin_name.clone(), associated_adapter.1.clone()),
        }
    }
}

impl fmt::Display for AdapterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plugin_unique_name, self.data.id)
    }
}

/// Tag name carrying the "never merge these" override.
pub const STRONGLY_UNBOUND_WITH: &str = "strongly_unbound_with";

/// A caller-attached annotation on an [`Entity`].
///
/// The engine only interprets tags named [`STRONGLY_UNBOUND_WITH`], whose data
/// is a JSON list of `[plugin_name, id]` pairs that must never be correlated
/// with the tagged entity. All other tags are opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub data: Value,
}

/// The caller's current notion of one real-world asset: an ordered collection
/// of adapter records already considered the same thing, plus caller tags.
///
/// The engine's job is to discover new same-as relationships only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub adapters: Vec<AdapterRecord>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Entity {
    pub fn new(adapters: Vec<AdapterRecord>) -> Self {
        Self {
            adapters,
            tags: Vec::new(),
        }
    }

    pub fn with_tags(adapters: Vec<AdapterRecord>, tags: Vec<Tag>) -> Self {
        Self { adapters, tags }
    }

    /// Whether a `strongly_unbound_with` tag forbids correlating this entity
    /// with the record addressed by `(plugin_name, id)`.
    pub fn is_strongly_unbound_with(&self, plugin_name: &str, id: &str) -> bool {
        self.tags.iter().any(|tag| {
            tag.name == STRONGLY_UNBOUND_WITH
                && tag.data.as_array().is_some_and(|pairs| {
                    pairs.iter().any(|pair| {
                        pair.as_array().is_some_and(|pair| {
                            pair.len() == 2
                                && pair[0].as_str() == Some(plugin_name)
                                && pair[1].as_str() == Some(id)
                        })
                    })
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(plugin: &str, unique: &str, id: &str) -> AdapterRecord {
        AdapterRecord::new(plugin, unique, RecordData::new(id))
    }

    #[test]
    fn test_adapter_addressing() {
        let rec = record("esx_adapter", "esx_adapter_1", "vm-42");
        assert_eq!(
            rec.base_addressing(),
            ("esx_adapter_1".to_string(), "vm-42".to_string())
        );
        assert_eq!(
            rec.match_addressing(),
            ("esx_adapter".to_string(), "vm-42".to_string())
        );
    }

    #[test]
    fn test_tag_addressing_goes_through_associated_adapter() {
        let mut rec = record("general_info", "general_info_1", "vm-42");
        rec.association = Association::Tag {
            associated_adapter: ("esx_adapter_1".to_string(), "vm-42".to_string()),
            adapter_plugin_name: "esx_adapter".to_string(),
        };

        assert!(rec.is_tag());
        assert_eq!(
            rec.base_addressing(),
            ("esx_adapter_1".to_string(), "vm-42".to_string())
        );
        assert_eq!(
            rec.match_addressing(),
            ("esx_adapter".to_string(), "vm-42".to_string())
        );
    }

    #[test]
    fn test_strongly_unbound_lookup() {
        let entity = Entity::with_tags(
            vec![record("ad_adapter", "ad_adapter_1", "CN=X")],
            vec![Tag {
                name: STRONGLY_UNBOUND_WITH.to_string(),
                data: json!([["aws_adapter", "i-123"]]),
            }],
        );

        assert!(entity.is_strongly_unbound_with("aws_adapter", "i-123"));
        assert!(!entity.is_strongly_unbound_with("aws_adapter", "i-999"));
        assert!(!entity.is_strongly_unbound_with("esx_adapter", "i-123"));
    }

    #[test]
    fn test_unrelated_tags_are_ignored() {
        let entity = Entity::with_tags(
            vec![record("ad_adapter", "ad_adapter_1", "CN=X")],
            vec![Tag {
                name: "owner".to_string(),
                data: json!([["aws_adapter", "i-123"]]),
            }],
        );

        assert!(!entity.is_strongly_unbound_with("aws_adapter", "i-123"));
    }
}
