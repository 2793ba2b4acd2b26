use corrlink::model::{NetworkInterface, OsInfo, Tag, STRONGLY_UNBOUND_WITH};
use corrlink::{AdapterRecord, Entity, RecordData};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Fresh vendor-native id, unique across one test binary.
#[allow(dead_code)]
pub fn fresh_id() -> String {
    format!("id-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Builder for one device sighting.
#[allow(dead_code)]
pub struct DeviceFixture {
    plugin_name: String,
    plugin_unique_name: String,
    data: RecordData,
}

#[allow(dead_code)]
impl DeviceFixture {
    pub fn new(plugin_name: &str) -> Self {
        Self {
            plugin_name: plugin_name.to_string(),
            plugin_unique_name: format!("{plugin_name}_1"),
            data: RecordData::new(fresh_id()),
        }
    }

    pub fn instance(mut self, plugin_unique_name: &str) -> Self {
        self.plugin_unique_name = plugin_unique_name.to_string();
        self
    }

    pub fn id(mut self, id: &str) -> Self {
        self.data.id = id.to_string();
        self
    }

    pub fn hostname(mut self, hostname: &str) -> Self {
        self.data.hostname = Some(hostname.to_string());
        self
    }

    pub fn os_type(mut self, os_type: &str) -> Self {
        self.data.os = Some(OsInfo {
            os_type: Some(os_type.to_string()),
        });
        self
    }

    pub fn serial(mut self, serial: &str) -> Self {
        self.data.device_serial = Some(serial.to_string());
        self
    }

    pub fn nic(mut self, ips: &[&str], mac: Option<&str>) -> Self {
        self.data.network_interfaces.push(NetworkInterface {
            ips: ips.iter().map(|ip| ip.to_string()).collect(),
            mac: mac.map(str::to_string),
        });
        self
    }

    pub fn scanner(mut self) -> Self {
        self.data.is_scanner = true;
        self
    }

    pub fn mail(mut self, mail: &str) -> Self {
        self.data.mail = Some(mail.to_string());
        self
    }

    pub fn upn(mut self, upn: &str) -> Self {
        self.data.ad_user_principal_name = Some(upn.to_string());
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.data.username = Some(username.to_string());
        self
    }

    pub fn display_name(mut self, display_name: &str) -> Self {
        self.data.ad_display_name = Some(display_name.to_string());
        self
    }

    pub fn record(self) -> AdapterRecord {
        AdapterRecord::new(self.plugin_name, self.plugin_unique_name, self.data)
    }

    pub fn entity(self) -> Entity {
        Entity::new(vec![self.record()])
    }
}

/// A `strongly_unbound_with` tag forbidding correlation with `(plugin_name, id)`.
#[allow(dead_code)]
pub fn strongly_unbound_tag(plugin_name: &str, id: &str) -> Tag {
    Tag {
        name: STRONGLY_UNBOUND_WITH.to_string(),
        data: json!([[plugin_name, id]]),
    }
}
