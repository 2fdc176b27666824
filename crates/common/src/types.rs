//! Corellium API payloads
//!
//! Field names follow the REST API's JSON. Everything the server may omit
//! is optional so that partial responses still decode.

use serde::{Deserialize, Serialize};

/// `GET /v1/ready`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReadyStatus {
    #[serde(default)]
    pub status: String,
}

// Projects

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub quotas: ProjectQuota,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quotas_used: Option<ProjectQuota>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectSettings {
    #[serde(default)]
    pub version: f64,
    #[serde(rename = "internet-access", default)]
    pub internet_access: bool,
    #[serde(default)]
    pub dhcp: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectQuota {
    #[serde(default)]
    pub cores: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<f64>,
}

/// Body for creating or updating a project
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectRequest {
    pub name: String,
    pub settings: ProjectSettings,
    pub quotas: ProjectQuota,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectKey {
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectKeyRequest {
    pub kind: String,
    pub label: String,
    pub key: String,
}

// Teams, users and roles

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeamRequest {
    pub label: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub administrator: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserRequest {
    pub label: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub administrator: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Role {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

/// Id returned by creation endpoints that answer with only an identifier
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Created {
    #[serde(default)]
    pub id: String,
}

// Instances

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_changed: Option<String>,
    #[serde(default)]
    pub started: Option<String>,
    #[serde(default)]
    pub user_task: Option<String>,
    #[serde(default)]
    pub task_state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub boot_options: Option<BootOptions>,
    #[serde(default)]
    pub service_ip: Option<String>,
    #[serde(default)]
    pub wifi_ip: Option<String>,
    #[serde(default)]
    pub secondary_ip: Option<String>,
    #[serde(default)]
    pub panicked: Option<bool>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fwpackage: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub agent: Option<AgentInfo>,
    #[serde(default)]
    pub netmon: Option<NetmonInfo>,
    #[serde(default)]
    pub expose_port: Option<String>,
    #[serde(default)]
    pub fault: Option<bool>,
    #[serde(default)]
    pub patches: Vec<String>,
    #[serde(default)]
    pub created_by: Option<CreatedBy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BootOptions {
    #[serde(default)]
    pub boot_args: Option<String>,
    #[serde(default)]
    pub restore_boot_args: Option<String>,
    #[serde(default)]
    pub udid: Option<String>,
    #[serde(default)]
    pub ecid: Option<String>,
    #[serde(default)]
    pub random_seed: Option<String>,
    #[serde(default)]
    pub pac: Option<bool>,
    #[serde(default)]
    pub aprr: Option<bool>,
    #[serde(default)]
    pub additional_tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentInfo {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetmonInfo {
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreatedBy {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub deleted: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InstanceCreateOptions {
    pub flavor: String,
    pub project: String,
    pub os: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InstanceUpdate {
    pub name: String,
}

/// Power actions exposed under `/v1/instances/{id}/{action}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
    Pause,
    Unpause,
}

impl InstanceAction {
    pub fn path(&self) -> &'static str {
        match self {
            InstanceAction::Start => "start",
            InstanceAction::Stop => "stop",
            InstanceAction::Pause => "pause",
            InstanceAction::Unpause => "unpause",
        }
    }

    /// Actions that move an instance from `current` to `desired`, each with
    /// the state it settles in. Empty when nothing needs to change; `None`
    /// when no sequence of actions gets there.
    pub fn steps(current: &str, desired: &str) -> Option<Vec<(Self, &'static str)>> {
        use InstanceAction::*;
        let steps = match (current, desired) {
            (c, d) if c == d => vec![],
            ("paused", "on") => vec![(Unpause, "on")],
            ("paused", "off") => vec![(Stop, "off")],
            (_, "on") => vec![(Start, "on")],
            (_, "off") => vec![(Stop, "off")],
            ("on", "paused") => vec![(Pause, "paused")],
            // A stopped instance cannot be paused directly
            ("off", "paused") => vec![(Start, "on"), (Pause, "paused")],
            _ => return None,
        };
        Some(steps)
    }
}

// Snapshots

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub status: Option<SnapshotStatus>,
    #[serde(default)]
    pub date: Option<f64>,
    #[serde(default)]
    pub fresh: Option<bool>,
    #[serde(default)]
    pub live: Option<bool>,
    #[serde(default)]
    pub local: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SnapshotStatus {
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub created: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotRequest {
    pub name: String,
}

// Images

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub uniqueid: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

pub const IMAGE_TYPES: &[&str] = &[
    "fwbinary",
    "kernel",
    "devicetree",
    "ramdisk",
    "loaderfile",
    "sepfw",
    "seprom",
    "bootrom",
    "llb",
    "iboot",
    "ibootdata",
    "fwpackage",
    "partition",
    "backup",
];

/// Fields of the multipart image upload, besides the file itself
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpload {
    pub name: String,
    pub kind: String,
    pub encapsulated: bool,
    pub project: String,
}

// Models and firmware

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub flavor: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub board_config: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub cp_id: Option<f64>,
    #[serde(default)]
    pub bd_id: Option<f64>,
    #[serde(default)]
    pub peripherals: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Firmware {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub android_flavor: Option<String>,
    #[serde(default)]
    pub buildid: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub md5sum: Option<String>,
    #[serde(default)]
    pub orig_url: Option<String>,
    #[serde(default)]
    pub releasedate: Option<String>,
    #[serde(default)]
    pub sha1sum: Option<String>,
    #[serde(default)]
    pub sha256sum: Option<String>,
    #[serde(default)]
    pub size: Option<f64>,
    #[serde(default)]
    pub uniqueid: Option<String>,
    #[serde(default)]
    pub uploaddate: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

// Web player

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coretrace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_control: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frida: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messaging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netmon: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_forwarding: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshots: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strace: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebPlayerSessionRequest {
    pub project_id: String,
    pub instance_id: String,
    pub expires_in: f64,
    pub features: Features,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebPlayerSession {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub token: Option<String>,
    /// Epoch millis on create, an ISO-8601 string elsewhere
    #[serde(default)]
    pub expiration: Option<serde_json::Value>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub features: Option<Features>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_settings_use_dashed_key() {
        let settings = ProjectSettings {
            version: 1.0,
            internet_access: true,
            dhcp: false,
        };
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value, json!({"version": 1.0, "internet-access": true, "dhcp": false}));
    }

    #[test]
    fn test_instance_decodes_partial_payload() {
        let instance: Instance = serde_json::from_value(json!({
            "id": "i-1",
            "state": "on",
            "bootOptions": {"bootArgs": "-v", "additionalTags": ["kalloc"]},
            "createdBy": {"username": "admin", "deleted": false}
        }))
        .unwrap();
        assert_eq!(instance.state.as_deref(), Some("on"));
        let boot = instance.boot_options.unwrap();
        assert_eq!(boot.boot_args.as_deref(), Some("-v"));
        assert_eq!(boot.additional_tags, vec!["kalloc".to_string()]);
        assert!(instance.patches.is_empty());
    }

    #[test]
    fn test_features_skip_unset_flags() {
        let features = Features {
            device_control: Some(true),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&features).unwrap(), json!({"deviceControl": true}));
    }

    #[test]
    fn test_instance_transitions() {
        use InstanceAction::*;
        assert_eq!(InstanceAction::steps("off", "on"), Some(vec![(Start, "on")]));
        assert_eq!(InstanceAction::steps("on", "off"), Some(vec![(Stop, "off")]));
        assert_eq!(InstanceAction::steps("on", "paused"), Some(vec![(Pause, "paused")]));
        assert_eq!(InstanceAction::steps("paused", "on"), Some(vec![(Unpause, "on")]));
        assert_eq!(InstanceAction::steps("paused", "off"), Some(vec![(Stop, "off")]));
        assert_eq!(InstanceAction::steps("on", "on"), Some(vec![]));
    }

    #[test]
    fn test_paused_from_off_starts_first() {
        use InstanceAction::*;
        assert_eq!(
            InstanceAction::steps("off", "paused"),
            Some(vec![(Start, "on"), (Pause, "paused")])
        );
        assert_eq!(InstanceAction::steps("booting", "paused"), None);
        assert_eq!(InstanceAction::steps("off", "rebooting"), None);
    }
}
