use crate::hash::ItemHash;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resources {
    pub vcpus: u32,
    /// Megabytes.
    pub memory: u64,
    pub seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmutableVolume {
    #[serde(rename = "ref")]
    pub reference: ItemHash,
    #[serde(default)]
    pub use_latest: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub mount: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralVolume {
    pub size_mib: u64,
    #[serde(default)]
    pub comment: Option<String>,
    pub mount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentVolume {
    pub persistence: String,
    pub name: String,
    pub size_mib: u64,
    #[serde(default)]
    pub comment: Option<String>,
    pub mount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Volume {
    Immutable(ImmutableVolume),
    Ephemeral(EphemeralVolume),
    Persistent(PersistentVolume),
}

impl Volume {
    pub fn as_immutable(&self) -> Option<&ImmutableVolume> {
        match self {
            Volume::Immutable(v) => Some(v),
            _ => None,
        }
    }

    /// Bytes this volume occupies, for volumes whose size is declared
    /// directly (ephemeral/persistent). Immutable volumes are sized by
    /// their referenced file instead (see `costs::volume_size`).
    pub fn declared_size_bytes(&self) -> Option<u64> {
        match self {
            Volume::Ephemeral(v) => Some(v.size_mib * 1024 * 1024),
            Volume::Persistent(v) => Some(v.size_mib * 1024 * 1024),
            Volume::Immutable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeVolume {
    pub encoding: String,
    pub entrypoint: String,
    #[serde(rename = "ref")]
    pub reference: ItemHash,
    #[serde(default)]
    pub use_latest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeRef {
    #[serde(rename = "ref")]
    pub reference: ItemHash,
    #[serde(default)]
    pub use_latest: bool,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataVolume {
    pub encoding: String,
    pub mount: String,
    #[serde(rename = "ref")]
    pub reference: ItemHash,
    #[serde(default)]
    pub use_latest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootfsVolume {
    pub parent: ImmutableVolume,
    pub size_mib: u64,
    pub persistence: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default)]
    pub reproducible: bool,
    #[serde(default)]
    pub internet: bool,
    #[serde(default)]
    pub aleph_api: bool,
    #[serde(default)]
    pub shared_cache: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub http: bool,
    #[serde(default)]
    pub message: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub cpu_architecture: Option<String>,
    #[serde(default)]
    pub cpu_vendor: Option<String>,
    #[serde(default)]
    pub node_owner: Option<String>,
    #[serde(default)]
    pub node_address_regex: Option<String>,
}

/// Content shared by PROGRAM and INSTANCE messages: the handler and cost
/// gate operate against this trait rather than the two concrete types, per
/// the originating node's `ExecutableContent` abstraction.
pub trait ExecutableContent {
    fn address(&self) -> &str;
    fn time(&self) -> f64;
    fn resources(&self) -> &Resources;
    fn environment(&self) -> &Environment;
    fn volumes(&self) -> &[Volume];
    fn allow_amend(&self) -> bool;
    fn replaces(&self) -> Option<&ItemHash>;
    /// File references that must resolve to an existing file before this
    /// message can be processed: immutable volumes, a program's
    /// code/runtime/data, an instance's rootfs parent. Excludes sized
    /// ephemeral/persistent volumes, which don't reference a file.
    fn immutable_refs(&self) -> Vec<&ItemHash>;
    fn is_persistent(&self) -> bool;
    /// Extra declared-size storage not expressed through `volumes()` --
    /// only instances' rootfs disk allocation, which is sized directly on
    /// the content rather than listed among its volumes.
    fn extra_sized_bytes(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramContent {
    pub address: String,
    pub allow_amend: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub variables: Option<std::collections::BTreeMap<String, String>>,
    pub environment: Environment,
    pub resources: Resources,
    #[serde(default)]
    pub requirements: Option<Requirements>,
    pub code: CodeVolume,
    pub runtime: RuntimeRef,
    #[serde(default)]
    pub data: Option<DataVolume>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    pub on: Triggers,
    #[serde(default)]
    pub replaces: Option<ItemHash>,
    pub time: f64,
}

impl ExecutableContent for ProgramContent {
    fn address(&self) -> &str {
        &self.address
    }
    fn time(&self) -> f64 {
        self.time
    }
    fn resources(&self) -> &Resources {
        &self.resources
    }
    fn environment(&self) -> &Environment {
        &self.environment
    }
    fn volumes(&self) -> &[Volume] {
        &self.volumes
    }
    fn allow_amend(&self) -> bool {
        self.allow_amend
    }
    fn replaces(&self) -> Option<&ItemHash> {
        self.replaces.as_ref()
    }
    fn immutable_refs(&self) -> Vec<&ItemHash> {
        let mut refs = vec![&self.code.reference, &self.runtime.reference];
        if let Some(data) = &self.data {
            refs.push(&data.reference);
        }
        for v in &self.volumes {
            if let Volume::Immutable(iv) = v {
                refs.push(&iv.reference);
            }
        }
        refs
    }
    fn is_persistent(&self) -> bool {
        self.on.persistent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceContent {
    pub address: String,
    pub allow_amend: bool,
    pub environment: Environment,
    pub resources: Resources,
    pub rootfs: RootfsVolume,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub replaces: Option<ItemHash>,
    pub time: f64,
}

impl ExecutableContent for InstanceContent {
    fn address(&self) -> &str {
        &self.address
    }
    fn time(&self) -> f64 {
        self.time
    }
    fn resources(&self) -> &Resources {
        &self.resources
    }
    fn environment(&self) -> &Environment {
        &self.environment
    }
    fn volumes(&self) -> &[Volume] {
        &self.volumes
    }
    fn allow_amend(&self) -> bool {
        self.allow_amend
    }
    fn replaces(&self) -> Option<&ItemHash> {
        self.replaces.as_ref()
    }
    fn immutable_refs(&self) -> Vec<&ItemHash> {
        let mut refs = vec![&self.rootfs.parent.reference];
        for v in &self.volumes {
            if let Volume::Immutable(iv) = v {
                refs.push(&iv.reference);
            }
        }
        refs
    }
    fn is_persistent(&self) -> bool {
        // Instances are always persistent (always-on VMs); there is no
        // on-demand instance mode, unlike programs.
        true
    }

    fn extra_sized_bytes(&self) -> u64 {
        self.rootfs.size_mib * 1024 * 1024
    }
}
