//! Core data types: nouns, verbs, and the records that ride alongside them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current major schema version written into every persisted record.
///
/// Readers reject a record whose `schema_version` exceeds this value.
pub const SCHEMA_VERSION: u32 = 1;

/// Rejects a record whose `schema_version` is newer than this build
/// understands, so a downgrade never silently misinterprets a field it
/// doesn't know about yet.
pub fn check_schema_version(found: u32) -> Result<(), crate::error::BrainyError> {
    if found > SCHEMA_VERSION {
        return Err(crate::error::BrainyError::InvalidData {
            reason: format!("record schema_version {found} is newer than supported version {SCHEMA_VERSION}"),
        });
    }
    Ok(())
}

/// A closed enumeration of noun types known ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NounType {
    Person,
    Organization,
    Location,
    Thing,
    Concept,
    Document,
    Content,
    Event,
    Project,
    Task,
}

impl NounType {
    /// All variants, used to enumerate candidate types for an unscoped search.
    pub const ALL: &'static [NounType] = &[
        NounType::Person,
        NounType::Organization,
        NounType::Location,
        NounType::Thing,
        NounType::Concept,
        NounType::Document,
        NounType::Content,
        NounType::Event,
        NounType::Project,
        NounType::Task,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            NounType::Person => "Person",
            NounType::Organization => "Organization",
            NounType::Location => "Location",
            NounType::Thing => "Thing",
            NounType::Concept => "Concept",
            NounType::Document => "Document",
            NounType::Content => "Content",
            NounType::Event => "Event",
            NounType::Project => "Project",
            NounType::Task => "Task",
        }
    }
}

impl fmt::Display for NounType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NounType {
    type Err = crate::error::BrainyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NounType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::error::BrainyError::UnknownNounType(s.to_string()))
    }
}

/// A closed enumeration of verb types known ahead of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VerbType {
    RelatedTo,
    Contains,
    PartOf,
    LocatedAt,
    References,
    Precedes,
    WorksWith,
    Creates,
}

impl VerbType {
    pub const ALL: &'static [VerbType] = &[
        VerbType::RelatedTo,
        VerbType::Contains,
        VerbType::PartOf,
        VerbType::LocatedAt,
        VerbType::References,
        VerbType::Precedes,
        VerbType::WorksWith,
        VerbType::Creates,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            VerbType::RelatedTo => "RelatedTo",
            VerbType::Contains => "Contains",
            VerbType::PartOf => "PartOf",
            VerbType::LocatedAt => "LocatedAt",
            VerbType::References => "References",
            VerbType::Precedes => "Precedes",
            VerbType::WorksWith => "WorksWith",
            VerbType::Creates => "Creates",
        }
    }
}

impl fmt::Display for VerbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VerbType {
    type Err = crate::error::BrainyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VerbType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| crate::error::BrainyError::UnknownVerbType(s.to_string()))
    }
}

/// Monotonic timestamp: seconds and nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        let dur = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            secs: dur.as_secs() as i64,
            nanos: dur.subsec_nanos(),
        }
    }
}

/// Optional provenance tag: which service, at which version, produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBy {
    pub service: String,
    pub version: String,
}

/// Mapping from HNSW layer index to the set of neighbor IDs at that layer.
pub type Connections = BTreeMap<usize, Vec<String>>;

/// An entity with a dense vector, a typed label, free-form metadata, and adjacency sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Noun {
    pub schema_version: u32,
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(rename = "type")]
    pub noun_type: NounType,
    #[serde(default)]
    pub metadata: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub connections: Connections,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub created_by: Option<CreatedBy>,
}

impl Noun {
    pub fn new(id: impl Into<String>, vector: Vec<f32>, noun_type: NounType) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            vector,
            noun_type,
            metadata: serde_json::Map::new(),
            connections: Connections::new(),
            created_at: now,
            updated_at: now,
            created_by: None,
        }
    }

    /// `true` when the noun carries the soft-delete marker.
    pub fn is_soft_deleted(&self) -> bool {
        self.metadata
            .get("_deleted")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    pub fn mark_soft_deleted(&mut self) {
        self.metadata.insert("_deleted".to_string(), JsonValue::Bool(true));
        self.updated_at = Timestamp::now();
    }
}

/// A typed, weighted, directed edge between two nouns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verb {
    pub schema_version: u32,
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub connections: Connections,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub created_by: Option<CreatedBy>,
    pub source: String,
    pub target: String,
    #[serde(rename = "verb")]
    pub verb_type: VerbType,
    pub weight: f32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, JsonValue>,
}

impl Verb {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        verb_type: VerbType,
        vector: Vec<f32>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            id: id.into(),
            vector,
            connections: Connections::new(),
            created_at: now,
            updated_at: now,
            created_by: None,
            source: source.into(),
            target: target.into(),
            verb_type,
            weight: 0.5,
            metadata: serde_json::Map::new(),
        }
    }
}

/// The kind of entity a change-log entry or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Noun,
    Verb,
    Metadata,
}

/// The operation a change-log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Upsert,
    Delete,
}

/// A single append-only change-log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub timestamp: i64,
    pub sequence: u64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub op: ChangeOp,
}

/// Per-service counts and index size, flushed on a timer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub schema_version: u32,
    pub noun_count: BTreeMap<String, u64>,
    pub verb_count: BTreeMap<String, u64>,
    pub metadata_count: BTreeMap<String, u64>,
    pub hnsw_index_size: BTreeMap<String, usize>,
    pub field_names: Vec<String>,
    pub last_updated: i64,
}

/// The role an instance plays in a distributed deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
    Hybrid,
}

impl std::str::FromStr for Role {
    type Err = crate::error::BrainyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reader" => Ok(Role::Reader),
            "writer" => Ok(Role::Writer),
            "hybrid" => Ok(Role::Hybrid),
            other => Err(crate::error::BrainyError::InvalidRole(other.to_string())),
        }
    }
}

/// Health classification surfaced in the config manager's per-instance heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// A single instance's entry in the distributed config record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub role: Role,
    pub last_heartbeat: i64,
    pub health_status: HealthStatus,
}

/// HNSW construction/search tuning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: usize,
    pub ef_construction: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
        }
    }
}

/// The shared-config settings block of a distributed config record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedSettings {
    pub partition_strategy: String,
    pub partition_count: u32,
    pub dimensions: usize,
    pub distance_metric: String,
    pub hnsw_params: HnswParams,
}

/// The bucket-resident shared config record (spec §3 "Distributed config record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributedConfigRecord {
    pub schema_version: u32,
    pub version: u64,
    pub updated: i64,
    pub settings: DistributedSettings,
    #[serde(default)]
    pub instances: BTreeMap<String, InstanceEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noun_type_round_trips_through_display_and_parse() {
        for t in NounType::ALL {
            let parsed: NounType = t.to_string().parse().unwrap();
            assert_eq!(parsed, *t);
        }
    }

    #[test]
    fn unknown_noun_type_is_rejected() {
        assert!("Wizard".parse::<NounType>().is_err());
    }

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Writer".parse::<Role>().unwrap(), Role::Writer);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn noun_soft_delete_marker_round_trips() {
        let mut n = Noun::new("n1", vec![0.0; 3], NounType::Thing);
        assert!(!n.is_soft_deleted());
        n.mark_soft_deleted();
        assert!(n.is_soft_deleted());
    }

    #[test]
    fn schema_version_check_accepts_current_and_older() {
        assert!(check_schema_version(SCHEMA_VERSION).is_ok());
        assert!(check_schema_version(0).is_ok());
    }

    #[test]
    fn schema_version_check_rejects_newer() {
        let err = check_schema_version(SCHEMA_VERSION + 1).unwrap_err();
        assert!(matches!(err, crate::error::BrainyError::InvalidData { .. }));
    }
}
