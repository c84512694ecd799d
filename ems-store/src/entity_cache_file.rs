use crate::fs_helpers::{read_json_opt, write_json};
use anyhow::Result;
use ems_domain::{ConstellationId, ConstellationInfo, StargateId, StargateLink, SystemId, SystemNode, TypeId, TypeInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// On-disk layout of the static universe cache. Every section is write-once; entries are only
/// dropped by an explicit refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCacheData {
    #[serde(default)]
    pub systems: BTreeMap<SystemId, SystemNode>,
    #[serde(default)]
    pub constellations: BTreeMap<ConstellationId, ConstellationInfo>,
    #[serde(default)]
    pub stargates: BTreeMap<StargateId, StargateLink>,
    #[serde(default)]
    pub types: BTreeMap<TypeId, TypeInfo>,
    #[serde(default)]
    pub names: BTreeMap<u64, String>,
    #[serde(default)]
    pub system_ids_by_name: BTreeMap<String, SystemId>,
}

impl EntityCacheData {
    pub async fn load(path: &Path) -> Result<Self> {
        Ok(read_json_opt(path).await?.unwrap_or_default())
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self).await
    }

    pub fn num_entries(&self) -> usize {
        self.systems.len() + self.constellations.len() + self.stargates.len() + self.types.len() + self.names.len() + self.system_ids_by_name.len()
    }
}
