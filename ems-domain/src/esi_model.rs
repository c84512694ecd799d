use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use strum::{Display as StrumDisplay, EnumString};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct SystemId(pub u64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct ConstellationId(pub u64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct RegionId(pub u64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct StargateId(pub u64);

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TypeId(pub u64);

macro_rules! display_inner {
    ($($t:ty),*) => {
        $(impl Display for $t {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_inner!(SystemId, ConstellationId, RegionId, StargateId, TypeId);

/// The home system used when the caller leaves it blank (Jita).
pub const DEFAULT_START_SYSTEM: SystemId = SystemId(30000142);

/// `GET /universe/systems/{system_id}/`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SystemNode {
    pub system_id: SystemId,
    pub name: String,
    pub security_status: f64,
    pub constellation_id: Option<ConstellationId>,
    pub stargates: Option<Vec<StargateId>>,
}

impl SystemNode {
    pub fn stargate_ids(&self) -> &[StargateId] {
        self.stargates.as_deref().unwrap_or_default()
    }
}

/// `GET /universe/stargates/{stargate_id}/`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StargateLink {
    pub stargate_id: StargateId,
    pub destination: Option<StargateDestination>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StargateDestination {
    pub stargate_id: Option<StargateId>,
    pub system_id: Option<SystemId>,
}

impl StargateLink {
    pub fn destination_system_id(&self) -> Option<SystemId> {
        self.destination.as_ref().and_then(|d| d.system_id)
    }
}

/// `GET /universe/constellations/{constellation_id}/`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ConstellationInfo {
    pub constellation_id: ConstellationId,
    pub name: Option<String>,
    pub region_id: Option<RegionId>,
}

/// `GET /universe/types/{type_id}/`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub type_id: TypeId,
    pub name: Option<String>,
    pub volume: Option<f64>,
    pub packaged_volume: Option<f64>,
}

impl TypeInfo {
    /// Volume of one unit as it travels in a cargo hold. Items are hauled packaged, so the packaged
    /// volume wins when ESI reports one.
    pub fn unit_volume(&self) -> Option<f64> {
        self.packaged_volume.or(self.volume)
    }
}

/// `GET /search/?categories=solar_system&strict=true`
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    #[serde(alias = "systems")]
    pub solar_system: Option<Vec<SystemId>>,
}

/// One entry of `POST /universe/names/`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct NameEntry {
    pub id: u64,
    pub name: String,
    pub category: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// `GET /markets/{region_id}/orders/`
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct MarketOrder {
    pub order_id: Option<u64>,
    pub type_id: Option<TypeId>,
    pub system_id: Option<SystemId>,
    pub location_id: Option<u64>,
    pub price: Option<f64>,
    #[serde(default)]
    pub volume_remain: u64,
    pub is_buy_order: Option<bool>,
}

impl MarketOrder {
    pub fn side(&self) -> Option<OrderSide> {
        self.is_buy_order.map(|is_buy| if is_buy { OrderSide::Buy } else { OrderSide::Sell })
    }
}
