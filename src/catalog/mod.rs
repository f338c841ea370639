//! LocationCatalog trait - the only I/O boundary of the selector.
//!
//! A catalog answers "which children of this parent exist at this level".
//! Responses are FeatureCollection-shaped JSON; each feature's `properties`
//! object is decoded into the typed node for the requested level.

pub mod http;
pub mod in_memory;

pub use http::HttpCatalog;
pub use in_memory::StaticCatalog;

use crate::error::CatalogError;
use async_trait::async_trait;
use basin_types::{
    Catchment, Drain, Level, LocationId, LocationNode, River, Stretch, Village,
};
use serde::{Deserialize, Deserializer};

pub type Result<T> = std::result::Result<T, CatalogError>;

#[async_trait]
pub trait LocationCatalog: Send + Sync {
    /// Children at `level` under `parent`. Rivers are fetched with no parent.
    /// Villages are fetched under their drain.
    async fn children(&self, level: Level, parent: Option<&LocationId>)
        -> Result<Vec<LocationNode>>;
}

// ── Wire shape ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Kept opaque; polygons are the renderer's business
    #[serde(default)]
    pub geometry: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct RiverProps {
    #[serde(deserialize_with = "deserialize_id")]
    id: LocationId,
    name: String,
}

#[derive(Deserialize)]
struct StretchProps {
    #[serde(deserialize_with = "deserialize_id")]
    id: LocationId,
    name: String,
    #[serde(alias = "parentId", deserialize_with = "deserialize_id")]
    parent_id: LocationId,
}

#[derive(Deserialize)]
struct DrainProps {
    #[serde(deserialize_with = "deserialize_id")]
    id: LocationId,
    name: String,
    #[serde(alias = "parentId", deserialize_with = "deserialize_id")]
    parent_id: LocationId,
    #[serde(alias = "drain_number", alias = "drainNo")]
    drain_no: u32,
}

#[derive(Deserialize)]
struct CatchmentProps {
    #[serde(deserialize_with = "deserialize_id")]
    id: LocationId,
    name: String,
    #[serde(alias = "parentId", deserialize_with = "deserialize_id")]
    parent_id: LocationId,
}

#[derive(Deserialize)]
struct VillageProps {
    #[serde(deserialize_with = "deserialize_id")]
    id: LocationId,
    name: String,
    /// Owning drain
    #[serde(alias = "parentId", deserialize_with = "deserialize_id")]
    parent_id: LocationId,
    #[serde(default, alias = "catchmentId", deserialize_with = "deserialize_opt_id")]
    catchment_id: Option<LocationId>,
    #[serde(alias = "drain_number", alias = "drainNo")]
    drain_no: u32,
    population: u64,
    district: String,
    #[serde(alias = "subDistrict")]
    sub_district: String,
    #[serde(alias = "state_name")]
    state: String,
}

/// Decode every feature as a node of `level`. One bad record fails the
/// whole response.
pub fn decode_features(level: Level, collection: FeatureCollection) -> Result<Vec<LocationNode>> {
    collection
        .features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            decode_properties(level, feature.properties).map_err(|e| {
                CatalogError::MalformedRecord {
                    level,
                    index,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

fn decode_properties(
    level: Level,
    props: serde_json::Value,
) -> std::result::Result<LocationNode, serde_json::Error> {
    Ok(match level {
        Level::River => {
            let p: RiverProps = serde_json::from_value(props)?;
            LocationNode::River(River {
                id: p.id,
                name: p.name,
            })
        }
        Level::Stretch => {
            let p: StretchProps = serde_json::from_value(props)?;
            LocationNode::Stretch(Stretch {
                id: p.id,
                name: p.name,
                river_id: p.parent_id,
            })
        }
        Level::Drain => {
            let p: DrainProps = serde_json::from_value(props)?;
            LocationNode::Drain(Drain {
                id: p.id,
                name: p.name,
                stretch_id: p.parent_id,
                drain_no: p.drain_no,
            })
        }
        Level::Catchment => {
            let p: CatchmentProps = serde_json::from_value(props)?;
            LocationNode::Catchment(Catchment {
                id: p.id,
                name: p.name,
                drain_id: p.parent_id,
            })
        }
        Level::Village => {
            let p: VillageProps = serde_json::from_value(props)?;
            LocationNode::Village(Village {
                id: p.id,
                name: p.name,
                drain_id: p.parent_id,
                catchment_id: p.catchment_id,
                drain_no: p.drain_no,
                population: p.population,
                district: p.district,
                sub_district: p.sub_district,
                state: p.state,
            })
        }
    })
}

/// GIS services hand out ids as strings or as bare numbers; accept both.
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<LocationId, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct IdVisitor;

    impl<'de> de::Visitor<'de> for IdVisitor {
        type Value = LocationId;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer id")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
            Ok(LocationId::new(v))
        }

        fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Self::Value, E> {
            Ok(LocationId(v))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(LocationId(v.to_string()))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(LocationId(v.to_string()))
        }
    }

    deserializer.deserialize_any(IdVisitor)
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<LocationId>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "deserialize_id")] LocationId);

    let wrapped: Option<Wrapped> = Option::deserialize(deserializer)?;
    Ok(wrapped.map(|Wrapped(id)| id))
}
