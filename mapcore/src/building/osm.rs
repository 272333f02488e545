//! OSM node/way/relation graph and building footprint resolution

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::map::coords::GeoPoint;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OsmNode {
    pub id: i64,
    #[serde(alias = "lon")]
    pub lng: f64,
    pub lat: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OsmWay {
    pub id: i64,
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OsmMember {
    #[serde(rename = "type")]
    pub kind: MemberKind,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub role: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OsmRelation {
    pub id: i64,
    pub members: Vec<OsmMember>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// A parsed OSM extract, as returned by a `FootprintSource`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsmData {
    pub nodes: Vec<OsmNode>,
    pub ways: Vec<OsmWay>,
    pub relations: Vec<OsmRelation>,
}

impl OsmData {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildingId {
    Way(i64),
    Relation(i64),
}

impl BuildingId {
    /// Stable seed for per-building randomness
    pub fn seed(&self) -> u64 {
        match *self {
            BuildingId::Way(id) => id as u64,
            BuildingId::Relation(id) => (id as u64) ^ (1 << 63),
        }
    }
}

impl fmt::Display for BuildingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildingId::Way(id) => write!(f, "way/{id}"),
            BuildingId::Relation(id) => write!(f, "relation/{id}"),
        }
    }
}

/// A building whose nodes are resolved to coordinates
#[derive(Clone, Debug, PartialEq)]
pub struct BuildingCandidate {
    pub id: BuildingId,
    /// Closed outline; the first point may repeat at the end
    pub outline: Vec<GeoPoint>,
    pub tags: HashMap<String, String>,
}

fn is_building(tags: &HashMap<String, String>) -> bool {
    tags.get("building").is_some_and(|v| v != "no")
}

/// Buildings found in an extract
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    pub buildings: Vec<BuildingCandidate>,
    /// Buildings referencing nodes or ways the extract does not contain
    pub unresolved: Vec<BuildingId>,
}

/// Collect the buildings in `data`: tagged ways, and multipolygon relations
/// whose outer ways stitch into a closed ring. Buildings referencing
/// missing nodes or ways are listed as unresolved.
pub fn resolve_buildings(data: &OsmData) -> Resolution {
    let nodes: HashMap<i64, GeoPoint> = data
        .nodes
        .iter()
        .map(|n| (n.id, GeoPoint::new(n.lng, n.lat)))
        .collect();
    let ways: HashMap<i64, &OsmWay> = data.ways.iter().map(|w| (w.id, w)).collect();

    let mut out = Resolution::default();

    for way in data.ways.iter().filter(|w| is_building(&w.tags)) {
        match resolve_nodes(&way.nodes, &nodes) {
            Some(outline) => out.buildings.push(BuildingCandidate {
                id: BuildingId::Way(way.id),
                outline,
                tags: way.tags.clone(),
            }),
            None => {
                log::debug!("Way {} references missing nodes", way.id);
                out.unresolved.push(BuildingId::Way(way.id));
            }
        }
    }

    for relation in &data.relations {
        let multipolygon = relation.tags.get("type").is_some_and(|t| t == "multipolygon");
        if !multipolygon || !is_building(&relation.tags) {
            continue;
        }

        let outer: Option<Vec<&[i64]>> = relation
            .members
            .iter()
            .filter(|m| m.kind == MemberKind::Way && (m.role == "outer" || m.role.is_empty()))
            .map(|m| ways.get(&m.reference).map(|w| w.nodes.as_slice()))
            .collect();

        let ring = outer.and_then(|segments| stitch_ring(&segments));
        match ring.and_then(|ids| resolve_nodes(&ids, &nodes)) {
            Some(outline) => out.buildings.push(BuildingCandidate {
                id: BuildingId::Relation(relation.id),
                outline,
                tags: relation.tags.clone(),
            }),
            None => {
                log::debug!("Relation {} has an incomplete outer ring", relation.id);
                out.unresolved.push(BuildingId::Relation(relation.id));
            }
        }
    }

    out
}

fn resolve_nodes(ids: &[i64], nodes: &HashMap<i64, GeoPoint>) -> Option<Vec<GeoPoint>> {
    ids.iter().map(|id| nodes.get(id).copied()).collect()
}

/// Join way segments end to end into the first closed ring, reversing
/// segments as needed.
pub fn stitch_ring(segments: &[&[i64]]) -> Option<Vec<i64>> {
    let mut unused: Vec<&[i64]> = segments.iter().copied().filter(|s| s.len() >= 2).collect();
    if unused.is_empty() {
        return None;
    }
    let mut ring: Vec<i64> = unused.remove(0).to_vec();

    while ring.first() != ring.last() {
        let end = *ring.last()?;
        let pos = unused
            .iter()
            .position(|s| s.first() == Some(&end) || s.last() == Some(&end))?;
        let segment = unused.remove(pos);
        if segment.first() == Some(&end) {
            ring.extend_from_slice(&segment[1..]);
        } else {
            ring.extend(segment.iter().rev().skip(1));
        }
    }

    if !unused.is_empty() {
        log::debug!("Ignoring {} outer segments beyond the first ring", unused.len());
    }
    Some(ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> OsmData {
        serde_json::from_str(
            r#"{
                "nodes": [
                    { "id": 1, "lon": 0.0, "lat": 0.0 },
                    { "id": 2, "lon": 0.001, "lat": 0.0 },
                    { "id": 3, "lon": 0.001, "lat": 0.001 },
                    { "id": 4, "lon": 0.0, "lat": 0.001 }
                ],
                "ways": [
                    {
                        "id": 10,
                        "nodes": [1, 2, 3, 4, 1],
                        "tags": { "building": "yes", "height": "12" }
                    },
                    { "id": 11, "nodes": [1, 2, 3] },
                    { "id": 12, "nodes": [1, 4, 3] },
                    { "id": 13, "nodes": [1, 2, 99, 1], "tags": { "building": "yes" } },
                    { "id": 14, "nodes": [1, 2, 3, 1], "tags": { "building": "no" } }
                ],
                "relations": [
                    {
                        "id": 20,
                        "members": [
                            { "type": "way", "ref": 11, "role": "outer" },
                            { "type": "way", "ref": 12, "role": "outer" }
                        ],
                        "tags": { "type": "multipolygon", "building": "apartments" }
                    },
                    {
                        "id": 21,
                        "members": [{ "type": "way", "ref": 11, "role": "outer" }],
                        "tags": { "type": "multipolygon", "building": "yes" }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_buildings() {
        let Resolution { buildings, unresolved } = resolve_buildings(&data());
        let ids: Vec<_> = buildings.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![BuildingId::Way(10), BuildingId::Relation(20)]);
        assert_eq!(unresolved, vec![BuildingId::Way(13), BuildingId::Relation(21)]);

        let way = &buildings[0];
        assert_eq!(way.outline.len(), 5);
        assert_eq!(way.tags["height"], "12");
        assert_eq!(way.outline[2], GeoPoint::new(0.001, 0.001));

        let relation = &buildings[1];
        assert_eq!(relation.outline.len(), 5);
        assert_eq!(relation.outline.first(), relation.outline.last());
    }

    #[test]
    fn test_stitch_ring() {
        let a: &[i64] = &[1, 2, 3];
        let b: &[i64] = &[5, 4, 3];
        let c: &[i64] = &[5, 1];
        assert_eq!(stitch_ring(&[a, b, c]), Some(vec![1, 2, 3, 4, 5, 1]));
        assert_eq!(stitch_ring(&[a, b]), None);
        assert_eq!(stitch_ring(&[]), None);
    }

    #[test]
    fn test_building_id() {
        assert_eq!(BuildingId::Way(7).to_string(), "way/7");
        assert_ne!(BuildingId::Way(7).seed(), BuildingId::Relation(7).seed());
    }
}
