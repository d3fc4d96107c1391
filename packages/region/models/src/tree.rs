//! Arena-backed region hierarchy.
//!
//! Nodes live in a single `Vec` and refer to each other by [`NodeIndex`].
//! Index `0` is always the nation root. Lookup maps from typed ids to node
//! indices keep insertion and lineage queries logarithmic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CityId, DistrictId, RegionError, RegionPath, SubDistrictId};

/// Position of a node inside a [`RegionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(usize);

impl NodeIndex {
    /// The nation root.
    pub const ROOT: Self = Self(0);
}

/// A region at any level of the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Region {
    /// The country root.
    Nation,
    /// A city.
    City(CityId),
    /// A district.
    District(DistrictId),
    /// A sub-district.
    SubDistrict(SubDistrictId),
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nation => write!(f, "nation"),
            Self::City(id) => write!(f, "{id}"),
            Self::District(id) => write!(f, "{id}"),
            Self::SubDistrict(id) => write!(f, "{id}"),
        }
    }
}

/// One node of the arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionNode {
    /// Which region this node represents.
    pub region: Region,
    /// Display name, empty when unknown.
    pub name: String,
    /// Parent node; `None` only for the root.
    pub parent: Option<NodeIndex>,
    /// Child nodes in insertion order.
    pub children: Vec<NodeIndex>,
}

/// The nation → city → district → sub-district hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTree {
    nodes: Vec<RegionNode>,
    cities: BTreeMap<CityId, NodeIndex>,
    districts: BTreeMap<DistrictId, NodeIndex>,
    sub_districts: BTreeMap<SubDistrictId, NodeIndex>,
}

impl Default for RegionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionTree {
    /// Creates a tree containing only the nation root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![RegionNode {
                region: Region::Nation,
                name: String::new(),
                parent: None,
                children: Vec::new(),
            }],
            cities: BTreeMap::new(),
            districts: BTreeMap::new(),
            sub_districts: BTreeMap::new(),
        }
    }

    /// Builds a tree from a list of sub-district paths.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::ParentMismatch`] if two paths disagree about
    /// a region's parent.
    pub fn from_paths<I>(paths: I) -> Result<Self, RegionError>
    where
        I: IntoIterator<Item = RegionPath>,
    {
        let mut tree = Self::new();
        for path in paths {
            tree.insert_path(path)?;
        }
        Ok(tree)
    }

    fn push(&mut self, region: Region, name: &str, parent: NodeIndex) -> NodeIndex {
        let idx = NodeIndex(self.nodes.len());
        self.nodes.push(RegionNode {
            region,
            name: name.to_string(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(idx);
        idx
    }

    /// Adds a city under the nation root.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::Duplicate`] if the city already exists.
    pub fn add_city(&mut self, id: CityId, name: &str) -> Result<NodeIndex, RegionError> {
        if self.cities.contains_key(&id) {
            return Err(RegionError::Duplicate {
                region: Region::City(id),
            });
        }
        let idx = self.push(Region::City(id), name, NodeIndex::ROOT);
        self.cities.insert(id, idx);
        Ok(idx)
    }

    /// Adds a district under an existing city.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the city is unknown or the district
    /// already exists.
    pub fn add_district(
        &mut self,
        city: CityId,
        id: DistrictId,
        name: &str,
    ) -> Result<NodeIndex, RegionError> {
        let Some(&parent) = self.cities.get(&city) else {
            return Err(RegionError::UnknownParent {
                parent: Region::City(city),
                region: Region::District(id),
            });
        };
        if self.districts.contains_key(&id) {
            return Err(RegionError::Duplicate {
                region: Region::District(id),
            });
        }
        let idx = self.push(Region::District(id), name, parent);
        self.districts.insert(id, idx);
        Ok(idx)
    }

    /// Adds a sub-district under an existing district.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError`] if the district is unknown or the
    /// sub-district already exists.
    pub fn add_sub_district(
        &mut self,
        district: DistrictId,
        id: SubDistrictId,
        name: &str,
    ) -> Result<NodeIndex, RegionError> {
        let Some(&parent) = self.districts.get(&district) else {
            return Err(RegionError::UnknownParent {
                parent: Region::District(district),
                region: Region::SubDistrict(id),
            });
        };
        if self.sub_districts.contains_key(&id) {
            return Err(RegionError::Duplicate {
                region: Region::SubDistrict(id),
            });
        }
        let idx = self.push(Region::SubDistrict(id), name, parent);
        self.sub_districts.insert(id, idx);
        Ok(idx)
    }

    /// Inserts every missing node along `path`, leaving existing nodes as
    /// they are. Newly created nodes get empty names.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::ParentMismatch`] if a region on the path is
    /// already attached to a different parent.
    pub fn insert_path(&mut self, path: RegionPath) -> Result<NodeIndex, RegionError> {
        let city = match self.cities.get(&path.city_id) {
            Some(&idx) => idx,
            None => self.add_city(path.city_id, "")?,
        };

        let district = if let Some(&district) = self.districts.get(&path.district_id) {
            self.check_parent(district, city, Region::District(path.district_id))?;
            district
        } else {
            self.add_district(path.city_id, path.district_id, "")?
        };

        if let Some(&sub) = self.sub_districts.get(&path.sub_district_id) {
            self.check_parent(sub, district, Region::SubDistrict(path.sub_district_id))?;
            return Ok(sub);
        }
        self.add_sub_district(path.district_id, path.sub_district_id, "")
    }

    /// Inserts `path` like [`Self::insert_path`] and names every node on it.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::ParentMismatch`] if a region on the path is
    /// already attached to a different parent.
    pub fn insert_named_path(
        &mut self,
        path: RegionPath,
        city_name: &str,
        district_name: &str,
        sub_district_name: &str,
    ) -> Result<NodeIndex, RegionError> {
        let sub = self.insert_path(path)?;
        for (idx, name) in [
            (self.cities.get(&path.city_id).copied(), city_name),
            (self.districts.get(&path.district_id).copied(), district_name),
            (Some(sub), sub_district_name),
        ] {
            if let Some(node) = idx.and_then(|i| self.nodes.get_mut(i.0)) {
                name.clone_into(&mut node.name);
            }
        }
        Ok(sub)
    }

    fn check_parent(
        &self,
        node: NodeIndex,
        requested: NodeIndex,
        region: Region,
    ) -> Result<(), RegionError> {
        let existing = self
            .node(node)
            .and_then(|n| n.parent)
            .unwrap_or(NodeIndex::ROOT);
        if existing == requested {
            return Ok(());
        }

        let region_of = |idx| self.node(idx).map_or(Region::Nation, |n: &RegionNode| n.region);
        Err(RegionError::ParentMismatch {
            region,
            existing: region_of(existing),
            requested: region_of(requested),
        })
    }

    /// Returns the node at `idx`.
    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> Option<&RegionNode> {
        self.nodes.get(idx.0)
    }

    /// Returns the parent node of `idx`.
    #[must_use]
    pub fn parent(&self, idx: NodeIndex) -> Option<&RegionNode> {
        self.node(idx)
            .and_then(|n| n.parent)
            .and_then(|p| self.node(p))
    }

    /// Looks up the node for a sub-district.
    #[must_use]
    pub fn find_sub_district(&self, id: SubDistrictId) -> Option<NodeIndex> {
        self.sub_districts.get(&id).copied()
    }

    /// Resolves the full path of a sub-district by walking parent links.
    #[must_use]
    pub fn path_of(&self, id: SubDistrictId) -> Option<RegionPath> {
        let sub = self.find_sub_district(id)?;
        let district_node = self.parent(sub)?;
        let Region::District(district_id) = district_node.region else {
            return None;
        };
        let city_node = district_node.parent.and_then(|p| self.node(p))?;
        let Region::City(city_id) = city_node.region else {
            return None;
        };
        Some(RegionPath {
            city_id,
            district_id,
            sub_district_id: id,
        })
    }

    /// Returns every sub-district path ordered by sub-district id.
    #[must_use]
    pub fn sub_district_paths(&self) -> Vec<RegionPath> {
        self.sub_districts
            .keys()
            .filter_map(|&id| self.path_of(id))
            .collect()
    }

    /// Number of sub-districts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sub_districts.len()
    }

    /// Whether the tree has no sub-districts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sub_districts.is_empty()
    }

    /// Number of cities.
    #[must_use]
    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    /// Number of districts.
    #[must_use]
    pub fn district_count(&self) -> usize {
        self.districts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegionTree {
        RegionTree::from_paths([
            RegionPath::new(11, 110, 1101),
            RegionPath::new(11, 110, 1102),
            RegionPath::new(11, 111, 1111),
            RegionPath::new(26, 260, 2601),
        ])
        .unwrap()
    }

    #[test]
    fn builds_hierarchy_from_paths() {
        let tree = sample();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.city_count(), 2);
        assert_eq!(tree.district_count(), 3);
        assert_eq!(
            tree.path_of(SubDistrictId(1111)),
            Some(RegionPath::new(11, 111, 1111))
        );
    }

    #[test]
    fn parent_links_reach_the_root() {
        let tree = sample();
        let sub = tree.find_sub_district(SubDistrictId(2601)).unwrap();
        let district = tree.node(sub).unwrap().parent.unwrap();
        let city = tree.node(district).unwrap().parent.unwrap();
        let root = tree.node(city).unwrap().parent.unwrap();
        assert_eq!(root, NodeIndex::ROOT);
        assert_eq!(tree.node(root).unwrap().region, Region::Nation);
        assert_eq!(tree.node(root).unwrap().children.len(), 2);
    }

    #[test]
    fn inserting_the_same_path_twice_is_a_no_op() {
        let mut tree = sample();
        let first = tree.find_sub_district(SubDistrictId(1101)).unwrap();
        let again = tree.insert_path(RegionPath::new(11, 110, 1101)).unwrap();
        assert_eq!(first, again);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn rejects_district_moving_between_cities() {
        let mut tree = sample();
        let err = tree
            .insert_path(RegionPath::new(26, 110, 9999))
            .unwrap_err();
        assert_eq!(
            err,
            RegionError::ParentMismatch {
                region: Region::District(DistrictId(110)),
                existing: Region::City(CityId(11)),
                requested: Region::City(CityId(26)),
            }
        );
    }

    #[test]
    fn rejects_sub_district_moving_between_districts() {
        let mut tree = sample();
        let err = tree
            .insert_path(RegionPath::new(11, 111, 1101))
            .unwrap_err();
        assert_eq!(
            err,
            RegionError::ParentMismatch {
                region: Region::SubDistrict(SubDistrictId(1101)),
                existing: Region::District(DistrictId(110)),
                requested: Region::District(DistrictId(111)),
            }
        );
    }

    #[test]
    fn rejects_unknown_parent_and_duplicates() {
        let mut tree = RegionTree::new();
        assert!(matches!(
            tree.add_district(CityId(1), DistrictId(10), "Gangnam"),
            Err(RegionError::UnknownParent { .. })
        ));
        tree.add_city(CityId(1), "Seoul").unwrap();
        assert!(matches!(
            tree.add_city(CityId(1), "Seoul"),
            Err(RegionError::Duplicate { .. })
        ));
    }

    #[test]
    fn named_insert_labels_every_level() {
        let mut tree = RegionTree::new();
        let sub = tree
            .insert_named_path(RegionPath::new(1, 10, 100), "Seoul", "Jongno-gu", "Sajik-dong")
            .unwrap();
        assert_eq!(tree.node(sub).unwrap().name, "Sajik-dong");
        assert_eq!(tree.parent(sub).unwrap().name, "Jongno-gu");
        let district = tree.node(sub).unwrap().parent.unwrap();
        assert_eq!(tree.parent(district).unwrap().name, "Seoul");
    }

    #[test]
    fn sub_district_paths_are_sorted_by_id() {
        let tree = sample();
        let ids: Vec<i64> = tree
            .sub_district_paths()
            .iter()
            .map(|p| p.sub_district_id.value())
            .collect();
        assert_eq!(ids, vec![1101, 1102, 1111, 2601]);
    }
}
