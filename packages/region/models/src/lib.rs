#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative region types for J-Score grouping.
//!
//! The hierarchy is fixed at four levels: nation, city, district and
//! sub-district. Sub-districts are the rows being scored; the three
//! coarser levels are the [`StatLevel`]s a metric is ranked within.

pub mod tree;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use tree::{NodeIndex, Region, RegionNode, RegionTree};

/// Errors raised while building a [`RegionTree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// A region with this identifier was already added.
    #[error("Duplicate region: {region}")]
    Duplicate {
        /// The region that was added twice.
        region: Region,
    },

    /// The parent a region was attached to does not exist.
    #[error("Unknown parent {parent} for {region}")]
    UnknownParent {
        /// The missing parent.
        parent: Region,
        /// The region being attached.
        region: Region,
    },

    /// A region is already attached to a different parent.
    #[error("{region} belongs to {existing}, not {requested}")]
    ParentMismatch {
        /// The region being attached.
        region: Region,
        /// The parent it is already attached to.
        existing: Region,
        /// The parent it was requested under.
        requested: Region,
    },
}

macro_rules! region_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw identifier.
            #[must_use]
            pub const fn value(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{} {}", $label, self.0)
            }
        }
    };
}

region_id!(
    /// Identifier of a city.
    CityId,
    "city"
);
region_id!(
    /// Identifier of a district. Unique nationally, not just within its city.
    DistrictId,
    "district"
);
region_id!(
    /// Identifier of a sub-district, the finest grain that is scored.
    SubDistrictId,
    "sub-district"
);

/// The full id triple locating a sub-district in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionPath {
    /// Owning city.
    pub city_id: CityId,
    /// Owning district.
    pub district_id: DistrictId,
    /// The sub-district itself.
    pub sub_district_id: SubDistrictId,
}

impl RegionPath {
    /// Creates a path from raw identifiers.
    #[must_use]
    pub const fn new(city_id: i64, district_id: i64, sub_district_id: i64) -> Self {
        Self {
            city_id: CityId(city_id),
            district_id: DistrictId(district_id),
            sub_district_id: SubDistrictId(sub_district_id),
        }
    }
}

/// The grouping scope a statistic or score was computed within.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StatLevel {
    /// Every sub-district in the country.
    Nation,
    /// Sub-districts sharing a city.
    City,
    /// Sub-districts sharing a district.
    District,
}

impl StatLevel {
    /// All levels in the order they are scored.
    pub const ALL: [Self; 3] = [Self::Nation, Self::City, Self::District];

    /// Returns the group a sub-district falls into at this level.
    #[must_use]
    pub const fn scope_of(self, path: &RegionPath) -> GroupScope {
        match self {
            Self::Nation => GroupScope::Nation,
            Self::City => GroupScope::City(path.city_id),
            Self::District => GroupScope::District(path.district_id),
        }
    }

    /// Projects a path onto the ids a record at this level carries.
    ///
    /// City-level records drop the district and district-level records
    /// drop the city, so a record's ids say which group it was ranked in.
    #[must_use]
    pub const fn project(self, path: &RegionPath) -> ScopedRegion {
        match self {
            Self::Nation => ScopedRegion {
                city_id: Some(path.city_id),
                district_id: Some(path.district_id),
                sub_district_id: path.sub_district_id,
            },
            Self::City => ScopedRegion {
                city_id: Some(path.city_id),
                district_id: None,
                sub_district_id: path.sub_district_id,
            },
            Self::District => ScopedRegion {
                city_id: None,
                district_id: Some(path.district_id),
                sub_district_id: path.sub_district_id,
            },
        }
    }
}

/// A concrete group at some [`StatLevel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupScope {
    /// The whole country.
    Nation,
    /// One city.
    City(CityId),
    /// One district.
    District(DistrictId),
}

impl GroupScope {
    /// Returns the level this scope belongs to.
    #[must_use]
    pub const fn level(&self) -> StatLevel {
        match self {
            Self::Nation => StatLevel::Nation,
            Self::City(_) => StatLevel::City,
            Self::District(_) => StatLevel::District,
        }
    }

    /// Whether the given sub-district lies inside this scope.
    #[must_use]
    pub fn contains(&self, path: &RegionPath) -> bool {
        match self {
            Self::Nation => true,
            Self::City(city) => path.city_id == *city,
            Self::District(district) => path.district_id == *district,
        }
    }
}

impl std::fmt::Display for GroupScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nation => write!(f, "nation"),
            Self::City(id) => write!(f, "{id}"),
            Self::District(id) => write!(f, "{id}"),
        }
    }
}

/// Region ids as carried by a record scored at a particular level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopedRegion {
    /// City id, absent on district-level records.
    pub city_id: Option<CityId>,
    /// District id, absent on city-level records.
    pub district_id: Option<DistrictId>,
    /// The scored sub-district.
    pub sub_district_id: SubDistrictId,
}
