//! Coordinate Reference System identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProjectionError, Result};

/// EPSG code of geographic WGS84 (lon/lat in degrees).
pub const WGS84_EPSG: u16 = 4326;

/// A coordinate reference system identified by its EPSG code.
///
/// Only codes present in the `crs-definitions` database are accepted, so
/// every `Crs` value can be turned into a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Crs {
    epsg: u16,
}

impl Crs {
    /// Geographic WGS84, the default for rasters and geometries without one.
    pub fn wgs84() -> Self {
        Self { epsg: WGS84_EPSG }
    }

    /// Build a CRS from an EPSG code, checking it against the database.
    pub fn from_epsg(epsg: u16) -> Result<Self> {
        if crs_definitions::from_code(epsg).is_none() {
            return Err(ProjectionError::UnknownEpsg(epsg));
        }
        Ok(Self { epsg })
    }

    /// Parse a CRS string.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326" / "epsg:4326"
    /// - "4326"
    /// - "CRS:84" and "OGC:CRS84" (WGS84 with lon/lat axis order)
    /// - "urn:ogc:def:crs:EPSG::32630" and "urn:ogc:def:crs:OGC:1.3:CRS84"
    /// - "http://www.opengis.net/def/crs/EPSG/0/3857"
    pub fn parse(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase();

        if normalized.ends_with("CRS84") || normalized == "CRS:84" {
            return Ok(Self::wgs84());
        }

        let code = if let Some(rest) = normalized.strip_prefix("EPSG:") {
            rest
        } else if let Some(rest) = normalized.strip_prefix("URN:OGC:DEF:CRS:EPSG:") {
            // The version field is usually empty: "EPSG::4326"
            rest.rsplit(':').next().unwrap_or(rest)
        } else if normalized.contains("/DEF/CRS/EPSG/") {
            normalized.rsplit('/').next().unwrap_or("")
        } else {
            normalized.as_str()
        };

        let epsg: u16 = code
            .parse()
            .map_err(|_| ProjectionError::UnsupportedCrs(s.to_string()))?;
        Self::from_epsg(epsg)
    }

    /// The EPSG code.
    pub fn epsg(&self) -> u16 {
        self.epsg
    }

    /// PROJ.4 definition string for this CRS.
    pub fn proj_string(&self) -> Result<&'static str> {
        crs_definitions::from_code(self.epsg)
            .map(|def| def.proj4)
            .ok_or(ProjectionError::UnknownEpsg(self.epsg))
    }

    /// Check if this is a geographic (lon/lat) CRS.
    pub fn is_geographic(&self) -> bool {
        match self.proj_string() {
            Ok(def) => def.contains("+proj=longlat"),
            Err(_) => (4000..5000).contains(&self.epsg),
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl FromStr for Crs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Crs {
    type Error = ProjectionError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}
