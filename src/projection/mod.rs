//! Projection catalog: family kinds, admissible parameter intervals, and the
//! per-candidate projection instance.
//!
//! The catalog is a closed set of spherical projection families. Each family
//! fixes its forward equations (see [`forward`]), the admissible intervals
//! for the central parallel and the cartographic pole, the transformed-
//! longitude convention, and the data-driven heuristic interval maps used by
//! the aspect sampler.
//!
//! # Coordinate conventions
//!
//! - The **cartographic pole** `(latp, lonp)` is the geographic position of
//!   the projection's north pole; `(90, 0)` is the normal aspect.
//! - `lat0` is the central (undistorted) parallel, `lon0` the central
//!   meridian, both in the aspect frame.
//! - `c` is the family constant; conic families read it as a cone-constant
//!   override (0 = derive from `lat0`).

pub mod forward;
pub mod tissot;
pub mod transform;

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::geo::{Interval, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Orientation of the projection's coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aspect {
    /// Polar axis coincides with the Earth axis: latp = 90, lonp = 0.
    Normal,
    /// Polar axis lies on the equator: latp = 0.
    Transverse,
    /// General pole position.
    Oblique,
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Normal => write!(f, "norm"),
            Aspect::Transverse => write!(f, "trans"),
            Aspect::Oblique => write!(f, "obli"),
        }
    }
}

/// Sign convention for the transformed longitude.
///
/// Some historical projections draw longitudes growing westward in the
/// rotated frame; their families declare [`LonDirection::Reversed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LonDirection {
    #[default]
    Normal,
    Reversed,
}

/// Broad construction category of a family, used for the heuristic interval
/// maps and the report's category column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyCategory {
    Azimuthal,
    Cylindrical,
    Conic,
    Pseudocylindrical,
    Pseudoconic,
}

impl fmt::Display for FamilyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FamilyCategory::Azimuthal => write!(f, "azim"),
            FamilyCategory::Cylindrical => write!(f, "cyli"),
            FamilyCategory::Conic => write!(f, "coni"),
            FamilyCategory::Pseudocylindrical => write!(f, "pscy"),
            FamilyCategory::Pseudoconic => write!(f, "psco"),
        }
    }
}

/// The closed set of projection families the analyzer can hypothesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectionKind {
    /// Equirectangular (equidistant cylindrical).
    Equirectangular,
    /// Mercator.
    Mercator,
    /// Sinusoidal (Sanson–Flamsteed).
    Sinusoidal,
    /// Stereographic, polar form in the aspect frame.
    Stereographic,
    /// Orthographic.
    Orthographic,
    /// Gnomonic.
    Gnomonic,
    /// Lambert azimuthal equal-area.
    LambertAzimuthal,
    /// Azimuthal equidistant (Postel).
    AzimuthalEquidistant,
    /// Lambert conformal conic, one standard parallel.
    LambertConic,
    /// Equidistant conic with one standard parallel.
    EquidistantConic,
    /// Albers equal-area conic, one standard parallel.
    AlbersConic,
    /// Bonne.
    Bonne,
    /// Werner (Bonne with the apex at the pole).
    Werner,
}

impl ProjectionKind {
    /// Every family in the catalog, in report order.
    pub const ALL: [ProjectionKind; 13] = [
        ProjectionKind::Equirectangular,
        ProjectionKind::Mercator,
        ProjectionKind::Sinusoidal,
        ProjectionKind::Stereographic,
        ProjectionKind::Orthographic,
        ProjectionKind::Gnomonic,
        ProjectionKind::LambertAzimuthal,
        ProjectionKind::AzimuthalEquidistant,
        ProjectionKind::LambertConic,
        ProjectionKind::EquidistantConic,
        ProjectionKind::AlbersConic,
        ProjectionKind::Bonne,
        ProjectionKind::Werner,
    ];

    /// Short catalog name (used in reports and `FromStr`).
    pub fn name(&self) -> &'static str {
        match self {
            ProjectionKind::Equirectangular => "eqc",
            ProjectionKind::Mercator => "merc",
            ProjectionKind::Sinusoidal => "sinu",
            ProjectionKind::Stereographic => "stere",
            ProjectionKind::Orthographic => "ortho",
            ProjectionKind::Gnomonic => "gnom",
            ProjectionKind::LambertAzimuthal => "laea",
            ProjectionKind::AzimuthalEquidistant => "aeqd",
            ProjectionKind::LambertConic => "lcc",
            ProjectionKind::EquidistantConic => "eqdc",
            ProjectionKind::AlbersConic => "aea",
            ProjectionKind::Bonne => "bonne",
            ProjectionKind::Werner => "werner",
        }
    }

    pub fn category(&self) -> FamilyCategory {
        match self {
            ProjectionKind::Equirectangular | ProjectionKind::Mercator => {
                FamilyCategory::Cylindrical
            }
            ProjectionKind::Sinusoidal => FamilyCategory::Pseudocylindrical,
            ProjectionKind::Stereographic
            | ProjectionKind::Orthographic
            | ProjectionKind::Gnomonic
            | ProjectionKind::LambertAzimuthal
            | ProjectionKind::AzimuthalEquidistant => FamilyCategory::Azimuthal,
            ProjectionKind::LambertConic
            | ProjectionKind::EquidistantConic
            | ProjectionKind::AlbersConic => FamilyCategory::Conic,
            ProjectionKind::Bonne | ProjectionKind::Werner => FamilyCategory::Pseudoconic,
        }
    }

    /// Admissible central-parallel interval.
    ///
    /// Conic and pseudoconic families exclude the equator where their cone
    /// constant degenerates; cylindric and azimuthal families keep the pole
    /// out of the undistorted-parallel range where the formulas blow up.
    pub fn lat0_interval(&self) -> Interval {
        match self {
            ProjectionKind::Equirectangular | ProjectionKind::Mercator => {
                Interval::new(0.0, 80.0)
            }
            ProjectionKind::Sinusoidal => Interval::new(0.0, 0.0),
            ProjectionKind::Stereographic
            | ProjectionKind::Orthographic
            | ProjectionKind::Gnomonic
            | ProjectionKind::LambertAzimuthal
            | ProjectionKind::AzimuthalEquidistant => Interval::new(0.0, 0.0),
            ProjectionKind::LambertConic => Interval::new(10.0, 80.0),
            ProjectionKind::EquidistantConic | ProjectionKind::AlbersConic => {
                Interval::new(10.0, 80.0)
            }
            ProjectionKind::Bonne => Interval::new(10.0, 80.0),
            ProjectionKind::Werner => Interval::new(90.0, 90.0),
        }
    }

    /// Admissible cartographic-pole latitude interval for the oblique aspect.
    pub fn latp_interval(&self) -> Interval {
        Interval::new(MIN_LAT, MAX_LAT)
    }

    /// Admissible cartographic-pole longitude interval.
    pub fn lonp_interval(&self) -> Interval {
        Interval::new(MIN_LON, MAX_LON)
    }

    /// Transformed-longitude convention of the family.
    pub fn lon_direction(&self) -> LonDirection {
        match self {
            // The pseudoconic pair is drawn with westward-growing longitudes
            // in the historical sources the catalog follows.
            ProjectionKind::Bonne | ProjectionKind::Werner => LonDirection::Reversed,
            _ => LonDirection::Normal,
        }
    }

    /// Default family constant. Conic families read `c` as a cone-constant
    /// override; 0 means "derive from lat0".
    pub fn default_c(&self) -> f64 {
        0.0
    }

    /// Whether the family is meaningful in the given aspect.
    ///
    /// Werner pins its apex to the rotated pole; a transverse pole only
    /// reproduces an oblique-aspect member of the same family.
    pub fn supports_aspect(&self, aspect: Aspect) -> bool {
        !matches!((self, aspect), (ProjectionKind::Werner, Aspect::Transverse))
    }

    /// Heuristic cartographic-pole latitude band for a map covering the
    /// given latitude extent (degrees).
    ///
    /// Azimuthal families expect the pole near the area centre; conic
    /// families near the complement of the central latitude; cylindric
    /// families near the equator of the aspect frame.
    pub fn latp_interval_for(&self, lat_extent: Interval) -> Interval {
        let mid = lat_extent.mid();
        let band = match self.category() {
            FamilyCategory::Azimuthal => Interval::new(mid - 30.0, mid + 30.0),
            FamilyCategory::Conic | FamilyCategory::Pseudoconic => {
                Interval::new(90.0 - mid - 30.0, 90.0 - mid + 30.0)
            }
            FamilyCategory::Cylindrical | FamilyCategory::Pseudocylindrical => {
                Interval::new(-30.0, 30.0)
            }
        };
        Interval::new(
            round_down_10(band.min).max(MIN_LAT),
            round_up_10(band.max).min(MAX_LAT),
        )
    }

    /// Heuristic cartographic-pole longitude band for a map covering the
    /// given longitude extent (degrees). The band is centred on the
    /// antimeridian of the area centre, where the cartographic pole of an
    /// oblique projection of that area tends to sit.
    pub fn lonp_interval_for(&self, lon_extent: Interval) -> Interval {
        let mid = lon_extent.mid();
        let anti = crate::geo::wrap_lon(mid + 180.0);
        let half = (lon_extent.span() / 2.0 + 40.0).min(180.0);
        Interval::new(round_down_10(anti - half), round_up_10(anti + half))
    }
}

fn round_down_10(v: f64) -> f64 {
    (v / 10.0).floor() * 10.0
}

fn round_up_10(v: f64) -> f64 {
    (v / 10.0).ceil() * 10.0
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ProjectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectionKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::Parse(format!("unknown projection family '{s}'")))
    }
}

/// One concrete projection hypothesis: a family plus its free parameters.
///
/// Instances are cheap to copy; the residual functor builds a transient one
/// per evaluation, so no shared projection state is ever mutated during
/// optimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub kind: ProjectionKind,
    /// Sphere radius in the map's paper units.
    pub r: f64,
    /// Cartographic pole latitude, degrees.
    pub latp: f64,
    /// Cartographic pole longitude, degrees.
    pub lonp: f64,
    /// Central parallel, degrees.
    pub lat0: f64,
    /// Central meridian, degrees.
    pub lon0: f64,
    /// Family constant.
    pub c: f64,
    /// Planar offsets of the projection origin.
    pub dx: f64,
    pub dy: f64,
}

impl Projection {
    /// A normal-aspect instance at the family defaults.
    pub fn normal(kind: ProjectionKind, r: f64) -> Self {
        Self {
            kind,
            r,
            latp: MAX_LAT,
            lonp: 0.0,
            lat0: kind.lat0_interval().mid(),
            lon0: 0.0,
            c: kind.default_c(),
            dx: 0.0,
            dy: 0.0,
        }
    }

    /// The aspect this instance's pole position corresponds to.
    pub fn aspect(&self) -> Aspect {
        if self.latp == MAX_LAT {
            Aspect::Normal
        } else if self.latp == 0.0 {
            Aspect::Transverse
        } else {
            Aspect::Oblique
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for kind in ProjectionKind::ALL {
            let parsed: ProjectionKind = kind.name().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("nosuch".parse::<ProjectionKind>().is_err());
    }

    #[test]
    fn test_lat0_intervals_are_valid() {
        for kind in ProjectionKind::ALL {
            let iv = kind.lat0_interval();
            assert!(iv.min <= iv.max, "{}: {:?}", kind.name(), iv);
        }
    }

    #[test]
    fn test_heuristic_latp_band_conic() {
        // A mid-latitude map (35..55) drawn with a conic projection should
        // expect the cartographic pole near 90 - 45 = 45.
        let band = ProjectionKind::LambertConic.latp_interval_for(Interval::new(35.0, 55.0));
        assert!(band.contains(45.0));
        // Bands are rounded to 10 degrees.
        assert_eq!(band.min % 10.0, 0.0);
        assert_eq!(band.max % 10.0, 0.0);
    }

    #[test]
    fn test_aspect_of_instance() {
        let mut p = Projection::normal(ProjectionKind::Mercator, 1.0);
        assert_eq!(p.aspect(), Aspect::Normal);
        p.latp = 0.0;
        assert_eq!(p.aspect(), Aspect::Transverse);
        p.latp = 50.0;
        assert_eq!(p.aspect(), Aspect::Oblique);
    }
}
