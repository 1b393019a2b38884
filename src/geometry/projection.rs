//! CRS identifiers and point reprojection.
//!
//! Reprojection is delegated to `proj4rs` with definitions looked up in the
//! `crs-definitions` EPSG database; nothing here implements projection math.

use std::fmt;
use std::str::FromStr;

use crate::error::ProjectionError;
use crate::geometry::Point;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs {
    epsg: i32,
}

impl Crs {
    /// WGS84 longitude/latitude.
    pub const WGS84: Crs = Crs { epsg: 4326 };

    #[must_use]
    pub const fn epsg(code: i32) -> Self {
        Self { epsg: code }
    }

    #[must_use]
    pub fn code(&self) -> i32 {
        self.epsg
    }

    /// Check if this CRS is geographic (lon/lat in degrees)
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        is_geographic_crs(self.epsg)
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Accepts `EPSG:4326` (any case, surrounding whitespace ignored) or a bare
/// code such as `4326`.
impl FromStr for Crs {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.trim().eq_ignore_ascii_case("epsg") => code.trim(),
            Some(_) => return Err(ProjectionError::InvalidCrs(s.to_string())),
            None => trimmed,
        };

        code.parse::<i32>()
            .ok()
            .filter(|c| *c > 0)
            .map(Crs::epsg)
            .ok_or_else(|| ProjectionError::InvalidCrs(s.to_string()))
    }
}

/// Reproject a point between two CRSs.
///
/// A no-op when both CRSs are the same.
pub fn reproject(point: Point, from: Crs, to: Crs) -> Result<Point, ProjectionError> {
    let (x, y) = project_point(from.code(), to.code(), point.x, point.y)?;
    Ok(Point::new(x, y))
}

/// Project a point from one EPSG code to another.
#[inline]
pub fn project_point(source_epsg: i32, target_epsg: i32, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    if source_epsg == target_epsg {
        return Ok((x, y));
    }

    project_with_proj4rs(source_epsg, target_epsg, x, y)
}

/// Get PROJ4 string for an EPSG code using the crs-definitions database
#[inline]
#[must_use]
pub fn get_proj_string(epsg: i32) -> Option<&'static str> {
    u16::try_from(epsg).ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: i32) -> bool {
    if let Some(proj_str) = get_proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        (4000..5000).contains(&epsg)
    }
}

fn project_with_proj4rs(source_epsg: i32, target_epsg: i32, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    let source_str = get_proj_string(source_epsg).ok_or(ProjectionError::UnknownCrs(source_epsg))?;
    let target_str = get_proj_string(target_epsg).ok_or(ProjectionError::UnknownCrs(target_epsg))?;

    project_with_definitions((source_epsg, source_str), (target_epsg, target_str), x, y)
}

/// Transform with explicit PROJ4 definitions.
///
/// A definition `proj4rs` cannot build is [`ProjectionError::InvalidDefinition`];
/// only the transform step itself yields [`ProjectionError::TransformFailed`].
fn project_with_definitions(
    (source_epsg, source_str): (i32, &str),
    (target_epsg, target_str): (i32, &str),
    x: f64,
    y: f64,
) -> Result<(f64, f64), ProjectionError> {
    use proj4rs::proj::Proj;
    use proj4rs::transform::transform;

    let source_proj = Proj::from_proj_string(source_str)
        .map_err(|e| ProjectionError::InvalidDefinition(source_epsg, format!("{e:?}")))?;
    let target_proj = Proj::from_proj_string(target_str)
        .map_err(|e| ProjectionError::InvalidDefinition(target_epsg, format!("{e:?}")))?;

    // proj4rs works in radians for geographic coordinates
    let (x_in, y_in) = if is_geographic_crs(source_epsg) {
        (x.to_radians(), y.to_radians())
    } else {
        (x, y)
    };

    let mut point = (x_in, y_in, 0.0);
    transform(&source_proj, &target_proj, &mut point).map_err(|e| {
        ProjectionError::TransformFailed(format!("EPSG:{source_epsg} -> EPSG:{target_epsg}: {e:?}"))
    })?;

    let (out_x, out_y) = if is_geographic_crs(target_epsg) {
        (point.0.to_degrees(), point.1.to_degrees())
    } else {
        (point.0, point.1)
    };

    if !out_x.is_finite() || !out_y.is_finite() {
        return Err(ProjectionError::TransformFailed(format!(
            "EPSG:{source_epsg} -> EPSG:{target_epsg} produced a non-finite coordinate"
        )));
    }

    Ok((out_x, out_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-6;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_parse_crs() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::WGS84);
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::epsg(3857));
        assert_eq!(" EPSG : 32633 ".parse::<Crs>().unwrap(), Crs::epsg(32633));
        assert_eq!("4326".parse::<Crs>().unwrap(), Crs::WGS84);
    }

    #[test]
    fn test_parse_crs_rejects_garbage() {
        assert!(matches!("ESRI:102003".parse::<Crs>(), Err(ProjectionError::InvalidCrs(_))));
        assert!("EPSG:".parse::<Crs>().is_err());
        assert!("EPSG:-1".parse::<Crs>().is_err());
        assert!("+proj=longlat".parse::<Crs>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let crs = Crs::epsg(32614);
        assert_eq!(crs.to_string(), "EPSG:32614");
        assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
    }

    #[test]
    fn test_same_crs_is_identity() {
        let p = reproject(Point::new(10.0, 51.5), Crs::WGS84, Crs::WGS84).unwrap();
        assert_eq!(p, Point::new(10.0, 51.5));
    }

    #[test]
    fn test_4326_to_3857_origin() {
        let p = reproject(Point::new(0.0, 0.0), Crs::WGS84, Crs::epsg(3857)).unwrap();
        assert!(approx_eq(p.x, 0.0));
        assert!(approx_eq(p.y, 0.0));
    }

    #[test]
    fn test_roundtrip_4326_3857() {
        for (lon, lat) in [(-97.9, 41.95), (-122.4194, 37.7749), (139.7, 35.7)] {
            let merc = reproject(Point::new(lon, lat), Crs::WGS84, Crs::epsg(3857)).unwrap();
            let back = reproject(merc, Crs::epsg(3857), Crs::WGS84).unwrap();
            assert!(approx_eq(back.lon(), lon), "lon: {} != {}", back.lon(), lon);
            assert!(approx_eq(back.lat(), lat), "lat: {} != {}", back.lat(), lat);
        }
    }

    #[test]
    fn test_utm_zone() {
        let (x, y) = project_point(4326, 32614, -99.0, 41.95).unwrap();
        // Zone 14N central meridian is -99, so easting sits at the false easting.
        assert!((x - 500_000.0).abs() < 1.0, "UTM easting: {x}");
        assert!(y > 4_600_000.0 && y < 4_700_000.0, "UTM northing: {y}");
    }

    #[test]
    fn test_is_geographic_crs() {
        assert!(is_geographic_crs(4326));
        assert!(!is_geographic_crs(3857));
        assert!(!is_geographic_crs(32633));
        assert!(Crs::WGS84.is_geographic());
    }

    #[test]
    fn test_unusable_definition_is_not_a_transform_failure() {
        let wgs84 = get_proj_string(4326).unwrap();
        let result = project_with_definitions((4326, wgs84), (900_913, "+proj=no_such_projection"), 10.0, 50.0);
        assert!(
            matches!(result, Err(ProjectionError::InvalidDefinition(900_913, _))),
            "{result:?}"
        );

        let result = project_with_definitions((900_913, "+proj=no_such_projection"), (4326, wgs84), 10.0, 50.0);
        assert!(matches!(result, Err(ProjectionError::InvalidDefinition(900_913, _))));
    }

    #[test]
    fn test_unknown_epsg_code() {
        let result = project_point(4326, 999_999, 0.0, 0.0);
        assert_eq!(result, Err(ProjectionError::UnknownCrs(999_999)));
    }
}
