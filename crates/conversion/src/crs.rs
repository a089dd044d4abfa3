use geo::{Coord, Geometry, MapCoords};
use std::f64::consts::FRAC_PI_4;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Coordinate reference systems the pipeline can normalize to WGS84.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    Wgs84,
    WebMercator,
    /// Recognized as a CRS but not reprojectable; coordinates pass through unchanged.
    Unknown(String),
}

impl Crs {
    #[must_use]
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 900_913 | 102_100 => Crs::WebMercator,
            other => Crs::Unknown(format!("EPSG:{other}")),
        }
    }

    /// Parse names such as `EPSG:3857`, `urn:ogc:def:crs:EPSG::4326` or
    /// `urn:ogc:def:crs:OGC:1.3:CRS84`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let trimmed = name.trim();
        if trimmed.ends_with("CRS84") {
            return Crs::Wgs84;
        }
        let digits = trimmed
            .rsplit(|c: char| c == ':' || c == '/')
            .next()
            .and_then(|tail| tail.parse::<u32>().ok());
        match digits {
            Some(code) if trimmed.to_ascii_uppercase().contains("EPSG") => Crs::from_epsg(code),
            _ => Crs::Unknown(trimmed.to_string()),
        }
    }

    /// Classify the WKT found in a shapefile `.prj` part.
    #[must_use]
    pub fn from_prj(wkt: &str) -> Self {
        let upper = wkt.to_ascii_uppercase();
        if upper.contains("PSEUDO-MERCATOR")
            || upper.contains("PSEUDO_MERCATOR")
            || upper.contains("MERCATOR_AUXILIARY_SPHERE")
            || upper.contains("\"3857\"")
        {
            Crs::WebMercator
        } else if upper.starts_with("GEOGCS") && upper.contains("WGS") {
            Crs::Wgs84
        } else {
            let name = upper
                .split('"')
                .nth(1)
                .unwrap_or("unnamed projection")
                .to_string();
            Crs::Unknown(name)
        }
    }

    /// Canonical name stored in raster headers; `None` for WGS84.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        match self {
            Crs::Wgs84 => None,
            Crs::WebMercator => Some("EPSG:3857".to_string()),
            Crs::Unknown(name) => Some(name.clone()),
        }
    }

    #[must_use]
    pub fn is_wgs84(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    #[must_use]
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::WebMercator => (
                (x / EARTH_RADIUS_M).to_degrees(),
                (2.0 * (y / EARTH_RADIUS_M).exp().atan() - 2.0 * FRAC_PI_4).to_degrees(),
            ),
            Crs::Wgs84 | Crs::Unknown(_) => (x, y),
        }
    }

    #[must_use]
    pub fn from_wgs84(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Crs::WebMercator => (
                EARTH_RADIUS_M * lon.to_radians(),
                EARTH_RADIUS_M * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln(),
            ),
            Crs::Wgs84 | Crs::Unknown(_) => (lon, lat),
        }
    }

    #[must_use]
    pub fn geometry_to_wgs84(&self, geometry: &Geometry<f64>) -> Geometry<f64> {
        if !matches!(self, Crs::WebMercator) {
            return geometry.clone();
        }
        geometry.map_coords(|c| {
            let (x, y) = self.to_wgs84(c.x, c.y);
            Coord { x, y }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn names_resolve_to_known_systems() {
        assert_eq!(Crs::from_name("EPSG:4326"), Crs::Wgs84);
        assert_eq!(Crs::from_name("urn:ogc:def:crs:EPSG::3857"), Crs::WebMercator);
        assert_eq!(Crs::from_name("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::Wgs84);
        assert_eq!(
            Crs::from_name("EPSG:32618"),
            Crs::Unknown("EPSG:32618".to_string())
        );
    }

    #[test]
    fn prj_text_is_classified() {
        let wgs = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137,298.257223563]]]"#;
        assert_eq!(Crs::from_prj(wgs), Crs::Wgs84);
        let mercator = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984"]]"#;
        assert_eq!(Crs::from_prj(mercator), Crs::WebMercator);
        let utm = r#"PROJCS["NAD83 / UTM zone 18N",GEOGCS["NAD83"]]"#;
        assert_eq!(Crs::from_prj(utm), Crs::Unknown("NAD83 / UTM ZONE 18N".to_string()));
    }

    #[test]
    fn web_mercator_inverts() {
        let crs = Crs::WebMercator;
        let (x, y) = crs.from_wgs84(-71.06, 42.36);
        let (lon, lat) = crs.to_wgs84(x, y);
        assert!((lon + 71.06).abs() < 1e-9);
        assert!((lat - 42.36).abs() < 1e-9);
        assert!((crs.to_wgs84(0.0, 0.0).1).abs() < 1e-12);
    }
}
