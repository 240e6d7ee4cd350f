//! Common test fixtures: query geometries and STAC items.

use serde_json::{json, Value};

/// GeoJSON query geometries in WGS84.
pub mod geojson {
    use super::*;

    /// A FeatureCollection of points given as `(lon, lat)`.
    pub fn points(coords: &[(f64, f64)]) -> Value {
        let features: Vec<Value> = coords
            .iter()
            .map(|&(lon, lat)| {
                json!({
                    "type": "Feature",
                    "properties": {},
                    "geometry": {"type": "Point", "coordinates": [lon, lat]}
                })
            })
            .collect();
        json!({"type": "FeatureCollection", "features": features})
    }

    /// A single axis-aligned polygon feature.
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Value {
        json!({
            "type": "Feature",
            "properties": {"name": "rectangle"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y], [min_x, min_y]
                ]]
            }
        })
    }

    /// A single line feature.
    pub fn line(coords: &[(f64, f64)]) -> Value {
        let coordinates: Vec<[f64; 2]> = coords.iter().map(|&(x, y)| [x, y]).collect();
        json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "LineString", "coordinates": coordinates}
        })
    }

    /// Wrap features in a FeatureCollection.
    pub fn collection(features: Vec<Value>) -> Value {
        json!({"type": "FeatureCollection", "features": features})
    }

    /// A point and a polygon together, which extraction rejects.
    pub fn mixed() -> Value {
        let mut point = points(&[(0.5, 0.5)]);
        let point = point["features"][0].take();
        collection(vec![point, rectangle(0.0, 0.0, 1.0, 1.0)])
    }
}

/// STAC items as a catalogue would serve them.
pub mod stac {
    use super::*;

    /// An item with one asset `data` pointing at `href`.
    pub fn item(id: &str, datetime: &str, href: &str) -> Value {
        json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": id,
            "geometry": null,
            "properties": {"datetime": datetime},
            "assets": {
                "data": {"href": href, "type": "image/tiff; application=geotiff"}
            },
            "links": []
        })
    }

    /// An item with a unit in its properties.
    pub fn item_with_unit(id: &str, datetime: &str, href: &str, unit: &str) -> Value {
        let mut item = item(id, datetime, href);
        item["properties"]["unit"] = json!(unit);
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_collection() {
        let fc = geojson::points(&[(1.0, 2.0), (3.0, 4.0)]);
        assert_eq!(fc["features"].as_array().unwrap().len(), 2);
        assert_eq!(fc["features"][1]["geometry"]["coordinates"], json!([3.0, 4.0]));
    }

    #[test]
    fn test_mixed_collection() {
        let fc = geojson::mixed();
        assert_eq!(fc["features"][0]["geometry"]["type"], "Point");
        assert_eq!(fc["features"][1]["geometry"]["type"], "Polygon");
    }

    #[test]
    fn test_stac_item_unit() {
        let item = stac::item_with_unit("a", "2024-01-01T00:00:00Z", "a.tif", "K");
        assert_eq!(item["properties"]["unit"], "K");
        assert_eq!(item["assets"]["data"]["href"], "a.tif");
    }
}
