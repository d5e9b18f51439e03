//! ArcGIS FeatureServer parcel source

use async_trait::async_trait;
use everylot_domain::{Parcel, ParcelSource, ParcelSourceError};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Albany County "TaxParcelsWithRPS" layer
pub const ALBANY_FEATURE_SERVER: &str = "https://services6.arcgis.com/JJzptGyn7EDStgyp/ArcGIS/rest/services/TaxParcelsWithRPS/FeatureServer/0";

const OUT_FIELDS: &str = "Parcel_TaxID,Street_Address,City_State_Zip,Parcel_Muni";

/// Pages parcels of one municipality out of a FeatureServer layer
pub struct ArcGisParcelSource {
    client: Client,
    query_url: String,
    municipality_field: String,
    city: String,
}

impl ArcGisParcelSource {
    pub fn new(
        feature_server_url: &str,
        municipality_field: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            query_url: format!("{}/query", feature_server_url.trim_end_matches('/')),
            municipality_field: municipality_field.into(),
            city: city.into(),
        }
    }

    fn where_clause(&self) -> String {
        format!(
            "{} = '{}'",
            self.municipality_field,
            self.city.replace('\'', "''")
        )
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    features: Vec<Feature>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    attributes: Attributes,
    geometry: Option<Geometry>,
}

#[derive(Deserialize, Default)]
struct Attributes {
    #[serde(rename = "Parcel_TaxID")]
    parcel_tax_id: Option<String>,
    #[serde(rename = "Street_Address")]
    street_address: Option<String>,
    #[serde(rename = "City_State_Zip")]
    city_state_zip: Option<String>,
}

#[derive(Deserialize)]
struct Geometry {
    x: Option<f64>,
    y: Option<f64>,
    rings: Option<Vec<Vec<Vec<f64>>>>,
}

/// `(lat, lon)` of a point, or the vertex mean of a polygon's first ring
fn centroid(geometry: Option<&Geometry>) -> (f64, f64) {
    let Some(geometry) = geometry else {
        return (0.0, 0.0);
    };

    if let Some(ring) = geometry.rings.as_ref().and_then(|rings| rings.first()) {
        let points: Vec<&Vec<f64>> = ring.iter().filter(|pt| pt.len() >= 2).collect();
        if points.is_empty() {
            return (0.0, 0.0);
        }
        let n = points.len() as f64;
        let lat = points.iter().map(|pt| pt[1]).sum::<f64>() / n;
        let lon = points.iter().map(|pt| pt[0]).sum::<f64>() / n;
        return (lat, lon);
    }

    match (geometry.y, geometry.x) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => (0.0, 0.0),
    }
}

impl From<Feature> for Parcel {
    fn from(feature: Feature) -> Self {
        let (lat, lon) = centroid(feature.geometry.as_ref());
        let attributes = feature.attributes;

        Parcel {
            id: attributes.parcel_tax_id,
            street: attributes.street_address.unwrap_or_default(),
            city_state_zip: attributes.city_state_zip.unwrap_or_default(),
            lat,
            lon,
        }
    }
}

#[async_trait]
impl ParcelSource for ArcGisParcelSource {
    async fn fetch_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Parcel>, ParcelSourceError> {
        let where_clause = self.where_clause();
        let offset = offset.to_string();
        let limit = limit.to_string();
        let params = [
            ("where", where_clause.as_str()),
            ("outFields", OUT_FIELDS),
            ("returnGeometry", "true"),
            ("outSR", "4326"),
            ("resultOffset", offset.as_str()),
            ("resultRecordCount", limit.as_str()),
            ("f", "json"),
        ];

        let response = self
            .client
            .get(&self.query_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| ParcelSourceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ParcelSourceError::Api(format!(
                "query failed ({}): {}",
                status, body
            )));
        }

        let data: QueryResponse = response
            .json()
            .await
            .map_err(|e| ParcelSourceError::InvalidResponse(e.to_string()))?;

        if let Some(error) = data.error {
            return Err(ParcelSourceError::Api(match error.code {
                Some(code) => format!("{} (code {})", error.message, code),
                None => error.message,
            }));
        }

        Ok(data.features.into_iter().map(Parcel::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_centroid_of_point_and_ring() {
        let point = Geometry {
            x: Some(-73.75),
            y: Some(42.65),
            rings: None,
        };
        assert_eq!(centroid(Some(&point)), (42.65, -73.75));

        let ring = Geometry {
            x: None,
            y: None,
            rings: Some(vec![vec![
                vec![-73.0, 42.0],
                vec![-74.0, 42.0],
                vec![-74.0, 43.0],
                vec![-73.0, 43.0],
            ]]),
        };
        assert_eq!(centroid(Some(&ring)), (42.5, -73.5));

        assert_eq!(centroid(None), (0.0, 0.0));
    }

    #[test]
    fn test_where_clause_escapes_quotes() {
        let source = ArcGisParcelSource::new("http://localhost", "Parcel_Muni", "Town of O'Brien");
        assert_eq!(source.where_clause(), "Parcel_Muni = 'Town of O''Brien'");
    }

    #[tokio::test]
    async fn test_fetch_page_maps_features() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/layer/0/query"))
            .and(query_param("where", "Parcel_Muni = 'City of Albany'"))
            .and(query_param("outSR", "4326"))
            .and(query_param("returnGeometry", "true"))
            .and(query_param("resultOffset", "1000"))
            .and(query_param("resultRecordCount", "500"))
            .and(query_param("f", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "features": [
                    {
                        "attributes": {
                            "Parcel_TaxID": "87.39-1-33",
                            "Street_Address": "812 Old S Pearl St ",
                            "City_State_Zip": "Albany, NY  12202",
                            "Parcel_Muni": "City of Albany"
                        },
                        "geometry": { "rings": [[[-73.0, 42.0], [-74.0, 43.0]]] }
                    },
                    {
                        "attributes": { "Parcel_TaxID": null, "Street_Address": null }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let source = ArcGisParcelSource::new(
            &format!("{}/layer/0/", server.uri()),
            "Parcel_Muni",
            "City of Albany",
        );
        let parcels = source.fetch_page(1000, 500).await.unwrap();

        assert_eq!(parcels.len(), 2);
        assert_eq!(parcels[0].id.as_deref(), Some("87.39-1-33"));
        assert_eq!(parcels[0].street, "812 Old S Pearl St ");
        assert_eq!(parcels[0].city_state_zip, "Albany, NY  12202");
        assert_eq!((parcels[0].lat, parcels[0].lon), (42.5, -73.5));
        assert_eq!(parcels[1].id, None);
        assert_eq!((parcels[1].lat, parcels[1].lon), (0.0, 0.0));
    }

    #[tokio::test]
    async fn test_error_body_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": { "code": 400, "message": "Invalid query parameters" }
            })))
            .mount(&server)
            .await;

        let source = ArcGisParcelSource::new(&server.uri(), "Parcel_Muni", "City of Albany");
        let result = source.fetch_page(0, 10).await;

        assert!(matches!(
            result,
            Err(ParcelSourceError::Api(msg)) if msg.contains("Invalid query parameters")
        ));
    }

    #[tokio::test]
    async fn test_http_error_is_api_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = ArcGisParcelSource::new(&server.uri(), "Parcel_Muni", "City of Albany");
        let result = source.fetch_page(0, 10).await;

        assert!(matches!(result, Err(ParcelSourceError::Api(_))));
    }
}
