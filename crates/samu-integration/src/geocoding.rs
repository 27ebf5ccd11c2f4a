//! 地址解析模块
//!
//! 通过 Nominatim 风格的 HTTP 接口把地址文本解析为坐标。
//! 调用方另有总超时，这里的请求超时只是连接层面的上限。

use async_trait::async_trait;
use samu_core::collaborators::Geocoder;
use samu_core::{Coordinates, Result, SamuError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// 地址解析服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpGeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl Default for HttpGeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: "SAMU-Dispatch/1.0".to_string(),
            request_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

/// HTTP 地址解析器
#[derive(Debug, Clone)]
pub struct HttpGeocoder {
    client: reqwest::Client,
    search_url: String,
}

impl HttpGeocoder {
    pub fn new(config: &HttpGeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SamuError::Config(format!("geocoding client: {}", e)))?;

        Ok(Self {
            client,
            search_url: format!("{}/search", config.base_url.trim_end_matches('/')),
        })
    }
}

/// 解析搜索结果，取第一条
pub fn parse_search_response(body: &str) -> Result<Option<Coordinates>> {
    let hits: Vec<SearchHit> = serde_json::from_str(body)?;
    let Some(hit) = hits.into_iter().next() else {
        return Ok(None);
    };

    let latitude = hit
        .lat
        .parse::<f64>()
        .map_err(|e| SamuError::Internal(format!("invalid latitude '{}': {}", hit.lat, e)))?;
    let longitude = hit
        .lon
        .parse::<f64>()
        .map_err(|e| SamuError::Internal(format!("invalid longitude '{}': {}", hit.lon, e)))?;

    let coordinates = Coordinates::new(latitude, longitude);
    coordinates.validate()?;
    Ok(Some(coordinates))
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn resolve(&self, address: &str) -> Result<Option<Coordinates>> {
        debug!("Geocoding '{}'", address);

        let response = self
            .client
            .get(&self.search_url)
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SamuError::UpstreamTimeout(format!("geocoding request: {}", e))
                } else {
                    SamuError::Internal(format!("geocoding request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(SamuError::Internal(format!(
                "geocoding service answered {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SamuError::Internal(format!("geocoding response: {}", e)))?;
        parse_search_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_first_hit() {
        let body = r#"[
            {"lat": "-23.5614", "lon": "-46.6559", "display_name": "Avenida Paulista"},
            {"lat": "-22.9068", "lon": "-43.1729", "display_name": "Rio de Janeiro"}
        ]"#;

        let coordinates = parse_search_response(body).unwrap().unwrap();
        assert_eq!(coordinates, Coordinates::new(-23.5614, -46.6559));
    }

    #[test]
    fn test_parse_empty_result() {
        assert_eq!(parse_search_response("[]").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_search_response(r#"[{"lat": "north", "lon": "0"}]"#).is_err());
        assert!(parse_search_response(r#"[{"lat": "95.0", "lon": "0"}]"#).is_err());
        assert!(matches!(
            parse_search_response("<html>"),
            Err(SamuError::Serialization(_))
        ));
    }

    #[test]
    fn test_search_url() {
        let geocoder = HttpGeocoder::new(&HttpGeocoderConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(geocoder.search_url, "http://localhost:8080/search");
    }
}
