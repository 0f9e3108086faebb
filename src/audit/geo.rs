// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Best-effort IP geolocation for login records.
//!
//! Lookups never fail the caller: any transport, status or payload problem
//! is logged and yields an empty [`GeoLocation`].

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

const IP138_ENDPOINT: &str = "https://api.ip138.com/ip/";

/// Location fields of a login record. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLocation {
    pub address: Option<String>,
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub operator: Option<String>,
    pub postal_code: Option<String>,
    pub area_code: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Resolves an IP address to a location.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: &str) -> GeoLocation;
}

/// Lookup turned off.
pub struct DisabledLocator;

#[async_trait]
impl GeoLocator for DisabledLocator {
    async fn locate(&self, _ip: &str) -> GeoLocation {
        GeoLocation::default()
    }
}

/// ip138.com lookup API.
pub struct Ip138Locator {
    http: Client,
    endpoint: Url,
    token: String,
}

impl Ip138Locator {
    pub fn new(token: impl Into<String>) -> Result<Self, GeoError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| GeoError::Client(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: Url::parse(IP138_ENDPOINT)?,
            token: token.into(),
        })
    }

    fn request_url(&self, ip: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("ip", ip)
            .append_pair("datatype", "jsonp")
            .append_pair("token", &self.token);
        url
    }

    async fn fetch(&self, ip: &str) -> Result<Value, reqwest::Error> {
        self.http
            .get(self.request_url(ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl GeoLocator for Ip138Locator {
    async fn locate(&self, ip: &str) -> GeoLocation {
        if !is_public_ip(ip) {
            return GeoLocation::default();
        }
        match self.fetch(ip).await {
            Ok(body) => parse_ip138(&body).unwrap_or_else(|| {
                tracing::warn!(ip = %ip, body = %body, "IP location lookup rejected");
                GeoLocation::default()
            }),
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "IP location lookup failed");
                GeoLocation::default()
            }
        }
    }
}

#[derive(Deserialize)]
struct Ip138Body {
    ret: String,
    #[serde(default)]
    data: Vec<String>,
}

/// Parse an ip138 response: `{"ret": "ok", "data": [country, province,
/// city, county, operator, postal_code, area_code]}`.
pub fn parse_ip138(body: &Value) -> Option<GeoLocation> {
    let body: Ip138Body = serde_json::from_value(body.clone()).ok()?;
    if body.ret != "ok" {
        return None;
    }
    let field = |i: usize| body.data.get(i).filter(|s| !s.is_empty()).cloned();

    let region: String = body.data.iter().take(4).map(String::as_str).collect();
    let operator = body.data.get(4).map(String::as_str).unwrap_or_default();
    let address = format!("{region} {operator}").trim().to_string();

    Some(GeoLocation {
        address: (!address.is_empty()).then_some(address),
        country: field(0),
        province: field(1),
        city: field(2),
        county: field(3),
        operator: field(4),
        postal_code: field(5),
        area_code: field(6),
    })
}

/// Loopback, private and link-local addresses have no public location.
fn is_public_ip(ip: &str) -> bool {
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => !(v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()),
        Ok(IpAddr::V6(v6)) => !(v6.is_loopback() || v6.is_unspecified()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_successful_response() {
        let body = json!({
            "ret": "ok",
            "ip": "1.2.3.4",
            "data": ["中国", "广东", "深圳", "南山", "电信", "518000", "0755"]
        });
        let location = parse_ip138(&body).unwrap();
        assert_eq!(location.address.as_deref(), Some("中国广东深圳南山 电信"));
        assert_eq!(location.city.as_deref(), Some("深圳"));
        assert_eq!(location.postal_code.as_deref(), Some("518000"));
        assert_eq!(location.area_code.as_deref(), Some("0755"));
    }

    #[test]
    fn empty_fields_become_none() {
        let body = json!({"ret": "ok", "data": ["中国", "", "", "", "", "", ""]});
        let location = parse_ip138(&body).unwrap();
        assert_eq!(location.country.as_deref(), Some("中国"));
        assert_eq!(location.province, None);
        assert_eq!(location.address.as_deref(), Some("中国"));
    }

    #[test]
    fn rejected_or_garbage_responses_yield_nothing() {
        assert!(parse_ip138(&json!({"ret": "err", "msg": "token invalid"})).is_none());
        assert!(parse_ip138(&json!("not an object")).is_none());
    }

    #[test]
    fn request_url_carries_query() {
        let locator = Ip138Locator::new("tok").unwrap();
        let url = locator.request_url("1.2.3.4");
        assert_eq!(url.as_str(), "https://api.ip138.com/ip/?ip=1.2.3.4&datatype=jsonp&token=tok");
    }

    #[tokio::test]
    async fn private_addresses_skip_lookup() {
        let locator = Ip138Locator::new("tok").unwrap();
        assert_eq!(locator.locate("127.0.0.1").await, GeoLocation::default());
        assert_eq!(locator.locate("192.168.1.10").await, GeoLocation::default());
        assert_eq!(locator.locate("not-an-ip").await, GeoLocation::default());
    }

    #[tokio::test]
    async fn disabled_locator_is_empty() {
        assert_eq!(DisabledLocator.locate("1.2.3.4").await, GeoLocation::default());
    }
}
