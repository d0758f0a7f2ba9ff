//! Places search adapter.
//!
//! Stateless wrapper over the Places "search nearby" HTTP endpoint. One
//! request per query, no retries; the HTTP client's timeout bounds the
//! round-trip. The decoded JSON body is returned as-is — the caller decides
//! how to frame it for the wire.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

/// Client for the Places endpoint. Cheap to clone behind an `Arc`; one
/// instance per daemon.
#[derive(Debug)]
pub struct PlacesClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl PlacesClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(PlacesClient {
            http,
            url: url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Search for places within `radius_m` metres of a point, asking the
    /// endpoint for at most `max_results` entries.
    ///
    /// Returns the decoded JSON body on HTTP success; any transport error or
    /// non-success status is an error.
    pub async fn search_nearby(
        &self,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
        max_results: i64,
    ) -> Result<Value> {
        let body = json!({
            "maxResultCount": max_results,
            "locationRestriction": {
                "circle": {
                    "center": { "latitude": latitude, "longitude": longitude },
                    "radius": radius_m,
                }
            }
        });

        let response = self
            .http
            .post(&self.url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", "*")
            .json(&body)
            .send()
            .await
            .context("sending places request")?;

        let status = response.status();
        if !status.is_success() {
            bail!("places endpoint returned {status}");
        }

        response.json().await.context("decoding places response")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response shaping
// ────────────────────────────────────────────────────────────────────────────

/// Truncate the top-level `results` array to at most `count` entries.
///
/// Applied even when the endpoint already honoured `maxResultCount`, so the
/// reply never exceeds what the client asked for. A body without a `results`
/// array gets an empty one, keeping the reply shape uniform.
pub fn truncate_results(body: &mut Value, count: i64) {
    let count = count.max(0) as usize;
    if let Some(results) = body.get_mut("results").and_then(|v| v.as_array_mut()) {
        results.truncate(count);
        return;
    }
    if let Some(map) = body.as_object_mut() {
        map.insert("results".to_string(), Value::Array(Vec::new()));
    }
}

/// Serialise a JSON body with 4-space indentation, as the wire format
/// requires. No trailing newline.
pub fn to_pretty_json(body: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    body.serialize(&mut serializer)
        .expect("serialising a Value is infallible");
    String::from_utf8(buf).expect("serde_json output is UTF-8")
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
