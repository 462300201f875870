use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::{
    courses::models::AssignmentMap,
    error::{Error, Result},
    store::models::RemoteConfig,
};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Client of the shared course map endpoint, one attempt per call
pub struct RemoteClient {
    http: reqwest::Client,
}

impl RemoteClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(TIMEOUT)
            .build()?;

        Ok(Self { http })
    }

    /// Download the shared map, `None` when sync is disabled or nothing usable came back
    pub async fn fetch(&self, remote: &RemoteConfig) -> Result<Option<Value>> {
        if !remote.is_enabled() {
            return Ok(None);
        }

        let mut request = self
            .http
            .get(&remote.url)
            .header(ACCEPT, "application/json")
            .header(reqwest::header::CACHE_CONTROL, "no-store");
        if !remote.token.is_empty() {
            // Sent as is, the scheme is part of the saved token
            request = request.header(AUTHORIZATION, &remote.token);
        }

        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::RemoteFetch {
                status: status.as_u16(),
            });
        }

        let payload: Value = res.json().await?;
        tracing::debug!(url = %remote.url, "fetched remote course map");

        Ok(extract_course_payload(payload))
    }

    /// Replace the shared map with ours, `None` when sync is disabled
    pub async fn push(&self, courses: &AssignmentMap, remote: &RemoteConfig) -> Result<Option<Value>> {
        if !remote.is_enabled() {
            return Ok(None);
        }

        let body = json!({
            "updatedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "courses": courses,
        });

        let mut request = self
            .http
            .put(&remote.url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string());
        if !remote.token.is_empty() {
            request = request.header(AUTHORIZATION, &remote.token);
        }

        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(Error::RemoteSave {
                status: status.as_u16(),
            });
        }

        tracing::info!(url = %remote.url, courses = courses.len(), "pushed course map");

        // The ack is informative only
        let ack = res.json().await.unwrap_or_else(|_| json!({}));
        Ok(Some(ack))
    }
}

/// Responses come either wrapped as `{courses: {...}}` or as the raw map
pub fn extract_course_payload(payload: Value) -> Option<Value> {
    match payload {
        Value::Object(mut body) => match body.remove("courses") {
            Some(courses @ Value::Object(_)) => Some(courses),
            Some(other) => {
                body.insert("courses".into(), other);
                Some(Value::Object(body))
            }
            None => Some(Value::Object(body)),
        },
        _ => None,
    }
}
