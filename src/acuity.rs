use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    courses::models::TutorId,
    error::{Error, Result},
    store::{models::Credentials, KeyValueStore},
};
use models::{AppointmentType, Calendar, TimeSlot};

pub mod models;

const BASE_URL: &str = "https://acuityscheduling.com/api/v1";
const SCHEDULE_URL: &str = "https://app.acuityscheduling.com/schedule.php";
const TIMEOUT: Duration = Duration::from_secs(15);

/// Calls made to the scheduling provider
#[allow(async_fn_in_trait)]
pub trait Upstream {
    async fn calendars(&self) -> Result<Vec<Calendar>>;

    async fn appointment_types(&self) -> Result<Vec<AppointmentType>>;

    /// Start times open on `date` for one calendar
    async fn availability(
        &self,
        calendar: TutorId,
        appointment_type: u64,
        date: NaiveDate,
        time_zone: Tz,
    ) -> Result<Vec<TimeSlot>>;
}

pub struct AcuityClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

impl AcuityClient {
    pub fn new(credentials: Credentials, user_agent: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_owned(),
            credentials,
        })
    }

    /// Client for the credentials saved on this device
    pub fn from_store(store: &impl KeyValueStore, user_agent: &str) -> Result<Self> {
        Self::new(Credentials::load(store)?, user_agent)
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_owned();
        self
    }

    pub fn owner(&self) -> &str {
        &self.credentials.user_id
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let res = self
            .http
            .get(&url)
            .basic_auth(&self.credentials.user_id, Some(&self.credentials.api_key))
            .query(query)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body: Value = res.json().await.unwrap_or_default();
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .or(status.canonical_reason())
                .unwrap_or("unknown error")
                .to_owned();
            tracing::warn!(%url, status = status.as_u16(), "upstream request failed");

            return Err(Error::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(res.json().await?)
    }
}

impl Upstream for AcuityClient {
    async fn calendars(&self) -> Result<Vec<Calendar>> {
        self.get("/calendars", &[]).await
    }

    async fn appointment_types(&self) -> Result<Vec<AppointmentType>> {
        self.get("/appointment-types", &[]).await
    }

    async fn availability(
        &self,
        calendar: TutorId,
        appointment_type: u64,
        date: NaiveDate,
        time_zone: Tz,
    ) -> Result<Vec<TimeSlot>> {
        tracing::debug!(%calendar, %date, "checking availability");

        self.get(
            "/availability/times",
            &[
                ("calendarID", calendar.to_string()),
                ("appointmentTypeID", appointment_type.to_string()),
                ("date", date.format("%Y-%m-%d").to_string()),
                ("timezone", time_zone.name().to_owned()),
            ],
        )
        .await
    }
}

/// Public booking page of a calendar
pub fn schedule_url(owner: &str, calendar: TutorId) -> String {
    format!("{SCHEDULE_URL}?owner={owner}&calendarID={calendar}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        extract::Query,
        http::{header, HeaderMap, StatusCode},
        routing::get,
        Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::store::MemoryStore;

    // base64("123:abc")
    const EXPECTED_AUTH: &str = "Basic MTIzOmFiYw==";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .is_some_and(|value| value == EXPECTED_AUTH)
    }

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route(
                "/calendars",
                get(|headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({ "status_code": 401, "message": "Bad credentials" })),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!([
                            { "id": 101, "name": "Ada Lovelace", "email": "ada@example.test" },
                            { "id": 102, "name": "Alan Turing" }
                        ])),
                    )
                }),
            )
            .route(
                "/appointment-types",
                get(|| async {
                    Json(json!([
                        { "id": 7, "name": "Tutoring", "duration": 45, "category": "Sessions" },
                        { "id": 8, "name": "Intro call" }
                    ]))
                }),
            )
            .route(
                "/availability/times",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let expected = [
                        ("calendarID", "101"),
                        ("appointmentTypeID", "7"),
                        ("date", "2024-05-06"),
                        ("timezone", "America/New_York"),
                    ];
                    if expected
                        .iter()
                        .any(|(k, v)| params.get(*k).map(String::as_str) != Some(*v))
                    {
                        return Json(json!([]));
                    }
                    Json(json!([{ "time": "2024-05-06T10:00:00-0400", "slotsAvailable": 1 }]))
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{addr}/")
    }

    fn client(base_url: &str, api_key: &str) -> AcuityClient {
        let credentials = Credentials {
            user_id: "123".into(),
            api_key: api_key.into(),
        };
        AcuityClient::new(credentials, "tutorcal-tests")
            .unwrap()
            .with_base_url(base_url)
    }

    #[test]
    fn missing_credentials_are_reported() {
        assert!(matches!(
            AcuityClient::from_store(&MemoryStore::new(), "tutorcal-tests"),
            Err(Error::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn calendars_use_basic_auth() {
        let base = spawn_upstream().await;

        let calendars = client(&base, "abc").calendars().await.unwrap();
        assert_eq!(calendars.len(), 2);
        assert_eq!(calendars[0].id, TutorId::from(101));
        assert_eq!(calendars[1].name, "Alan Turing");

        let denied = client(&base, "nope").calendars().await;
        assert!(matches!(
            denied,
            Err(Error::Upstream { status: 401, ref message }) if message == "Bad credentials"
        ));
    }

    #[tokio::test]
    async fn appointment_types_default_duration() {
        let base = spawn_upstream().await;

        let types = client(&base, "abc").appointment_types().await.unwrap();
        assert_eq!(types[0].duration, 45);
        assert_eq!(types[0].category, "Sessions");
        assert_eq!(types[1].duration, 60);
    }

    #[tokio::test]
    async fn availability_sends_query() {
        let base = spawn_upstream().await;

        let slots = client(&base, "abc")
            .availability(
                TutorId::from(101),
                7,
                NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
                chrono_tz::America::New_York,
            )
            .await
            .unwrap();

        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].slots_available, 1);
    }

    #[test]
    fn schedule_link_targets_calendar() {
        assert_eq!(
            schedule_url("123", TutorId::from(101)),
            "https://app.acuityscheduling.com/schedule.php?owner=123&calendarID=101"
        );
    }
}
