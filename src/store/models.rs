use serde_json::{Map, Value};

use super::{
    KeyValueStore, ACUITY_API_KEY, ACUITY_USER_ID, COURSE_REMOTE_TOKEN, COURSE_REMOTE_URL,
};
use crate::error::{Error, Result};

/// Acuity account used for Basic auth
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub user_id: String,
    pub api_key: String,
}

impl Credentials {
    pub fn load(store: &impl KeyValueStore) -> Result<Self> {
        let values = store.get(&[ACUITY_USER_ID, ACUITY_API_KEY])?;
        let user_id = string_value(&values, ACUITY_USER_ID).unwrap_or_default();
        let api_key = string_value(&values, ACUITY_API_KEY).unwrap_or_default();

        if user_id.is_empty() || api_key.is_empty() {
            return Err(Error::MissingCredentials);
        }

        Ok(Self { user_id, api_key })
    }

    pub fn save(&self, store: &impl KeyValueStore) -> Result<()> {
        let user_id = self.user_id.trim();
        let api_key = self.api_key.trim();

        if user_id.is_empty() || api_key.is_empty() {
            return Err(Error::validation("Please fill both fields."));
        }

        let mut values = Map::new();
        values.insert(ACUITY_USER_ID.into(), user_id.into());
        values.insert(ACUITY_API_KEY.into(), api_key.into());
        store.set(values)
    }
}

/// Where the shared course map lives, an empty `url` disables sync
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub token: String,
}

impl RemoteConfig {
    pub fn new(url: &str, token: &str) -> Self {
        Self {
            url: url.trim().to_owned(),
            token: token.trim().to_owned(),
        }
    }

    /// `default_url` only applies when no URL was ever saved,
    /// a saved empty URL keeps sync disabled
    pub fn from_values(values: &Map<String, Value>, default_url: &str) -> Self {
        let url = match values.get(COURSE_REMOTE_URL) {
            None | Some(Value::Null) => default_url.to_owned(),
            Some(_) => string_value(values, COURSE_REMOTE_URL).unwrap_or_default(),
        };
        let token = string_value(values, COURSE_REMOTE_TOKEN).unwrap_or_default();

        Self::new(&url, &token)
    }

    pub fn load(store: &impl KeyValueStore, default_url: &str) -> Result<Self> {
        let values = store.get(&[COURSE_REMOTE_URL, COURSE_REMOTE_TOKEN])?;
        Ok(Self::from_values(&values, default_url))
    }

    pub fn save(&self, store: &impl KeyValueStore) -> Result<()> {
        let mut values = Map::new();
        values.insert(COURSE_REMOTE_URL.into(), self.url.trim().into());
        values.insert(COURSE_REMOTE_TOKEN.into(), self.token.trim().into());
        store.set(values)
    }

    pub fn is_enabled(&self) -> bool {
        !self.url.is_empty()
    }
}

fn string_value(values: &Map<String, Value>, key: &str) -> Option<String> {
    match values.get(key)? {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn values(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn credentials_require_both_fields() {
        let store = MemoryStore::new();
        assert!(matches!(
            Credentials::load(&store),
            Err(Error::MissingCredentials)
        ));

        let partial = Credentials {
            user_id: " 1234 ".into(),
            api_key: "   ".into(),
        };
        assert!(matches!(partial.save(&store), Err(Error::Validation(_))));
        assert!(matches!(
            Credentials::load(&store),
            Err(Error::MissingCredentials)
        ));

        let full = Credentials {
            user_id: " 1234 ".into(),
            api_key: "key".into(),
        };
        full.save(&store).unwrap();
        assert_eq!(
            Credentials::load(&store).unwrap(),
            Credentials {
                user_id: "1234".into(),
                api_key: "key".into()
            }
        );
    }

    #[test]
    fn default_url_applies_only_when_unset() {
        let unset = RemoteConfig::from_values(&Map::new(), "https://example.test/courses");
        assert_eq!(unset.url, "https://example.test/courses");
        assert!(unset.is_enabled());

        let cleared = RemoteConfig::from_values(
            &values(json!({ COURSE_REMOTE_URL: "", COURSE_REMOTE_TOKEN: "t" })),
            "https://example.test/courses",
        );
        assert_eq!(cleared.url, "");
        assert!(!cleared.is_enabled());
        assert_eq!(cleared.token, "t");
    }

    #[test]
    fn remote_config_round_trips_through_store() {
        let store = MemoryStore::new();
        RemoteConfig::new("  https://example.test/  ", " Bearer abc ")
            .save(&store)
            .unwrap();

        let loaded = RemoteConfig::load(&store, "").unwrap();
        assert_eq!(loaded, RemoteConfig::new("https://example.test/", "Bearer abc"));
    }
}
