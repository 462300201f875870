use std::{collections::HashMap, fmt};

use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    remote::RemoteClient,
    store::{models::RemoteConfig, KeyValueStore, COURSE_TUTOR_MAP},
};
use models::{clone_map, hydrate, normalize_course_name, AssignmentMap, TutorId};

pub mod models;

/// What the manager needs to persist and share the map
pub struct SyncContext<'a, S: KeyValueStore> {
    pub store: &'a S,
    pub client: &'a RemoteClient,
    pub remote: RemoteConfig,
}

/// Where a loaded map came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapOrigin {
    Remote,
    Local,
    Defaults,
}

/// Outcome of the remote half of a commit, the local half already succeeded
#[derive(Debug)]
pub enum SyncStatus {
    /// No remote URL configured
    Disabled,
    Pushed,
    /// Local copy is now ahead of the shared one
    LocalOnly(Error),
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Saved locally."),
            Self::Pushed => write!(f, "Saved locally and to the shared course list."),
            Self::LocalOnly(e) => write!(f, "Saved locally; remote sync failed: {e}"),
        }
    }
}

/// Course to tutor assignments for one session
#[derive(Clone, Debug, PartialEq)]
pub struct CourseMap {
    courses: AssignmentMap,
    defaults: AssignmentMap,
}

impl CourseMap {
    pub fn new(defaults: AssignmentMap) -> Self {
        Self {
            courses: clone_map(&defaults),
            defaults,
        }
    }

    pub fn from_value(raw: &Value, defaults: AssignmentMap) -> Self {
        Self {
            courses: hydrate(raw, &defaults),
            defaults,
        }
    }

    pub fn courses(&self) -> &AssignmentMap {
        &self.courses
    }

    pub fn has_courses(&self) -> bool {
        !self.courses.is_empty()
    }

    /// Course names in case-insensitive alphabetical order
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.courses.keys().map(String::as_str).collect();
        names.sort_by_cached_key(|name| (name.to_lowercase(), (*name).to_owned()));
        names
    }

    /// Tutors of a course, empty when the course is unknown
    pub fn tutors_for(&self, name: &str) -> &[TutorId] {
        self.find_course_key(name)
            .and_then(|key| self.courses.get(key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Stored spelling of a course, an exact match first then regardless of case
    pub fn find_course_key(&self, name: &str) -> Option<&str> {
        let course = normalize_course_name(name);
        if course.is_empty() {
            return None;
        }

        if let Some((key, _)) = self.courses.get_key_value(&course) {
            return Some(key);
        }

        let target = course.to_lowercase();
        self.courses
            .keys()
            .find(|key| key.to_lowercase() == target)
            .map(String::as_str)
    }

    /// Add a course without tutors, returns its stored name
    pub fn add_course(&mut self, name: &str) -> Result<String> {
        let course = normalize_course_name(name);
        if course.is_empty() {
            return Err(Error::validation("Enter a course name to add."));
        }

        if let Some(existing) = self.find_course_key(&course) {
            return Err(Error::Duplicate(existing.to_owned()));
        }

        self.courses.insert(course.clone(), vec![]);
        Ok(course)
    }

    /// Drop a course, returns whether it was there
    pub fn remove_course(&mut self, name: &str) -> bool {
        match self.find_course_key(name).map(str::to_owned) {
            Some(key) => self.courses.remove(&key).is_some(),
            None => false,
        }
    }

    /// Replace the tutors of a course, creating the course if needed
    pub fn set_course_tutors(&mut self, name: &str, tutors: Vec<TutorId>) -> Result<String> {
        let course = match self.find_course_key(name) {
            Some(key) => key.to_owned(),
            None => normalize_course_name(name),
        };
        if course.is_empty() {
            return Err(Error::validation("Select a course to update."));
        }

        self.courses.insert(course.clone(), tutors);
        Ok(course)
    }

    /// Courses taught by each tutor
    pub fn tutor_subjects(&self) -> HashMap<TutorId, Vec<String>> {
        let mut lookup: HashMap<TutorId, Vec<String>> = HashMap::new();
        for name in self.sorted_names() {
            for id in &self.courses[name] {
                let subjects = lookup.entry(*id).or_default();
                if !subjects.iter().any(|s| s == name) {
                    subjects.push(name.to_owned());
                }
            }
        }

        lookup
    }

    /// Load the map: shared copy first, then the local cache, then the defaults
    pub async fn load<S: KeyValueStore>(
        ctx: &SyncContext<'_, S>,
        defaults: AssignmentMap,
    ) -> Result<(Self, MapOrigin)> {
        match ctx.client.fetch(&ctx.remote).await {
            Ok(Some(payload)) => {
                let map = Self::from_value(&payload, defaults);
                // A fetched map overwrites whatever this device had
                map.save_local(ctx.store)?;
                return Ok((map, MapOrigin::Remote));
            }
            Ok(None) => (),
            Err(e) => tracing::warn!("remote course map unavailable, using local copy: {}", e),
        }

        Self::load_local(ctx.store, defaults)
    }

    /// Load the map saved on this device, or the defaults
    pub fn load_local(
        store: &impl KeyValueStore,
        defaults: AssignmentMap,
    ) -> Result<(Self, MapOrigin)> {
        let stored = store.get(&[COURSE_TUTOR_MAP])?;
        match stored.get(COURSE_TUTOR_MAP) {
            Some(raw) if !raw.is_null() => Ok((Self::from_value(raw, defaults), MapOrigin::Local)),
            _ => Ok((Self::new(defaults), MapOrigin::Defaults)),
        }
    }

    /// Save locally, then try to share.
    ///
    /// A failed local save is returned as an error. A failed push is not: the
    /// local write stands and the returned status says the shared copy is behind.
    pub async fn commit<S: KeyValueStore>(&self, ctx: &SyncContext<'_, S>) -> Result<SyncStatus> {
        self.save_local(ctx.store)?;

        Ok(match ctx.client.push(&self.courses, &ctx.remote).await {
            Ok(Some(_)) => SyncStatus::Pushed,
            Ok(None) => SyncStatus::Disabled,
            Err(e) => {
                tracing::warn!("course map saved locally but not shared: {}", e);
                SyncStatus::LocalOnly(e)
            }
        })
    }

    pub fn save_local(&self, store: &impl KeyValueStore) -> Result<()> {
        let mut values = Map::new();
        values.insert(COURSE_TUTOR_MAP.into(), serde_json::to_value(&self.courses)?);
        store.set(values)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        server::{
            self,
            models::{BlobStore, MemoryBlobStore, COURSES_KEY},
            AppState,
        },
        store::MemoryStore,
    };

    const TOKEN: &str = "s3cret";

    fn ids(values: &[u32]) -> Vec<TutorId> {
        values.iter().copied().map(TutorId::from).collect()
    }

    fn sample() -> CourseMap {
        CourseMap::from_value(
            &json!({ "Math": [1, 2], "Chemistry": [2, 3], "art": [] }),
            AssignmentMap::new(),
        )
    }

    fn client() -> RemoteClient {
        RemoteClient::new("tutorcal-tests").unwrap()
    }

    fn local_map(store: &MemoryStore) -> Option<Value> {
        store
            .get(&[COURSE_TUTOR_MAP])
            .unwrap()
            .remove(COURSE_TUTOR_MAP)
    }

    #[test]
    fn added_course_is_found_under_any_case() {
        let mut map = CourseMap::new(AssignmentMap::new());
        assert!(!map.has_courses());

        let stored = map.add_course("  AP   Biology ").unwrap();
        assert_eq!(stored, "AP Biology");
        assert!(map.has_courses());

        for variant in ["ap biology", "AP BIOLOGY", " Ap  Biology"] {
            assert_eq!(map.find_course_key(variant), Some("AP Biology"));
        }
        assert_eq!(map.tutors_for("AP Biology"), &[] as &[TutorId]);
    }

    #[test]
    fn duplicate_course_is_rejected_and_map_unchanged() {
        let mut map = sample();
        let before = map.clone();

        assert!(matches!(
            map.add_course("MATH"),
            Err(Error::Duplicate(existing)) if existing == "Math"
        ));
        assert_eq!(map, before);
    }

    #[test]
    fn blank_course_is_rejected() {
        let mut map = sample();

        assert!(matches!(map.add_course(" \t "), Err(Error::Validation(_))));
        assert!(matches!(
            map.set_course_tutors("  ", ids(&[1])),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut map = sample();

        assert!(map.remove_course("chemistry"));
        assert!(map.find_course_key("Chemistry").is_none());
        assert!(!map.remove_course("Chemistry"));
        assert!(!map.remove_course("Latin"));
        assert_eq!(map.courses().len(), 2);
    }

    #[test]
    fn set_tutors_replaces_or_creates() {
        let mut map = sample();

        assert_eq!(map.set_course_tutors("math", ids(&[7, 7])).unwrap(), "Math");
        assert_eq!(map.tutors_for("Math"), ids(&[7, 7]).as_slice());

        assert_eq!(map.set_course_tutors(" Latin ", ids(&[4])).unwrap(), "Latin");
        assert_eq!(map.tutors_for("latin"), ids(&[4]).as_slice());
    }

    #[test]
    fn case_variants_fold_into_first_spelling() {
        let mut map = CourseMap::from_value(
            &json!({ "Math": [1], "math": [2], " Art ": [3], "Art": [4] }),
            AssignmentMap::new(),
        );
        assert_eq!(
            map.courses(),
            &AssignmentMap::from([("Art".into(), ids(&[3])), ("Math".into(), ids(&[1]))])
        );

        assert_eq!(map.set_course_tutors("math", ids(&[9])).unwrap(), "Math");
        assert_eq!(
            map.courses(),
            &AssignmentMap::from([("Art".into(), ids(&[3])), ("Math".into(), ids(&[9]))])
        );

        assert!(map.remove_course("math"));
        assert!(map.find_course_key("Math").is_none());
        assert_eq!(map.courses().len(), 1);
    }

    #[test]
    fn exact_spelling_is_found_first() {
        let mut map = sample();
        map.courses.insert("math".into(), ids(&[5]));

        assert_eq!(map.find_course_key("math"), Some("math"));
        assert_eq!(map.find_course_key("Math"), Some("Math"));
        assert_eq!(map.find_course_key("MATH"), Some("Math"));

        assert!(map.remove_course("math"));
        assert_eq!(map.tutors_for("Math"), ids(&[1, 2]).as_slice());
    }

    #[test]
    fn names_sort_case_insensitively() {
        assert_eq!(sample().sorted_names(), vec!["art", "Chemistry", "Math"]);
    }

    #[test]
    fn tutor_subjects_lists_courses_per_tutor() {
        let subjects = sample().tutor_subjects();

        assert_eq!(subjects[&TutorId::from(1)], vec!["Math"]);
        assert_eq!(subjects[&TutorId::from(2)], vec!["Chemistry", "Math"]);
        assert!(!subjects.contains_key(&TutorId::from(9)));
    }

    #[tokio::test]
    async fn load_without_remote_prefers_local_then_defaults() {
        let store = MemoryStore::new();
        let client = client();
        let ctx = SyncContext {
            store: &store,
            client: &client,
            remote: RemoteConfig::default(),
        };
        let defaults = AssignmentMap::from([("Geometry".into(), ids(&[5]))]);

        let (map, origin) = CourseMap::load(&ctx, defaults.clone()).await.unwrap();
        assert_eq!(origin, MapOrigin::Defaults);
        assert_eq!(map.courses(), &defaults);

        store
            .set(Map::from_iter([(COURSE_TUTOR_MAP.to_owned(), json!({ "Math ": [1] }))]))
            .unwrap();
        let (map, origin) = CourseMap::load(&ctx, defaults).await.unwrap();
        assert_eq!(origin, MapOrigin::Local);
        assert_eq!(map.courses(), &AssignmentMap::from([("Math".into(), ids(&[1]))]));
    }

    #[tokio::test]
    async fn load_prefers_remote_and_caches_it() {
        let blobs = Arc::new(MemoryBlobStore::default());
        blobs.set(COURSES_KEY, &json!({ "Physics": [8] })).unwrap();
        let url = server::spawn_local(AppState::new(blobs, Some(TOKEN.into()))).await;

        let store = MemoryStore::new();
        store
            .set(Map::from_iter([(COURSE_TUTOR_MAP.to_owned(), json!({ "Math": [1] }))]))
            .unwrap();
        let client = client();
        let ctx = SyncContext {
            store: &store,
            client: &client,
            remote: RemoteConfig::new(&url, ""),
        };

        let (map, origin) = CourseMap::load(&ctx, AssignmentMap::new()).await.unwrap();
        assert_eq!(origin, MapOrigin::Remote);
        assert_eq!(map.courses(), &AssignmentMap::from([("Physics".into(), ids(&[8]))]));
        assert_eq!(local_map(&store), Some(json!({ "Physics": [8] })));
    }

    #[tokio::test]
    async fn load_falls_back_to_local_when_remote_fails() {
        let url = server::spawn_local(AppState::new(Arc::new(MemoryBlobStore::default()), None)).await;

        let store = MemoryStore::new();
        store
            .set(Map::from_iter([(COURSE_TUTOR_MAP.to_owned(), json!({ "Math": [1] }))]))
            .unwrap();
        let client = client();
        let ctx = SyncContext {
            store: &store,
            client: &client,
            remote: RemoteConfig::new(&format!("{url}gone"), ""),
        };

        let (_, origin) = CourseMap::load(&ctx, AssignmentMap::new()).await.unwrap();
        assert_eq!(origin, MapOrigin::Local);
    }

    #[tokio::test]
    async fn commit_pushes_after_saving_locally() {
        let blobs = Arc::new(MemoryBlobStore::default());
        let url = server::spawn_local(AppState::new(blobs.clone(), Some(TOKEN.into()))).await;

        let store = MemoryStore::new();
        let client = client();
        let ctx = SyncContext {
            store: &store,
            client: &client,
            remote: RemoteConfig::new(&url, &format!("Bearer {TOKEN}")),
        };

        let mut map = CourseMap::new(AssignmentMap::new());
        map.add_course("Math").unwrap();
        map.set_course_tutors("Math", ids(&[1, 2])).unwrap();

        assert!(matches!(map.commit(&ctx).await.unwrap(), SyncStatus::Pushed));
        assert_eq!(local_map(&store), Some(json!({ "Math": [1, 2] })));
        assert_eq!(blobs.get(COURSES_KEY).unwrap(), Some(json!({ "Math": [1, 2] })));
    }

    #[tokio::test]
    async fn failed_push_keeps_local_write() {
        let blobs = Arc::new(MemoryBlobStore::default());
        let url = server::spawn_local(AppState::new(blobs.clone(), Some(TOKEN.into()))).await;

        let store = MemoryStore::new();
        let client = client();
        let ctx = SyncContext {
            store: &store,
            client: &client,
            remote: RemoteConfig::new(&url, "wrong"),
        };

        let mut map = CourseMap::new(AssignmentMap::new());
        map.add_course("Math").unwrap();

        let status = map.commit(&ctx).await.unwrap();
        assert!(matches!(
            status,
            SyncStatus::LocalOnly(Error::RemoteSave { status: 401 })
        ));
        assert!(status.to_string().starts_with("Saved locally; remote sync failed"));
        assert_eq!(local_map(&store), Some(json!({ "Math": [] })));
        assert_eq!(blobs.get(COURSES_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn commit_without_remote_is_local_only() {
        let store = MemoryStore::new();
        let client = client();
        let ctx = SyncContext {
            store: &store,
            client: &client,
            remote: RemoteConfig::default(),
        };

        let map = sample();
        assert!(matches!(map.commit(&ctx).await.unwrap(), SyncStatus::Disabled));
        assert_eq!(
            local_map(&store),
            Some(json!({ "Math": [1, 2], "Chemistry": [2, 3], "art": [] }))
        );
    }
}
