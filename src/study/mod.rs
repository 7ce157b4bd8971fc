//! Study session controller.
//!
//! A visitor either carries the id of a persisted [`StudySession`] in their
//! browser session, in which case the two variant axes decide every display
//! flag, or they fall back to per-flag values kept in the browser session
//! (defaulting to the configured baseline). A dangling id silently falls back.

mod session_store;

pub use session_store::{MemorySessionStore, SessionStore};

#[cfg(test)]
pub use session_store::MockSessionStore;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AppResult, FieldError};
use crate::storage::{SqliteStorage, Storage, StudySession};

/// Browser-session key holding the active study session id.
pub const STUDY_SESSION_ID_KEY: &str = "study_session_id";

/// Display flags consumed by page assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayFlags {
    pub show_recommended_content: bool,
    pub show_survey: bool,
    pub show_top_navigation: bool,
    pub show_content_on_homepage: bool,
}

impl DisplayFlags {
    /// The untreated site: everything on except homepage content.
    pub fn baseline() -> Self {
        Self {
            show_recommended_content: true,
            show_survey: true,
            show_top_navigation: true,
            show_content_on_homepage: false,
        }
    }

    /// Flags implied by a variant. Each axis controls its own pair.
    pub fn from_variant(variant: StudyVariant) -> Self {
        Self {
            show_recommended_content: !variant.high_agency,
            show_survey: !variant.high_agency,
            show_top_navigation: !variant.integrated_content,
            show_content_on_homepage: variant.integrated_content,
        }
    }

    pub fn from_session(session: &StudySession) -> Self {
        Self::from_variant(StudyVariant::of(session))
    }

    pub fn get(&self, flag: FeatureFlag) -> bool {
        match flag {
            FeatureFlag::RecommendedContent => self.show_recommended_content,
            FeatureFlag::TopNavigation => self.show_top_navigation,
            FeatureFlag::ContentOnHomepage => self.show_content_on_homepage,
            FeatureFlag::Survey => self.show_survey,
        }
    }

    pub fn set(&mut self, flag: FeatureFlag, value: bool) {
        match flag {
            FeatureFlag::RecommendedContent => self.show_recommended_content = value,
            FeatureFlag::TopNavigation => self.show_top_navigation = value,
            FeatureFlag::ContentOnHomepage => self.show_content_on_homepage = value,
            FeatureFlag::Survey => self.show_survey = value,
        }
    }
}

impl Default for DisplayFlags {
    fn default() -> Self {
        Self::baseline()
    }
}

/// One individually togglable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    RecommendedContent,
    TopNavigation,
    ContentOnHomepage,
    Survey,
}

impl FeatureFlag {
    /// Form order.
    pub const ALL: [FeatureFlag; 4] = [
        FeatureFlag::RecommendedContent,
        FeatureFlag::TopNavigation,
        FeatureFlag::ContentOnHomepage,
        FeatureFlag::Survey,
    ];

    /// Browser-session key and form value.
    pub fn key(&self) -> &'static str {
        match self {
            FeatureFlag::RecommendedContent => "show_recommended_content",
            FeatureFlag::TopNavigation => "show_top_navigation",
            FeatureFlag::ContentOnHomepage => "show_content_on_homepage",
            FeatureFlag::Survey => "show_survey",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeatureFlag::RecommendedContent => "Show recommended content",
            FeatureFlag::TopNavigation => "Show top navigation",
            FeatureFlag::ContentOnHomepage => "Show homepage content",
            FeatureFlag::Survey => "Show survey",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.key() == key)
    }
}

/// The two orthogonal study axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyVariant {
    pub high_agency: bool,
    pub integrated_content: bool,
}

impl StudyVariant {
    pub fn new(high_agency: bool, integrated_content: bool) -> Self {
        Self {
            high_agency,
            integrated_content,
        }
    }

    /// All four combinations.
    pub fn all() -> [StudyVariant; 4] {
        [
            Self::new(false, false),
            Self::new(true, false),
            Self::new(false, true),
            Self::new(true, true),
        ]
    }

    /// Both axes drawn independently and uniformly.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.gen_bool(0.5), rng.gen_bool(0.5))
    }

    pub fn of(session: &StudySession) -> Self {
        Self::new(
            session.high_agency_version,
            session.integrated_content_version,
        )
    }
}

/// Flags for one request: a study session record wins outright, otherwise
/// the per-flag fallback applies.
pub fn resolve_display_flags(
    session: Option<&StudySession>,
    fallback: &DisplayFlags,
) -> DisplayFlags {
    match session {
        Some(session) => DisplayFlags::from_session(session),
        None => *fallback,
    }
}

/// Resolved study state of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyState {
    /// The active study session, when the stored id still exists.
    pub session: Option<StudySession>,
    pub flags: DisplayFlags,
}

/// Assigns variants and resolves display flags for requests.
#[derive(Clone)]
pub struct StudyController {
    storage: SqliteStorage,
    defaults: DisplayFlags,
}

impl StudyController {
    pub fn new(storage: SqliteStorage, defaults: DisplayFlags) -> Self {
        Self { storage, defaults }
    }

    /// Resolve the request's display flags.
    pub async fn resolve(&self, session: &dyn SessionStore) -> AppResult<StudyState> {
        let record = match active_session_id(session) {
            Some(id) => {
                let record = self.storage.get_study_session(id).await?;
                if record.is_none() {
                    debug!(study_session_id = id, "Study session not found, using fallback flags");
                }
                record
            }
            None => None,
        };

        let fallback = self.fallback_flags(session);
        let flags = resolve_display_flags(record.as_ref(), &fallback);

        Ok(StudyState {
            session: record,
            flags,
        })
    }

    /// Per-flag values from the browser session, defaulting each to the
    /// configured baseline. Non-boolean values count as absent.
    pub fn fallback_flags(&self, session: &dyn SessionStore) -> DisplayFlags {
        let mut flags = self.defaults;
        for flag in FeatureFlag::ALL {
            if let Some(value) = session.get(flag.key()).and_then(|v| v.as_bool()) {
                flags.set(flag, value);
            }
        }
        flags
    }

    /// Record a new study session and make it the visitor's active one.
    pub async fn assign_variant(
        &self,
        session: &dyn SessionStore,
        persona: Option<&str>,
        variant: StudyVariant,
    ) -> AppResult<StudySession> {
        let record = StudySession::new(
            persona.map(str::to_string),
            variant.high_agency,
            variant.integrated_content,
        );
        let record = self.storage.create_study_session(&record).await?;
        session.set(STUDY_SESSION_ID_KEY, Value::from(record.id));

        info!(
            study_session_id = record.id,
            persona = ?record.persona,
            high_agency = variant.high_agency,
            integrated_content = variant.integrated_content,
            "Assigned study variant"
        );
        Ok(record)
    }

    pub async fn assign_random_variant(
        &self,
        session: &dyn SessionStore,
        persona: Option<&str>,
    ) -> AppResult<StudySession> {
        let variant = StudyVariant::random(&mut rand::thread_rng());
        self.assign_variant(session, persona, variant).await
    }

    /// Forget the active study session; the record itself is kept.
    pub fn clear(&self, session: &dyn SessionStore) {
        session.remove(STUDY_SESSION_ID_KEY);
        debug!("Cleared study session id");
    }

    /// Store the feature-flag form: checked flags on, the rest off.
    ///
    /// Unknown choices reject the whole submission without writing.
    pub fn set_feature_flags(
        &self,
        session: &dyn SessionStore,
        features: &[String],
    ) -> AppResult<DisplayFlags> {
        let mut checked = Vec::with_capacity(features.len());
        for feature in features {
            match FeatureFlag::from_key(feature) {
                Some(flag) => checked.push(flag),
                None => {
                    return Err(FieldError::new(
                        "features",
                        format!(
                            "Select a valid choice. {} is not one of the available choices.",
                            feature
                        ),
                    )
                    .into())
                }
            }
        }

        let mut flags = self.defaults;
        for flag in FeatureFlag::ALL {
            let value = checked.contains(&flag);
            session.set(flag.key(), Value::Bool(value));
            flags.set(flag, value);
        }

        info!(flags = ?flags, "Updated feature flags");
        Ok(flags)
    }
}

/// The stored study session id, if it is an integer.
pub fn active_session_id(session: &dyn SessionStore) -> Option<i64> {
    session.get(STUDY_SESSION_ID_KEY).and_then(|v| v.as_i64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn session(high_agency: bool, integrated: bool) -> StudySession {
        StudySession::new(None, high_agency, integrated)
    }

    #[test]
    fn test_flag_table() {
        let fallback = DisplayFlags::baseline();
        let rows = [
            ((true, false), (false, false, true, false)),
            ((false, true), (true, true, false, true)),
            ((true, true), (false, false, false, true)),
            ((false, false), (true, true, true, false)),
        ];

        for ((high, integrated), (recommended, survey, nav, home)) in rows {
            let flags = resolve_display_flags(Some(&session(high, integrated)), &fallback);
            assert_eq!(
                flags,
                DisplayFlags {
                    show_recommended_content: recommended,
                    show_survey: survey,
                    show_top_navigation: nav,
                    show_content_on_homepage: home,
                },
                "variant high_agency={high} integrated={integrated}"
            );
        }
    }

    #[test]
    fn test_session_record_overrides_fallback() {
        let fallback = DisplayFlags {
            show_recommended_content: false,
            show_survey: false,
            show_top_navigation: false,
            show_content_on_homepage: true,
        };
        let flags = resolve_display_flags(Some(&session(false, false)), &fallback);
        assert_eq!(flags, DisplayFlags::baseline());
        assert_eq!(resolve_display_flags(None, &fallback), fallback);
    }

    #[test]
    fn test_feature_flag_keys_round_trip() {
        for flag in FeatureFlag::ALL {
            assert_eq!(FeatureFlag::from_key(flag.key()), Some(flag));
        }
        assert_eq!(FeatureFlag::from_key("show_everything"), None);
    }

    #[test]
    fn test_random_variant_covers_all_combinations() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(StudyVariant::random(&mut rng));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_active_session_id_ignores_non_integers() {
        let mut store = MockSessionStore::new();
        store
            .expect_get()
            .with(eq(STUDY_SESSION_ID_KEY))
            .returning(|_| Some(Value::from("7")));
        assert_eq!(active_session_id(&store), None);
    }

    #[tokio::test]
    async fn test_set_feature_flags_rejects_unknown_without_writing() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let controller = StudyController::new(storage, DisplayFlags::baseline());

        let mut store = MockSessionStore::new();
        store.expect_set().never();

        let err = controller
            .set_feature_flags(
                &store,
                &["show_survey".to_string(), "show_everything".to_string()],
            )
            .unwrap_err();
        assert!(err.to_string().contains("features"));
    }

    #[tokio::test]
    async fn test_set_feature_flags_writes_every_flag() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        let controller = StudyController::new(storage, DisplayFlags::baseline());

        let mut store = MockSessionStore::new();
        store
            .expect_set()
            .with(eq("show_survey"), eq(Value::Bool(true)))
            .times(1)
            .return_const(());
        store
            .expect_set()
            .with(eq("show_recommended_content"), eq(Value::Bool(false)))
            .times(1)
            .return_const(());
        store
            .expect_set()
            .with(eq("show_top_navigation"), eq(Value::Bool(false)))
            .times(1)
            .return_const(());
        store
            .expect_set()
            .with(eq("show_content_on_homepage"), eq(Value::Bool(false)))
            .times(1)
            .return_const(());

        let flags = controller
            .set_feature_flags(&store, &["show_survey".to_string()])
            .unwrap();
        assert!(flags.show_survey);
        assert!(!flags.show_top_navigation);
    }
}
