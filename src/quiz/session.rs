//! Quiz session state machine.
//!
//! Owns the active quiz (feature index, match property, filters, guess
//! history, highlight cursor), computes guess matches, and publishes every
//! state change on the event bus. Durable state goes through the store
//! ahead of in-memory state: a write that fails leaves the session exactly
//! as it was.

use log::{debug, info};
use serde_json::Value;

use crate::error::QuizError;
use crate::events::{EventBus, QuizEvent};
use crate::quiz::types::{Feature, FeatureId, Filter, PropertyValues, QuizInfo};
use crate::store::QuizStore;

/// Everything owned by a started quiz. Built fully before being installed,
/// so the session is never observable with partially replaced state.
struct ActiveQuiz {
    data_source: String,
    attribution: Option<String>,
    match_property: String,
    /// Feature index: position == FeatureId.
    features: Vec<Feature>,
    collected_property_values: PropertyValues,
    filters: Vec<Filter>,
    /// Ids guessed so far, in first-match order.
    guessed_ids: Vec<FeatureId>,
    /// Ids matched by the most recent successful guess.
    last_guessed_ids: Vec<FeatureId>,
    highlighted_id: Option<FeatureId>,
}

impl ActiveQuiz {
    fn features_by_ids(&self, ids: &[FeatureId]) -> Vec<Feature> {
        ids.iter()
            .filter_map(|id| self.features.get(*id))
            .cloned()
            .collect()
    }
}

/// The central state machine of a quiz.
///
/// Starts `uninitialized`; [`start_new_quiz`](Self::start_new_quiz) or
/// [`resume_existing_quiz`](Self::resume_existing_quiz) moves it to
/// `started`. There is no way back within a session's lifetime; starting
/// another quiz replaces all state in one step.
pub struct QuizSession {
    store: QuizStore,
    bus: EventBus,
    active: Option<ActiveQuiz>,
}

impl QuizSession {
    pub fn new(store: QuizStore) -> Self {
        Self {
            store,
            bus: EventBus::new(),
            active: None,
        }
    }

    /// The bus this session publishes its events on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn started(&self) -> bool {
        self.active.is_some()
    }

    pub fn data_source(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.data_source.as_str())
    }

    pub fn data_attribution(&self) -> Option<&str> {
        self.active
            .as_ref()
            .and_then(|active| active.attribution.as_deref())
    }

    pub fn match_property(&self) -> Option<&str> {
        self.active
            .as_ref()
            .map(|active| active.match_property.as_str())
    }

    /// Start a brand-new quiz from the given definition.
    ///
    /// Assigns dense feature ids in list order, persists the definition
    /// (discarding any previously stored quiz and its guess history), then
    /// replaces in-memory state and publishes [`QuizEvent::QuizStart`]. If
    /// the write fails, nothing in memory changes.
    pub fn start_new_quiz(&mut self, mut quiz_info: QuizInfo) -> Result<(), QuizError> {
        for (id, feature) in quiz_info.features.iter_mut().enumerate() {
            feature.id = Some(id);
        }
        self.store.set_quiz_info(&quiz_info)?;
        info!(
            "started new quiz on {:?}: {} features, match property {:?}",
            quiz_info.data_source,
            quiz_info.features.len(),
            quiz_info.match_property
        );
        self.install(quiz_info, Vec::new());
        Ok(())
    }

    /// Resume the stored quiz, seeding the guessed list from storage.
    ///
    /// Returns `Ok(false)` without publishing anything if no quiz was ever
    /// stored; the session stays uninitialized. Storage is not re-written.
    pub fn resume_existing_quiz(&mut self) -> Result<bool, QuizError> {
        let Some(stored) = self.store.stored_data()? else {
            return Ok(false);
        };
        info!(
            "resumed quiz on {:?}: {} of {} guessed",
            stored.quiz_info.data_source,
            stored.guessed_ids.len(),
            stored.quiz_info.features.len()
        );
        self.install(stored.quiz_info, stored.guessed_ids);
        Ok(true)
    }

    fn install(&mut self, quiz_info: QuizInfo, guessed_ids: Vec<FeatureId>) {
        self.active = Some(ActiveQuiz {
            data_source: quiz_info.data_source,
            attribution: quiz_info.attribution,
            match_property: quiz_info.match_property,
            features: quiz_info.features,
            collected_property_values: quiz_info.collected_property_values,
            filters: Vec::new(),
            guessed_ids,
            last_guessed_ids: Vec::new(),
            highlighted_id: None,
        });
        self.bus.publish(&QuizEvent::QuizStart);
    }

    /// Match a raw guess against the currently filtered features.
    ///
    /// Newly matched features have their ids appended durably and in
    /// memory, become the new last-guessed set, and are announced via
    /// [`QuizEvent::MatchesUpdate`]. Returns the newly matched features; an
    /// empty result means no event was published and nothing was written
    /// (no match, already guessed, empty guess, or no active quiz).
    pub fn make_guess(&mut self, raw_guess: &str) -> Result<Vec<Feature>, QuizError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(Vec::new());
        };
        let guess = normalize(raw_guess);
        if guess.is_empty() {
            return Ok(Vec::new());
        }

        let new_ids: Vec<FeatureId> = active
            .features
            .iter()
            .filter(|feature| passes_filters(feature, &active.filters))
            .filter(|feature| matches_guess(feature, &active.match_property, &guess))
            .filter_map(|feature| feature.id)
            .filter(|id| !active.guessed_ids.contains(id))
            .collect();
        if new_ids.is_empty() {
            return Ok(Vec::new());
        }

        self.store.add_guessed_ids(&new_ids)?;
        let previous_last_guessed = active.features_by_ids(&active.last_guessed_ids);
        active.guessed_ids.extend_from_slice(&new_ids);
        active.last_guessed_ids = new_ids.clone();
        let new_matches = active.features_by_ids(&new_ids);
        debug!("guess {guess:?} matched {} new feature(s)", new_matches.len());
        self.bus.publish(&QuizEvent::MatchesUpdate {
            previous_last_guessed,
            new_matches: new_matches.clone(),
        });
        Ok(new_matches)
    }

    /// The live filter list; empty when no quiz is active.
    pub fn filters(&self) -> &[Filter] {
        self.active
            .as_ref()
            .map_or(&[], |active| active.filters.as_slice())
    }

    /// Replace the filter list.
    ///
    /// Duplicate `(key, value)` pairs are dropped, keeping first
    /// occurrences. [`QuizEvent::FiltersUpdate`] is published only when the
    /// resulting set differs from the previous one, compared as sets.
    pub fn set_filters(&mut self, filters: Vec<Filter>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let mut deduped: Vec<Filter> = Vec::with_capacity(filters.len());
        for filter in filters {
            if !deduped.contains(&filter) {
                deduped.push(filter);
            }
        }
        let changed = !same_filter_set(&active.filters, &deduped);
        active.filters = deduped;
        if changed {
            self.bus
                .publish(&QuizEvent::FiltersUpdate(active.filters.clone()));
        }
    }

    pub fn highlighted_feature_id(&self) -> Option<FeatureId> {
        self.active.as_ref().and_then(|active| active.highlighted_id)
    }

    /// Move the transient highlight. Setting the current value again is a
    /// no-op; otherwise a before/after pair is published.
    pub fn set_highlighted_feature_id(&mut self, feature_id: Option<FeatureId>) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.highlighted_id == feature_id {
            return;
        }
        let previous_highlighted_id = active.highlighted_id;
        active.highlighted_id = feature_id;
        self.bus.publish(&QuizEvent::HighlightedFeatureUpdate {
            previous_highlighted_id,
            current_highlighted_id: feature_id,
        });
    }

    pub fn feature_by_id(&self, feature_id: FeatureId) -> Option<&Feature> {
        self.active
            .as_ref()
            .and_then(|active| active.features.get(feature_id))
    }

    /// The configured match property's value on a feature, unmodified. May
    /// be a string, an array, or any other JSON value.
    pub fn feature_match_property_value<'a>(&self, feature: &'a Feature) -> Option<&'a Value> {
        let active = self.active.as_ref()?;
        feature.property(&active.match_property)
    }

    pub fn features(&self) -> Vec<&Feature> {
        self.active
            .as_ref()
            .map_or_else(Vec::new, |active| active.features.iter().collect())
    }

    /// Features passing every active filter.
    pub fn filtered_features(&self) -> Vec<&Feature> {
        self.active.as_ref().map_or_else(Vec::new, |active| {
            active
                .features
                .iter()
                .filter(|feature| passes_filters(feature, &active.filters))
                .collect()
        })
    }

    /// Guessed features in first-match order.
    pub fn guessed_features(&self) -> Vec<&Feature> {
        self.active.as_ref().map_or_else(Vec::new, |active| {
            active
                .guessed_ids
                .iter()
                .filter_map(|id| active.features.get(*id))
                .collect()
        })
    }

    /// Guessed features that also pass the active filters, in guess order.
    pub fn filtered_guessed_features(&self) -> Vec<&Feature> {
        self.active.as_ref().map_or_else(Vec::new, |active| {
            active
                .guessed_ids
                .iter()
                .filter_map(|id| active.features.get(*id))
                .filter(|feature| passes_filters(feature, &active.filters))
                .collect()
        })
    }

    /// The property-values snapshot minus the match property's entry:
    /// quizzing on a property and filtering on it are mutually exclusive.
    pub fn property_values_for_filter(&self) -> PropertyValues {
        self.active.as_ref().map_or_else(PropertyValues::new, |active| {
            let mut values = active.collected_property_values.clone();
            values.remove(&active.match_property);
            values
        })
    }

    /// Guessed and total counts over the currently filtered feature set.
    pub fn progress(&self) -> (usize, usize) {
        (
            self.filtered_guessed_features().len(),
            self.filtered_features().len(),
        )
    }
}

/// Guess normalization: trim whitespace, lower-case. Matching is case- and
/// whitespace-insensitive but otherwise exact.
fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A feature matches a normalized guess if its match-property value is a
/// string normalizing to the guess, or an array any string element of which
/// does. Any other value type never matches.
fn matches_guess(feature: &Feature, match_property: &str, guess: &str) -> bool {
    match feature.property(match_property) {
        Some(Value::String(value)) => normalize(value) == guess,
        Some(Value::Array(values)) => values
            .iter()
            .any(|value| matches!(value, Value::String(text) if normalize(text) == guess)),
        _ => false,
    }
}

/// A feature is in the filtered set iff it satisfies every active filter.
/// An empty filter list admits every feature.
fn passes_filters(feature: &Feature, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let property = feature.property(&filter.key).unwrap_or(&Value::Null);
        values_loosely_equal(property, &filter.value)
    })
}

/// Pinned-down replacement for the platform-defined loose equality the
/// filter rule historically relied on: structural equality, or equality of
/// the canonical scalar strings (so the string `"5"` matches the number 5).
fn values_loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (scalar_text(a), scalar_text(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Order-independent set comparison of two deduplicated filter lists.
fn same_filter_set(a: &[Filter], b: &[Filter]) -> bool {
    a.len() == b.len() && a.iter().all(|filter| b.contains(filter))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::dataset::collect_key_values;
    use crate::events::QuizEventKind;

    fn feature(properties: Value) -> Feature {
        Feature {
            id: None,
            geometry: Value::Null,
            properties: properties.as_object().cloned().unwrap_or_default(),
        }
    }

    fn city_features() -> Vec<Feature> {
        vec![
            feature(json!({ "name": "Berlin", "country": "DE" })),
            feature(json!({ "name": "Paris", "country": "FR" })),
        ]
    }

    fn quiz_info(features: Vec<Feature>, match_property: &str) -> QuizInfo {
        let collected_property_values = collect_key_values(&features);
        QuizInfo {
            data_source: "test data".to_string(),
            features,
            attribution: None,
            match_property: match_property.to_string(),
            collected_property_values,
        }
    }

    fn started_session(features: Vec<Feature>, match_property: &str) -> QuizSession {
        let mut session = QuizSession::new(QuizStore::open_in_memory().unwrap());
        session
            .start_new_quiz(quiz_info(features, match_property))
            .unwrap();
        session
    }

    fn record_events(session: &QuizSession, kind: QuizEventKind) -> Rc<RefCell<Vec<QuizEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        session
            .bus()
            .subscribe(kind, move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn test_start_assigns_dense_ids_in_input_order() {
        let session = started_session(city_features(), "name");
        let ids: Vec<Option<FeatureId>> =
            session.features().iter().map(|feature| feature.id).collect();
        assert_eq!(ids, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_start_publishes_quiz_start_after_state_replacement() {
        let mut session = QuizSession::new(QuizStore::open_in_memory().unwrap());
        let events = record_events(&session, QuizEventKind::QuizStart);
        session
            .start_new_quiz(quiz_info(city_features(), "name"))
            .unwrap();
        assert_eq!(events.borrow().len(), 1);
        assert!(session.started());
    }

    #[test]
    fn test_failed_persist_leaves_session_unstarted() {
        let mut store = QuizStore::open_in_memory().unwrap();
        store.drop_tables_for_tests();
        let mut session = QuizSession::new(store);
        let events = record_events(&session, QuizEventKind::QuizStart);

        let result = session.start_new_quiz(quiz_info(city_features(), "name"));
        assert!(result.is_err());
        assert!(!session.started());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_guess_scenario_berlin() {
        let mut session = started_session(city_features(), "name");
        let events = record_events(&session, QuizEventKind::MatchesUpdate);

        let matched = session.make_guess("berlin").unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, Some(0));
        assert_eq!(session.guessed_features().len(), 1);
        assert_eq!(events.borrow().len(), 1);
        match &events.borrow()[0] {
            QuizEvent::MatchesUpdate {
                previous_last_guessed,
                new_matches,
            } => {
                assert!(previous_last_guessed.is_empty());
                assert_eq!(new_matches[0].id, Some(0));
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Re-guessing a fully guessed term changes nothing and stays silent
        let matched = session.make_guess("berlin").unwrap();
        assert!(matched.is_empty());
        assert_eq!(session.guessed_features().len(), 1);
        assert_eq!(events.borrow().len(), 1);
    }

    #[test]
    fn test_matches_update_carries_previous_last_guessed() {
        let mut session = started_session(city_features(), "name");
        let events = record_events(&session, QuizEventKind::MatchesUpdate);
        session.make_guess("berlin").unwrap();
        session.make_guess("paris").unwrap();

        match &events.borrow()[1] {
            QuizEvent::MatchesUpdate {
                previous_last_guessed,
                new_matches,
            } => {
                assert_eq!(previous_last_guessed[0].id, Some(0));
                assert_eq!(new_matches[0].id, Some(1));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_guess_normalization() {
        for guess in [" Paris ", "paris", "PARIS"] {
            let mut session = started_session(city_features(), "name");
            let matched = session.make_guess(guess).unwrap();
            assert_eq!(matched.len(), 1, "guess {guess:?} should match");
            assert_eq!(matched[0].id, Some(1));
        }
    }

    #[test]
    fn test_empty_guess_is_a_no_op() {
        let mut session = started_session(city_features(), "name");
        let events = record_events(&session, QuizEventKind::MatchesUpdate);
        assert!(session.make_guess("   ").unwrap().is_empty());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_guess_before_start_is_a_no_op() {
        let mut session = QuizSession::new(QuizStore::open_in_memory().unwrap());
        assert!(session.make_guess("berlin").unwrap().is_empty());
    }

    #[test]
    fn test_array_valued_match_property_matches_any_element() {
        let features = vec![feature(json!({ "name": ["NYC", "New York"] }))];
        for guess in ["nyc", "new york"] {
            let mut session = started_session(features.clone(), "name");
            assert_eq!(session.make_guess(guess).unwrap().len(), 1);
        }
    }

    #[test]
    fn test_non_string_match_values_never_match() {
        let features = vec![feature(json!({ "name": 42 }))];
        let mut session = started_session(features, "name");
        assert!(session.make_guess("42").unwrap().is_empty());
    }

    #[test]
    fn test_one_guess_matches_all_equal_valued_features() {
        let features = vec![
            feature(json!({ "name": "Springfield", "state": "IL" })),
            feature(json!({ "name": "Springfield", "state": "MA" })),
        ];
        let mut session = started_session(features, "name");
        let matched = session.make_guess("springfield").unwrap();
        assert_eq!(matched.len(), 2);
        assert_eq!(session.guessed_features().len(), 2);
    }

    #[test]
    fn test_filters_deduplicate_on_set() {
        let mut session = started_session(city_features(), "name");
        session.set_filters(vec![
            Filter::new("country", "DE"),
            Filter::new("country", "DE"),
            Filter::new("country", "FR"),
        ]);
        assert_eq!(session.filters().len(), 2);
    }

    #[test]
    fn test_set_equal_filters_publish_nothing() {
        let mut session = started_session(city_features(), "name");
        let events = record_events(&session, QuizEventKind::FiltersUpdate);

        session.set_filters(vec![
            Filter::new("country", "DE"),
            Filter::new("country", "FR"),
        ]);
        assert_eq!(events.borrow().len(), 1);

        // Same set in a different order, with a duplicate thrown in
        session.set_filters(vec![
            Filter::new("country", "FR"),
            Filter::new("country", "DE"),
            Filter::new("country", "FR"),
        ]);
        assert_eq!(events.borrow().len(), 1);

        session.set_filters(Vec::new());
        assert_eq!(events.borrow().len(), 2);
    }

    #[test]
    fn test_filters_restrict_matching_and_views() {
        let mut session = started_session(city_features(), "name");
        session.set_filters(vec![Filter::new("country", "DE")]);

        let filtered = session.filtered_features();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, Some(0));

        // Paris is filtered out, so a correct guess for it cannot match
        assert!(session.make_guess("paris").unwrap().is_empty());
        assert_eq!(session.make_guess("berlin").unwrap().len(), 1);
    }

    #[test]
    fn test_filtered_guessed_features_intersects_both_sets() {
        let mut session = started_session(city_features(), "name");
        session.make_guess("berlin").unwrap();
        session.make_guess("paris").unwrap();
        session.set_filters(vec![Filter::new("country", "FR")]);

        assert_eq!(session.guessed_features().len(), 2);
        let filtered_guessed = session.filtered_guessed_features();
        assert_eq!(filtered_guessed.len(), 1);
        assert_eq!(filtered_guessed[0].id, Some(1));
        assert_eq!(session.progress(), (1, 1));
    }

    #[test]
    fn test_filter_values_compare_across_scalar_types() {
        let features = vec![
            feature(json!({ "name": "A", "zoom": 5 })),
            feature(json!({ "name": "B", "zoom": "5" })),
            feature(json!({ "name": "C", "zoom": 6 })),
        ];
        let mut session = started_session(features, "name");
        session.set_filters(vec![Filter::new("zoom", "5")]);
        assert_eq!(session.filtered_features().len(), 2);

        session.set_filters(vec![Filter::new("zoom", 5)]);
        assert_eq!(session.filtered_features().len(), 2);
    }

    #[test]
    fn test_property_values_for_filter_omits_match_property() {
        let session = started_session(city_features(), "name");
        let values = session.property_values_for_filter();
        assert!(!values.contains_key("name"));
        assert_eq!(
            values.get("country"),
            Some(&vec![json!("DE"), json!("FR")])
        );
    }

    #[test]
    fn test_highlight_updates_publish_before_after_pair() {
        let mut session = started_session(city_features(), "name");
        let events = record_events(&session, QuizEventKind::HighlightedFeatureUpdate);

        session.set_highlighted_feature_id(Some(1));
        // Same value again is a no-op
        session.set_highlighted_feature_id(Some(1));
        session.set_highlighted_feature_id(None);

        let events = events.borrow();
        assert_eq!(events.len(), 2);
        match &events[0] {
            QuizEvent::HighlightedFeatureUpdate {
                previous_highlighted_id,
                current_highlighted_id,
            } => {
                assert_eq!(*previous_highlighted_id, None);
                assert_eq!(*current_highlighted_id, Some(1));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_resume_with_nothing_stored_stays_uninitialized() {
        let mut session = QuizSession::new(QuizStore::open_in_memory().unwrap());
        let events = record_events(&session, QuizEventKind::QuizStart);
        assert!(!session.resume_existing_quiz().unwrap());
        assert!(!session.started());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn test_round_trip_resume_after_reload() {
        let db_path = std::env::temp_dir().join(format!(
            "cartoquiz-test-{}.sqlite",
            uuid::Uuid::new_v4()
        ));
        {
            let mut session = QuizSession::new(QuizStore::open(&db_path).unwrap());
            session
                .start_new_quiz(quiz_info(city_features(), "name"))
                .unwrap();
            session.set_filters(vec![Filter::new("country", "DE")]);
            session.make_guess("berlin").unwrap();
        }
        {
            let mut session = QuizSession::new(QuizStore::open(&db_path).unwrap());
            assert!(session.resume_existing_quiz().unwrap());
            assert_eq!(session.match_property(), Some("name"));
            assert_eq!(session.data_source(), Some("test data"));
            assert_eq!(session.features().len(), 2);
            // Filters reset to empty on resume
            assert!(session.filters().is_empty());
            assert_eq!(session.filtered_features().len(), 2);
            let guessed = session.guessed_features();
            assert_eq!(guessed.len(), 1);
            assert_eq!(guessed[0].id, Some(0));
            // Guessing continues where the previous session left off
            assert!(session.make_guess("berlin").unwrap().is_empty());
            assert_eq!(session.make_guess("paris").unwrap().len(), 1);
        }
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(db_path.with_extension("sqlite-wal"));
        let _ = std::fs::remove_file(db_path.with_extension("sqlite-shm"));
    }

    #[test]
    fn test_starting_again_replaces_previous_quiz() {
        let mut session = started_session(city_features(), "name");
        session.make_guess("berlin").unwrap();
        session.set_filters(vec![Filter::new("country", "DE")]);

        let features = vec![feature(json!({ "name": "Tokyo", "country": "JP" }))];
        session.start_new_quiz(quiz_info(features, "name")).unwrap();

        assert_eq!(session.features().len(), 1);
        assert!(session.filters().is_empty());
        assert!(session.guessed_features().is_empty());
        assert_eq!(session.highlighted_feature_id(), None);
    }
}
