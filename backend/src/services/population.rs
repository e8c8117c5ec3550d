//! Population data service.
//!
//! Loads externally supplied population records, validates them, and keeps the
//! accepted set as an immutable snapshot that is replaced wholesale on reload.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::api::PointId;
use crate::error::{ErrorContext, ValidationError};
use crate::models::{validate_coordinates, BoundingBox, LatLng, PopulationPoint, PopulationRecord};

/// Outcome of a population load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulationLoad {
    /// Points that passed validation, in input order.
    #[serde(skip)]
    pub points: Vec<PopulationPoint>,
    pub accepted: usize,
    pub skipped: usize,
    /// One entry per skipped record.
    #[serde(serialize_with = "serialize_issues")]
    pub issues: Vec<ValidationError>,
    pub bounds: Option<BoundingBox>,
}

fn serialize_issues<S>(issues: &[ValidationError], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(issues.iter().map(|e| e.to_string()))
}

fn record_context(index: usize) -> ErrorContext {
    ErrorContext::new("load_population")
        .with_entity("population_record")
        .with_entity_id(index)
}

fn validate_record(record: &PopulationRecord) -> Result<(), ValidationError> {
    validate_coordinates(record.lat, record.lon)?;
    if !record.weight.is_finite() || record.weight < 0.0 {
        return Err(ValidationError::new(format!(
            "Weight must be finite and non-negative (got {})",
            record.weight
        )));
    }
    Ok(())
}

/// Validate records and build population points.
///
/// Invalid records (bad coordinates, negative or non-finite weight, duplicate
/// id) are dropped and reported in [`PopulationLoad::issues`]. Records without
/// an id get sequential ids after the largest explicit one.
pub fn load_population<I>(records: I) -> PopulationLoad
where
    I: IntoIterator<Item = PopulationRecord>,
{
    let records: Vec<PopulationRecord> = records.into_iter().collect();
    let mut next_id = records
        .iter()
        .filter_map(|r| r.id)
        .max()
        .map_or(1, |max| max.saturating_add(1));

    let mut load = PopulationLoad::default();
    let mut seen: HashSet<i64> = HashSet::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        if let Err(e) = validate_record(&record) {
            load.issues.push(e.in_context(record_context(index)));
            continue;
        }

        let id = match record.id {
            Some(id) => id,
            None => {
                let id = next_id;
                next_id = next_id.saturating_add(1);
                id
            }
        };
        if !seen.insert(id) {
            load.issues.push(ValidationError::with_context(
                format!("Duplicate population point id {}", id),
                record_context(index),
            ));
            continue;
        }

        load.points.push(PopulationPoint::new(
            PointId(id),
            LatLng::new(record.lat, record.lon),
            record.weight,
        ));
    }

    load.accepted = load.points.len();
    load.skipped = load.issues.len();
    load.bounds = BoundingBox::from_points(load.points.iter().map(|p| p.location));
    load
}

/// Parse a JSON array of population records.
///
/// The document itself must be an array; anything else is an error carrying
/// the JSON path. Individual records that do not deserialize are skipped and
/// counted like any other invalid record.
pub fn parse_population_json(json: &str) -> Result<PopulationLoad, ValidationError> {
    let deserializer = &mut serde_json::Deserializer::from_str(json);
    let values: Vec<serde_json::Value> =
        serde_path_to_error::deserialize(deserializer).map_err(|e| {
            ValidationError::with_context(
                format!("Population document is not a JSON array of records: {}", e),
                ErrorContext::new("parse_population_json").with_details(e.path().to_string()),
            )
        })?;

    let mut parse_issues = Vec::new();
    let mut records = Vec::with_capacity(values.len());
    let mut original_index = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<PopulationRecord>(value) {
            Ok(record) => {
                records.push(record);
                original_index.push(index);
            }
            Err(e) => parse_issues.push(ValidationError::with_context(
                format!("Malformed population record: {}", e),
                record_context(index),
            )),
        }
    }

    let mut load = load_population(records);
    // Re-point validation issues at indices of the original document.
    for issue in &mut load.issues {
        if let Some(idx) = issue
            .context
            .entity_id
            .as_deref()
            .and_then(|s| s.parse::<usize>().ok())
        {
            if let Some(original) = original_index.get(idx) {
                issue.context.entity_id = Some(original.to_string());
            }
        }
    }
    load.issues.extend(parse_issues);
    load.skipped = load.issues.len();
    Ok(load)
}

/// Owner of the current population snapshot.
#[derive(Clone, Default)]
pub struct PopulationService {
    points: Arc<RwLock<Arc<Vec<PopulationPoint>>>>,
}

impl PopulationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service pre-loaded with already validated points.
    pub fn with_points(points: Vec<PopulationPoint>) -> Self {
        Self {
            points: Arc::new(RwLock::new(Arc::new(points))),
        }
    }

    /// Load records, replacing the current population.
    pub fn load<I>(&self, records: I) -> PopulationLoad
    where
        I: IntoIterator<Item = PopulationRecord>,
    {
        let load = load_population(records);
        self.install(&load);
        load
    }

    /// Load a JSON array of records, replacing the current population.
    ///
    /// A document-level parse error leaves the current population untouched.
    pub fn load_json(&self, json: &str) -> Result<PopulationLoad, ValidationError> {
        let load = parse_population_json(json)?;
        self.install(&load);
        Ok(load)
    }

    /// Replace the population with already validated points.
    pub fn replace(&self, points: Vec<PopulationPoint>) {
        log::info!("Replaced population: {} points", points.len());
        *self.points.write() = Arc::new(points);
    }

    fn install(&self, load: &PopulationLoad) {
        log::info!(
            "Loaded population: {} points accepted, {} records skipped",
            load.accepted,
            load.skipped
        );
        for issue in load.issues.iter().take(10) {
            log::debug!("Skipped population record: {}", issue);
        }
        *self.points.write() = Arc::new(load.points.clone());
    }

    /// Current snapshot; cheap to clone and never mutated.
    pub fn points(&self) -> Arc<Vec<PopulationPoint>> {
        Arc::clone(&self.points.read())
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.points.read().iter().map(|p| p.weight).sum()
    }

    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.points.read().iter().map(|p| p.location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: Option<i64>, lat: f64, lon: f64, weight: f64) -> PopulationRecord {
        PopulationRecord::new(id, lat, lon, weight)
    }

    #[test]
    fn test_load_valid_records() {
        let load = load_population(vec![
            record(Some(1), 52.5, 13.4, 10.0),
            record(Some(2), 52.6, 13.5, 0.0),
        ]);
        assert_eq!(load.accepted, 2);
        assert_eq!(load.skipped, 0);
        assert_eq!(load.points[1].weight, 0.0);
        assert_eq!(load.bounds, Some(BoundingBox::new(52.5, 13.4, 52.6, 13.5)));
    }

    #[test]
    fn test_invalid_records_skipped_and_counted() {
        let load = load_population(vec![
            record(Some(1), 95.0, 0.0, 1.0),
            record(Some(2), 0.0, 0.0, -5.0),
            record(Some(3), 0.0, f64::NAN, 1.0),
            record(Some(4), 0.0, 0.0, f64::INFINITY),
            record(Some(5), 10.0, 10.0, 3.0),
        ]);
        assert_eq!(load.accepted, 1);
        assert_eq!(load.skipped, 4);
        assert_eq!(load.points[0].id, PointId(5));
        assert_eq!(load.issues[1].context.entity_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_missing_ids_assigned_after_max() {
        let load = load_population(vec![
            record(None, 0.0, 0.0, 1.0),
            record(Some(10), 0.0, 0.0, 1.0),
            record(None, 0.0, 0.0, 1.0),
        ]);
        let ids: Vec<i64> = load.points.iter().map(|p| p.id.value()).collect();
        assert_eq!(ids, vec![11, 10, 12]);
    }

    #[test]
    fn test_duplicate_ids_skipped() {
        let load = load_population(vec![
            record(Some(1), 0.0, 0.0, 1.0),
            record(Some(1), 1.0, 1.0, 2.0),
        ]);
        assert_eq!(load.accepted, 1);
        assert_eq!(load.skipped, 1);
        assert!(load.issues[0].message.contains("Duplicate"));
    }

    #[test]
    fn test_parse_json_with_aliases_and_malformed() {
        let json = r#"[
            {"id": 1, "lat": 48.1, "lon": 11.5, "weight": 100},
            {"latitude": 48.2, "lng": 11.6, "population": 50},
            {"lat": "north", "lon": 11.6, "weight": 1},
            {"lat": 48.3, "lon": 11.7},
            {"lat": 148.3, "lon": 11.7, "weight": 2}
        ]"#;
        let load = parse_population_json(json).unwrap();
        assert_eq!(load.accepted, 2);
        assert_eq!(load.skipped, 3);
        assert_eq!(load.points[1].id, PointId(2));
        assert_eq!(load.points[1].weight, 50.0);
        // The out-of-range record was the fifth element of the document.
        assert!(load
            .issues
            .iter()
            .any(|i| i.context.entity_id.as_deref() == Some("4")));
    }

    #[test]
    fn test_parse_json_document_error() {
        let err = parse_population_json(r#"{"lat": 1}"#).unwrap_err();
        assert!(err.message.contains("not a JSON array"));
    }

    #[test]
    fn test_service_replaces_snapshot() {
        let service = PopulationService::new();
        assert!(service.is_empty());

        service.load(vec![record(Some(1), 0.0, 0.0, 5.0), record(Some(2), 1.0, 1.0, 7.0)]);
        let first = service.points();
        assert_eq!(service.len(), 2);
        assert_eq!(service.total_weight(), 12.0);

        service.load(vec![record(Some(3), 0.0, 0.0, 1.0)]);
        assert_eq!(service.len(), 1);
        // Earlier snapshots stay intact.
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_load_json_error_keeps_population() {
        let service = PopulationService::new();
        service.load(vec![record(Some(1), 0.0, 0.0, 5.0)]);
        assert!(service.load_json("not json").is_err());
        assert_eq!(service.len(), 1);
    }
}
