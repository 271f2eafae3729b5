//! Fan-out of distance queries over one category and reduction to the
//! nearest station.

use std::str::FromStr;

use itertools::{Either, Itertools};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use crate::centers::{Category, LatLng, Registry};
use crate::provider::{DistanceProvider, DistanceQueryResult, ProviderError};

/// What to do when a provider call fails partway through a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failure aborts the aggregation. Remaining stations are not
    /// queried and nothing collected so far is returned.
    #[default]
    AllOrNothing,
    /// Failed stations are left out. Fails only when every station failed.
    PartialSuccess,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all-or-nothing" | "strict" => Ok(FailurePolicy::AllOrNothing),
            "partial" | "partial-success" => Ok(FailurePolicy::PartialSuccess),
            other => Err(format!("unknown aggregation policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StationDistance {
    pub name: String,
    pub location: LatLng,
    pub result: DistanceQueryResult,
}

/// Successful lookups for one origin and category, in registry order.
///
/// Serializes as `{name: {distance, duration}}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedResult {
    entries: Vec<StationDistance>,
}

impl AggregatedResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StationDistance> {
        self.entries.iter()
    }
}

impl FromIterator<StationDistance> for AggregatedResult {
    fn from_iter<I: IntoIterator<Item = StationDistance>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Serialize for AggregatedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.result)?;
        }
        map.end()
    }
}

/// Queries `provider` once per station of `category`, in registry order.
///
/// An absent or empty category yields an empty result, not an error.
pub async fn aggregate(
    origin: LatLng,
    category: Category,
    registry: &Registry,
    provider: &dyn DistanceProvider,
    policy: FailurePolicy,
) -> Result<AggregatedResult, ProviderError> {
    let centers = registry.centers(category);
    debug!(%category, stations = centers.len(), ?policy, "aggregating distances");

    match policy {
        FailurePolicy::AllOrNothing => {
            let mut entries = Vec::with_capacity(centers.len());
            for center in centers {
                let result = provider
                    .distance(origin, center.location)
                    .await
                    .inspect_err(|e| {
                        warn!(station = %center.name, error = %e, "aborting aggregation")
                    })?;
                entries.push(StationDistance {
                    name: center.name.clone(),
                    location: center.location,
                    result,
                });
            }
            Ok(AggregatedResult { entries })
        }
        FailurePolicy::PartialSuccess => {
            let mut outcomes = Vec::with_capacity(centers.len());
            for center in centers {
                outcomes.push((center, provider.distance(origin, center.location).await));
            }

            let (entries, errors): (Vec<_>, Vec<_>) =
                outcomes
                    .into_iter()
                    .partition_map(|(center, outcome)| match outcome {
                        Ok(result) => Either::Left(StationDistance {
                            name: center.name.clone(),
                            location: center.location,
                            result,
                        }),
                        Err(e) => {
                            warn!(station = %center.name, error = %e, "skipping station");
                            Either::Right(e)
                        }
                    });

            match errors.into_iter().next() {
                Some(first) if entries.is_empty() => Err(first),
                _ => Ok(AggregatedResult { entries }),
            }
        }
    }
}

/// Comparison key taken from a distance display text: the leading numeral,
/// unit ignored ("3.2 km" -> 3.2, "1,204 km" -> 1204.0).
///
/// Mixed units across results ("km" vs "mi") compare wrongly. Results from a
/// single provider request all use one unit system.
pub fn distance_key(text: &str) -> Option<f64> {
    let numeral = text.split_whitespace().next()?;
    numeral
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// The entry with the smallest display distance; ties go to the earliest
/// entry. Entries whose distance has no leading numeral are never picked.
pub fn nearest(result: &AggregatedResult) -> Option<&StationDistance> {
    nearest_by(result, |r| distance_key(&r.distance))
}

/// [`nearest`] with a caller-supplied comparison key.
pub fn nearest_by<F>(result: &AggregatedResult, key: F) -> Option<&StationDistance>
where
    F: Fn(&DistanceQueryResult) -> Option<f64>,
{
    result
        .iter()
        .filter_map(|entry| key(&entry.result).map(|k| (k, entry)))
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, entry)| entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::centers::fixtures::*;
    use crate::provider::testing::ScriptedProvider;

    const ORIGIN: LatLng = LatLng {
        lat: 25.13,
        lng: 55.42,
    };
    const A: LatLng = LatLng {
        lat: 25.10,
        lng: 55.40,
    };
    const B: LatLng = LatLng {
        lat: 25.20,
        lng: 55.45,
    };

    fn fire_registry() -> Registry {
        let file = registry_file(FIRE_AND_POLICE);
        Registry::load(file.path()).unwrap()
    }

    fn station<'a>(result: &'a AggregatedResult, name: &str) -> Option<&'a StationDistance> {
        result.iter().find(|e| e.name == name)
    }

    fn entry(name: &str, distance: &str) -> StationDistance {
        StationDistance {
            name: name.to_string(),
            location: ORIGIN,
            result: DistanceQueryResult {
                distance: distance.to_string(),
                duration: "1 min".to_string(),
            },
        }
    }

    #[test]
    fn test_distance_key() {
        assert_eq!(distance_key("3.2 km"), Some(3.2));
        assert_eq!(distance_key("12 km"), Some(12.0));
        assert_eq!(distance_key("0.4 mi"), Some(0.4));
        assert_eq!(distance_key("1,204 km"), Some(1204.0));
        assert_eq!(distance_key("  7 m"), Some(7.0));
        assert_eq!(distance_key("km"), None);
        assert_eq!(distance_key(""), None);
    }

    #[test]
    fn test_failure_policy_from_str() {
        assert_eq!(
            "all-or-nothing".parse::<FailurePolicy>(),
            Ok(FailurePolicy::AllOrNothing)
        );
        assert_eq!(
            "Partial".parse::<FailurePolicy>(),
            Ok(FailurePolicy::PartialSuccess)
        );
        assert!("sometimes".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::AllOrNothing);
    }

    #[tokio::test]
    async fn test_aggregate_one_entry_per_station() {
        let registry = fire_registry();
        let provider = ScriptedProvider::new()
            .reply(A, "5.0 km", "10 mins")
            .reply(B, "2.1 km", "4 mins");

        let result = aggregate(
            ORIGIN,
            Category::Fire,
            &registry,
            &provider,
            FailurePolicy::AllOrNothing,
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(station(&result, "Station A").unwrap().result.distance, "5.0 km");
        assert_eq!(station(&result, "Station B").unwrap().result.duration, "4 mins");
        assert_eq!(station(&result, "Station B").unwrap().location, B);
        assert_eq!(provider.calls(), vec![A, B]);
    }

    #[tokio::test]
    async fn test_aggregate_absent_category_is_empty() {
        let registry = fire_registry();
        let provider = ScriptedProvider::new();

        let result = aggregate(
            ORIGIN,
            Category::Hospital,
            &registry,
            &provider,
            FailurePolicy::AllOrNothing,
        )
        .await
        .unwrap();

        assert!(result.is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_first_failure_aborts_without_partial_results() {
        let registry = fire_registry();
        let provider = ScriptedProvider::new()
            .fail(
                A,
                ProviderError::Status {
                    status: "OVER_QUERY_LIMIT".to_string(),
                    message: None,
                },
            )
            .reply(B, "2.1 km", "4 mins");

        let err = aggregate(
            ORIGIN,
            Category::Fire,
            &registry,
            &provider,
            FailurePolicy::AllOrNothing,
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("OVER_QUERY_LIMIT"));
        // B is never queried once A fails.
        assert_eq!(provider.calls(), vec![A]);
    }

    #[tokio::test]
    async fn test_failure_after_success_discards_collected() {
        let registry = fire_registry();
        let provider = ScriptedProvider::new()
            .reply(A, "5.0 km", "10 mins")
            .fail(B, ProviderError::Element("ZERO_RESULTS".to_string()));

        let outcome = aggregate(
            ORIGIN,
            Category::Fire,
            &registry,
            &provider,
            FailurePolicy::AllOrNothing,
        )
        .await;

        assert_eq!(
            outcome,
            Err(ProviderError::Element("ZERO_RESULTS".to_string()))
        );
    }

    #[tokio::test]
    async fn test_partial_success_skips_failed_stations() {
        let registry = fire_registry();
        let provider = ScriptedProvider::new()
            .fail(A, ProviderError::Element("ZERO_RESULTS".to_string()))
            .reply(B, "2.1 km", "4 mins");

        let result = aggregate(
            ORIGIN,
            Category::Fire,
            &registry,
            &provider,
            FailurePolicy::PartialSuccess,
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 1);
        assert!(station(&result, "Station A").is_none());
        assert_eq!(provider.calls(), vec![A, B]);
    }

    #[tokio::test]
    async fn test_partial_success_reports_first_error_when_all_fail() {
        let registry = fire_registry();
        let provider = ScriptedProvider::new()
            .fail(A, ProviderError::Element("NOT_FOUND".to_string()))
            .fail(B, ProviderError::Element("ZERO_RESULTS".to_string()));

        let err = aggregate(
            ORIGIN,
            Category::Fire,
            &registry,
            &provider,
            FailurePolicy::PartialSuccess,
        )
        .await
        .unwrap_err();

        assert_eq!(err, ProviderError::Element("NOT_FOUND".to_string()));
    }

    #[test]
    fn test_nearest_picks_smallest() {
        let result: AggregatedResult = vec![
            entry("A", "5.0 km"),
            entry("B", "2.1 km"),
            entry("C", "12 km"),
        ]
        .into_iter()
        .collect();

        assert_eq!(nearest(&result).unwrap().name, "B");
    }

    #[test]
    fn test_nearest_tie_goes_to_first() {
        let result: AggregatedResult = vec![
            entry("First", "3.0 km"),
            entry("Second", "3 km"),
            entry("Third", "4.5 km"),
        ]
        .into_iter()
        .collect();

        assert_eq!(nearest(&result).unwrap().name, "First");
    }

    #[test]
    fn test_nearest_empty_is_none() {
        assert!(nearest(&AggregatedResult::default()).is_none());
    }

    #[test]
    fn test_nearest_skips_unparseable() {
        let result: AggregatedResult = vec![entry("Odd", "n/a"), entry("Fine", "9.9 km")]
            .into_iter()
            .collect();
        assert_eq!(nearest(&result).unwrap().name, "Fine");

        let result: AggregatedResult = vec![entry("Odd", "n/a")].into_iter().collect();
        assert!(nearest(&result).is_none());
    }

    #[test]
    fn test_nearest_by_custom_key() {
        let result: AggregatedResult = vec![entry("A", "5.0 km"), entry("B", "2.1 km")]
            .into_iter()
            .collect();

        // Longest instead of shortest.
        let farthest = nearest_by(&result, |r| distance_key(&r.distance).map(|d| -d));
        assert_eq!(farthest.unwrap().name, "A");
    }

    #[test]
    fn test_serializes_as_name_map_in_order() {
        let result: AggregatedResult = vec![entry("Zulu", "1 km"), entry("Alpha", "2 km")]
            .into_iter()
            .collect();

        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(
            json,
            r#"{"Zulu":{"distance":"1 km","duration":"1 min"},"Alpha":{"distance":"2 km","duration":"1 min"}}"#
        );
    }
}
