//! ==============================================================================
//! router.rs - topic classification
//! ==============================================================================
//!
//! purpose:
//!     maps an incoming topic string onto the canonical field model.
//!     two independent naming schemes are supported:
//!     - primary:  `<prefix>/<sensor>` with sensor in {battery, level, tds, ph}
//!     - legacy:   exact `water/level` and `water/quality/<subfield>`
//!
//!     the primary scheme is tested first; legacy schemes only apply to
//!     topics that miss the primary prefix. anything else is Unrouted and
//!     reaches the diagnostic log but never the canonical model.
//!
//! relationships:
//!     - used by: hub.rs (classify, then extract a Reading from the payload)
//!     - uses: payload.rs (decoded payload tiers)
//!
//! ==============================================================================

use crate::domain::{FieldId, Reading};
use crate::payload::ParsedPayload;
use chrono::{DateTime, Utc};
use serde_json::Value;

const LEGACY_LEVEL_TOPIC: &str = "water/level";
const LEGACY_QUALITY_PREFIX: &str = "water/quality/";

/// where a topic landed. new schemes become new variants; existing handlers
/// stay untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteResult {
    /// primary scheme sensor. tds cross-maps to turbidity; battery is
    /// diagnostic-only and never fed into the canonical model.
    Structured(FieldId),
    /// exact legacy topic `water/level`
    LegacyLevel,
    /// legacy quality topic `water/quality/<subfield>`
    LegacyQuality(FieldId),
    /// matches neither scheme; logged, never applied
    Unrouted,
}

pub struct TopicRouter {
    primary_prefix: String,
}

impl TopicRouter {
    pub fn new(primary_prefix: impl Into<String>) -> Self {
        Self {
            primary_prefix: primary_prefix.into(),
        }
    }

    pub fn primary_pattern(&self) -> String {
        format!("{}/#", self.primary_prefix)
    }

    /// classify a topic against both naming schemes, primary first
    pub fn route(&self, topic: &str) -> RouteResult {
        if let Some(rest) = topic.strip_prefix(&self.primary_prefix) {
            if let Some(segment) = rest.strip_prefix('/') {
                return match segment {
                    "battery" => RouteResult::Structured(FieldId::Battery),
                    "level" => RouteResult::Structured(FieldId::Level),
                    // deliberate cross-mapping: tds readings drive turbidity
                    "tds" => RouteResult::Structured(FieldId::Turbidity),
                    "ph" => RouteResult::Structured(FieldId::Ph),
                    _ => RouteResult::Unrouted,
                };
            }
        }
        if topic == LEGACY_LEVEL_TOPIC {
            return RouteResult::LegacyLevel;
        }
        if let Some(subfield) = topic.strip_prefix(LEGACY_QUALITY_PREFIX) {
            return match subfield {
                "ph" => RouteResult::LegacyQuality(FieldId::Ph),
                "temperature" => RouteResult::LegacyQuality(FieldId::Temperature),
                "turbidity" => RouteResult::LegacyQuality(FieldId::Turbidity),
                "dissolved_oxygen" => RouteResult::LegacyQuality(FieldId::DissolvedOxygen),
                _ => RouteResult::Unrouted,
            };
        }
        RouteResult::Unrouted
    }

    /// turn a classified topic plus decoded payload into a Reading.
    /// returns none when the payload does not carry a usable value for the
    /// route (e.g. a non-numeric body under the primary scheme) - the caller
    /// still logs the raw message.
    pub fn extract_reading(
        &self,
        route: RouteResult,
        parsed: &ParsedPayload,
        topic: &str,
        observed_at: DateTime<Utc>,
    ) -> Option<Reading> {
        let (field, value) = match route {
            // primary sensors publish bare numbers; anything else is dropped
            RouteResult::Structured(field) => (field, parsed.as_number().map(Value::from)?),
            // json body with a `level` property, or the bare value itself
            RouteResult::LegacyLevel => {
                let value = parsed
                    .as_json()
                    .and_then(|v| v.get("level").cloned())
                    .unwrap_or_else(|| parsed.to_value());
                (FieldId::Level, value)
            }
            // json body with a `value` property, or the bare value itself
            RouteResult::LegacyQuality(field) => {
                let value = parsed
                    .as_json()
                    .and_then(|v| v.get("value").cloned())
                    .unwrap_or_else(|| parsed.to_value());
                (field, value)
            }
            RouteResult::Unrouted => return None,
        };
        Some(Reading {
            field,
            value,
            source_topic: topic.to_string(),
            observed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload;
    use serde_json::json;

    fn router() -> TopicRouter {
        TopicRouter::new("root/water")
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn primary_scheme_routes_known_sensors() {
        let r = router();
        assert_eq!(r.route("root/water/level"), RouteResult::Structured(FieldId::Level));
        assert_eq!(r.route("root/water/ph"), RouteResult::Structured(FieldId::Ph));
        assert_eq!(r.route("root/water/battery"), RouteResult::Structured(FieldId::Battery));
    }

    #[test]
    fn tds_cross_maps_to_turbidity() {
        let r = router();
        assert_eq!(r.route("root/water/tds"), RouteResult::Structured(FieldId::Turbidity));
    }

    #[test]
    fn primary_prefix_wins_over_legacy() {
        // unknown segment under the primary prefix does not fall through to
        // the legacy schemes
        let r = TopicRouter::new("water");
        assert_eq!(r.route("water/level"), RouteResult::Structured(FieldId::Level));
        assert_eq!(r.route("water/flow"), RouteResult::Unrouted);
    }

    #[test]
    fn legacy_topics_route_when_primary_misses() {
        let r = router();
        assert_eq!(r.route("water/level"), RouteResult::LegacyLevel);
        assert_eq!(
            r.route("water/quality/ph"),
            RouteResult::LegacyQuality(FieldId::Ph)
        );
        assert_eq!(
            r.route("water/quality/dissolved_oxygen"),
            RouteResult::LegacyQuality(FieldId::DissolvedOxygen)
        );
    }

    #[test]
    fn unknown_topics_are_unrouted() {
        let r = router();
        assert_eq!(r.route("foo/bar"), RouteResult::Unrouted);
        assert_eq!(r.route("water/quality/chlorine"), RouteResult::Unrouted);
        assert_eq!(r.route("root/water"), RouteResult::Unrouted);
    }

    #[test]
    fn structured_reading_requires_numeric_payload() {
        let r = router();
        let route = r.route("root/water/level");
        let ok = r.extract_reading(route, &payload::parse(b"42.5"), "root/water/level", now());
        assert_eq!(ok.unwrap().value, json!(42.5));

        let bad = r.extract_reading(route, &payload::parse(b"oops"), "root/water/level", now());
        assert!(bad.is_none());
    }

    #[test]
    fn legacy_quality_takes_value_property_or_bare_number() {
        let r = router();
        let route = r.route("water/quality/ph");

        let wrapped =
            r.extract_reading(route, &payload::parse(br#"{"value": 7.9}"#), "water/quality/ph", now());
        assert_eq!(wrapped.unwrap().value, json!(7.9));

        let bare = r.extract_reading(route, &payload::parse(b"7.9"), "water/quality/ph", now());
        assert_eq!(bare.unwrap().value, json!(7.9));
    }

    #[test]
    fn legacy_level_takes_level_property_or_bare_value() {
        let r = router();
        let route = r.route("water/level");

        let wrapped =
            r.extract_reading(route, &payload::parse(br#"{"level": 12.0}"#), "water/level", now());
        assert_eq!(wrapped.unwrap().value, json!(12.0));

        let bare = r.extract_reading(route, &payload::parse(b"12"), "water/level", now());
        assert_eq!(bare.unwrap().value, json!(12.0));
    }

    #[test]
    fn unrouted_yields_no_reading() {
        let r = router();
        let reading = r.extract_reading(RouteResult::Unrouted, &payload::parse(b"123"), "foo/bar", now());
        assert!(reading.is_none());
    }
}
