//! Decay and reinforcement arithmetic over event salience.
//!
//! Effective salience ranks the "recent" briefing bucket; reinforcement
//! boosts events that keep proving useful.

use chrono::{DateTime, Utc};

use crate::constants::{DEFAULT_DECAY_RATE, DEFAULT_REINFORCEMENT_MULTIPLIER};
use crate::event::Event;
use crate::time::{now_iso, parse_iso};

/// Effective salience of an event at `now`, under the default decay rate.
pub fn effective_salience(event: &Event, now: DateTime<Utc>) -> f64 {
    effective_salience_with(event, now, DEFAULT_DECAY_RATE)
}

/// Effective salience under an explicit per-hour decay rate.
///
/// `salience × decay_rate ^ hours_since_accessed_at`, where immortal
/// events never decay. A malformed `accessed_at` returns the raw salience
/// rather than failing — bad data must not take the engine down.
pub fn effective_salience_with(event: &Event, now: DateTime<Utc>, decay_rate: f64) -> f64 {
    if event.immortal {
        return event.salience;
    }
    let Some(accessed) = parse_iso(&event.accessed_at) else {
        return event.salience;
    };
    let hours = (now - accessed).num_seconds().max(0) as f64 / 3600.0;
    event.salience * decay_rate.powf(hours)
}

/// Reinforce an event that was just retrieved, using the default multiplier.
pub fn reinforce(event: &Event) -> Event {
    reinforce_with(event, DEFAULT_REINFORCEMENT_MULTIPLIER)
}

/// Reinforce with an explicit multiplier: salience is boosted and capped at
/// 1.0, `accessed_at` advances to now, `access_count` increments. Returns a
/// new event; the original is untouched.
pub fn reinforce_with(event: &Event, multiplier: f64) -> Event {
    let mut reinforced = event.clone();
    reinforced.salience = (event.salience * multiplier).min(1.0);
    reinforced.accessed_at = now_iso();
    reinforced.access_count = event.access_count + 1;
    reinforced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use crate::time::to_iso;
    use proptest::prelude::*;

    fn event_accessed_at(ty: EventType, accessed: &str) -> Event {
        let mut e = Event::builder(ty, "content").build().unwrap();
        e.accessed_at = accessed.to_string();
        e
    }

    #[test]
    fn immortal_events_never_decay() {
        let e = event_accessed_at(EventType::DecisionMade, "2020-01-01T00:00:00Z");
        let now = Utc::now();
        assert_eq!(effective_salience(&e, now), e.salience);
    }

    #[test]
    fn mortal_events_decay_per_hour() {
        let now: DateTime<Utc> = "2026-01-02T00:00:00Z".parse().unwrap();
        let e = event_accessed_at(EventType::KnowledgeAcquired, "2026-01-01T00:00:00Z");
        let expected = 0.7 * DEFAULT_DECAY_RATE.powf(24.0);
        assert!((effective_salience(&e, now) - expected).abs() < 1e-9);
    }

    #[test]
    fn malformed_accessed_at_returns_raw_salience() {
        let e = event_accessed_at(EventType::CommandRun, "garbage");
        assert_eq!(effective_salience(&e, Utc::now()), e.salience);
    }

    #[test]
    fn future_accessed_at_does_not_boost() {
        let now: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let e = event_accessed_at(EventType::CommandRun, "2026-06-01T00:00:00Z");
        assert!(effective_salience(&e, now) <= e.salience);
    }

    #[test]
    fn reinforce_boosts_and_caps() {
        let e = Event::builder(EventType::PreferenceNoted, "tabs over spaces")
            .build()
            .unwrap();
        let r1 = reinforce(&e);
        assert!((r1.salience - (0.8f64 * 1.2).min(1.0)).abs() < 1e-9);
        assert_eq!(r1.access_count, 1);
        assert!(r1.accessed_at >= e.accessed_at);

        // Repeated reinforcement saturates at 1.0.
        let mut r = r1;
        for _ in 0..10 {
            r = reinforce(&r);
        }
        assert!(r.salience <= 1.0);
    }

    #[test]
    fn reinforce_does_not_mutate_original() {
        let e = Event::builder(EventType::TaskCompleted, "done").build().unwrap();
        let before = e.clone();
        let _ = reinforce(&e);
        assert_eq!(e.access_count, before.access_count);
        assert_eq!(e.salience, before.salience);
    }

    proptest! {
        /// Effective salience never exceeds raw salience, for any elapsed time.
        #[test]
        fn decay_is_monotone_bounded(hours in 0u32..100_000) {
            let accessed: DateTime<Utc> = "2020-01-01T00:00:00Z".parse().unwrap();
            let now = accessed + chrono::Duration::hours(i64::from(hours));
            let e = event_accessed_at(EventType::KnowledgeAcquired, &to_iso(accessed));
            let eff = effective_salience(&e, now);
            prop_assert!(eff <= e.salience + 1e-12);
            prop_assert!(eff >= 0.0);
        }

        /// Reinforcement stays clamped to [0, 1].
        #[test]
        fn reinforcement_clamps(multiplier in 0.0f64..10.0) {
            let e = Event::builder(EventType::ErrorResolved, "fixed").build().unwrap();
            let r = reinforce_with(&e, multiplier);
            prop_assert!(r.salience <= 1.0);
            prop_assert!(r.salience >= 0.0);
        }
    }
}
