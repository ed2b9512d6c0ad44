//! Static catalog of the four function units.
//!
//! Sizing is fixed per unit and does not vary by environment. Consumers are
//! short and light; the batch jobs get more time and memory.

use crate::types::{FunctionUnit, Schedule};
use std::time::Duration;

pub const CONTACT_CONSUMER: FunctionUnit = FunctionUnit {
    logical_name: "contact-consumer",
    construct_id: "ContactConsumer",
    source_subdir: "contact_consumer",
    timeout: Duration::from_secs(60),
    memory_size: 512,
};

pub const LISTING_CONSUMER: FunctionUnit = FunctionUnit {
    logical_name: "listing-consumer",
    construct_id: "ListingConsumer",
    source_subdir: "listing_consumer",
    timeout: Duration::from_secs(60),
    memory_size: 512,
};

pub const SCORE_DECAY: FunctionUnit = FunctionUnit {
    logical_name: "score-decay",
    construct_id: "ScoreDecay",
    source_subdir: "score_decay",
    timeout: Duration::from_secs(5 * 60),
    memory_size: 1024,
};

pub const CARD_REFRESH: FunctionUnit = FunctionUnit {
    logical_name: "card-refresh",
    construct_id: "CardRefresh",
    source_subdir: "card_refresh",
    timeout: Duration::from_secs(5 * 60),
    memory_size: 1024,
};

/// Declaration order is also template order.
pub static ALL: [FunctionUnit; 4] = [CONTACT_CONSUMER, LISTING_CONSUMER, SCORE_DECAY, CARD_REFRESH];

/// Finds a unit by logical name (`score-decay`) or source dir (`score_decay`).
pub fn lookup(name: &str) -> Option<&'static FunctionUnit> {
    ALL.iter()
        .find(|u| u.logical_name == name || u.source_subdir == name)
}

/// Scheduled trigger for a unit, if it has one. Consumers are driven by
/// external event sources.
pub fn schedule_for(unit: &FunctionUnit) -> Option<Schedule> {
    match unit.logical_name {
        "score-decay" => Some(Schedule::Daily { hour: 2, minute: 0 }),
        "card-refresh" => Some(Schedule::Every { minutes: 15 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn deployed_names_unique_and_deterministic() {
        for env in ["dev", "prod", "staging"] {
            let names: HashSet<String> = ALL.iter().map(|u| u.deployed_name(env)).collect();
            assert_eq!(names.len(), ALL.len());
            for u in &ALL {
                assert_eq!(u.deployed_name(env), u.deployed_name(env));
                assert!(u.deployed_name(env).ends_with(&format!("-{env}")));
            }
        }
        assert_eq!(
            SCORE_DECAY.deployed_name("prod"),
            "rise-scout-score-decay-prod"
        );
    }

    #[test]
    fn lookup_by_either_name() {
        assert_eq!(lookup("score_decay"), Some(&ALL[2]));
        assert_eq!(lookup("card-refresh"), Some(&ALL[3]));
        assert!(lookup("nope").is_none());
    }

    #[test]
    fn only_batch_units_are_scheduled() {
        let scheduled: Vec<_> = ALL
            .iter()
            .filter(|u| schedule_for(u).is_some())
            .map(|u| u.logical_name)
            .collect();
        assert_eq!(scheduled, vec!["score-decay", "card-refresh"]);
    }

    #[test]
    fn batch_units_get_longer_timeout_and_more_memory() {
        assert!(SCORE_DECAY.timeout > CONTACT_CONSUMER.timeout);
        assert!(CARD_REFRESH.memory_size > LISTING_CONSUMER.memory_size);
        assert_eq!(CONTACT_CONSUMER.handler_path(), "lambdas.contact_consumer.handler.handler");
    }
}
