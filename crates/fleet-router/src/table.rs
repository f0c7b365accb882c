//! Route table — per-class targets and round-robin counters.
//!
//! Unhealthy targets stay in the list and are skipped by selection, so
//! they can recover in place. A per-class atomic counter drives the
//! rotation; it advances on every selection regardless of outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::RouterError;

/// One backend instance of a service class.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteTarget {
    pub url: String,
    pub name: String,
    pub healthy: bool,
    pub consecutive_failures: u32,
}

impl RouteTarget {
    fn new(url: String, name: String) -> Self {
        Self {
            url,
            name,
            healthy: true,
            consecutive_failures: 0,
        }
    }
}

struct ClassEntry {
    targets: Vec<RouteTarget>,
    counter: AtomicU64,
}

/// Snapshot of one class for the status surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSnapshot {
    pub targets: Vec<RouteTarget>,
    pub round_robin: u64,
}

/// Health-aware routing table. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct RouteTable {
    classes: Arc<RwLock<HashMap<String, ClassEntry>>>,
    failure_threshold: u32,
    evict_vanished: bool,
}

impl RouteTable {
    pub fn new(failure_threshold: u32, evict_vanished: bool) -> Self {
        Self {
            classes: Arc::new(RwLock::new(HashMap::new())),
            failure_threshold,
            evict_vanished,
        }
    }

    /// Register a class with its (possibly empty) static seed targets.
    pub fn add_class(&self, class: &str, urls: &[String]) {
        let mut classes = self.classes.write().expect("classes lock");
        classes.entry(class.to_string()).or_insert_with(|| ClassEntry {
            targets: urls
                .iter()
                .map(|u| RouteTarget::new(u.clone(), u.clone()))
                .collect(),
            counter: AtomicU64::new(0),
        });
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.read().expect("classes lock").contains_key(class)
    }

    pub fn class_names(&self) -> Vec<String> {
        self.classes.read().expect("classes lock").keys().cloned().collect()
    }

    /// Pick the next healthy target url for a class.
    ///
    /// Round-robin over the healthy subset: the shared counter always
    /// advances, unhealthy targets are skipped without being removed.
    pub fn next_healthy(&self, class: &str) -> Result<RouteTarget, RouterError> {
        let classes = self.classes.read().expect("classes lock");
        let entry = classes
            .get(class)
            .ok_or_else(|| RouterError::UnknownClass(class.to_string()))?;

        let healthy: Vec<&RouteTarget> = entry.targets.iter().filter(|t| t.healthy).collect();
        if healthy.is_empty() {
            return Err(RouterError::NoHealthyTarget(class.to_string()));
        }

        let idx = entry.counter.fetch_add(1, Ordering::Relaxed) as usize % healthy.len();
        Ok(healthy[idx].clone())
    }

    /// Record a failed dispatch or probe against a target.
    ///
    /// Returns true when this failure crossed the threshold and flipped
    /// the target unhealthy.
    pub fn record_failure(&self, class: &str, url: &str) -> bool {
        let mut classes = self.classes.write().expect("classes lock");
        let Some(entry) = classes.get_mut(class) else {
            return false;
        };
        let Some(target) = entry.targets.iter_mut().find(|t| t.url == url) else {
            return false;
        };

        target.consecutive_failures += 1;
        if target.healthy && target.consecutive_failures >= self.failure_threshold {
            target.healthy = false;
            warn!(
                %class,
                %url,
                failures = target.consecutive_failures,
                "target marked unhealthy"
            );
            return true;
        }
        false
    }

    /// Record a successful dispatch or probe against a target.
    ///
    /// Returns true when the target recovered from unhealthy.
    pub fn record_success(&self, class: &str, url: &str) -> bool {
        let mut classes = self.classes.write().expect("classes lock");
        let Some(entry) = classes.get_mut(class) else {
            return false;
        };
        let Some(target) = entry.targets.iter_mut().find(|t| t.url == url) else {
            return false;
        };

        target.consecutive_failures = 0;
        if !target.healthy {
            target.healthy = true;
            info!(%class, %url, "target recovered");
            return true;
        }
        false
    }

    /// Reconcile a class against the latest discovery result.
    ///
    /// New urls join healthy with zero failures; names are refreshed;
    /// vanished urls are marked unhealthy so in-flight references stay
    /// valid, or evicted when configured.
    pub fn reconcile(&self, class: &str, discovered: &[(String, String)]) {
        let mut classes = self.classes.write().expect("classes lock");
        let Some(entry) = classes.get_mut(class) else {
            return;
        };

        for (url, name) in discovered {
            match entry.targets.iter_mut().find(|t| &t.url == url) {
                Some(target) => target.name = name.clone(),
                None => {
                    debug!(%class, %url, "discovered new target");
                    entry.targets.push(RouteTarget::new(url.clone(), name.clone()));
                }
            }
        }

        if self.evict_vanished {
            entry
                .targets
                .retain(|t| discovered.iter().any(|(url, _)| url == &t.url));
        } else {
            for target in &mut entry.targets {
                let present = discovered.iter().any(|(url, _)| url == &target.url);
                if !present && target.healthy {
                    target.healthy = false;
                    info!(%class, url = %target.url, "target vanished from discovery");
                }
            }
        }
    }

    /// Every (class, target) pair, for the probe loop.
    pub fn all_targets(&self) -> Vec<(String, String)> {
        let classes = self.classes.read().expect("classes lock");
        classes
            .iter()
            .flat_map(|(class, entry)| {
                entry
                    .targets
                    .iter()
                    .map(move |t| (class.clone(), t.url.clone()))
            })
            .collect()
    }

    /// All currently tracked urls, for metrics pruning.
    pub fn tracked_urls(&self) -> Vec<String> {
        let classes = self.classes.read().expect("classes lock");
        classes
            .values()
            .flat_map(|entry| entry.targets.iter().map(|t| t.url.clone()))
            .collect()
    }

    /// (healthy, unhealthy) counts for a class.
    pub fn counts(&self, class: &str) -> (usize, usize) {
        let classes = self.classes.read().expect("classes lock");
        match classes.get(class) {
            Some(entry) => {
                let healthy = entry.targets.iter().filter(|t| t.healthy).count();
                (healthy, entry.targets.len() - healthy)
            }
            None => (0, 0),
        }
    }

    /// Full table snapshot for the status surface.
    pub fn snapshot(&self) -> HashMap<String, ClassSnapshot> {
        let classes = self.classes.read().expect("classes lock");
        classes
            .iter()
            .map(|(class, entry)| {
                (
                    class.clone(),
                    ClassSnapshot {
                        targets: entry.targets.clone(),
                        round_robin: entry.counter.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// Look up a target's display name.
    pub fn target_name(&self, class: &str, url: &str) -> Option<String> {
        let classes = self.classes.read().expect("classes lock");
        classes
            .get(class)?
            .targets
            .iter()
            .find(|t| t.url == url)
            .map(|t| t.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(urls: &[&str]) -> RouteTable {
        let table = RouteTable::new(3, false);
        let urls: Vec<String> = urls.iter().map(|u| u.to_string()).collect();
        table.add_class("compute", &urls);
        table
    }

    #[test]
    fn round_robin_is_fair_over_healthy_subset() {
        let table = table_with(&["http://a", "http://b", "http://c"]);

        // 3 targets x 3 rounds: each selected exactly 3 times, cyclically.
        let mut counts: HashMap<String, u32> = HashMap::new();
        let mut order = Vec::new();
        for _ in 0..9 {
            let t = table.next_healthy("compute").unwrap();
            *counts.entry(t.url.clone()).or_default() += 1;
            order.push(t.url);
        }
        assert!(counts.values().all(|&c| c == 3));
        assert_eq!(order[0], order[3]);
        assert_eq!(order[1], order[4]);
        assert_eq!(order[2], order[5]);
    }

    #[test]
    fn selection_skips_unhealthy() {
        let table = table_with(&["http://a", "http://b"]);
        for _ in 0..3 {
            table.record_failure("compute", "http://a");
        }

        for _ in 0..5 {
            assert_eq!(table.next_healthy("compute").unwrap().url, "http://b");
        }
    }

    #[test]
    fn unknown_class_is_an_error() {
        let table = table_with(&["http://a"]);
        assert!(matches!(
            table.next_healthy("ghost"),
            Err(RouterError::UnknownClass(_))
        ));
    }

    #[test]
    fn all_unhealthy_is_no_healthy_target() {
        let table = table_with(&["http://a"]);
        for _ in 0..3 {
            table.record_failure("compute", "http://a");
        }
        assert!(matches!(
            table.next_healthy("compute"),
            Err(RouterError::NoHealthyTarget(_))
        ));
    }

    #[test]
    fn failure_flips_exactly_at_threshold() {
        let table = table_with(&["http://a"]);

        assert!(!table.record_failure("compute", "http://a"));
        assert!(!table.record_failure("compute", "http://a"));
        // Third failure crosses threshold = 3.
        assert!(table.record_failure("compute", "http://a"));
        // Further failures do not re-flip.
        assert!(!table.record_failure("compute", "http://a"));

        let (healthy, unhealthy) = table.counts("compute");
        assert_eq!((healthy, unhealthy), (0, 1));
    }

    #[test]
    fn success_resets_failures_and_recovers() {
        let table = table_with(&["http://a"]);
        for _ in 0..3 {
            table.record_failure("compute", "http://a");
        }

        assert!(table.record_success("compute", "http://a"));
        let snap = table.snapshot();
        let target = &snap["compute"].targets[0];
        assert!(target.healthy);
        assert_eq!(target.consecutive_failures, 0);

        // Success on an already-healthy target is not a recovery.
        assert!(!table.record_success("compute", "http://a"));
    }

    #[test]
    fn reconcile_adds_new_and_marks_vanished() {
        let table = table_with(&["http://a", "http://b"]);
        table.reconcile(
            "compute",
            &[
                ("http://b".to_string(), "B".to_string()),
                ("http://c".to_string(), "C".to_string()),
            ],
        );

        let snap = table.snapshot();
        let targets = &snap["compute"].targets;
        assert_eq!(targets.len(), 3);

        let a = targets.iter().find(|t| t.url == "http://a").unwrap();
        assert!(!a.healthy);

        let c = targets.iter().find(|t| t.url == "http://c").unwrap();
        assert!(c.healthy);
        assert_eq!(c.name, "C");
    }

    #[test]
    fn reconcile_evicts_when_configured() {
        let table = RouteTable::new(3, true);
        table.add_class(
            "compute",
            &["http://a".to_string(), "http://b".to_string()],
        );
        table.reconcile("compute", &[("http://b".to_string(), "B".to_string())]);

        let snap = table.snapshot();
        assert_eq!(snap["compute"].targets.len(), 1);
        assert_eq!(snap["compute"].targets[0].url, "http://b");
    }

    #[test]
    fn vanished_target_reappears_healthy() {
        let table = table_with(&["http://a"]);
        table.reconcile("compute", &[]);
        assert_eq!(table.counts("compute"), (0, 1));

        // It comes back in a later pass: record_success path resets it.
        table.reconcile("compute", &[("http://a".to_string(), "A".to_string())]);
        table.record_success("compute", "http://a");
        assert_eq!(table.counts("compute"), (1, 0));
    }

    #[test]
    fn counter_advances_across_outcomes() {
        let table = table_with(&["http://a", "http://b"]);
        table.next_healthy("compute").unwrap();
        table.next_healthy("compute").unwrap();
        table.next_healthy("compute").unwrap();

        let snap = table.snapshot();
        assert_eq!(snap["compute"].round_robin, 3);
    }

    #[test]
    fn add_class_is_idempotent() {
        let table = table_with(&["http://a"]);
        table.add_class("compute", &["http://zzz".to_string()]);
        let snap = table.snapshot();
        assert_eq!(snap["compute"].targets.len(), 1);
        assert_eq!(snap["compute"].targets[0].url, "http://a");
    }
}
