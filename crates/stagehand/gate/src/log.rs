use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use stagehand_types::{Certification, PlanId};

use crate::{GateError, GateResult};

/// Append-only store of certification records, keyed by
/// `(plan_id, attempt)`.
///
/// At most one certification attempt per plan may be in flight; a
/// concurrent second attempt is refused rather than allowed to race.
#[derive(Default)]
pub struct CertificationLog {
    records: RwLock<BTreeMap<(PlanId, u32), Certification>>,
    in_flight: Arc<DashMap<PlanId, u32>>,
}

/// Reservation for one in-flight attempt; released on drop
pub struct AttemptGuard {
    plan_id: PlanId,
    attempt: u32,
    in_flight: Arc<DashMap<PlanId, u32>>,
}

impl AttemptGuard {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn plan_id(&self) -> &PlanId {
        &self.plan_id
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.plan_id);
    }
}

impl CertificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from previously persisted records
    pub fn restore(records: impl IntoIterator<Item = Certification>) -> GateResult<Self> {
        let log = Self::new();
        for record in records {
            log.append(record)?;
        }
        Ok(log)
    }

    /// Reserve the next attempt number for `plan_id`.
    pub fn begin(&self, plan_id: &PlanId) -> GateResult<AttemptGuard> {
        let attempt = self.attempts(plan_id) + 1;
        match self.in_flight.entry(plan_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(GateError::ConcurrentCertification(plan_id.clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(attempt);
                Ok(AttemptGuard {
                    plan_id: plan_id.clone(),
                    attempt,
                    in_flight: self.in_flight.clone(),
                })
            }
        }
    }

    /// Append a record. Existing keys are never overwritten.
    pub fn append(&self, certification: Certification) -> GateResult<()> {
        let key = (certification.plan_id.clone(), certification.attempt);
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&key) {
            return Err(GateError::DuplicateCertification {
                plan_id: key.0,
                attempt: key.1,
            });
        }
        records.insert(key, certification);
        Ok(())
    }

    pub fn attempts(&self, plan_id: &PlanId) -> u32 {
        self.for_plan(plan_id).len() as u32
    }

    /// Every record for a plan, by attempt
    pub fn for_plan(&self, plan_id: &PlanId) -> Vec<Certification> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .range((plan_id.clone(), 0)..=(plan_id.clone(), u32::MAX))
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn latest(&self, plan_id: &PlanId) -> Option<Certification> {
        self.for_plan(plan_id).pop()
    }

    /// Most recent certified dry run of `fingerprint` still valid at `now`
    pub fn find_valid_dry_run(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<Certification> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| c.authorizes_real_run(fingerprint, now))
            .max_by_key(|c| c.timestamp)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(plan: &str, attempt: u32, dry_run: bool, certified: bool) -> Certification {
        let now = Utc::now();
        Certification {
            plan_id: PlanId::new(plan),
            attempt,
            fingerprint: "fp".into(),
            dry_run,
            validator_results: BTreeMap::new(),
            certified,
            rejection_reasons: vec![],
            timestamp: now,
            valid_until: (dry_run && certified).then(|| now + Duration::hours(24)),
        }
    }

    #[test]
    fn append_refuses_overwrite() {
        let log = CertificationLog::new();
        log.append(record("p", 1, false, true)).unwrap();

        let err = log.append(record("p", 1, false, false)).unwrap_err();
        assert!(matches!(err, GateError::DuplicateCertification { attempt: 1, .. }));
        assert!(log.latest(&PlanId::new("p")).unwrap().certified);
    }

    #[test]
    fn concurrent_attempt_rejected_until_guard_drops() {
        let log = CertificationLog::new();
        let plan = PlanId::new("p");

        let guard = log.begin(&plan).unwrap();
        assert_eq!(guard.attempt(), 1);
        assert!(matches!(
            log.begin(&plan),
            Err(GateError::ConcurrentCertification(_))
        ));

        log.append(record("p", guard.attempt(), false, false)).unwrap();
        drop(guard);

        let second = log.begin(&plan).unwrap();
        assert_eq!(second.attempt(), 2);
    }

    #[test]
    fn records_are_scoped_by_plan() {
        let log = CertificationLog::new();
        log.append(record("a", 1, false, true)).unwrap();
        log.append(record("ab", 1, false, true)).unwrap();
        log.append(record("a", 2, false, true)).unwrap();

        assert_eq!(log.attempts(&PlanId::new("a")), 2);
        assert_eq!(log.attempts(&PlanId::new("ab")), 1);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn finds_only_certified_dry_runs() {
        let log = CertificationLog::new();
        log.append(record("rejected-dry", 1, true, false)).unwrap();
        log.append(record("real", 1, false, true)).unwrap();
        assert!(log.find_valid_dry_run("fp", Utc::now()).is_none());

        log.append(record("dry", 1, true, true)).unwrap();
        let found = log.find_valid_dry_run("fp", Utc::now()).unwrap();
        assert_eq!(found.plan_id, PlanId::new("dry"));
        assert!(log.find_valid_dry_run("fp", Utc::now() + Duration::hours(48)).is_none());
    }

    #[test]
    fn restore_replays_records() {
        let log = CertificationLog::restore(vec![record("p", 1, true, true), record("p", 2, false, true)]).unwrap();
        assert_eq!(log.attempts(&PlanId::new("p")), 2);
        assert!(CertificationLog::restore(vec![record("p", 1, true, true), record("p", 1, true, true)]).is_err());
    }
}
