//! Finding lifecycle across runs: carry forward, fix, reopen, append.

use tracing::info;

use crate::model::{Finding, RunOutcome};

/// Decides whether a persisted finding and a fresh one are the same issue.
pub trait FindingIdentity {
    fn same(&self, previous: &Finding, current: &Finding) -> bool;
}

/// Exact message equality. Compatible with lists persisted before findings
/// carried structural fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageIdentity;

impl FindingIdentity for MessageIdentity {
    fn same(&self, previous: &Finding, current: &Finding) -> bool {
        previous.message == current.message
    }
}

/// Kind + date + source. Falls back to message equality when either side
/// lacks the structural fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralIdentity;

impl FindingIdentity for StructuralIdentity {
    fn same(&self, previous: &Finding, current: &Finding) -> bool {
        match (previous.kind, previous.date, current.kind, current.date) {
            (Some(pk), Some(pd), Some(ck), Some(cd)) => {
                pk == ck && pd == cd && previous.source == current.source
            }
            _ => previous.message == current.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Every previous finding (updated in place) followed by the new ones.
    pub findings: Vec<Finding>,
    pub new_count: usize,
    pub newly_fixed: usize,
    pub already_fixed: usize,
    pub still_open: usize,
    pub outcome: RunOutcome,
}

/// Merge fresh findings into the persisted list.
///
/// The result never shrinks: a persisted finding is either still open (it
/// matched, and takes the fresh message and fields) or fixed.
pub fn reconcile(
    previous: &[Finding],
    current: &[Finding],
    identity: &dyn FindingIdentity,
) -> Reconciliation {
    let mut remaining: Vec<Option<&Finding>> = current.iter().map(Some).collect();
    let mut findings: Vec<Finding> = Vec::with_capacity(previous.len() + current.len());
    let mut newly_fixed = 0;
    let mut already_fixed = 0;

    for prev in previous {
        let matched = remaining
            .iter_mut()
            .find(|slot| slot.is_some_and(|cur| identity.same(prev, cur)))
            .and_then(Option::take);

        match matched {
            Some(cur) => findings.push(Finding {
                fixed: false,
                ..cur.clone()
            }),
            None if !prev.fixed => {
                newly_fixed += 1;
                findings.push(Finding {
                    fixed: true,
                    ..prev.clone()
                });
            }
            None => {
                already_fixed += 1;
                findings.push(prev.clone());
            }
        }
    }

    let mut new_count = 0;
    for cur in remaining.into_iter().flatten() {
        new_count += 1;
        findings.push(Finding {
            fixed: false,
            ..cur.clone()
        });
    }

    let still_open = findings.iter().filter(|f| !f.fixed).count();
    let outcome = classify(new_count, newly_fixed, still_open);

    info!(
        new = new_count,
        newly_fixed,
        already_fixed,
        still_open,
        outcome = %outcome,
        "reconciled findings"
    );

    Reconciliation {
        findings,
        new_count,
        newly_fixed,
        already_fixed,
        still_open,
        outcome,
    }
}

fn classify(new_count: usize, newly_fixed: usize, still_open: usize) -> RunOutcome {
    match (new_count > 0, newly_fixed > 0, still_open > 0) {
        (true, true, _) => RunOutcome::SomeFixedSomeNew,
        (true, false, _) => RunOutcome::NewWarningsFound,
        (false, true, true) => RunOutcome::SomeFixedStillRemaining,
        (false, true, false) => RunOutcome::AllFixed,
        (false, false, true) => RunOutcome::NoNewButRemaining,
        (false, false, false) => RunOutcome::NoWarnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FindingKind, SourceTag};
    use chrono::NaiveDate;

    fn open(msg: &str) -> Finding {
        Finding {
            message: msg.into(),
            source: SourceTag::Cases,
            fixed: false,
            kind: None,
            date: None,
        }
    }

    fn fixed(msg: &str) -> Finding {
        Finding {
            fixed: true,
            ..open(msg)
        }
    }

    #[test]
    fn vanished_finding_is_fixed() {
        let r = reconcile(&[open("A")], &[], &MessageIdentity);
        assert_eq!(r.findings, vec![fixed("A")]);
        assert_eq!(r.newly_fixed, 1);
        assert_eq!(r.outcome, RunOutcome::AllFixed);
        assert!(r.outcome.should_notify());
    }

    #[test]
    fn repeated_finding_stays_open() {
        let r = reconcile(&[open("A")], &[open("A")], &MessageIdentity);
        assert_eq!(r.findings, vec![open("A")]);
        assert_eq!(r.outcome, RunOutcome::NoNewButRemaining);
        assert!(!r.outcome.should_notify());
    }

    #[test]
    fn fixed_finding_reappearing_is_reopened() {
        let r = reconcile(&[fixed("A")], &[open("A")], &MessageIdentity);
        assert_eq!(r.findings, vec![open("A")]);
        assert_eq!(r.new_count, 0);
        assert_eq!(r.already_fixed, 0);
    }

    #[test]
    fn already_fixed_is_counted_not_refixed() {
        let r = reconcile(&[fixed("A")], &[], &MessageIdentity);
        assert_eq!(r.already_fixed, 1);
        assert_eq!(r.newly_fixed, 0);
        assert_eq!(r.outcome, RunOutcome::NoWarnings);
    }

    #[test]
    fn outcomes() {
        let r = reconcile(&[], &[open("B")], &MessageIdentity);
        assert_eq!(r.outcome, RunOutcome::NewWarningsFound);

        let r = reconcile(&[open("A")], &[open("B")], &MessageIdentity);
        assert_eq!(r.outcome, RunOutcome::SomeFixedSomeNew);
        assert_eq!(r.findings, vec![fixed("A"), open("B")]);

        let r = reconcile(&[open("A"), open("C")], &[open("C")], &MessageIdentity);
        assert_eq!(r.outcome, RunOutcome::SomeFixedStillRemaining);

        let r = reconcile(&[], &[], &MessageIdentity);
        assert_eq!(r.outcome, RunOutcome::NoWarnings);
    }

    #[test]
    fn duplicate_messages_match_one_to_one() {
        let r = reconcile(&[open("A")], &[open("A"), open("A")], &MessageIdentity);
        assert_eq!(r.findings.len(), 2);
        assert_eq!(r.new_count, 1);
    }

    #[test]
    fn structural_identity_survives_wording_change() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let prev = Finding::new(
            FindingKind::NegativeDelta,
            SourceTag::Cumulative,
            date,
            "old wording".into(),
        );
        let cur = Finding::new(
            FindingKind::NegativeDelta,
            SourceTag::Cumulative,
            date,
            "new wording".into(),
        );

        let by_message = reconcile(&[prev.clone()], &[cur.clone()], &MessageIdentity);
        assert_eq!(by_message.outcome, RunOutcome::SomeFixedSomeNew);

        let by_structure = reconcile(&[prev], &[cur.clone()], &StructuralIdentity);
        assert_eq!(by_structure.outcome, RunOutcome::NoNewButRemaining);
        assert_eq!(by_structure.findings, vec![cur]);
    }

    #[test]
    fn structural_identity_falls_back_for_legacy_entries() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap();
        let cur = Finding::new(
            FindingKind::SumMismatch,
            SourceTag::Cases,
            date,
            "A".into(),
        );
        let r = reconcile(&[open("A")], &[cur], &StructuralIdentity);
        assert_eq!(r.new_count, 0);
        assert_eq!(r.newly_fixed, 0);
    }
}
