//! # Stock Reconciliation Planning
//!
//! Pure decision logic for a bidirectional stock sync. The engine in
//! `fiscal-sync` reads both catalogs, asks [`plan_bidirectional`] what to do
//! and then performs at most one write.
//!
//! ## Decision Table (baseline = last synced quantity)
//! ```text
//! ┌──────────────────────┬──────────────────────┬─────────────────────────┐
//! │ commerce vs baseline │ external vs baseline │ plan                    │
//! ├──────────────────────┼──────────────────────┼─────────────────────────┤
//! │ equal to external    │ equal to commerce    │ InSync (record value)   │
//! │ changed              │ unchanged            │ PushToExternal          │
//! │ unchanged            │ changed              │ PushToCommerce          │
//! │ changed              │ changed (different)  │ Conflict, no write      │
//! │ no baseline          │ -                    │ PushToExternal          │
//! └──────────────────────┴──────────────────────┴─────────────────────────┘
//! ```

/// Outcome of bidirectional planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockPlan {
    /// Both sides agree; nothing is written.
    InSync { quantity: i64 },
    /// Write the commerce quantity to the fiscal catalog.
    PushToExternal { quantity: i64 },
    /// Write the fiscal quantity to the commerce catalog.
    PushToCommerce { quantity: i64 },
    /// Both sides moved away from the baseline to different values.
    Conflict {
        baseline: i64,
        commerce: i64,
        external: i64,
    },
}

/// Plans a bidirectional reconciliation.
pub fn plan_bidirectional(baseline: Option<i64>, commerce: i64, external: i64) -> StockPlan {
    if commerce == external {
        return StockPlan::InSync { quantity: commerce };
    }

    let Some(baseline) = baseline else {
        return StockPlan::PushToExternal { quantity: commerce };
    };

    match (commerce != baseline, external != baseline) {
        (true, false) => StockPlan::PushToExternal { quantity: commerce },
        (false, true) => StockPlan::PushToCommerce { quantity: external },
        _ => StockPlan::Conflict {
            baseline,
            commerce,
            external,
        },
    }
}

/// `new - previous`, or `None` when there is no previous quantity.
pub fn delta(previous: Option<i64>, new: i64) -> Option<i64> {
    previous.map(|p| new - p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_sign_convention() {
        assert_eq!(delta(Some(10), 7), Some(-3));
        assert_eq!(delta(Some(3), 8), Some(5));
        assert_eq!(delta(None, 8), None);
    }

    #[test]
    fn test_only_commerce_changed() {
        assert_eq!(
            plan_bidirectional(Some(10), 7, 10),
            StockPlan::PushToExternal { quantity: 7 }
        );
    }

    #[test]
    fn test_only_external_changed() {
        assert_eq!(
            plan_bidirectional(Some(10), 10, 4),
            StockPlan::PushToCommerce { quantity: 4 }
        );
    }

    #[test]
    fn test_both_changed_differently_is_conflict() {
        assert_eq!(
            plan_bidirectional(Some(10), 7, 4),
            StockPlan::Conflict {
                baseline: 10,
                commerce: 7,
                external: 4
            }
        );
    }

    #[test]
    fn test_converged_values_are_in_sync() {
        assert_eq!(
            plan_bidirectional(Some(10), 6, 6),
            StockPlan::InSync { quantity: 6 }
        );
        assert_eq!(
            plan_bidirectional(Some(10), 10, 10),
            StockPlan::InSync { quantity: 10 }
        );
    }

    #[test]
    fn test_no_baseline_trusts_commerce() {
        assert_eq!(
            plan_bidirectional(None, 5, 9),
            StockPlan::PushToExternal { quantity: 5 }
        );
    }
}
