//! Portfolio Risk Registry
//!
//! Mutex-guarded map of position id to reserved dollar risk. The ceiling
//! check and the insert happen under the same lock, so two plans firing on
//! the same bar can never both pass a check that together would breach it.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::RiskError;
use crate::domain::shared::{Money, PositionId};

/// One reserved amount, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Position holding the reservation.
    pub position_id: PositionId,
    /// Dollar risk reserved.
    pub dollar_risk: Money,
}

/// Read-only view of the registry. Informational only; `reserve` re-derives
/// its totals under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Account value the percentages are measured against.
    pub account_value: Money,
    /// Sum of all reservations.
    pub total_reserved: Money,
    /// `total_reserved` as a percentage of `account_value`.
    pub portfolio_risk_percent: Decimal,
    /// Ceiling.
    pub limit_percent: Decimal,
    /// Number of reservations.
    pub open_reservations: usize,
}

#[derive(Debug)]
struct RegistryState {
    account_value: Money,
    reservations: HashMap<PositionId, Money>,
}

impl RegistryState {
    fn total(&self) -> Money {
        self.reservations.values().copied().sum()
    }

    fn percent(&self, amount: Money) -> Decimal {
        amount
            .percent_of(self.account_value)
            .unwrap_or(Decimal::MAX)
            .normalize()
    }
}

/// Shared ledger of open-position risk.
#[derive(Debug)]
pub struct PortfolioRiskRegistry {
    state: Mutex<RegistryState>,
    limit_percent: Decimal,
}

impl PortfolioRiskRegistry {
    /// Default portfolio ceiling, in percent of account value.
    pub const DEFAULT_LIMIT_PERCENT: Decimal = Decimal::TEN;

    /// Create an empty registry.
    ///
    /// # Errors
    ///
    /// `InvalidRiskInput` if the account value is not positive or the limit
    /// is outside (0, 100].
    pub fn new(account_value: Money, limit_percent: Decimal) -> Result<Self, RiskError> {
        if !account_value.is_positive() {
            return Err(RiskError::invalid_input(format!(
                "account value must be positive, got {account_value}"
            )));
        }
        if limit_percent <= Decimal::ZERO || limit_percent > Decimal::ONE_HUNDRED {
            return Err(RiskError::invalid_input(format!(
                "portfolio limit must be in (0, 100], got {limit_percent}"
            )));
        }
        Ok(Self {
            state: Mutex::new(RegistryState {
                account_value,
                reservations: HashMap::new(),
            }),
            limit_percent,
        })
    }

    /// Atomically check the ceiling and reserve `dollar_risk` for `position_id`.
    ///
    /// # Errors
    ///
    /// - `PortfolioRiskExceeded` when the new total would breach the ceiling;
    ///   the registry is left unchanged.
    /// - `DuplicateReservation` when the id already holds a reservation.
    /// - `InvalidRiskInput` for a non-positive amount.
    /// - `RegistryCorrupted` when the existing total already breaches the
    ///   ceiling.
    pub fn reserve(
        &self,
        position_id: PositionId,
        dollar_risk: Money,
    ) -> Result<RiskSnapshot, RiskError> {
        if !dollar_risk.is_positive() {
            return Err(RiskError::invalid_input(format!(
                "reservation must be positive, got {dollar_risk}"
            )));
        }

        let mut state = self.state.lock();

        if state.reservations.contains_key(&position_id) {
            return Err(RiskError::DuplicateReservation { position_id });
        }

        let current_total = state.total();
        let current_percent = state.percent(current_total);
        if current_percent > self.limit_percent {
            return Err(RiskError::RegistryCorrupted {
                message: format!(
                    "reserved {current_total} is {current_percent}% of {}, above the {}% limit",
                    state.account_value, self.limit_percent
                ),
            });
        }

        let attempted_total = current_total + dollar_risk;
        let attempted_percent = state.percent(attempted_total);
        if attempted_percent > self.limit_percent {
            return Err(RiskError::PortfolioRiskExceeded {
                current_total,
                attempted_total,
                current_percent,
                attempted_percent,
                limit_percent: self.limit_percent,
            });
        }

        state.reservations.insert(position_id, dollar_risk);
        Ok(self.snapshot_of(&state))
    }

    /// Remove a reservation. Releasing an unknown id is a no-op.
    ///
    /// Returns the released amount, if there was one.
    pub fn release(&self, position_id: &PositionId) -> Option<Money> {
        self.state.lock().reservations.remove(position_id)
    }

    /// Reserved risk as a percentage of account value.
    #[must_use]
    pub fn current_portfolio_risk_percent(&self) -> Decimal {
        let state = self.state.lock();
        state.percent(state.total())
    }

    /// Point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> RiskSnapshot {
        self.snapshot_of(&self.state.lock())
    }

    /// Copy of every reservation, ordered by position id.
    #[must_use]
    pub fn reservations(&self) -> Vec<Reservation> {
        let state = self.state.lock();
        let mut out: Vec<Reservation> = state
            .reservations
            .iter()
            .map(|(position_id, dollar_risk)| Reservation {
                position_id: position_id.clone(),
                dollar_risk: *dollar_risk,
            })
            .collect();
        drop(state);
        out.sort_by(|a, b| a.position_id.cmp(&b.position_id));
        out
    }

    /// Whether `position_id` holds a reservation.
    #[must_use]
    pub fn is_reserved(&self, position_id: &PositionId) -> bool {
        self.state.lock().reservations.contains_key(position_id)
    }

    /// Account value used for sizing and percentages.
    #[must_use]
    pub fn account_value(&self) -> Money {
        self.state.lock().account_value
    }

    /// Replace all reservations with a recovered set.
    ///
    /// # Errors
    ///
    /// `RegistryCorrupted` if the set has duplicates, non-positive amounts,
    /// or exceeds the ceiling. The registry is left unchanged.
    pub fn restore(&self, reservations: Vec<Reservation>) -> Result<RiskSnapshot, RiskError> {
        let mut restored = HashMap::with_capacity(reservations.len());
        for Reservation {
            position_id,
            dollar_risk,
        } in reservations
        {
            if !dollar_risk.is_positive() {
                return Err(RiskError::RegistryCorrupted {
                    message: format!("recovered reservation for {position_id} is {dollar_risk}"),
                });
            }
            if restored.insert(position_id.clone(), dollar_risk).is_some() {
                return Err(RiskError::RegistryCorrupted {
                    message: format!("recovered reservations repeat position {position_id}"),
                });
            }
        }

        let mut state = self.state.lock();
        let total: Money = restored.values().copied().sum();
        let percent = state.percent(total);
        if percent > self.limit_percent {
            return Err(RiskError::RegistryCorrupted {
                message: format!(
                    "recovered reservations total {total} ({percent}%) above the {}% limit",
                    self.limit_percent
                ),
            });
        }
        state.reservations = restored;
        Ok(self.snapshot_of(&state))
    }

    fn snapshot_of(&self, state: &RegistryState) -> RiskSnapshot {
        let total_reserved = state.total();
        RiskSnapshot {
            account_value: state.account_value,
            total_reserved,
            portfolio_risk_percent: state.percent(total_reserved),
            limit_percent: self.limit_percent,
            open_reservations: state.reservations.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use rust_decimal_macros::dec;

    fn registry() -> PortfolioRiskRegistry {
        PortfolioRiskRegistry::new(Money::new(dec!(10000)), dec!(10)).unwrap()
    }

    #[test]
    fn reserve_adds_percentage_points() {
        let registry = registry();
        let snapshot = registry
            .reserve(PositionId::new("p1"), Money::new(dec!(200)))
            .unwrap();
        assert_eq!(snapshot.portfolio_risk_percent, dec!(2));
        assert_eq!(registry.current_portfolio_risk_percent(), dec!(2));
    }

    #[test]
    fn rejects_reservation_over_ceiling_and_leaves_registry_unchanged() {
        let registry = registry();
        registry
            .reserve(PositionId::new("p1"), Money::new(dec!(500)))
            .unwrap();
        registry
            .reserve(PositionId::new("p2"), Money::new(dec!(350)))
            .unwrap();
        let before = registry.reservations();

        let err = registry
            .reserve(PositionId::new("p3"), Money::new(dec!(300)))
            .unwrap_err();
        match err {
            RiskError::PortfolioRiskExceeded {
                current_total,
                attempted_total,
                attempted_percent,
                ..
            } => {
                assert_eq!(current_total, Money::new(dec!(850)));
                assert_eq!(attempted_total, Money::new(dec!(1150)));
                assert_eq!(attempted_percent, dec!(11.5));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(registry.reservations(), before);
        assert_eq!(registry.current_portfolio_risk_percent(), dec!(8.5));
    }

    #[test]
    fn exactly_at_ceiling_is_allowed() {
        let registry = registry();
        registry
            .reserve(PositionId::new("p1"), Money::new(dec!(1000)))
            .unwrap();
        assert_eq!(registry.current_portfolio_risk_percent(), dec!(10));
    }

    #[test]
    fn release_is_idempotent() {
        let registry = registry();
        let id = PositionId::new("p1");
        registry.reserve(id.clone(), Money::new(dec!(200))).unwrap();

        assert_eq!(registry.release(&id), Some(Money::new(dec!(200))));
        let once = registry.snapshot();
        assert_eq!(registry.release(&id), None);
        assert_eq!(registry.snapshot(), once);
        assert_eq!(once.total_reserved, Money::ZERO);
    }

    #[test]
    fn duplicate_reservation_rejected() {
        let registry = registry();
        let id = PositionId::new("p1");
        registry.reserve(id.clone(), Money::new(dec!(100))).unwrap();
        assert!(matches!(
            registry.reserve(id, Money::new(dec!(100))),
            Err(RiskError::DuplicateReservation { .. })
        ));
    }

    #[test]
    fn restore_rejects_over_ceiling_as_corruption() {
        let registry = registry();
        let err = registry
            .restore(vec![
                Reservation {
                    position_id: PositionId::new("a"),
                    dollar_risk: Money::new(dec!(600)),
                },
                Reservation {
                    position_id: PositionId::new("b"),
                    dollar_risk: Money::new(dec!(600)),
                },
            ])
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(registry.snapshot().open_reservations, 0);
    }

    #[test]
    fn concurrent_reserves_never_exceed_ceiling() {
        let registry = Arc::new(registry());
        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry
                        .reserve(PositionId::new(format!("p{i}")), Money::new(dec!(300)))
                        .is_ok()
                })
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 3);
        assert!(registry.current_portfolio_risk_percent() <= dec!(10));
    }
}
