//! Property tests for position sizing and the portfolio risk ceiling.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use proptest::prelude::*;
use rust_decimal::Decimal;
use tokio_test::{assert_err, assert_ok};
use trade_engine::domain::risk_management::RiskSnapshot;
use trade_engine::{Money, PortfolioRiskRegistry, PositionId, PositionSizer, RiskError};

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

#[derive(Debug, Clone)]
enum Op {
    Reserve(i64),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..=150_000).prop_map(Op::Reserve),
        (0usize..16).prop_map(Op::Release),
    ]
}

proptest! {
    #[test]
    fn test_sizing_never_exceeds_risk_budget(
        account in 100_000i64..100_000_000,
        percent in 1u32..=3,
        entry in 100i64..100_000,
        offset in 1i64..5_000,
        short in any::<bool>(),
    ) {
        let entry_price = cents(entry);
        let stop_price = if short { cents(entry + offset) } else { cents((entry - offset).max(1)) };
        prop_assume!(entry_price != stop_price);

        let account_value = Money::new(cents(account));
        let risk_percent = Decimal::from(percent);
        let size = assert_ok!(
            PositionSizer::new().size(account_value, risk_percent, entry_price, stop_price)
        );

        let budget = account_value.amount() * risk_percent / Decimal::ONE_HUNDRED;
        let per_share = (entry_price - stop_price).abs();
        let shares = Decimal::from(size.shares);

        prop_assert!(shares * per_share <= budget);
        prop_assert!((shares + Decimal::ONE) * per_share > budget);
        prop_assert_eq!(size.dollar_risk, Money::new(budget).round_cents());
    }

    #[test]
    fn test_reservations_never_breach_ceiling(ops in prop::collection::vec(op(), 1..64)) {
        let limit = Decimal::TEN;
        let registry = PortfolioRiskRegistry::new(Money::new(cents(10_000_000)), limit).unwrap();
        let mut held: Vec<(PositionId, Money)> = Vec::new();

        for op in ops {
            match op {
                Op::Reserve(amount) => {
                    let id = PositionId::generate();
                    let dollar_risk = Money::new(cents(amount));
                    let before: RiskSnapshot = registry.snapshot();
                    match registry.reserve(id.clone(), dollar_risk) {
                        Ok(snapshot) => {
                            prop_assert!(snapshot.portfolio_risk_percent <= limit);
                            held.push((id, dollar_risk));
                        }
                        Err(RiskError::PortfolioRiskExceeded { attempted_percent, .. }) => {
                            prop_assert!(attempted_percent > limit);
                            prop_assert_eq!(registry.snapshot(), before);
                        }
                        Err(other) => prop_assert!(false, "unexpected error {other}"),
                    }
                }
                Op::Release(index) => {
                    if held.is_empty() {
                        continue;
                    }
                    let (id, amount) = held.remove(index % held.len());
                    prop_assert_eq!(registry.release(&id), Some(amount));
                    prop_assert_eq!(registry.release(&id), None);
                }
            }

            let expected: Money = held.iter().map(|(_, amount)| *amount).sum();
            let snapshot = registry.snapshot();
            prop_assert_eq!(snapshot.total_reserved, expected);
            prop_assert!(registry.current_portfolio_risk_percent() <= limit);
        }
    }
}

#[test]
fn test_equal_entry_and_stop_is_invalid_input() {
    let err = assert_err!(PositionSizer::new().size(
        Money::new(cents(1_000_000)),
        Decimal::TWO,
        cents(18_050),
        cents(18_050),
    ));
    assert!(matches!(err, RiskError::InvalidRiskInput { .. }));
}
