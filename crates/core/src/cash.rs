//! Cash register (caixa) sessions and their entries (lançamentos).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CashEntryId, CashEntryKind, Money, OrderId, PaymentMethod};

/// Errors raised by cash register operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CashError {
    /// Opening while another session is open.
    #[error("já existe um caixa aberto")]
    AlreadyOpen,
    /// Entry or close without an open session.
    #[error("nenhum caixa aberto")]
    NotOpen,
    /// Amount is zero or negative.
    #[error("valor deve ser maior que zero")]
    NonPositiveAmount,
    /// Negative opening or counted balance.
    #[error("saldo não pode ser negativo")]
    NegativeBalance,
    /// Supplies and withdrawals move physical cash only.
    #[error("{} deve ser em dinheiro", kind.as_str())]
    CashOnly {
        /// Offending entry kind.
        kind: CashEntryKind,
    },
}

/// A single entry within a register session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::FromRow))]
pub struct CashEntry {
    /// Entry id.
    pub id: CashEntryId,
    /// Sale, supply, withdrawal or expense.
    pub kind: CashEntryKind,
    /// How the money moved.
    pub payment_method: PaymentMethod,
    /// Always positive; direction comes from `kind`.
    pub amount: Money,
    /// Free text.
    pub description: Option<String>,
    /// Order a sale entry refers to.
    pub order_id: Option<OrderId>,
    /// When it was recorded.
    pub created_at: DateTime<Utc>,
}

/// Validate a new entry before it is written.
///
/// # Errors
///
/// Returns [`CashError::NonPositiveAmount`] or [`CashError::CashOnly`].
pub fn validate_entry(
    kind: CashEntryKind,
    payment_method: PaymentMethod,
    amount: Money,
) -> Result<(), CashError> {
    if amount.is_negative() || amount.is_zero() {
        return Err(CashError::NonPositiveAmount);
    }
    if matches!(kind, CashEntryKind::Supply | CashEntryKind::Withdrawal)
        && payment_method != PaymentMethod::Cash
    {
        return Err(CashError::CashOnly { kind });
    }
    Ok(())
}

/// Validate an opening or counted balance.
///
/// # Errors
///
/// Returns [`CashError::NegativeBalance`] for negative amounts.
pub fn validate_balance(amount: Money) -> Result<(), CashError> {
    if amount.is_negative() {
        return Err(CashError::NegativeBalance);
    }
    Ok(())
}

/// Totals of a register session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashSummary {
    /// Balance the session was opened with.
    pub opening_balance: Money,
    /// Sum of sales, any payment method.
    pub sales: Money,
    /// Sum of supplies.
    pub supplies: Money,
    /// Sum of withdrawals.
    pub withdrawals: Money,
    /// Sum of expenses, any payment method.
    pub expenses: Money,
    /// Sales per payment method.
    pub sales_by_method: BTreeMap<&'static str, Money>,
    /// Cash that should be in the drawer:
    /// opening + cash sales + supplies - withdrawals - cash expenses.
    pub expected_cash: Money,
    /// Number of entries.
    pub entry_count: usize,
}

impl CashSummary {
    /// Summarize the entries of a session.
    #[must_use]
    pub fn compute(opening_balance: Money, entries: &[CashEntry]) -> Self {
        let mut summary = Self {
            opening_balance,
            sales: Money::ZERO,
            supplies: Money::ZERO,
            withdrawals: Money::ZERO,
            expenses: Money::ZERO,
            sales_by_method: BTreeMap::new(),
            expected_cash: opening_balance,
            entry_count: entries.len(),
        };

        for entry in entries {
            let cash = entry.payment_method == PaymentMethod::Cash;
            match entry.kind {
                CashEntryKind::Sale => {
                    summary.sales += entry.amount;
                    *summary
                        .sales_by_method
                        .entry(entry.payment_method.as_str())
                        .or_default() += entry.amount;
                    if cash {
                        summary.expected_cash += entry.amount;
                    }
                }
                CashEntryKind::Supply => {
                    summary.supplies += entry.amount;
                    summary.expected_cash += entry.amount;
                }
                CashEntryKind::Withdrawal => {
                    summary.withdrawals += entry.amount;
                    summary.expected_cash = summary.expected_cash - entry.amount;
                }
                CashEntryKind::Expense => {
                    summary.expenses += entry.amount;
                    if cash {
                        summary.expected_cash = summary.expected_cash - entry.amount;
                    }
                }
            }
        }

        summary
    }

    /// `counted - expected_cash`; positive means surplus, negative shortage.
    #[must_use]
    pub fn difference(&self, counted: Money) -> Money {
        counted - self.expected_cash
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn entry(kind: CashEntryKind, method: PaymentMethod, cents: i64) -> CashEntry {
        CashEntry {
            id: CashEntryId::new(1),
            kind,
            payment_method: method,
            amount: Money::from_cents(cents),
            description: None,
            order_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_expected_cash_counts_only_cash_movements() {
        let entries = [
            entry(CashEntryKind::Sale, PaymentMethod::Cash, 5000),
            entry(CashEntryKind::Sale, PaymentMethod::Pix, 8000),
            entry(CashEntryKind::Supply, PaymentMethod::Cash, 2000),
            entry(CashEntryKind::Withdrawal, PaymentMethod::Cash, 3000),
            entry(CashEntryKind::Expense, PaymentMethod::Cash, 1500),
            entry(CashEntryKind::Expense, PaymentMethod::Pix, 900),
        ];
        let summary = CashSummary::compute(Money::from_cents(10_000), &entries);

        assert_eq!(summary.sales, Money::from_cents(13_000));
        assert_eq!(summary.expenses, Money::from_cents(2400));
        // 100 + 50 + 20 - 30 - 15
        assert_eq!(summary.expected_cash, Money::from_cents(12_500));
        assert_eq!(summary.sales_by_method["pix"], Money::from_cents(8000));
        assert_eq!(summary.entry_count, 6);

        assert_eq!(summary.difference(Money::from_cents(12_000)), Money::from_cents(-500));
        assert_eq!(summary.difference(Money::from_cents(12_500)), Money::ZERO);
    }

    #[test]
    fn test_empty_session() {
        let summary = CashSummary::compute(Money::from_cents(5000), &[]);
        assert_eq!(summary.expected_cash, Money::from_cents(5000));
    }

    #[test]
    fn test_validate_entry() {
        assert_eq!(
            validate_entry(CashEntryKind::Sale, PaymentMethod::Pix, Money::ZERO),
            Err(CashError::NonPositiveAmount)
        );
        assert_eq!(
            validate_entry(CashEntryKind::Withdrawal, PaymentMethod::Pix, Money::from_cents(100)),
            Err(CashError::CashOnly {
                kind: CashEntryKind::Withdrawal
            })
        );
        assert!(validate_entry(CashEntryKind::Expense, PaymentMethod::DebitCard, Money::from_cents(100)).is_ok());
        assert_eq!(validate_balance(Money::from_cents(-1)), Err(CashError::NegativeBalance));
    }
}
