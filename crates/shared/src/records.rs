use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::domain::{ServiceId, StudentId};

pub const CURRENCY: &str = "ZMW";
const MINOR_PER_MAJOR: u64 = 100;
const BASIS_POINTS: u64 = 10_000;

/// An amount in ngwee (1/100 kwacha).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(pub u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_kwacha(kwacha: u64) -> Self {
        Self(kwacha.saturating_mul(MINOR_PER_MAJOR))
    }

    pub fn minor_units(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sums amounts, or `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }

    /// Share of this amount expressed in basis points, rounded half up.
    pub fn basis_points(self, bps: u32) -> Money {
        let scaled = u128::from(self.0) * u128::from(bps) + u128::from(BASIS_POINTS / 2);
        let share = scaled / u128::from(BASIS_POINTS);
        Money(u64::try_from(share).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.0 / MINOR_PER_MAJOR;
        let minor = self.0 % MINOR_PER_MAJOR;
        let digits = major.to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (idx, ch) in digits.chars().enumerate() {
            if idx > 0 && (digits.len() - idx) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(f, "{CURRENCY} {grouped}.{minor:02}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub name: String,
    pub id: StudentId,
    pub grade: String,
    /// Number of outstanding invoices.
    pub balances: u32,
}

/// One billable line handed from service selection to checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutService {
    pub id: ServiceId,
    pub description: String,
    pub amount: Money,
    pub invoice_no: String,
    pub student_name: String,
}

/// A priced service offered by the fee schedule, before it is assigned to a
/// student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceQuote {
    pub description: String,
    pub amount: Money,
}

/// A past payment as listed in a student's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub date: String,
    pub day: String,
    pub title: String,
    pub subtitle: String,
    pub amount: Money,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptContext {
    pub student_name: String,
    pub student_id: StudentId,
    /// Keyed by month label.
    pub payments_by_month: BTreeMap<String, Vec<PaymentRecord>>,
}
