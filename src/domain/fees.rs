//! Fee arithmetic applied once when a payment is created.

use super::money::{Amount, Balance, round_money};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Rates used by [`FeeCalculator`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Proportional gateway fee (0.029 = 2.9%).
    pub processing_rate: Decimal,
    /// Fixed gateway fee added per payment.
    pub processing_fixed: Decimal,
    /// Platform commission (0.10 = 10%).
    pub platform_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            processing_rate: dec!(0.029),
            processing_fixed: dec!(0.30),
            platform_rate: dec!(0.10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub processing_fee: Balance,
    pub platform_fee: Balance,
    pub net_amount: Balance,
}

impl FeeBreakdown {
    pub fn total(&self) -> Balance {
        self.processing_fee + self.platform_fee + self.net_amount
    }
}

/// Splits a payment amount into gateway fee, platform fee and payee net.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeCalculator {
    schedule: FeeSchedule,
}

impl FeeCalculator {
    pub fn new(schedule: FeeSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Computes the breakdown. The three parts always sum to `amount`: whatever
    /// rounding leaves over is folded into the largest part.
    pub fn compute(&self, amount: Amount) -> FeeBreakdown {
        let gross = amount.value();
        let processing_raw = gross * self.schedule.processing_rate + self.schedule.processing_fixed;
        let platform_raw = gross * self.schedule.platform_rate;
        let net_raw = gross - processing_raw - platform_raw;

        let mut parts = [
            round_money(processing_raw),
            round_money(platform_raw),
            round_money(net_raw),
        ];
        let remainder = gross - parts.iter().sum::<Decimal>();
        if !remainder.is_zero() {
            // ties go to the net amount (last index)
            let largest = (0..parts.len())
                .max_by(|&a, &b| parts[a].cmp(&parts[b]))
                .unwrap_or(2);
            parts[largest] += remainder;
        }

        FeeBreakdown {
            processing_fee: Balance(parts[0]),
            platform_fee: Balance(parts[1]),
            net_amount: Balance(parts[2]),
        }
    }

    /// Flat percentage fee charged on a payout, rounded half-up to cents.
    pub fn payout_fee(amount: Amount, rate: Decimal) -> Balance {
        Balance(round_money(amount.value() * rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute(value: Decimal) -> FeeBreakdown {
        FeeCalculator::default().compute(Amount::new(value).unwrap())
    }

    #[test]
    fn test_hundred_dollar_breakdown() {
        let fees = compute(dec!(100.00));
        assert_eq!(fees.processing_fee, Balance(dec!(3.20)));
        assert_eq!(fees.platform_fee, Balance(dec!(10.00)));
        assert_eq!(fees.net_amount, Balance(dec!(86.80)));
        assert_eq!(fees.total(), Balance(dec!(100.00)));
    }

    #[test]
    fn test_rounding_remainder_goes_to_largest_part() {
        // 0.35945 -> 0.36, 0.205 -> 0.21, 1.48555 -> 1.49 overshoots by a cent
        let fees = compute(dec!(2.05));
        assert_eq!(fees.processing_fee, Balance(dec!(0.36)));
        assert_eq!(fees.platform_fee, Balance(dec!(0.21)));
        assert_eq!(fees.net_amount, Balance(dec!(1.48)));
        assert_eq!(fees.total(), Balance(dec!(2.05)));
    }

    #[test]
    fn test_parts_always_sum_to_amount() {
        let mut cents = 100;
        while cents < 100_000 {
            let amount = Decimal::new(cents, 2);
            let fees = compute(amount);
            assert_eq!(fees.total().value(), amount, "amount {amount}");
            assert!(fees.processing_fee.value().scale() <= 2);
            cents += 37;
        }
    }

    #[test]
    fn test_custom_schedule() {
        let calculator = FeeCalculator::new(FeeSchedule {
            processing_rate: Decimal::ZERO,
            processing_fixed: Decimal::ZERO,
            platform_rate: dec!(0.05),
        });
        let fees = calculator.compute(Amount::new(dec!(40)).unwrap());
        assert_eq!(fees.processing_fee, Balance(dec!(0)));
        assert_eq!(fees.platform_fee, Balance(dec!(2.00)));
        assert_eq!(fees.net_amount, Balance(dec!(38.00)));
    }

    #[test]
    fn test_payout_fee() {
        let fee = FeeCalculator::payout_fee(Amount::new(dec!(50.00)).unwrap(), dec!(0.01));
        assert_eq!(fee, Balance(dec!(0.50)));
        let fee = FeeCalculator::payout_fee(Amount::new(dec!(0.50)).unwrap(), dec!(0.01));
        assert_eq!(fee, Balance(dec!(0.01)));
    }
}
