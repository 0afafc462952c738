use crate::domain::fees::FeeSchedule;
use crate::domain::ids::Currency;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::time::Duration;

/// Engine tunables. Defaults match the production fee schedule.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fees: FeeSchedule,
    /// Flat fee charged on payouts (0.01 = 1%).
    pub payout_fee_rate: Decimal,
    /// Delay before a scheduled payout completion runs.
    pub payout_settlement_delay: Duration,
    /// Period of the background transfer retry job.
    pub transfer_retry_interval: Duration,
    pub default_currency: Currency,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fees: FeeSchedule::default(),
            payout_fee_rate: dec!(0.01),
            payout_settlement_delay: Duration::ZERO,
            transfer_retry_interval: Duration::from_secs(60),
            default_currency: Currency::usd(),
        }
    }
}

impl EngineConfig {
    /// Reads `ESCROW_*` environment variables; unset or unparsable values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            fees: FeeSchedule {
                processing_rate: env_parse("ESCROW_PROCESSING_RATE")
                    .unwrap_or(defaults.fees.processing_rate),
                processing_fixed: env_parse("ESCROW_PROCESSING_FIXED")
                    .unwrap_or(defaults.fees.processing_fixed),
                platform_rate: env_parse("ESCROW_PLATFORM_RATE")
                    .unwrap_or(defaults.fees.platform_rate),
            },
            payout_fee_rate: env_parse("ESCROW_PAYOUT_FEE_RATE").unwrap_or(defaults.payout_fee_rate),
            payout_settlement_delay: env_parse("ESCROW_PAYOUT_SETTLEMENT_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.payout_settlement_delay),
            transfer_retry_interval: env_parse("ESCROW_TRANSFER_RETRY_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.transfer_retry_interval),
            default_currency: std::env::var("ESCROW_DEFAULT_CURRENCY")
                .ok()
                .and_then(|code| Currency::new(&code))
                .unwrap_or(defaults.default_currency),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
