use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{KeeperError, Result};

/// LTV operating band, all values in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LtvBand {
    /// Below this the position is expanded
    #[serde(default = "default_min_ltv")]
    pub min_ltv: Decimal,

    /// Above this the position is contracted
    #[serde(default = "default_max_ltv")]
    pub max_ltv: Decimal,

    /// LTV a correction moves the position to
    #[serde(default = "default_target_ltv")]
    pub target_ltv: Decimal,
}

fn default_min_ltv() -> Decimal {
    dec!(65)
}
fn default_max_ltv() -> Decimal {
    dec!(85)
}
fn default_target_ltv() -> Decimal {
    dec!(75)
}

impl Default for LtvBand {
    fn default() -> Self {
        Self {
            min_ltv: default_min_ltv(),
            max_ltv: default_max_ltv(),
            target_ltv: default_target_ltv(),
        }
    }
}

/// Side of the band an LTV fell out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandBreach {
    Below,
    Above,
}

impl BandBreach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::Above => "above",
        }
    }
}

impl LtvBand {
    pub fn new(min_ltv: Decimal, max_ltv: Decimal, target_ltv: Decimal) -> Result<Self> {
        let band = Self {
            min_ltv,
            max_ltv,
            target_ltv,
        };
        band.validate()?;
        Ok(band)
    }

    /// Require `0 <= min <= target <= max <= 100`.
    pub fn validate(&self) -> Result<()> {
        if self.min_ltv < Decimal::ZERO {
            return Err(KeeperError::Config(format!(
                "min_ltv must not be negative (got {})",
                self.min_ltv
            )));
        }
        if self.max_ltv > dec!(100) {
            return Err(KeeperError::Config(format!(
                "max_ltv must not exceed 100 (got {})",
                self.max_ltv
            )));
        }
        if self.min_ltv > self.max_ltv {
            return Err(KeeperError::Config(format!(
                "min_ltv {} is above max_ltv {}",
                self.min_ltv, self.max_ltv
            )));
        }
        if self.target_ltv < self.min_ltv || self.target_ltv > self.max_ltv {
            return Err(KeeperError::Config(format!(
                "target_ltv {} is outside [{}, {}]",
                self.target_ltv, self.min_ltv, self.max_ltv
            )));
        }
        Ok(())
    }

    /// Which side of the band `ltv` is on, if outside. Bounds are inclusive.
    pub fn breach(&self, ltv: Decimal) -> Option<BandBreach> {
        if ltv < self.min_ltv {
            Some(BandBreach::Below)
        } else if ltv > self.max_ltv {
            Some(BandBreach::Above)
        } else {
            None
        }
    }
}
