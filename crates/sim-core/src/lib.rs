#![deny(warnings)]

//! Core domain models and invariants for the portfolio simulator.
//!
//! This crate defines serializable types shared by the market model, the
//! engine and the outbound gateways, with validation helpers that guarantee
//! the basic invariants (positive prices, allocations within 100%).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Number of allocation rounds in one playthrough.
pub const MAX_ROUNDS: u32 = 5;

/// Headline shown before the first allocation is executed.
pub const INITIAL_HEADLINE: &str = "Market Initialized. Awaiting Capital Allocation.";

/// Notional starting capital in USD.
pub fn initial_capital() -> Decimal {
    Decimal::new(1_000_000, 0)
}

/// The asset buckets a user can allocate capital to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Stocks.
    Equities,
    /// Bonds.
    FixedIncome,
    /// Gold.
    Commodities,
}

impl AssetClass {
    /// Every asset class, in display order.
    pub const ALL: [AssetClass; 3] = [
        AssetClass::Equities,
        AssetClass::FixedIncome,
        AssetClass::Commodities,
    ];

    /// Human-readable label used by shells and reports.
    pub fn label(self) -> &'static str {
        match self {
            AssetClass::Equities => "Equities (Stocks)",
            AssetClass::FixedIncome => "Fixed Income (Bonds)",
            AssetClass::Commodities => "Commodities (Gold)",
        }
    }

    /// Short symbol used to key quote lookups.
    pub fn symbol(self) -> &'static str {
        match self {
            AssetClass::Equities => "EQ",
            AssetClass::FixedIncome => "FI",
            AssetClass::Commodities => "CM",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-asset mapping. Ordered so iteration and serialization are stable.
pub type AssetMap<T> = BTreeMap<AssetClass, T>;

/// Validation errors for domain invariants.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A unit price is zero or negative.
    #[error("price for {0} must be > 0, got {1}")]
    NonPositivePrice(AssetClass, Decimal),
    /// A price mapping does not cover every asset class.
    #[error("missing price for {0}")]
    MissingPrice(AssetClass),
    /// Starting capital must be strictly positive.
    #[error("initial capital must be > 0, got {0}")]
    NonPositiveCapital(Decimal),
    /// A single allocation percentage is outside [0, 100].
    #[error("allocation for {0} must be within [0, 100]%, got {1}%")]
    PercentOutOfRange(AssetClass, Decimal),
    /// Percentages add up to more than the available capital.
    #[error("Compliance Error: allocation of {0}% exceeds 100% of available capital.")]
    Overallocated(Decimal),
    /// A scenario return would drive a price to zero or below.
    #[error("scenario '{0}' has a return at or below -100%")]
    ReturnOutOfRange(String),
    /// A scenario catalog must hold at least one entry.
    #[error("scenario catalog is empty")]
    EmptyCatalog,
    /// A price or valuation left the representable decimal range.
    #[error("arithmetic overflow while {0}")]
    Overflow(&'static str),
}

/// Validated unit prices, one strictly positive price per asset class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<AssetClass, Decimal>",
    into = "BTreeMap<AssetClass, Decimal>"
)]
pub struct PriceBook {
    prices: AssetMap<Decimal>,
}

impl PriceBook {
    /// Build a price book, failing fast on missing or non-positive prices.
    pub fn new(prices: AssetMap<Decimal>) -> Result<Self, ValidationError> {
        for asset in AssetClass::ALL {
            match prices.get(&asset) {
                None => return Err(ValidationError::MissingPrice(asset)),
                Some(p) if *p <= Decimal::ZERO => {
                    return Err(ValidationError::NonPositivePrice(asset, *p))
                }
                Some(_) => {}
            }
        }
        Ok(Self { prices })
    }

    /// Unit price of `asset`.
    pub fn price(&self, asset: AssetClass) -> Decimal {
        // Presence of every asset is checked in `new`.
        self.prices[&asset]
    }

    /// Iterate `(asset, price)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (AssetClass, Decimal)> + '_ {
        self.prices.iter().map(|(a, p)| (*a, *p))
    }

    /// Prices after applying a scenario: `price * (1 + return)`.
    pub fn apply(&self, scenario: &MarketScenario) -> Result<Self, ValidationError> {
        let mut moved = AssetMap::new();
        for (a, p) in self.iter() {
            let moved_price = Decimal::ONE
                .checked_add(scenario.return_for(a))
                .and_then(|factor| p.checked_mul(factor))
                .ok_or(ValidationError::Overflow("applying a market move"))?;
            moved.insert(a, moved_price);
        }
        Self::new(moved)
    }
}

impl TryFrom<BTreeMap<AssetClass, Decimal>> for PriceBook {
    type Error = ValidationError;

    fn try_from(prices: BTreeMap<AssetClass, Decimal>) -> Result<Self, Self::Error> {
        Self::new(prices)
    }
}

impl From<PriceBook> for BTreeMap<AssetClass, Decimal> {
    fn from(book: PriceBook) -> Self {
        book.prices
    }
}

/// Static seed prices used whenever no quote source is available.
pub fn fallback_prices() -> PriceBook {
    PriceBook {
        prices: AssetMap::from([
            (AssetClass::Equities, Decimal::new(480, 0)),
            (AssetClass::FixedIncome, Decimal::new(95, 0)),
            (AssetClass::Commodities, Decimal::new(185, 0)),
        ]),
    }
}

/// Percentage-of-wealth assignment per asset for one round.
///
/// Assets left out are treated as 0%; whatever is not allocated stays in cash.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    percents: AssetMap<Decimal>,
}

impl Allocation {
    /// Build from arbitrary `(asset, percent)` pairs. Validation is deferred to [`Allocation::validate`].
    pub fn new<I: IntoIterator<Item = (AssetClass, Decimal)>>(percents: I) -> Self {
        Self {
            percents: percents.into_iter().collect(),
        }
    }

    /// Convenience constructor from whole-number percentages in display order.
    pub fn from_whole(equities: u32, fixed_income: u32, commodities: u32) -> Self {
        Self::new([
            (AssetClass::Equities, Decimal::from(equities)),
            (AssetClass::FixedIncome, Decimal::from(fixed_income)),
            (AssetClass::Commodities, Decimal::from(commodities)),
        ])
    }

    /// Percentage assigned to `asset` (0 when absent).
    pub fn percent(&self, asset: AssetClass) -> Decimal {
        self.percents.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Sum of all percentages.
    pub fn total(&self) -> Decimal {
        self.percents.values().copied().sum()
    }

    /// Share left in cash, in percent.
    pub fn cash_percent(&self) -> Decimal {
        Decimal::ONE_HUNDRED - self.total()
    }

    /// Check per-asset range and the 100% ceiling.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (asset, pct) in &self.percents {
            if *pct < Decimal::ZERO || *pct > Decimal::ONE_HUNDRED {
                return Err(ValidationError::PercentOutOfRange(*asset, *pct));
            }
        }
        let total = self.total();
        if total > Decimal::ONE_HUNDRED {
            return Err(ValidationError::Overallocated(total));
        }
        Ok(())
    }
}

/// One named market move: a headline plus a multiplicative return per asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketScenario {
    label: String,
    returns: AssetMap<Decimal>,
}

impl MarketScenario {
    /// Build a scenario; every return must be strictly above -100%.
    pub fn new<I>(label: impl Into<String>, returns: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (AssetClass, Decimal)>,
    {
        let label = label.into();
        let returns: AssetMap<Decimal> = returns.into_iter().collect();
        if returns.values().any(|r| *r <= -Decimal::ONE) {
            return Err(ValidationError::ReturnOutOfRange(label));
        }
        Ok(Self { label, returns })
    }

    /// Headline shown to the user.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Fractional return for `asset` (0 when the scenario leaves it untouched).
    pub fn return_for(&self, asset: AssetClass) -> Decimal {
        self.returns.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Which market-event policy drives price moves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketModelKind {
    /// Uniform draw from the fixed headline catalog.
    #[default]
    Catalog,
    /// Independent normal return per asset class.
    Gaussian,
}

/// Simulation configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Starting capital in USD (> 0).
    pub initial_capital: Decimal,
    /// Seed for deterministic RNG.
    pub rng_seed: u64,
    /// Market-event policy.
    pub market_model: MarketModelKind,
    /// Explicit seed prices; when absent the quote source or fallback is used.
    pub seed_prices: Option<PriceBook>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            initial_capital: initial_capital(),
            rng_seed: 42,
            market_model: MarketModelKind::default(),
            seed_prices: None,
        }
    }
}

/// Validate starting capital.
pub fn validate_capital(capital: Decimal) -> Result<(), ValidationError> {
    if capital <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveCapital(capital));
    }
    Ok(())
}

/// Validate a configuration before a session is created.
pub fn validate_config(cfg: &SimConfig) -> Result<(), ValidationError> {
    validate_capital(cfg.initial_capital)
}
