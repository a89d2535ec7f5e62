#![deny(warnings)]

//! Market-event models for the portfolio simulator.
//!
//! This crate provides seeded generators for per-round price moves:
//! - A fixed catalog of headline scenarios drawn uniformly with replacement
//! - Independent normal returns per asset class
//! - A scripted sequence for reproducible tests and demos

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sim_core::{AssetClass, AssetMap, MarketModelKind, MarketScenario, SimConfig, ValidationError};
use thiserror::Error;
use tracing::debug;

/// Lowest return a gaussian draw may produce, keeping prices positive.
const GAUSSIAN_RETURN_FLOOR: f64 = -0.95;

/// Errors produced while building market models.
#[derive(Debug, Error, PartialEq)]
pub enum MarketError {
    /// Volatility must be finite and non-negative; mean must be finite.
    #[error("invalid normal parameters for {0}: mean={1}, volatility={2}")]
    InvalidParameters(AssetClass, f64, f64),
    /// Catalog content failed domain validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Source of one market move per round.
pub trait MarketModel {
    /// Produce the scenario applied to prices this round.
    fn next_scenario(&mut self) -> Result<MarketScenario, MarketError>;
}

/// The built-in headline catalog.
pub fn default_catalog() -> Result<Vec<MarketScenario>, ValidationError> {
    let pct = |n: i64| Decimal::new(n, 2);
    let row = |label: &str, e: i64, f: i64, c: i64| {
        MarketScenario::new(
            label,
            [
                (AssetClass::Equities, pct(e)),
                (AssetClass::FixedIncome, pct(f)),
                (AssetClass::Commodities, pct(c)),
            ],
        )
    };
    Ok(vec![
        row(
            "Quantitative Easing: Equity markets surge on liquidity.",
            14,
            2,
            -4,
        )?,
        row(
            "Yield Curve Inversion: Recessional fears drive investors to Gold.",
            -15,
            5,
            12,
        )?,
        row(
            "Aggressive Rate Hike: Bond prices fall, Stock volatility increases.",
            -10,
            -7,
            -3,
        )?,
        row(
            "Positive Earnings Season: Corporate growth exceeds forecasts.",
            11,
            1,
            -6,
        )?,
    ])
}

/// Uniform draw with replacement from a fixed list of scenarios.
#[derive(Clone, Debug)]
pub struct ScenarioCatalog {
    scenarios: Vec<MarketScenario>,
    rng: ChaCha8Rng,
}

impl ScenarioCatalog {
    /// Catalog over `scenarios`, seeded for reproducibility.
    pub fn new(scenarios: Vec<MarketScenario>, seed: u64) -> Result<Self, MarketError> {
        if scenarios.is_empty() {
            return Err(ValidationError::EmptyCatalog.into());
        }
        Ok(Self {
            scenarios,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// The built-in catalog, seeded.
    pub fn standard(seed: u64) -> Result<Self, MarketError> {
        Self::new(default_catalog()?, seed)
    }

    /// Scenarios available for drawing.
    pub fn scenarios(&self) -> &[MarketScenario] {
        &self.scenarios
    }
}

impl MarketModel for ScenarioCatalog {
    fn next_scenario(&mut self) -> Result<MarketScenario, MarketError> {
        let idx = self.rng.gen_range(0..self.scenarios.len());
        debug!(idx, label = self.scenarios[idx].label(), "catalog scenario drawn");
        Ok(self.scenarios[idx].clone())
    }
}

/// Mean and volatility of one asset's per-round return.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReturnParams {
    /// Expected return per round (e.g. 0.01 = 1%).
    pub mean: f64,
    /// Standard deviation per round (>= 0).
    pub volatility: f64,
}

/// Default per-asset parameters: equities most volatile, bonds least.
pub fn default_return_params() -> AssetMap<ReturnParams> {
    AssetMap::from([
        (
            AssetClass::Equities,
            ReturnParams {
                mean: 0.01,
                volatility: 0.08,
            },
        ),
        (
            AssetClass::FixedIncome,
            ReturnParams {
                mean: 0.003,
                volatility: 0.02,
            },
        ),
        (
            AssetClass::Commodities,
            ReturnParams {
                mean: 0.005,
                volatility: 0.05,
            },
        ),
    ])
}

/// Independent normal return per asset, floored so prices stay positive.
#[derive(Clone, Debug)]
pub struct GaussianModel {
    dists: Vec<(AssetClass, Normal<f64>)>,
    rng: ChaCha8Rng,
}

impl GaussianModel {
    /// Model over `params`, seeded for reproducibility.
    pub fn new(params: AssetMap<ReturnParams>, seed: u64) -> Result<Self, MarketError> {
        let mut dists = Vec::with_capacity(params.len());
        for (asset, p) in params {
            if !(p.mean.is_finite() && p.volatility.is_finite() && p.volatility >= 0.0) {
                return Err(MarketError::InvalidParameters(asset, p.mean, p.volatility));
            }
            let normal = Normal::new(p.mean, p.volatility)
                .map_err(|_| MarketError::InvalidParameters(asset, p.mean, p.volatility))?;
            dists.push((asset, normal));
        }
        Ok(Self {
            dists,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }
}

impl MarketModel for GaussianModel {
    fn next_scenario(&mut self) -> Result<MarketScenario, MarketError> {
        let mut returns = AssetMap::new();
        for (asset, normal) in &self.dists {
            let r = normal.sample(&mut self.rng).max(GAUSSIAN_RETURN_FLOOR);
            let r = Decimal::from_f64(r).unwrap_or(Decimal::ZERO).round_dp(4);
            returns.insert(*asset, r);
        }
        let label = describe_moves(&returns);
        debug!(%label, "gaussian scenario drawn");
        Ok(MarketScenario::new(label, returns)?)
    }
}

fn describe_moves(returns: &AssetMap<Decimal>) -> String {
    let parts: Vec<String> = returns
        .iter()
        .map(|(a, r)| format!("{} {:+.1}%", a.symbol(), r.to_f64().unwrap_or(0.0) * 100.0))
        .collect();
    format!("Market drift: {}", parts.join(", "))
}

/// Replays a fixed list of scenarios in order, wrapping around.
#[derive(Clone, Debug)]
pub struct ScriptedModel {
    scenarios: Vec<MarketScenario>,
    next: usize,
}

impl ScriptedModel {
    /// Script over `scenarios`; must be non-empty.
    pub fn new(scenarios: Vec<MarketScenario>) -> Result<Self, MarketError> {
        if scenarios.is_empty() {
            return Err(ValidationError::EmptyCatalog.into());
        }
        Ok(Self { scenarios, next: 0 })
    }

    /// Always the same scenario.
    pub fn repeat(scenario: MarketScenario) -> Self {
        Self {
            scenarios: vec![scenario],
            next: 0,
        }
    }
}

impl MarketModel for ScriptedModel {
    fn next_scenario(&mut self) -> Result<MarketScenario, MarketError> {
        let s = self.scenarios[self.next % self.scenarios.len()].clone();
        self.next = self.next.wrapping_add(1);
        Ok(s)
    }
}

/// Build the model selected by `cfg`.
pub fn build_model(cfg: &SimConfig) -> Result<Box<dyn MarketModel>, MarketError> {
    Ok(match cfg.market_model {
        MarketModelKind::Catalog => Box::new(ScenarioCatalog::standard(cfg.rng_seed)?),
        MarketModelKind::Gaussian => {
            Box::new(GaussianModel::new(default_return_params(), cfg.rng_seed)?)
        }
    })
}
