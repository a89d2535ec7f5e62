#![deny(warnings)]

//! Portfolio simulation engine: turn-based rebalancing and valuation.
//!
//! The engine is a set of pure state transitions over [`SimulationState`]:
//! [`initialize`] builds a fresh playthrough, [`execute_allocation`] rebalances
//! the whole portfolio at current prices, applies one market move and revalues,
//! and [`summarize`] projects the result for reporting. [`Session`] pairs a state
//! with a seeded [`MarketModel`] for shells that just want to submit allocations.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{
    validate_capital, AssetClass, AssetMap, Allocation, MarketScenario, PriceBook, SimConfig,
    ValidationError, INITIAL_HEADLINE, MAX_ROUNDS,
};
use sim_market::{MarketError, MarketModel};
use thiserror::Error;
use tracing::{debug, info};

/// Scaling applied to volatility in the display-only Sharpe-like ratio.
const SHARPE_VOL_SCALE: f64 = 10_000.0;

/// Reasons an allocation request does not advance the simulation.
#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    /// Validation failed; the state is unchanged.
    #[error("{0}")]
    Rejected(ValidationError),
    /// All rounds have been played.
    #[error("simulation complete after {0} rounds; start a new session to continue")]
    SimulationComplete(u32),
    /// A price became non-positive or the arithmetic overflowed: broken
    /// configuration, not a user error.
    #[error("simulation cannot continue: {0}")]
    Fatal(ValidationError),
    /// The market model could not produce a scenario.
    #[error(transparent)]
    Market(#[from] MarketError),
}

/// All mutable data for one playthrough.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    round: u32,
    initial_capital: Decimal,
    cash_balance: Decimal,
    prices: PriceBook,
    holdings: AssetMap<Decimal>,
    valuation_history: Vec<Decimal>,
    last_event: String,
}

impl SimulationState {
    /// 1-based round about to be played; `MAX_ROUNDS + 1` once finished.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Capital the playthrough started with.
    pub fn initial_capital(&self) -> Decimal {
        self.initial_capital
    }

    /// Capital not allocated to any asset.
    pub fn cash_balance(&self) -> Decimal {
        self.cash_balance
    }

    /// Current unit prices.
    pub fn prices(&self) -> &PriceBook {
        &self.prices
    }

    /// Quantity held of `asset`.
    pub fn holding(&self, asset: AssetClass) -> Decimal {
        self.holdings.get(&asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// All holdings.
    pub fn holdings(&self) -> &AssetMap<Decimal> {
        &self.holdings
    }

    /// Realized total value after each round, seeded with the initial capital.
    pub fn valuation_history(&self) -> &[Decimal] {
        &self.valuation_history
    }

    /// Most recently realized total value.
    pub fn current_value(&self) -> Decimal {
        self.valuation_history
            .last()
            .copied()
            .unwrap_or(self.initial_capital)
    }

    /// Headline of the last market move.
    pub fn last_event(&self) -> &str {
        &self.last_event
    }

    /// Assets under management: cash plus holdings marked at current prices.
    ///
    /// `None` only if the marked value leaves the decimal range, which a state
    /// produced by [`execute_allocation`] never does.
    pub fn aum(&self) -> Option<Decimal> {
        mark_to_market(self.cash_balance, &self.holdings, &self.prices)
    }

    /// Share of rounds completed, in whole percent.
    pub fn completion_percent(&self) -> u32 {
        (self.round.saturating_sub(1).min(MAX_ROUNDS) * 100) / MAX_ROUNDS
    }

    /// True once every round has been played.
    pub fn is_terminal(&self) -> bool {
        is_terminal(self)
    }
}

fn mark_to_market(
    cash: Decimal,
    holdings: &AssetMap<Decimal>,
    prices: &PriceBook,
) -> Option<Decimal> {
    holdings.iter().try_fold(cash, |acc, (asset, qty)| {
        qty.checked_mul(prices.price(*asset))
            .and_then(|v| acc.checked_add(v))
    })
}

/// `percent`% of `amount`. The fraction is taken first so it never exceeds 1.
fn share_of(amount: Decimal, percent: Decimal) -> Option<Decimal> {
    amount.checked_mul(percent.checked_div(Decimal::ONE_HUNDRED)?)
}

/// Start a playthrough with `initial_capital` in cash and no holdings.
///
/// Fails fast on non-positive capital; prices are validated by [`PriceBook`].
pub fn initialize(
    initial_capital: Decimal,
    seed_prices: PriceBook,
) -> Result<SimulationState, ValidationError> {
    validate_capital(initial_capital)?;
    Ok(SimulationState {
        round: 1,
        initial_capital,
        cash_balance: initial_capital,
        prices: seed_prices,
        holdings: AssetClass::ALL.iter().map(|a| (*a, Decimal::ZERO)).collect(),
        valuation_history: vec![initial_capital],
        last_event: INITIAL_HEADLINE.to_string(),
    })
}

/// True when `state.round > MAX_ROUNDS`.
pub fn is_terminal(state: &SimulationState) -> bool {
    state.round > MAX_ROUNDS
}

/// Rebalance to `allocation`, apply `scenario`, revalue and advance one round.
///
/// Holdings are re-derived from total wealth at current prices; prior holdings
/// are discarded. On error the input state is left as it was.
pub fn execute_allocation(
    state: &SimulationState,
    allocation: &Allocation,
    scenario: &MarketScenario,
) -> Result<SimulationState, AllocationError> {
    if is_terminal(state) {
        return Err(AllocationError::SimulationComplete(MAX_ROUNDS));
    }
    allocation.validate().map_err(AllocationError::Rejected)?;

    let total_wealth = state.current_value();
    let mut holdings = AssetMap::new();
    for asset in AssetClass::ALL {
        let qty = share_of(total_wealth, allocation.percent(asset))
            .and_then(|budget| budget.checked_div(state.prices.price(asset)))
            .ok_or(AllocationError::Fatal(ValidationError::Overflow(
                "converting allocation to quantities",
            )))?;
        holdings.insert(asset, qty);
    }
    let cash_balance = share_of(total_wealth, allocation.cash_percent()).ok_or(
        AllocationError::Fatal(ValidationError::Overflow("computing cash balance")),
    )?;

    let prices = state
        .prices
        .apply(scenario)
        .map_err(AllocationError::Fatal)?;
    let value = mark_to_market(cash_balance, &holdings, &prices).ok_or(
        AllocationError::Fatal(ValidationError::Overflow("revaluing the portfolio")),
    )?;

    let mut valuation_history = state.valuation_history.clone();
    valuation_history.push(value);
    debug!(
        round = state.round,
        %total_wealth,
        %cash_balance,
        %value,
        event = scenario.label(),
        "round executed"
    );
    Ok(SimulationState {
        round: state.round + 1,
        initial_capital: state.initial_capital,
        cash_balance,
        prices,
        holdings,
        valuation_history,
        last_event: scenario.label().to_string(),
    })
}

/// End-of-game figures derived from the valuation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Capital the playthrough started with.
    pub initial_capital: Decimal,
    /// Last realized total value.
    pub final_value: Decimal,
    /// ROI relative to the initial capital, in percent.
    pub total_return_percent: Decimal,
    /// Full valuation history.
    pub history: Vec<Decimal>,
    /// Population standard deviation of the history (display only).
    pub volatility: f64,
    /// `total_return_percent / (volatility / 10000)`; `None` for a flat history.
    /// A cosmetic figure, not a risk metric.
    pub sharpe_like: Option<f64>,
}

impl Summary {
    /// Rows of the final financial statement, formatted for display.
    pub fn statement_rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Final Portfolio Value", format_usd(self.final_value)),
            (
                "Total Return (ROI %)",
                format!("{:.2}%", self.total_return_percent.round_dp(2)),
            ),
            ("Initial Capital", format_usd(self.initial_capital)),
        ]
    }
}

/// Project `state` into a [`Summary`]. Pure.
pub fn summarize(state: &SimulationState) -> Summary {
    summarize_history(state.initial_capital, &state.valuation_history)
}

/// Summary over an explicit history; an empty history means no change.
pub fn summarize_history(initial_capital: Decimal, history: &[Decimal]) -> Summary {
    let final_value = history.last().copied().unwrap_or(initial_capital);
    let total_return_percent = if initial_capital.is_zero() {
        Decimal::ZERO
    } else {
        final_value
            .checked_sub(initial_capital)
            .and_then(|gain| gain.checked_div(initial_capital))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            // Saturate rather than panic on absurd capital/value ratios.
            .unwrap_or(if final_value >= initial_capital {
                Decimal::MAX
            } else {
                Decimal::MIN
            })
    };
    let volatility = population_std_dev(history);
    let sharpe_like = if volatility > 0.0 {
        total_return_percent
            .to_f64()
            .map(|r| r / (volatility / SHARPE_VOL_SCALE))
    } else {
        None
    };
    Summary {
        initial_capital,
        final_value,
        total_return_percent,
        history: history.to_vec(),
        volatility,
        sharpe_like,
    }
}

fn population_std_dev(values: &[Decimal]) -> f64 {
    let xs: Vec<f64> = values.iter().filter_map(|v| v.to_f64()).collect();
    if xs.is_empty() {
        return 0.0;
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

/// Format a USD amount as `$1,234,567.89`.
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{frac}")
}

/// One user's playthrough: current state plus the market model driving it.
pub struct Session {
    initial_capital: Decimal,
    seed_prices: PriceBook,
    state: SimulationState,
    model: Box<dyn MarketModel>,
}

impl Session {
    /// Start a session with explicit seed prices and market model.
    pub fn new(
        initial_capital: Decimal,
        seed_prices: PriceBook,
        model: Box<dyn MarketModel>,
    ) -> Result<Self, ValidationError> {
        let state = initialize(initial_capital, seed_prices.clone())?;
        info!(%initial_capital, rounds = MAX_ROUNDS, "session started");
        Ok(Self {
            initial_capital,
            seed_prices,
            state,
            model,
        })
    }

    /// Start a session from configuration; `seed_prices` is used unless the config pins its own.
    pub fn from_config(
        cfg: &SimConfig,
        seed_prices: PriceBook,
        model: Box<dyn MarketModel>,
    ) -> Result<Self, ValidationError> {
        let prices = cfg.seed_prices.clone().unwrap_or(seed_prices);
        Self::new(cfg.initial_capital, prices, model)
    }

    /// Current state.
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Submit one round's allocation.
    ///
    /// The market model is only consulted for accepted allocations, so a
    /// rejected request neither changes the state nor advances the draw sequence.
    pub fn submit(&mut self, allocation: &Allocation) -> Result<&SimulationState, AllocationError> {
        if self.state.is_terminal() {
            return Err(AllocationError::SimulationComplete(MAX_ROUNDS));
        }
        allocation.validate().map_err(AllocationError::Rejected)?;
        let scenario = self.model.next_scenario()?;
        self.state = execute_allocation(&self.state, allocation, &scenario)?;
        if self.state.is_terminal() {
            info!(final_value = %self.state.current_value(), "simulation concluded");
        }
        Ok(&self.state)
    }

    /// True once every round has been played.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Summary of the current state.
    pub fn summary(&self) -> Summary {
        summarize(&self.state)
    }

    /// Discard the playthrough and start over from the seed prices.
    pub fn reset(&mut self) -> Result<(), ValidationError> {
        self.state = initialize(self.initial_capital, self.seed_prices.clone())?;
        info!("session reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sim_market::{ScenarioCatalog, ScriptedModel};

    fn book(e: i64, f: i64, c: i64) -> PriceBook {
        PriceBook::new(AssetMap::from([
            (AssetClass::Equities, Decimal::new(e, 0)),
            (AssetClass::FixedIncome, Decimal::new(f, 0)),
            (AssetClass::Commodities, Decimal::new(c, 0)),
        ]))
        .unwrap()
    }

    fn capital() -> Decimal {
        Decimal::new(1_000_000, 0)
    }

    fn flat() -> MarketScenario {
        MarketScenario::new("Flat market", AssetMap::new()).unwrap()
    }

    fn move_all(bp: i64) -> MarketScenario {
        let r = Decimal::new(bp, 4);
        MarketScenario::new("Move", AssetClass::ALL.iter().map(|a| (*a, r))).unwrap()
    }

    #[test]
    fn initialize_seeds_state() {
        let s = initialize(capital(), book(500, 100, 200)).unwrap();
        assert_eq!(s.round(), 1);
        assert_eq!(s.cash_balance(), capital());
        assert_eq!(s.valuation_history(), &[capital()]);
        assert_eq!(s.last_event(), INITIAL_HEADLINE);
        assert_eq!(s.completion_percent(), 0);
        for a in AssetClass::ALL {
            assert_eq!(s.holding(a), Decimal::ZERO);
        }
        assert!(!s.is_terminal());
    }

    #[test]
    fn initialize_fails_fast_on_bad_capital() {
        assert_eq!(
            initialize(Decimal::ZERO, book(1, 1, 1)),
            Err(ValidationError::NonPositiveCapital(Decimal::ZERO))
        );
    }

    #[test]
    fn full_allocation_converts_wealth_to_quantities() {
        let s = initialize(capital(), book(500, 100, 200)).unwrap();
        let next = execute_allocation(&s, &Allocation::from_whole(40, 30, 30), &flat()).unwrap();
        assert_eq!(next.cash_balance(), Decimal::ZERO);
        assert_eq!(next.holding(AssetClass::Equities), Decimal::new(800, 0));
        assert_eq!(next.holding(AssetClass::FixedIncome), Decimal::new(3000, 0));
        assert_eq!(next.holding(AssetClass::Commodities), Decimal::new(1500, 0));
        assert_eq!(next.current_value(), capital());
        assert_eq!(next.last_event(), "Flat market");
    }

    #[test]
    fn overallocation_is_rejected_without_side_effects() {
        let s = initialize(capital(), book(500, 100, 200)).unwrap();
        let before = s.clone();
        let err = execute_allocation(&s, &Allocation::from_whole(50, 60, 0), &flat()).unwrap_err();
        assert_eq!(
            err,
            AllocationError::Rejected(ValidationError::Overallocated(Decimal::new(110, 0)))
        );
        assert!(err.to_string().contains("exceeds 100%"));
        assert_eq!(s, before);
        assert_eq!(s.valuation_history().len(), 1);
    }

    #[test]
    fn unallocated_share_stays_in_cash_and_is_unaffected_by_moves() {
        let s = initialize(capital(), book(500, 100, 200)).unwrap();
        let next = execute_allocation(&s, &Allocation::from_whole(50, 0, 0), &move_all(1000)).unwrap();
        assert_eq!(next.cash_balance(), Decimal::new(500_000, 0));
        // 1000 shares at 550 plus half a million cash.
        assert_eq!(next.current_value(), Decimal::new(1_050_000, 0));
        assert_eq!(next.prices().price(AssetClass::Equities), Decimal::new(550, 0));
    }

    #[test]
    fn rebalancing_discards_prior_holdings() {
        let s = initialize(capital(), book(500, 100, 200)).unwrap();
        let s = execute_allocation(&s, &Allocation::from_whole(100, 0, 0), &move_all(1000)).unwrap();
        let s = execute_allocation(&s, &Allocation::from_whole(0, 0, 0), &flat()).unwrap();
        assert_eq!(s.holding(AssetClass::Equities), Decimal::ZERO);
        assert_eq!(s.cash_balance(), Decimal::new(1_100_000, 0));
        assert_eq!(s.valuation_history().len(), 3);
    }

    #[test]
    fn five_rounds_then_terminal() {
        let mut session = Session::new(
            capital(),
            book(500, 100, 200),
            Box::new(ScenarioCatalog::standard(42).unwrap()),
        )
        .unwrap();
        let alloc = Allocation::from_whole(34, 33, 33);
        for round in 1..=MAX_ROUNDS {
            assert!(!session.is_terminal(), "terminal too early at round {round}");
            let s = session.submit(&alloc).unwrap();
            assert_eq!(s.valuation_history().len() as u32, round + 1);
        }
        assert!(session.is_terminal());
        assert_eq!(session.state().valuation_history().len(), 6);
        assert_eq!(session.state().completion_percent(), 100);
        assert_eq!(
            session.submit(&alloc).unwrap_err(),
            AllocationError::SimulationComplete(MAX_ROUNDS)
        );
    }

    #[test]
    fn same_seed_same_playthrough() {
        let run = |seed| {
            let mut s = Session::new(
                capital(),
                book(480, 95, 185),
                Box::new(ScenarioCatalog::standard(seed).unwrap()),
            )
            .unwrap();
            for _ in 0..MAX_ROUNDS {
                s.submit(&Allocation::from_whole(34, 33, 33)).unwrap();
            }
            s.state().valuation_history().to_vec()
        };
        assert_eq!(run(9), run(9));
    }

    #[test]
    fn rejected_submit_does_not_consume_a_draw() {
        let a = MarketScenario::new("A", AssetMap::new()).unwrap();
        let b = MarketScenario::new("B", AssetMap::new()).unwrap();
        let mut session = Session::new(
            capital(),
            book(500, 100, 200),
            Box::new(ScriptedModel::new(vec![a, b]).unwrap()),
        )
        .unwrap();
        let before = session.state().clone();
        assert!(session.submit(&Allocation::from_whole(90, 20, 0)).is_err());
        assert_eq!(session.state(), &before);
        let s = session.submit(&Allocation::from_whole(10, 20, 30)).unwrap();
        assert_eq!(s.last_event(), "A");
    }

    #[test]
    fn reset_recreates_initial_state() {
        let mut session = Session::new(
            capital(),
            book(500, 100, 200),
            Box::new(ScriptedModel::repeat(move_all(500))),
        )
        .unwrap();
        session.submit(&Allocation::from_whole(100, 0, 0)).unwrap();
        assert_eq!(session.state().round(), 2);
        session.reset().unwrap();
        assert_eq!(session.state(), &initialize(capital(), book(500, 100, 200)).unwrap());
    }

    #[test]
    fn config_prices_override_feed() {
        let cfg = SimConfig {
            seed_prices: Some(book(10, 20, 30)),
            ..SimConfig::default()
        };
        let session =
            Session::from_config(&cfg, book(1, 2, 3), Box::new(ScriptedModel::repeat(flat()))).unwrap();
        assert_eq!(session.state().prices(), &book(10, 20, 30));
    }

    #[test]
    fn summary_reports_roi() {
        let s = summarize_history(capital(), &[capital(), Decimal::new(1_100_000, 0)]);
        assert_eq!(s.total_return_percent, Decimal::new(10, 0));
        assert_eq!(format!("{:.2}", s.total_return_percent), "10.00");
        assert_eq!(s.final_value, Decimal::new(1_100_000, 0));
        assert!((s.volatility - 50_000.0).abs() < 1e-6);
        let sharpe = s.sharpe_like.unwrap();
        assert!((sharpe - 2.0).abs() < 1e-9);
    }

    #[test]
    fn summary_of_fresh_state_is_flat() {
        let s = summarize(&initialize(capital(), book(500, 100, 200)).unwrap());
        assert_eq!(s.total_return_percent, Decimal::ZERO);
        assert_eq!(s.volatility, 0.0);
        assert_eq!(s.sharpe_like, None);
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn statement_roi_is_rounded_not_truncated() {
        let s = summarize_history(capital(), &[capital(), Decimal::new(1_123_456, 0)]);
        assert_eq!(s.statement_rows()[1].1, "12.35%");
        let s = summarize_history(capital(), &[capital(), Decimal::new(876_544, 0)]);
        assert_eq!(s.statement_rows()[1].1, "-12.35%");
    }

    #[test]
    fn huge_capital_is_rebalanced_without_overflow() {
        let big = Decimal::from_i128_with_scale(10i128.pow(27), 0);
        let s = initialize(big, book(500, 100, 200)).unwrap();
        let next = execute_allocation(&s, &Allocation::from_whole(100, 0, 0), &flat()).unwrap();
        assert_eq!(next.current_value(), big);
        assert_eq!(next.aum(), Some(big));
    }

    #[test]
    fn revaluation_overflow_is_fatal_not_a_panic() {
        let s = initialize(Decimal::MAX, book(500, 100, 200)).unwrap();
        let before = s.clone();
        let err = execute_allocation(&s, &Allocation::from_whole(100, 0, 0), &move_all(1400))
            .unwrap_err();
        assert_eq!(
            err,
            AllocationError::Fatal(ValidationError::Overflow("revaluing the portfolio"))
        );
        assert_eq!(s, before);
    }

    #[test]
    fn tiny_seed_price_is_fatal_not_a_panic() {
        let tiny = PriceBook::new(AssetMap::from([
            (AssetClass::Equities, Decimal::new(1, 28)),
            (AssetClass::FixedIncome, Decimal::new(100, 0)),
            (AssetClass::Commodities, Decimal::new(200, 0)),
        ]))
        .unwrap();
        let s = initialize(capital(), tiny).unwrap();
        let err = execute_allocation(&s, &Allocation::from_whole(100, 0, 0), &flat()).unwrap_err();
        assert_eq!(
            err,
            AllocationError::Fatal(ValidationError::Overflow(
                "converting allocation to quantities"
            ))
        );
    }

    #[test]
    fn summary_saturates_on_extreme_ratio() {
        let s = summarize_history(Decimal::new(1, 28), &[Decimal::new(1, 28), Decimal::MAX]);
        assert_eq!(s.total_return_percent, Decimal::MAX);
    }

    #[test]
    fn statement_rows_are_formatted() {
        let s = summarize_history(capital(), &[capital(), Decimal::new(1_100_000, 0)]);
        let rows = s.statement_rows();
        assert_eq!(rows[0], ("Final Portfolio Value", "$1,100,000.00".to_string()));
        assert_eq!(rows[1], ("Total Return (ROI %)", "10.00%".to_string()));
        assert_eq!(rows[2], ("Initial Capital", "$1,000,000.00".to_string()));
    }

    #[test]
    fn usd_formatting() {
        assert_eq!(format_usd(Decimal::new(123_456_789, 2)), "$1,234,567.89");
        assert_eq!(format_usd(Decimal::new(999, 0)), "$999.00");
        assert_eq!(format_usd(Decimal::new(-150_050, 2)), "-$1,500.50");
        assert_eq!(format_usd(Decimal::ZERO), "$0.00");
    }

    #[test]
    fn state_serde_roundtrip() {
        let s = initialize(capital(), book(500, 100, 200)).unwrap();
        let s = execute_allocation(&s, &Allocation::from_whole(40, 30, 30), &move_all(-500)).unwrap();
        let text = serde_json::to_string(&s).unwrap();
        let back: SimulationState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, s);
    }

    fn within_budget() -> impl Strategy<Value = (u32, u32, u32)> {
        (0u32..=100)
            .prop_flat_map(|e| (Just(e), 0u32..=100 - e))
            .prop_flat_map(|(e, f)| (Just(e), Just(f), 0u32..=100 - e - f))
    }

    proptest! {
        #[test]
        fn accounting_invariant_holds((e, f, c) in within_budget(), seed in any::<u64>()) {
            let mut session = Session::new(
                capital(),
                book(480, 95, 185),
                Box::new(ScenarioCatalog::standard(seed).unwrap()),
            ).unwrap();
            let alloc = Allocation::from_whole(e, f, c);
            while !session.is_terminal() {
                let s = session.submit(&alloc).unwrap();
                prop_assert_eq!(s.aum(), Some(s.current_value()));
                prop_assert!(s.cash_balance() >= Decimal::ZERO);
                prop_assert_eq!(s.valuation_history().len() as u32, s.round());
            }
        }

        #[test]
        fn overallocation_never_changes_state(e in 0u32..=100, f in 0u32..=100, c in 0u32..=100) {
            prop_assume!(e + f + c > 100);
            let s = initialize(capital(), book(500, 100, 200)).unwrap();
            let before = s.clone();
            let r = execute_allocation(&s, &Allocation::from_whole(e, f, c), &flat());
            let rejected = matches!(r, Err(AllocationError::Rejected(ValidationError::Overallocated(_))));
            prop_assert!(rejected);
            prop_assert_eq!(s, before);
        }

        #[test]
        fn terminal_only_after_fifth_round(bp in -5_000i64..5_000, rounds in 0u32..=5) {
            let mut s = initialize(capital(), book(500, 100, 200)).unwrap();
            for _ in 0..rounds {
                s = execute_allocation(&s, &Allocation::from_whole(34, 33, 33), &move_all(bp)).unwrap();
            }
            prop_assert_eq!(is_terminal(&s), rounds == MAX_ROUNDS);
        }
    }
}
