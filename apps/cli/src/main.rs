#![deny(warnings)]

//! Headless shell for the portfolio simulator.
//!
//! Allocations come from repeated `--alloc E,F,C` flags first, then from stdin,
//! one line per round. On stdin, `reset` restarts the playthrough and `quit` exits.
//! After the final statement the shell offers `reset` for a new session.

use anyhow::{anyhow, bail, Context, Result};
use gateways::{deliver, resolve_seed_prices, JsonLinesSink, JsonQuoteFile, ReportRecord, StaticPrices};
use rust_decimal::Decimal;
use sim_core::{validate_config, Allocation, AssetClass, MarketModelKind, SimConfig, MAX_ROUNDS};
use sim_engine::{format_usd, AllocationError, Session, SimulationState};
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    seed: Option<u64>,
    capital: Option<Decimal>,
    model: Option<MarketModelKind>,
    prices: Option<PathBuf>,
    allocs: VecDeque<String>,
    report: Option<PathBuf>,
    student: Option<String>,
    instructor: Option<String>,
}

fn parse_args<I: IntoIterator<Item = String>>(argv: I) -> Result<Args> {
    let mut args = Args::default();
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| anyhow!("missing value for {arg}"));
        match arg.as_str() {
            "--config" => args.config = Some(value()?.into()),
            "--seed" => args.seed = Some(value()?.parse().context("--seed")?),
            "--capital" => args.capital = Some(Decimal::from_str(&value()?).context("--capital")?),
            "--model" => args.model = Some(parse_model(&value()?)?),
            "--prices" => args.prices = Some(value()?.into()),
            "--alloc" => args.allocs.push_back(value()?),
            "--report" => args.report = Some(value()?.into()),
            "--student" => args.student = Some(value()?),
            "--instructor" => args.instructor = Some(value()?),
            other => warn!(arg = other, "ignoring unknown argument"),
        }
    }
    Ok(args)
}

fn parse_model(s: &str) -> Result<MarketModelKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "catalog" => Ok(MarketModelKind::Catalog),
        "gaussian" => Ok(MarketModelKind::Gaussian),
        other => bail!("unknown market model '{other}' (expected catalog or gaussian)"),
    }
}

/// Parse `E,F,C` percentages in display order; missing trailing values are 0.
fn parse_allocation(line: &str) -> Result<Allocation> {
    let parts: Vec<&str> = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > AssetClass::ALL.len() {
        bail!(
            "expected at most {} percentages, got {}",
            AssetClass::ALL.len(),
            parts.len()
        );
    }
    let mut pairs = Vec::with_capacity(parts.len());
    for (asset, raw) in AssetClass::ALL.into_iter().zip(parts) {
        let pct = Decimal::from_str(raw.trim_end_matches('%'))
            .with_context(|| format!("invalid percentage for {asset}: '{raw}'"))?;
        pairs.push((asset, pct));
    }
    Ok(Allocation::new(pairs))
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_yaml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SimConfig::default(),
    };
    if let Some(seed) = args.seed {
        cfg.rng_seed = seed;
    }
    if let Some(capital) = args.capital {
        cfg.initial_capital = capital;
    }
    if let Some(model) = args.model {
        cfg.market_model = model;
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

fn print_status(state: &SimulationState) {
    println!(
        "Trading Period: {} of {} | Market Headline: {}",
        state.round().min(MAX_ROUNDS),
        MAX_ROUNDS,
        state.last_event()
    );
    println!(
        "Cash Balance: {} | AUM: {} | Completion: {}%",
        format_usd(state.cash_balance()),
        format_usd(state.current_value()),
        state.completion_percent()
    );
}

fn print_statement(session: &Session) {
    let summary = session.summary();
    println!("Portfolio Simulation Concluded.");
    let curve: Vec<String> = summary.history.iter().map(|v| format_usd(*v)).collect();
    println!("Equity curve: {}", curve.join(" -> "));
    for (metric, value) in summary.statement_rows() {
        println!("{metric:<24} {value}");
    }
    match summary.sharpe_like {
        Some(s) => println!("Volatility: {:.2} | Sharpe-like: {:.4}", summary.volatility, s),
        None => println!("Volatility: {:.2}", summary.volatility),
    }
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut args = parse_args(std::env::args().skip(1))?;
    let cfg = load_config(&args)?;
    info!(seed = cfg.rng_seed, model = ?cfg.market_model, "starting CLI");

    let seed_prices = match &args.prices {
        Some(path) => resolve_seed_prices(&JsonQuoteFile::new(path)),
        None => resolve_seed_prices(&StaticPrices::default()),
    };
    let model = sim_market::build_model(&cfg)?;
    let mut session = Session::from_config(&cfg, seed_prices, model)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        play_rounds(&mut session, &mut args.allocs, &mut lines)?;
        if !session.is_terminal() {
            return Ok(());
        }
        print_status(session.state());
        print_statement(&session);
        submit_report(&args, &session);

        print!("Type 'reset' to initialize a new session or 'quit' to exit: ");
        io::stdout().flush()?;
        let next = loop {
            match lines.next() {
                None => break AfterConclusion::Exit,
                Some(line) => match parse_after_conclusion(&line?) {
                    Some(step) => break step,
                    None => eprintln!("expected 'reset' or 'quit'"),
                },
            }
        };
        match next {
            AfterConclusion::Exit => return Ok(()),
            AfterConclusion::NewSession => session.reset()?,
        }
    }
}

/// What the shell does once a playthrough has concluded.
#[derive(Debug, PartialEq)]
enum AfterConclusion {
    NewSession,
    Exit,
}

fn parse_after_conclusion(line: &str) -> Option<AfterConclusion> {
    match line.trim().to_ascii_lowercase().as_str() {
        "reset" | "new" => Some(AfterConclusion::NewSession),
        "quit" | "exit" | "" => Some(AfterConclusion::Exit),
        _ => None,
    }
}

/// Run rounds until the session is terminal. Returns early, leaving the
/// session active, when the user types `quit`.
fn play_rounds<B: BufRead>(
    session: &mut Session,
    allocs: &mut VecDeque<String>,
    lines: &mut io::Lines<B>,
) -> Result<()> {
    while !session.is_terminal() {
        print_status(session.state());
        let line = match allocs.pop_front() {
            Some(l) => l,
            None => {
                print!("Allocation % (equities,fixed income,commodities): ");
                io::stdout().flush()?;
                match lines.next() {
                    Some(l) => l?,
                    None => bail!("input ended before round {}", session.state().round()),
                }
            }
        };
        match line.trim() {
            "quit" => return Ok(()),
            "reset" => {
                session.reset()?;
                continue;
            }
            _ => {}
        }
        let allocation = match parse_allocation(&line) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("{e:#}");
                continue;
            }
        };
        match session.submit(&allocation) {
            Ok(_) => {}
            Err(AllocationError::Rejected(e)) => eprintln!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn submit_report(args: &Args, session: &Session) {
    if let Some(path) = &args.report {
        let record = ReportRecord::new(
            args.student.clone().unwrap_or_default(),
            args.instructor.clone().unwrap_or_default(),
            &session.summary(),
        );
        let delivered = JsonLinesSink::append_to(path)
            .and_then(|mut sink| deliver(&mut sink, &record));
        match delivered {
            Ok(()) => println!("Report written to {}", path.display()),
            Err(e) => eprintln!("Report not delivered: {e}"),
        }
    }
}
