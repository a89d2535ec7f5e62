#![deny(warnings)]

//! Outbound collaborators of the simulation: quote sources and report sinks.
//!
//! Both sit behind narrow traits so the engine can run against fakes. A failing
//! quote source never blocks a session: [`resolve_seed_prices`] substitutes the
//! static fallback prices. Report delivery is best-effort and never touches
//! simulation state.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_core::{fallback_prices, AssetClass, AssetMap, PriceBook, ValidationError};
use sim_engine::Summary;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors from quote sources.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The quote source could not be read.
    #[error("quote source unavailable: {0}")]
    Io(#[from] std::io::Error),
    /// The quote payload is malformed.
    #[error("malformed quotes: {0}")]
    Parse(#[from] serde_json::Error),
    /// A quote uses a symbol outside the fixed set.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
    /// Quotes are incomplete or non-positive.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Errors from report sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the report failed.
    #[error("report delivery failed: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding the report failed.
    #[error("report encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Lookup of the current unit price per asset class.
pub trait PriceSource {
    /// Fetch one complete, validated price book.
    fn fetch_prices(&self) -> Result<PriceBook, FeedError>;
}

/// A source that always returns the same prices.
#[derive(Clone, Debug)]
pub struct StaticPrices(pub PriceBook);

impl Default for StaticPrices {
    fn default() -> Self {
        Self(fallback_prices())
    }
}

impl PriceSource for StaticPrices {
    fn fetch_prices(&self) -> Result<PriceBook, FeedError> {
        Ok(self.0.clone())
    }
}

/// Quotes read from a JSON object keyed by asset symbol, e.g. `{"EQ": 480.5, "FI": 95, "CM": 185}`.
#[derive(Clone, Debug)]
pub struct JsonQuoteFile {
    path: PathBuf,
}

impl JsonQuoteFile {
    /// Quotes read from the file at `path` on each fetch.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl PriceSource for JsonQuoteFile {
    fn fetch_prices(&self) -> Result<PriceBook, FeedError> {
        let text = fs::read_to_string(&self.path)?;
        parse_quotes(&text)
    }
}

/// Parse a symbol-keyed quote object into a price book.
pub fn parse_quotes(text: &str) -> Result<PriceBook, FeedError> {
    let raw: BTreeMap<String, Decimal> = serde_json::from_str(text)?;
    let mut prices = AssetMap::new();
    for (symbol, price) in raw {
        let asset = AssetClass::ALL
            .into_iter()
            .find(|a| a.symbol().eq_ignore_ascii_case(symbol.trim()))
            .ok_or_else(|| FeedError::UnknownSymbol(symbol.clone()))?;
        prices.insert(asset, price);
    }
    Ok(PriceBook::new(prices)?)
}

/// Seed prices from `source`, falling back to the static constants on any failure.
pub fn resolve_seed_prices(source: &dyn PriceSource) -> PriceBook {
    match source.fetch_prices() {
        Ok(book) => book,
        Err(e) => {
            warn!(error = %e, "price feed unavailable, using fallback prices");
            fallback_prices()
        }
    }
}

/// Flat record handed to reporting once a simulation is terminal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub student_name: String,
    pub instructor_contact: String,
    pub initial_capital: Decimal,
    pub final_value: Decimal,
    pub total_return_percent: Decimal,
}

impl ReportRecord {
    /// Build a record from a summary; ROI is rounded to two decimals.
    pub fn new(
        student_name: impl Into<String>,
        instructor_contact: impl Into<String>,
        summary: &Summary,
    ) -> Self {
        Self {
            student_name: student_name.into(),
            instructor_contact: instructor_contact.into(),
            initial_capital: summary.initial_capital,
            final_value: summary.final_value.round_dp(2),
            total_return_percent: summary.total_return_percent.round_dp(2),
        }
    }
}

/// Destination for finished reports.
pub trait ReportSink {
    /// Deliver one record.
    fn submit(&mut self, record: &ReportRecord) -> Result<(), SinkError>;
}

/// Appends one JSON object per line to a writer.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    /// Sink writing records to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the sink and return the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl JsonLinesSink<BufWriter<File>> {
    /// Append to the file at `path`, creating parent directories as needed.
    pub fn append_to<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn submit(&mut self, record: &ReportRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Keeps submitted reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ReportRecord>,
}

impl ReportSink for MemorySink {
    fn submit(&mut self, record: &ReportRecord) -> Result<(), SinkError> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Submit once, logging the outcome. No retries.
pub fn deliver(sink: &mut dyn ReportSink, record: &ReportRecord) -> Result<(), SinkError> {
    match sink.submit(record) {
        Ok(()) => {
            info!(student = %record.student_name, "report delivered");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "report delivery failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{initial_capital, Allocation};
    use sim_engine::{summarize_history, Session};
    use sim_market::ScenarioCatalog;
    use std::io;

    struct DownFeed;

    impl PriceSource for DownFeed {
        fn fetch_prices(&self) -> Result<PriceBook, FeedError> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "quote service timed out").into())
        }
    }

    struct BrokenSink;

    impl ReportSink for BrokenSink {
        fn submit(&mut self, _record: &ReportRecord) -> Result<(), SinkError> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "smtp down").into())
        }
    }

    #[test]
    fn quotes_parse_by_symbol() {
        let book = parse_quotes(r#"{"EQ": 480.5, "fi": 95, "CM": "185"}"#).unwrap();
        assert_eq!(book.price(AssetClass::Equities), Decimal::new(4805, 1));
        assert_eq!(book.price(AssetClass::FixedIncome), Decimal::new(95, 0));
        assert_eq!(book.price(AssetClass::Commodities), Decimal::new(185, 0));
    }

    #[test]
    fn bad_quotes_are_errors() {
        assert!(matches!(
            parse_quotes(r#"{"EQ": 1, "FI": 1, "XX": 1}"#),
            Err(FeedError::UnknownSymbol(s)) if s == "XX"
        ));
        assert!(matches!(
            parse_quotes(r#"{"EQ": 1, "FI": 1}"#),
            Err(FeedError::Invalid(ValidationError::MissingPrice(AssetClass::Commodities)))
        ));
        assert!(matches!(
            parse_quotes(r#"{"EQ": 0, "FI": 1, "CM": 1}"#),
            Err(FeedError::Invalid(ValidationError::NonPositivePrice(..)))
        ));
        assert!(matches!(parse_quotes("not json"), Err(FeedError::Parse(_))));
    }

    #[test]
    fn feed_failure_falls_back_to_constants() {
        assert_eq!(resolve_seed_prices(&DownFeed), fallback_prices());
        let missing = JsonQuoteFile::new("/definitely/not/here/quotes.json");
        assert_eq!(resolve_seed_prices(&missing), fallback_prices());
    }

    #[test]
    fn quote_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.json");
        fs::write(&path, r#"{"EQ": 500, "FI": 100, "CM": 200}"#).unwrap();
        let book = resolve_seed_prices(&JsonQuoteFile::new(&path));
        assert_eq!(book.price(AssetClass::Equities), Decimal::new(500, 0));
        assert_ne!(book, fallback_prices());
    }

    #[test]
    fn record_from_summary() {
        let s = summarize_history(
            initial_capital(),
            &[initial_capital(), Decimal::new(1_100_000, 0)],
        );
        let r = ReportRecord::new("Ada", "prof@example.edu", &s);
        assert_eq!(r.total_return_percent, Decimal::new(10, 0));
        assert_eq!(r.final_value, Decimal::new(1_100_000, 0));
        assert_eq!(r.initial_capital, initial_capital());
    }

    #[test]
    fn json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/out.jsonl");
        let s = summarize_history(initial_capital(), &[initial_capital()]);
        let rec = ReportRecord::new("Ada", "prof@example.edu", &s);
        {
            let mut sink = JsonLinesSink::append_to(&path).unwrap();
            deliver(&mut sink, &rec).unwrap();
        }
        {
            let mut sink = JsonLinesSink::append_to(&path).unwrap();
            deliver(&mut sink, &rec).unwrap();
        }
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: ReportRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn failed_delivery_leaves_session_untouched() {
        let mut session = Session::new(
            initial_capital(),
            resolve_seed_prices(&DownFeed),
            Box::new(ScenarioCatalog::standard(5).unwrap()),
        )
        .unwrap();
        while !session.is_terminal() {
            session.submit(&Allocation::from_whole(34, 33, 33)).unwrap();
        }
        let before = session.state().clone();
        let rec = ReportRecord::new("Ada", "prof@example.edu", &session.summary());
        assert!(deliver(&mut BrokenSink, &rec).is_err());
        assert_eq!(session.state(), &before);

        let mut mem = MemorySink::default();
        deliver(&mut mem, &rec).unwrap();
        assert_eq!(mem.records, vec![rec]);
    }
}
