//! Bar loading for the runner.
//!
//! Bars come from a CSV file (`symbol,timestamp,open,high,low,close,volume`)
//! or, when no file is configured, from a deterministic synthetic random
//! walk. Synthetic results are tagged so they are never mistaken for
//! research on real data.
//!
//! Loading does not validate bar contents: a malformed bar is the engine's
//! business and ends the run at the step it appears.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use serde::Deserialize;
use simlab_core::domain::Bar;
use simlab_core::engine::{BarFeed, VecFeed};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RunSection;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("row {row}: unparseable timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },

    /// Nothing to simulate for the requested symbols.
    #[error("no bars loaded for [{}]", .0.join(", "))]
    Empty(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    symbol: String,
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Bars plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub feed: VecFeed,
    /// BLAKE3 over every bar in symbol order.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    Some(date_to_utc(date))
}

fn date_to_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Parse bars from any CSV reader. Rows keep file order within a symbol.
pub fn read_bars<R: std::io::Read>(reader: R, path: &Path) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();

    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        // Header is line 1.
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::BadTimestamp {
            row: i + 2,
            value: row.timestamp.clone(),
        })?;
        bars.push(Bar {
            symbol: row.symbol,
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    Ok(bars)
}

/// Load a CSV file into a feed, keeping only `symbols` when non-empty.
pub fn load_csv(path: &Path, symbols: &[String]) -> Result<VecFeed, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_bars(file, path)?;
    let feed = VecFeed::from_bars(
        bars.into_iter()
            .filter(|b| symbols.is_empty() || symbols.contains(&b.symbol)),
    );

    if feed.is_empty() {
        return Err(LoadError::Empty(symbols.to_vec()));
    }
    if let Some(missing) = symbols.iter().find(|s| feed.bars(s).is_empty()) {
        warn!(symbol = %missing, path = %path.display(), "symbol has no bars in data file");
    }
    Ok(feed)
}

/// Deterministic daily random walk from 100.0, weekdays only.
///
/// The RNG is seeded from the symbol and `seed`, so every symbol gets its
/// own path and the same inputs always give the same bars.
pub fn generate_synthetic_bars(symbol: &str, start: NaiveDate, count: usize, seed: u64) -> Vec<Bar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(&seed.to_le_bytes());
    let mut rng = StdRng::from_seed(*hasher.finalize().as_bytes());

    let mut bars = Vec::with_capacity(count);
    let mut price = 100.0_f64;
    let mut current = start;

    while bars.len() < count {
        let weekday = current.weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            current += Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64) as f64;

        bars.push(Bar {
            symbol: symbol.to_string(),
            timestamp: date_to_utc(current),
            open,
            high,
            low,
            close,
            volume,
        });

        price = close;
        current += Duration::days(1);
    }

    bars
}

/// Deterministic BLAKE3 hash over all bars, symbols in sorted order.
pub fn dataset_hash(feed: &dyn BarFeed) -> String {
    let mut hasher = blake3::Hasher::new();
    let mut symbols = feed.symbols();
    symbols.sort();

    for symbol in &symbols {
        hasher.update(symbol.as_bytes());
        for bar in feed.stream(symbol) {
            hasher.update(&bar.timestamp.timestamp().to_le_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
    }

    hasher.finalize().to_hex().to_string()
}

/// Resolve the `[run]` data source into a feed.
pub fn load_feed(run: &RunSection) -> Result<LoadedData, LoadError> {
    let (feed, has_synthetic) = match &run.data {
        Some(path) => (load_csv(path, &run.symbols)?, false),
        None => {
            if run.symbols.is_empty() {
                return Err(LoadError::Empty(Vec::new()));
            }
            warn!(
                symbols = ?run.symbols,
                bars = run.synthetic_bars,
                "no data file configured; generating synthetic bars"
            );
            let feed = VecFeed::from_bars(run.symbols.iter().flat_map(|symbol| {
                generate_synthetic_bars(symbol, run.synthetic_start, run.synthetic_bars, run.seed)
            }));
            (feed, true)
        }
    };

    let dataset_hash = dataset_hash(&feed);
    info!(
        symbols = feed.symbols().len(),
        bars = feed.len(),
        synthetic = has_synthetic,
        hash = %&dataset_hash[..12],
        "data loaded"
    );

    Ok(LoadedData {
        feed,
        dataset_hash,
        has_synthetic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
symbol,timestamp,open,high,low,close,volume
SPY,2024-01-02,100,102,99,101,1000
SPY,2024-01-03T00:00:00Z,101,103,100,102,1100
QQQ,2024-01-02,50,51,49,50.5,800
";

    #[test]
    fn parses_both_timestamp_forms() {
        let a = parse_timestamp("2024-01-02").unwrap();
        let b = parse_timestamp("2024-01-02T00:00:00+00:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert!(parse_timestamp("02/01/2024").is_none());
    }

    #[test]
    fn reads_rows_in_order() {
        let bars = read_bars(CSV.as_bytes(), Path::new("inline")).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[1].symbol, "SPY");
        assert_eq!(bars[1].close, 102.0);
        assert_eq!(bars[2].volume, 800.0);
    }

    #[test]
    fn bad_timestamp_names_the_row() {
        let text = "symbol,timestamp,open,high,low,close,volume\nSPY,yesterday,1,1,1,1,1\n";
        let err = read_bars(text.as_bytes(), Path::new("inline")).unwrap_err();
        assert!(matches!(err, LoadError::BadTimestamp { row: 2, .. }));
    }

    #[test]
    fn synthetic_bars_are_deterministic_and_skip_weekends() {
        // 2024-01-05 is a Friday.
        let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        let a = generate_synthetic_bars("SPY", start, 10, 1);
        let b = generate_synthetic_bars("SPY", start, 10, 1);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert_eq!(a[1].timestamp, Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
        assert!(a.iter().all(|bar| bar.is_sane()));
        for w in a.windows(2) {
            assert_eq!(w[1].open, w[0].close);
        }

        let other_seed = generate_synthetic_bars("SPY", start, 10, 2);
        assert_ne!(a, other_seed);
        let other_symbol = generate_synthetic_bars("QQQ", start, 10, 1);
        assert_ne!(a[0].close, other_symbol[0].close);
    }

    #[test]
    fn dataset_hash_tracks_content() {
        let bars = read_bars(CSV.as_bytes(), Path::new("inline")).unwrap();
        let feed = VecFeed::from_bars(bars.clone());
        let same = VecFeed::from_bars(bars.clone());
        assert_eq!(dataset_hash(&feed), dataset_hash(&same));

        let mut changed = bars;
        changed[0].close = 101.5;
        assert_ne!(dataset_hash(&feed), dataset_hash(&VecFeed::from_bars(changed)));
    }

    #[test]
    fn synthetic_feed_when_no_file() {
        let run = RunSection {
            symbols: vec!["AAA".into(), "BBB".into()],
            synthetic_bars: 20,
            ..RunSection::default()
        };
        let loaded = load_feed(&run).unwrap();
        assert!(loaded.has_synthetic);
        assert_eq!(loaded.feed.len(), 40);
        assert_eq!(loaded.dataset_hash, load_feed(&run).unwrap().dataset_hash);
    }

    #[test]
    fn synthetic_feed_needs_symbols() {
        let run = RunSection {
            symbols: Vec::new(),
            ..RunSection::default()
        };
        assert!(matches!(load_feed(&run), Err(LoadError::Empty(_))));
    }
}
