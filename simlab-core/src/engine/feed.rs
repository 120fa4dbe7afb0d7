//! Bar feeds and the k-way merge that turns per-symbol streams into global
//! simulation steps.
//!
//! A step is the set of bars sharing the next-smallest timestamp across all
//! symbols. Every bar is validated as it is pulled; the first malformed or
//! out-of-order bar ends the merge with an error.

use crate::domain::Bar;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::iter::Peekable;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeedError {
    #[error("malformed bar for {symbol} at {timestamp}: {reason}")]
    MalformedBar {
        symbol: String,
        timestamp: DateTime<Utc>,
        reason: String,
    },

    #[error("bars for {symbol} out of order: {timestamp} does not follow {previous}")]
    NonMonotonic {
        symbol: String,
        previous: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
}

impl FeedError {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            FeedError::MalformedBar { timestamp, .. } | FeedError::NonMonotonic { timestamp, .. } => {
                *timestamp
            }
        }
    }
}

/// Source of historical bars, one finite stream per symbol.
///
/// `stream` must return a fresh iterator on every call so a run can be
/// repeated.
pub trait BarFeed {
    fn symbols(&self) -> Vec<String>;
    fn stream(&self, symbol: &str) -> Box<dyn Iterator<Item = Bar> + '_>;
}

/// In-memory feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VecFeed {
    bars: BTreeMap<String, Vec<Bar>>,
}

impl VecFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group bars by symbol, keeping their given order within each symbol.
    pub fn from_bars(bars: impl IntoIterator<Item = Bar>) -> Self {
        let mut feed = Self::new();
        for bar in bars {
            feed.push(bar);
        }
        feed
    }

    pub fn push(&mut self, bar: Bar) {
        self.bars.entry(bar.symbol.clone()).or_default().push(bar);
    }

    pub fn bars(&self, symbol: &str) -> &[Bar] {
        self.bars.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All bars, grouped by symbol in symbol order.
    pub fn all_bars(&self) -> impl Iterator<Item = &Bar> {
        self.bars.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BarFeed for VecFeed {
    fn symbols(&self) -> Vec<String> {
        self.bars.keys().cloned().collect()
    }

    fn stream(&self, symbol: &str) -> Box<dyn Iterator<Item = Bar> + '_> {
        Box::new(self.bars(symbol).iter().cloned())
    }
}

type Stream<'a> = Peekable<Box<dyn Iterator<Item = Bar> + 'a>>;

/// Iterator over global steps, each a symbol-sorted batch of bars sharing a
/// timestamp.
pub struct MergedFeed<'a> {
    streams: Vec<(String, Stream<'a>)>,
    last_seen: BTreeMap<String, DateTime<Utc>>,
    failed: bool,
}

impl<'a> MergedFeed<'a> {
    pub fn new(feed: &'a dyn BarFeed) -> Self {
        let mut symbols = feed.symbols();
        symbols.sort();
        symbols.dedup();
        let streams = symbols
            .into_iter()
            .map(|symbol| {
                let stream = feed.stream(&symbol).peekable();
                (symbol, stream)
            })
            .collect();
        Self {
            streams,
            last_seen: BTreeMap::new(),
            failed: false,
        }
    }

    fn check(&mut self, stream_symbol: &str, bar: &Bar) -> Result<(), FeedError> {
        let defect = if bar.symbol != stream_symbol {
            Some(format!("bar labelled {} in the {stream_symbol} stream", bar.symbol))
        } else {
            bar.defect()
        };
        if let Some(reason) = defect {
            return Err(FeedError::MalformedBar {
                symbol: stream_symbol.to_string(),
                timestamp: bar.timestamp,
                reason,
            });
        }
        if let Some(previous) = self.last_seen.get(stream_symbol) {
            if bar.timestamp <= *previous {
                return Err(FeedError::NonMonotonic {
                    symbol: stream_symbol.to_string(),
                    previous: *previous,
                    timestamp: bar.timestamp,
                });
            }
        }
        self.last_seen.insert(stream_symbol.to_string(), bar.timestamp);
        Ok(())
    }
}

impl Iterator for MergedFeed<'_> {
    type Item = Result<Vec<Bar>, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next_ts = self
            .streams
            .iter_mut()
            .filter_map(|(_, s)| s.peek().map(|b| b.timestamp))
            .min()?;

        let mut batch = Vec::new();
        for (symbol, stream) in &mut self.streams {
            if let Some(bar) = stream.next_if(|b| b.timestamp == next_ts) {
                batch.push((symbol.clone(), bar));
            }
        }

        let mut bars = Vec::with_capacity(batch.len());
        for (symbol, bar) in batch {
            if let Err(e) = self.check(&symbol, &bar) {
                self.failed = true;
                return Some(Err(e));
            }
            bars.push(bar);
        }
        Some(Ok(bars))
    }
}
