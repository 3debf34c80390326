//! Time-bucketed bar resampling over the in-memory tape.
//!
//! The tape is a bounded FIFO of per-trade analytics points. Resampling
//! groups points into fixed-width buckets keyed by truncated event time and
//! derives OHLC from the traded prices in each bucket. Overlay series
//! (VWAP, bands, cumulative flow) take the last value observed inside the
//! bucket. Buckets with no trades produce no bar.

use std::collections::VecDeque;

use rust_decimal::Decimal;

/// One per-trade analytics sample on the tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapePoint {
    /// Event time in epoch milliseconds.
    pub time_millis: i64,
    /// Traded price.
    pub price: Decimal,
    /// Session VWAP after this trade.
    pub vwap: Decimal,
    /// Upper volatility band, once the window can produce one.
    pub upper: Option<Decimal>,
    /// Lower volatility band, once the window can produce one.
    pub lower: Option<Decimal>,
    /// Cumulative signed flow after this trade.
    pub flow: Decimal,
}

/// One resampled bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bar {
    /// Bucket start time in epoch milliseconds.
    pub start_millis: i64,
    /// First traded price in the bucket.
    pub open: Decimal,
    /// Highest traded price in the bucket.
    pub high: Decimal,
    /// Lowest traded price in the bucket.
    pub low: Decimal,
    /// Last traded price in the bucket.
    pub close: Decimal,
    /// VWAP as of the last trade in the bucket.
    pub vwap: Decimal,
    /// Upper band as of the last trade in the bucket.
    pub upper: Option<Decimal>,
    /// Lower band as of the last trade in the bucket.
    pub lower: Option<Decimal>,
    /// Cumulative flow as of the last trade in the bucket.
    pub flow: Decimal,
    /// Number of trades in the bucket.
    pub trade_count: usize,
}

/// Bounded FIFO of tape points with bar resampling.
#[derive(Debug, Clone)]
pub struct Tape {
    depth: usize,
    points: VecDeque<TapePoint>,
}

impl Tape {
    /// Create a tape retaining at most `depth` points.
    #[must_use]
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            depth,
            points: VecDeque::with_capacity(depth),
        }
    }

    /// Append a point, evicting the oldest when the tape is full.
    pub fn push(&mut self, point: TapePoint) {
        self.points.push_back(point);
        while self.points.len() > self.depth {
            self.points.pop_front();
        }
    }

    /// Number of points currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the tape holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Resample the retained points into fixed-width bars.
    ///
    /// Points are grouped by `time_millis` truncated to `bucket_ms`. Only
    /// the trailing `max_bars` bars are returned; buckets containing no
    /// trades are omitted rather than forward-filled.
    #[must_use]
    pub fn resample(&self, bucket_ms: i64, max_bars: usize) -> Vec<Bar> {
        if bucket_ms <= 0 || self.points.is_empty() {
            return Vec::new();
        }

        let mut bars: Vec<Bar> = Vec::new();
        for point in &self.points {
            let start = point.time_millis.div_euclid(bucket_ms) * bucket_ms;

            match bars.last_mut() {
                Some(bar) if bar.start_millis == start => {
                    bar.high = bar.high.max(point.price);
                    bar.low = bar.low.min(point.price);
                    bar.close = point.price;
                    bar.vwap = point.vwap;
                    bar.upper = point.upper;
                    bar.lower = point.lower;
                    bar.flow = point.flow;
                    bar.trade_count += 1;
                }
                _ => bars.push(Bar {
                    start_millis: start,
                    open: point.price,
                    high: point.price,
                    low: point.price,
                    close: point.price,
                    vwap: point.vwap,
                    upper: point.upper,
                    lower: point.lower,
                    flow: point.flow,
                    trade_count: 1,
                }),
            }
        }

        if bars.len() > max_bars {
            bars.drain(..bars.len() - max_bars);
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn point(time_millis: i64, price: Decimal) -> TapePoint {
        TapePoint {
            time_millis,
            price,
            vwap: price,
            upper: None,
            lower: None,
            flow: Decimal::ZERO,
        }
    }

    #[test]
    fn trades_land_in_their_time_buckets() {
        let mut tape = Tape::new(100);
        tape.push(point(200, dec!(100)));
        tape.push(point(400, dec!(101)));
        tape.push(point(1_100, dec!(99)));

        let bars = tape.resample(1_000, 100);
        assert_eq!(bars.len(), 2);

        assert_eq!(bars[0].start_millis, 0);
        assert_eq!(bars[0].open, dec!(100));
        assert_eq!(bars[0].high, dec!(101));
        assert_eq!(bars[0].low, dec!(100));
        assert_eq!(bars[0].close, dec!(101));
        assert_eq!(bars[0].trade_count, 2);

        assert_eq!(bars[1].start_millis, 1_000);
        assert_eq!(bars[1].open, dec!(99));
        assert_eq!(bars[1].close, dec!(99));
        assert_eq!(bars[1].trade_count, 1);
    }

    #[test]
    fn empty_buckets_produce_no_bars() {
        let mut tape = Tape::new(100);
        tape.push(point(500, dec!(100)));
        tape.push(point(10_500, dec!(105)));

        let bars = tape.resample(1_000, 100);
        let starts: Vec<i64> = bars.iter().map(|b| b.start_millis).collect();
        assert_eq!(starts, vec![0, 10_000]);
    }

    #[test]
    fn overlays_take_the_last_value_in_the_bucket() {
        let mut tape = Tape::new(100);
        tape.push(TapePoint {
            time_millis: 100,
            price: dec!(100),
            vwap: dec!(100),
            upper: None,
            lower: None,
            flow: dec!(1),
        });
        tape.push(TapePoint {
            time_millis: 900,
            price: dec!(102),
            vwap: dec!(101),
            upper: Some(dec!(103)),
            lower: Some(dec!(99)),
            flow: dec!(3),
        });

        let bars = tape.resample(1_000, 100);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].vwap, dec!(101));
        assert_eq!(bars[0].upper, Some(dec!(103)));
        assert_eq!(bars[0].lower, Some(dec!(99)));
        assert_eq!(bars[0].flow, dec!(3));
    }

    #[test]
    fn only_trailing_bars_are_returned() {
        let mut tape = Tape::new(100);
        for i in 0..10 {
            tape.push(point(i * 1_000, dec!(100)));
        }

        let bars = tape.resample(1_000, 3);
        let starts: Vec<i64> = bars.iter().map(|b| b.start_millis).collect();
        assert_eq!(starts, vec![7_000, 8_000, 9_000]);
    }

    #[test]
    fn tape_depth_bounds_retained_points() {
        let mut tape = Tape::new(5);
        for i in 0..20 {
            tape.push(point(i * 100, dec!(100)));
        }
        assert_eq!(tape.len(), 5);

        // Only the last five points survive, all within the second bucket.
        let bars = tape.resample(1_000, 100);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].start_millis, 1_000);
        assert_eq!(bars[0].trade_count, 5);
    }

    #[test]
    fn non_positive_bucket_yields_no_bars() {
        let mut tape = Tape::new(10);
        tape.push(point(100, dec!(100)));
        assert!(tape.resample(0, 10).is_empty());
    }
}
