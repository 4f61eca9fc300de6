mod yahoo;

pub use yahoo::{parse_chart, YahooChartProvider};
