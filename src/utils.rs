pub mod tree;

pub use tree::{Interval, IntervalTree};
