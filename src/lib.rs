pub mod algorithms;
pub mod area;
pub mod containers;
pub mod entities;
pub mod netlist;
pub mod preprocess;
pub mod report;
pub mod route;
pub mod settings;
pub mod utils;

pub use algorithms::Algorithm;
pub use area::RoutingArea;
pub use containers::{Bundle, OverlappedIntervalDict, ShieldDict, ShieldedNetList};
pub use entities::{
    AllocData, Allocatable, Allocation, Blockage, Net, Pin, Shield, ShieldType, WireGeometry,
};
pub use settings::{ProblemSettings, RunOptions, SettingsDoc};
pub use utils::tree::{Interval, IntervalTree};
