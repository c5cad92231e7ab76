pub mod runner;

pub use runner::{BatchInput, BatchReport, BatchRunner, BatchUnit, UnitReport};
