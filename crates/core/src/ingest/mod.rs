pub mod file;
pub mod provider;

pub use file::{CsvFileSource, JsonFileSource};
pub use provider::{DataSource, HttpJsonSource};
