pub mod contract;
pub mod dataset;
pub mod narrative;
pub mod report;
pub mod schema;
