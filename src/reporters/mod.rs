pub mod basic;
pub mod context;
pub mod markdown;
pub mod matrix;
pub mod risk;
pub mod structured;
pub mod validate;
pub mod writer;

pub use context::ReportContext;
pub use risk::{Analytics, RiskAssessment};
pub use writer::ReportEmitter;
