pub mod analysis_service;
pub mod summary_service;

pub use analysis_service::{AnalysisService, AnalyzedTicket, Pricing};
pub use summary_service::{build_summary, fallback_summary, EMPTY_SUMMARY};
