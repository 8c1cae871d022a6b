pub mod analysis;
pub mod loaders;
pub mod run;
pub mod ticket;

pub use analysis::{
    ticket_analysis_schema, Category, Priority, StoredAnalysis, TicketAnalysis,
    TicketAnalysisOutput,
};
pub use loaders::load_seed_tickets;
pub use run::{
    AnalysisHistory, AnalysisRun, AnalyzeResponse, CallUsage, DistributionEntry, RunCounters,
    RunStatus, TicketsSummary,
};
pub use ticket::{Ticket, TicketCreate, TicketUpdate};
