//! 存储层
//!
//! 流水线只通过这里的 trait 访问工单、批次和分析记录，
//! 具体的存储实现（内存 / 关系数据库）由调用方注入。

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{AnalysisStore, RunStore, Stores, TicketStore};
