//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责并发调度和对外操作，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、示例数据）
//! - 持有存储句柄和 LLM 客户端
//! - 暴露工单管理、批量分析、结果查询等操作
//! - 把内部错误映射成对外的 `ErrorResponse`
//!
//! ### `batch_processor` - 批量分析调度器
//! - K 个 worker 从共享队列领取工单
//! - 同时进行的 LLM 调用不超过 K 个
//! - 按完成顺序收集结果，累计 token 与费用
//! - 任一调用失败时停止领取，返回第一个错误
//!
//! ## 层次关系
//!
//! ```text
//! app (对外操作)
//!     ↓
//! workflow::AnalysisFlow (validate → create_run → fetch → analyze → summarize → save)
//!     ↓                         ↓
//! store (存储)           batch_processor (并发调度)
//!                               ↓
//!                        services::AnalysisService (单个工单)
//!                               ↓
//!                        clients::ChatBackend (LLM)
//! ```

pub mod app;
pub mod batch_processor;

// 重新导出主要类型
pub use app::App;
pub use batch_processor::{BatchOptions, BatchOutcome, BatchProcessor};
