//! # Ticket Analyst
//!
//! 用 LLM 批量分析客服工单的后端
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础层（Clients / Store）
//! - `clients/` - `ChatBackend` trait 与 OpenAI 兼容的 `LlmClient`
//! - `store/` - 工单、分析批次、分析记录三个存储 trait 及内存实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个工单或一组结果
//! - `AnalysisService` - 分析单个工单（结构化输出 + 校验 + 计费）
//! - `summary_service` - 由一组分析结果生成批次摘要
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次分析批次"的完整处理流程
//! - `AnalysisCtx` - 上下文封装（存储 + 配置 + 分析服务）
//! - `AnalysisFlow` - 流程编排（validate → create_run → fetch → analyze → summarize → save）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 并发调度，最多 K 个同时进行的 LLM 调用
//! - `orchestrator/app` - 应用入口，对外暴露全部操作
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ChatBackend, LlmClient, StructuredRequest, StructuredResponse};
pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use models::{AnalyzeResponse, Ticket, TicketAnalysis, TicketCreate, TicketUpdate};
pub use orchestrator::{App, BatchProcessor};
pub use store::{MemoryStore, Stores};
pub use workflow::{AnalysisCtx, AnalysisFlow, PipelineOutcome};
