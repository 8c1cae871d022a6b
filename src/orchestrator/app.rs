//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 对外暴露全部业务操作，相当于 HTTP 层背后的处理器：
//!
//! 1. **应用初始化**：创建存储、LLM 客户端，写入示例工单
//! 2. **工单管理**：创建、更新、列出工单
//! 3. **批量分析**：检查 API Key 后运行 `AnalysisFlow`，把错误映射成 `ErrorResponse`
//! 4. **结果查询**：最近批次、历史批次、分类/优先级分布
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有存储句柄和 LLM 客户端的模块
//! - **向下委托**：分析流程交给 workflow，单个工单的分析交给 services

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::{ChatBackend, LlmClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, DatabaseError, ErrorResponse, LlmError, ValidationError};
use crate::models::{
    load_seed_tickets, AnalysisHistory, AnalyzeResponse, Ticket, TicketCreate, TicketUpdate,
    TicketsSummary,
};
use crate::services::summary_service::{empty_tickets_summary, tickets_summary};
use crate::services::AnalysisService;
use crate::store::{MemoryStore, Stores};
use crate::utils::logging::log_startup;
use crate::workflow::{AnalysisCtx, AnalysisFlow};

/// 历史批次每页最多条数
pub const MAX_HISTORY_LIMIT: usize = 100;

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    stores: Stores,
    /// 未配置 API Key 时为 `None`
    flow: Option<Arc<AnalysisFlow>>,
}

impl App {
    /// 初始化应用：内存存储 + OpenAI 兼容的 LLM 客户端
    pub async fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config.llm_model_name, config.max_concurrent_calls);

        let backend: Option<Arc<dyn ChatBackend>> = if config.has_api_key() {
            Some(Arc::new(LlmClient::new(&config)?))
        } else {
            warn!("⚠️ 未配置 OPENROUTER_API_KEY，分析功能不可用");
            None
        };

        let stores = Stores::from_shared(Arc::new(MemoryStore::new()));
        let app = Self::with_parts(config, stores, backend);

        if app.config.seed_database {
            app.seed().await?;
        }

        Ok(app)
    }

    /// 使用指定的存储和 LLM 后端组装应用
    pub fn with_parts(
        config: Config,
        stores: Stores,
        backend: Option<Arc<dyn ChatBackend>>,
    ) -> Self {
        let config = Arc::new(config);
        let flow = backend.map(|backend| {
            let service = Arc::new(AnalysisService::new(backend, &config));
            Arc::new(AnalysisFlow::new(AnalysisCtx::new(
                stores.clone(),
                config.clone(),
                service,
            )))
        });

        Self {
            config,
            stores,
            flow,
        }
    }

    /// 清空历史分析，工单表为空时写入示例工单
    pub async fn seed(&self) -> AppResult<()> {
        self.stores.analyses.clear_analyses().await?;
        self.stores.runs.clear_runs().await?;

        if self.stores.tickets.count().await? > 0 {
            info!("工单表已有数据，跳过示例工单");
            return Ok(());
        }

        let seed_path = Path::new(&self.config.seed_file);
        match load_seed_tickets(seed_path).await {
            Ok(tickets) => {
                let created = self.stores.tickets.create_tickets(tickets).await?;
                info!("✓ 写入 {} 个示例工单", created.len());
            }
            Err(e) => warn!("⚠️ 示例工单加载失败，跳过: {:#}", e),
        }
        Ok(())
    }

    /// 命令行入口：运行一次分析
    pub async fn run(&self, ticket_ids: Option<Vec<i64>>) -> AppResult<AnalyzeResponse> {
        let Some(flow) = self.flow.as_ref().filter(|_| self.config.has_api_key()) else {
            return Err(LlmError::MissingApiKey.into());
        };

        // 流程在独立任务中运行，panic 等未知失败统一按 GraphExecution 上报
        let flow = Arc::clone(flow);
        let outcome = tokio::spawn(async move { flow.run(ticket_ids).await })
            .await
            .map_err(|e| AppError::from_unexpected(e.into()))??;

        let analysis_run = self
            .stores
            .runs
            .get_run(outcome.run_id)
            .await?
            .ok_or_else(|| {
                AppError::graph_execution(format!("分析批次 #{} 保存后无法读取", outcome.run_id))
            })?;

        Ok(AnalyzeResponse {
            analysis_run,
            ticket_analyses: outcome.results,
        })
    }

    /// 批量分析工单
    ///
    /// `ticket_ids` 为 `None` 时分析全部工单
    pub async fn analyze(
        &self,
        ticket_ids: Option<Vec<i64>>,
    ) -> Result<AnalyzeResponse, ErrorResponse> {
        self.run(ticket_ids).await.map_err(ErrorResponse::from)
    }

    pub async fn list_tickets(&self) -> AppResult<Vec<Ticket>> {
        self.stores.tickets.fetch_all().await
    }

    /// 批量创建工单
    pub async fn create_tickets(&self, tickets: Vec<TicketCreate>) -> AppResult<Vec<Ticket>> {
        if tickets.is_empty() {
            return Err(ValidationError::EmptyTicketBatch.into());
        }

        for (index, ticket) in tickets.iter().enumerate() {
            ticket.check().map_err(|detail| ValidationError::InvalidTicket {
                detail: format!("第 {} 个工单: {}", index + 1, detail),
            })?;
        }

        let created = self.stores.tickets.create_tickets(tickets).await?;
        info!("✓ 创建 {} 个工单", created.len());
        Ok(created)
    }

    /// 部分更新工单
    pub async fn update_ticket(&self, id: i64, update: TicketUpdate) -> AppResult<Ticket> {
        update
            .check()
            .map_err(|detail| ValidationError::InvalidTicket { detail })?;

        match self.stores.tickets.update_ticket(id, update).await {
            Err(AppError::Database(DatabaseError::TicketNotFound { ticket_id })) => {
                Err(AppError::NotFound(format!("Ticket {} not found", ticket_id)))
            }
            other => other,
        }
    }

    /// 指定批次及其分析记录
    pub async fn analysis_run(&self, run_id: i64) -> AppResult<AnalyzeResponse> {
        let analysis_run = self
            .stores
            .runs
            .get_run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Analysis run {} not found", run_id)))?;

        let ticket_analyses = self.stores.analyses.list_for_run(run_id).await?;
        Ok(AnalyzeResponse {
            analysis_run,
            ticket_analyses,
        })
    }

    /// 最近一次批次
    pub async fn latest_analysis(&self) -> AppResult<AnalyzeResponse> {
        let latest = self
            .stores
            .runs
            .latest_run()
            .await?
            .ok_or_else(|| AppError::NotFound("No analysis runs found".to_string()))?;

        self.analysis_run(latest.id).await
    }

    /// 历史批次，最新的在前
    pub async fn analysis_history(&self, limit: usize, offset: usize) -> AppResult<AnalysisHistory> {
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(ValidationError::InvalidPagination {
                detail: format!("limit 必须在 1 到 {} 之间，实际 {}", MAX_HISTORY_LIMIT, limit),
            }
            .into());
        }

        let analysis_runs = self.stores.runs.list_runs(limit, offset).await?;
        Ok(AnalysisHistory { analysis_runs })
    }

    /// 最近一次批次的分类/优先级分布
    pub async fn tickets_summary(&self) -> AppResult<TicketsSummary> {
        let Some(latest) = self.stores.runs.latest_run().await? else {
            return Ok(empty_tickets_summary());
        };

        let analyses = self.stores.analyses.list_for_run(latest.id).await?;
        Ok(tickets_summary(&analyses))
    }
}
