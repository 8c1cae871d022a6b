//! 工单分析流程 - 流程层
//!
//! 核心职责：定义"一次分析批次"的完整处理流程
//!
//! 流程顺序（线性，不分支，不重试）：
//! 1. validate   - 校验指定的工单 ID 全部存在
//! 2. create_run - 创建 `in_progress` 状态的批次
//! 3. fetch      - 读取待分析的工单
//! 4. analyze    - 并发分析（最多 K 个同时调用）
//! 5. summarize  - 生成批次摘要，失败时使用最简摘要
//! 6. save       - 写入分析记录，更新批次为 `completed`
//!
//! 任一阶段失败即中止；批次已创建时先把它标记为 `failed`，再把错误返回给调用方。

use std::collections::HashSet;
use std::fmt::Display;

use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult, DatabaseError, ValidationError};
use crate::models::{RunCounters, RunStatus, StoredAnalysis, Ticket, TicketAnalysis};
use crate::orchestrator::batch_processor::{BatchOptions, BatchProcessor};
use crate::services::summary_service::{build_summary, fallback_summary};
use crate::utils::logging::{log_run_complete, log_run_start, truncate_text};
use crate::workflow::analysis_ctx::AnalysisCtx;

/// 流程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Validated,
    RunCreated,
    TicketsFetched,
    Analyzed,
    Summarized,
    Saved,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Pending => "pending",
            Stage::Validated => "validated",
            Stage::RunCreated => "run_created",
            Stage::TicketsFetched => "tickets_fetched",
            Stage::Analyzed => "analyzed",
            Stage::Summarized => "summarized",
            Stage::Saved => "saved",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 固定的阶段顺序
const STAGES: [Stage; 6] = [
    Stage::Validated,
    Stage::RunCreated,
    Stage::TicketsFetched,
    Stage::Analyzed,
    Stage::Summarized,
    Stage::Saved,
];

/// 各阶段累积的状态
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// 已完成的最后一个阶段
    pub stage: Stage,
    /// 去重后的指定工单 ID，`None` 表示全部工单
    pub requested_ids: Option<Vec<i64>>,
    pub run_id: Option<i64>,
    pub tickets: Vec<Ticket>,
    pub results: Vec<TicketAnalysis>,
    pub counters: RunCounters,
    pub summary: String,
    pub saved: Vec<StoredAnalysis>,
}

impl PipelineState {
    pub fn new(ticket_ids: Option<Vec<i64>>) -> Self {
        Self {
            stage: Stage::Pending,
            requested_ids: normalize_ids(ticket_ids),
            run_id: None,
            tickets: Vec::new(),
            results: Vec::new(),
            counters: RunCounters::default(),
            summary: String::new(),
            saved: Vec::new(),
        }
    }
}

/// 流程成功时的结果
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: i64,
    pub summary: String,
    /// 已保存的分析记录
    pub results: Vec<StoredAnalysis>,
    pub total_tokens_used: u64,
    pub total_cost: f64,
    pub status: RunStatus,
}

/// 工单分析流程
///
/// - 按固定顺序执行各阶段
/// - 第一个失败的阶段决定返回的错误
/// - 不持有任何流程状态，可以重复运行
pub struct AnalysisFlow {
    ctx: AnalysisCtx,
}

impl AnalysisFlow {
    /// 创建新的分析流程
    pub fn new(ctx: AnalysisCtx) -> Self {
        Self { ctx }
    }

    /// 运行一次分析批次
    ///
    /// `ticket_ids` 为 `None` 或空列表时分析全部工单
    pub async fn run(&self, ticket_ids: Option<Vec<i64>>) -> AppResult<PipelineOutcome> {
        let mut state = PipelineState::new(ticket_ids);

        for stage in STAGES {
            let step = match stage {
                Stage::Validated => validate(&self.ctx, &mut state).await,
                Stage::RunCreated => create_run(&self.ctx, &mut state).await,
                Stage::TicketsFetched => fetch(&self.ctx, &mut state).await,
                Stage::Analyzed => analyze(&self.ctx, &mut state).await,
                Stage::Summarized => summarize(&self.ctx, &mut state).await,
                Stage::Saved => save(&self.ctx, &mut state).await,
                Stage::Pending => Ok(()),
            };

            if let Err(e) = step {
                error!("❌ 阶段 {} 失败: {}", stage, e);
                self.mark_failed(&state, &e).await;
                return Err(e);
            }

            debug!("{} 阶段 {} 完成", self.ctx, stage);
            state.stage = stage;
        }

        let run_id = state
            .run_id
            .ok_or_else(|| AppError::graph_execution("流程结束但没有批次 ID"))?;

        log_run_complete(run_id, state.saved.len(), &state.counters, &state.summary);

        Ok(PipelineOutcome {
            run_id,
            summary: state.summary,
            results: state.saved,
            total_tokens_used: state.counters.total_tokens_used,
            total_cost: state.counters.total_cost,
            status: RunStatus::Completed,
        })
    }

    /// 把已创建的批次标记为失败（尽力而为）
    async fn mark_failed(&self, state: &PipelineState, err: &AppError) {
        let Some(run_id) = state.run_id else {
            return;
        };

        if let Err(update_err) = self
            .ctx
            .stores
            .runs
            .update_run(run_id, &err.to_string(), state.counters, RunStatus::Failed)
            .await
        {
            warn!(
                "⚠️ 无法将批次 #{} 标记为 failed: {}",
                run_id, update_err
            );
        }
    }
}

/// 去重并保持请求顺序；空列表视为未指定
fn normalize_ids(ids: Option<Vec<i64>>) -> Option<Vec<i64>> {
    let ids = ids?;
    if ids.is_empty() {
        return None;
    }
    let mut seen = HashSet::new();
    Some(ids.into_iter().filter(|id| seen.insert(*id)).collect())
}

async fn validate(ctx: &AnalysisCtx, state: &mut PipelineState) -> AppResult<()> {
    let Some(ids) = &state.requested_ids else {
        return Ok(());
    };

    let found: HashSet<i64> = ctx
        .stores
        .tickets
        .fetch_by_ids(ids)
        .await?
        .iter()
        .map(|ticket| ticket.id)
        .collect();

    let missing: Vec<i64> = ids
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect();

    if !missing.is_empty() {
        return Err(ValidationError::MissingTickets { ids: missing }.into());
    }
    Ok(())
}

async fn create_run(ctx: &AnalysisCtx, state: &mut PipelineState) -> AppResult<()> {
    let run_id = ctx.stores.runs.create_run(RunStatus::InProgress).await?;
    log_run_start(run_id, state.requested_ids.as_deref());
    state.run_id = Some(run_id);
    Ok(())
}

async fn fetch(ctx: &AnalysisCtx, state: &mut PipelineState) -> AppResult<()> {
    let tickets = match &state.requested_ids {
        Some(ids) => ctx.stores.tickets.fetch_by_ids(ids).await?,
        None => ctx.stores.tickets.fetch_all().await?,
    };

    if tickets.is_empty() {
        return Err(ValidationError::NoTickets.into());
    }

    info!("✓ 读取到 {} 个待分析工单", tickets.len());
    state.tickets = tickets;
    Ok(())
}

async fn analyze(ctx: &AnalysisCtx, state: &mut PipelineState) -> AppResult<()> {
    let processor = BatchProcessor::new(
        ctx.service.clone(),
        BatchOptions::from_config(&ctx.config),
    );
    let outcome = processor.process(state.tickets.clone()).await?;

    state.results = outcome.results;
    state.counters = outcome.counters;
    Ok(())
}

async fn summarize(ctx: &AnalysisCtx, state: &mut PipelineState) -> AppResult<()> {
    state.summary = match build_summary(&state.results) {
        Ok(summary) => summary,
        Err(e) => {
            warn!("⚠️ 摘要生成失败，使用最简摘要: {}", e);
            fallback_summary(state.results.len())
        }
    };

    if ctx.config.verbose_logging {
        info!("📝 摘要: {}", truncate_text(&state.summary, 200));
    }
    Ok(())
}

async fn save(ctx: &AnalysisCtx, state: &mut PipelineState) -> AppResult<()> {
    let run_id = state
        .run_id
        .ok_or_else(|| AppError::graph_execution("保存阶段缺少批次 ID"))?;

    let saved = ctx
        .stores
        .analyses
        .bulk_insert(run_id, &state.results)
        .await
        .map_err(as_database_error)?;

    if saved.len() != state.tickets.len() {
        return Err(DatabaseError::SaveFailed {
            detail: format!(
                "写入 {} 条分析记录，但提交了 {} 个工单",
                saved.len(),
                state.tickets.len()
            ),
        }
        .into());
    }

    ctx.stores
        .runs
        .update_run(run_id, &state.summary, state.counters, RunStatus::Completed)
        .await
        .map_err(as_database_error)?;

    state.saved = saved;
    Ok(())
}

/// 保存阶段的任何失败都按存储错误上报
fn as_database_error(err: AppError) -> AppError {
    match err {
        AppError::Database(_) => err,
        other => DatabaseError::SaveFailed {
            detail: other.to_string(),
        }
        .into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::clients::{ChatBackend, StructuredRequest, StructuredResponse};
    use crate::config::Config;
    use crate::models::TicketCreate;
    use crate::services::AnalysisService;
    use crate::store::{MemoryStore, RunStore, Stores, TicketStore};

    struct BugBackend;

    #[async_trait]
    impl ChatBackend for BugBackend {
        async fn complete(&self, _request: &StructuredRequest) -> AppResult<StructuredResponse> {
            Ok(StructuredResponse {
                content: serde_json::json!({
                    "category": "bug",
                    "priority": "high",
                    "analysis": "The page crashes on load.",
                    "potential_causes": ["Null pointer in renderer", "Stale cache entries"],
                    "suggested_solutions": ["Patch the renderer", "Clear the cache on deploy"]
                })
                .to_string(),
                prompt_tokens: 10,
                completion_tokens: 5,
            })
        }
    }

    async fn flow_with_tickets(n: usize) -> (AnalysisFlow, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let tickets = (1..=n)
            .map(|i| TicketCreate::new(format!("Ticket {}", i), "Something is broken"))
            .collect();
        store.create_tickets(tickets).await.unwrap();

        let config = Arc::new(Config::default());
        let service = Arc::new(AnalysisService::new(Arc::new(BugBackend), &config));
        let ctx = AnalysisCtx::new(Stores::from_shared(store.clone()), config, service);
        (AnalysisFlow::new(ctx), store)
    }

    #[test]
    fn test_normalize_ids() {
        assert_eq!(normalize_ids(None), None);
        assert_eq!(normalize_ids(Some(vec![])), None);
        assert_eq!(normalize_ids(Some(vec![3, 1, 3, 2, 1])), Some(vec![3, 1, 2]));
    }

    #[tokio::test]
    async fn test_run_all_tickets() {
        let (flow, store) = flow_with_tickets(7).await;
        let outcome = flow.run(None).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.results.len(), 7);
        assert_eq!(outcome.total_tokens_used, 7 * 15);
        assert!(outcome.summary.contains("7 bug (100%)"));

        let run = store.get_run(outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.summary, outcome.summary);
    }

    #[tokio::test]
    async fn test_missing_ids_fail_before_run_is_created() {
        let (flow, store) = flow_with_tickets(2).await;
        let err = flow.run(Some(vec![1, 9, 2, 8])).await.unwrap_err();

        match err {
            AppError::Validation(ValidationError::MissingTickets { ids }) => {
                assert_eq!(ids, vec![9, 8])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.latest_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_store_marks_run_failed() {
        let (flow, store) = flow_with_tickets(0).await;
        let err = flow.run(None).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Validation(ValidationError::NoTickets)
        ));
        let run = store.latest_run().await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_save_failure_is_database_error() {
        let (flow, store) = flow_with_tickets(2).await;
        store.fail_inserts(true);

        let err = flow.run(None).await.unwrap_err();
        assert_eq!(err.code(), "DATABASE_ERROR");

        let run = store.latest_run().await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.counters.total_tokens_used, 30);
    }
}
