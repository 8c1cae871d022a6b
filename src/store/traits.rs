use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{
    AnalysisRun, RunCounters, RunStatus, StoredAnalysis, Ticket, TicketAnalysis, TicketCreate,
    TicketUpdate,
};

/// 工单存储
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// 按 ID 查询，不存在的 ID 直接忽略（返回的数量可能更少）
    async fn fetch_by_ids(&self, ids: &[i64]) -> AppResult<Vec<Ticket>>;

    /// 查询全部工单，按 ID 升序
    async fn fetch_all(&self) -> AppResult<Vec<Ticket>>;

    async fn create_tickets(&self, tickets: Vec<TicketCreate>) -> AppResult<Vec<Ticket>>;

    /// 更新工单，ID 不存在时返回 `DatabaseError::TicketNotFound`
    async fn update_ticket(&self, id: i64, update: TicketUpdate) -> AppResult<Ticket>;

    async fn count(&self) -> AppResult<usize>;
}

/// 分析批次存储
#[async_trait]
pub trait RunStore: Send + Sync {
    /// 创建批次，返回批次 ID
    async fn create_run(&self, status: RunStatus) -> AppResult<i64>;

    /// 写入批次摘要、计数和状态，ID 不存在时返回 `DatabaseError::RunNotFound`
    async fn update_run(
        &self,
        run_id: i64,
        summary: &str,
        counters: RunCounters,
        status: RunStatus,
    ) -> AppResult<()>;

    async fn get_run(&self, run_id: i64) -> AppResult<Option<AnalysisRun>>;

    async fn latest_run(&self) -> AppResult<Option<AnalysisRun>>;

    /// 最新的批次在前
    async fn list_runs(&self, limit: usize, offset: usize) -> AppResult<Vec<AnalysisRun>>;

    async fn clear_runs(&self) -> AppResult<()>;
}

/// 工单分析记录存储
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// 批量写入，全部成功或全部失败
    async fn bulk_insert(
        &self,
        run_id: i64,
        analyses: &[TicketAnalysis],
    ) -> AppResult<Vec<StoredAnalysis>>;

    /// 某个批次的全部记录，按记录 ID 升序
    async fn list_for_run(&self, run_id: i64) -> AppResult<Vec<StoredAnalysis>>;

    async fn clear_analyses(&self) -> AppResult<()>;
}

/// 流水线使用的三个存储句柄
#[derive(Clone)]
pub struct Stores {
    pub tickets: Arc<dyn TicketStore>,
    pub runs: Arc<dyn RunStore>,
    pub analyses: Arc<dyn AnalysisStore>,
}

impl Stores {
    /// 三个存储由同一个实现提供
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: TicketStore + RunStore + AnalysisStore + 'static,
    {
        Self {
            tickets: store.clone(),
            runs: store.clone(),
            analyses: store,
        }
    }
}
