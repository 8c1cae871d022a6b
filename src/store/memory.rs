//! 内存存储
//!
//! 同时实现 `TicketStore`、`RunStore` 和 `AnalysisStore`，
//! 用于命令行运行和测试。列表字段与数据库实现一样以 JSON 文本保存。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{AppError, AppResult, DatabaseError};
use crate::models::{
    AnalysisRun, RunCounters, RunStatus, StoredAnalysis, Ticket, TicketAnalysis, TicketCreate,
    TicketUpdate,
};
use crate::store::traits::{AnalysisStore, RunStore, TicketStore};

#[derive(Debug, Default)]
struct Tables {
    tickets: BTreeMap<i64, Ticket>,
    runs: BTreeMap<i64, AnalysisRun>,
    analyses: Vec<StoredAnalysis>,
    next_ticket_id: i64,
    next_run_id: i64,
    next_analysis_id: i64,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_inserts: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让后续的 `bulk_insert` 失败（模拟写库失败）
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| AppError::db_unavailable("内存存储锁已损坏"))
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn fetch_by_ids(&self, ids: &[i64]) -> AppResult<Vec<Ticket>> {
        let tables = self.lock()?;
        Ok(tables
            .tickets
            .values()
            .filter(|ticket| ids.contains(&ticket.id))
            .cloned()
            .collect())
    }

    async fn fetch_all(&self) -> AppResult<Vec<Ticket>> {
        let tables = self.lock()?;
        Ok(tables.tickets.values().cloned().collect())
    }

    async fn create_tickets(&self, tickets: Vec<TicketCreate>) -> AppResult<Vec<Ticket>> {
        let mut tables = self.lock()?;
        let now = Utc::now();

        let mut created = Vec::with_capacity(tickets.len());
        for new_ticket in tickets {
            let id = next_id(&mut tables.next_ticket_id);
            let ticket = Ticket {
                id,
                title: new_ticket.title,
                description: new_ticket.description,
                status: new_ticket.status.unwrap_or_else(|| "open".to_string()),
                tags: new_ticket.tags,
                created_at: now,
                updated_at: now,
            };
            tables.tickets.insert(id, ticket.clone());
            created.push(ticket);
        }

        Ok(created)
    }

    async fn update_ticket(&self, id: i64, update: TicketUpdate) -> AppResult<Ticket> {
        let mut tables = self.lock()?;
        let ticket = tables
            .tickets
            .get_mut(&id)
            .ok_or(DatabaseError::TicketNotFound { ticket_id: id })?;
        update.apply(ticket, Utc::now());
        Ok(ticket.clone())
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.lock()?.tickets.len())
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_run(&self, status: RunStatus) -> AppResult<i64> {
        let mut tables = self.lock()?;
        let id = next_id(&mut tables.next_run_id);
        tables.runs.insert(
            id,
            AnalysisRun {
                id,
                created_at: Utc::now(),
                summary: String::new(),
                status,
                counters: RunCounters::default(),
            },
        );
        Ok(id)
    }

    async fn update_run(
        &self,
        run_id: i64,
        summary: &str,
        counters: RunCounters,
        status: RunStatus,
    ) -> AppResult<()> {
        let mut tables = self.lock()?;
        let run = tables
            .runs
            .get_mut(&run_id)
            .ok_or(DatabaseError::RunNotFound { run_id })?;
        run.summary = summary.to_string();
        run.counters = counters;
        run.status = status;
        Ok(())
    }

    async fn get_run(&self, run_id: i64) -> AppResult<Option<AnalysisRun>> {
        Ok(self.lock()?.runs.get(&run_id).cloned())
    }

    async fn latest_run(&self) -> AppResult<Option<AnalysisRun>> {
        Ok(self.lock()?.runs.values().next_back().cloned())
    }

    async fn list_runs(&self, limit: usize, offset: usize) -> AppResult<Vec<AnalysisRun>> {
        let tables = self.lock()?;
        Ok(tables
            .runs
            .values()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear_runs(&self) -> AppResult<()> {
        self.lock()?.runs.clear();
        Ok(())
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn bulk_insert(
        &self,
        run_id: i64,
        analyses: &[TicketAnalysis],
    ) -> AppResult<Vec<StoredAnalysis>> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(DatabaseError::SaveFailed {
                detail: "写入被拒绝".to_string(),
            }
            .into());
        }

        let mut tables = self.lock()?;
        if !tables.runs.contains_key(&run_id) {
            return Err(DatabaseError::RunNotFound { run_id }.into());
        }

        // 先全部编码，成功后再写入
        let now = Utc::now();
        let mut next = tables.next_analysis_id;
        let rows = analyses
            .iter()
            .map(|analysis| StoredAnalysis::encode(next_id(&mut next), run_id, analysis, now))
            .collect::<Result<Vec<_>, _>>()?;

        tables.next_analysis_id = next;
        tables.analyses.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn list_for_run(&self, run_id: i64) -> AppResult<Vec<StoredAnalysis>> {
        let tables = self.lock()?;
        Ok(tables
            .analyses
            .iter()
            .filter(|analysis| analysis.analysis_run_id == run_id)
            .cloned()
            .collect())
    }

    async fn clear_analyses(&self) -> AppResult<()> {
        self.lock()?.analyses.clear();
        Ok(())
    }
}
