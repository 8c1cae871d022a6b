//! 批量分析调度器 - 编排层
//!
//! ## 职责
//!
//! 为每个工单提交一次分析调用，同时进行的调用不超过 K 个。
//!
//! ## 调度方式
//!
//! 1. 所有工单放入共享队列
//! 2. 启动 K 个 worker，各自从队列取工单并调用 `AnalysisService`
//! 3. 每个调用的结果（成功或失败）发送到结果通道
//! 4. 收集器按完成顺序接收消息
//!
//! 任一调用失败后 worker 不再领取新工单，但已经开始的调用会执行完；
//! 最终返回第一个错误，整批视为失败。
//!
//! 因此失败时实际发出的调用可能少于 N 个：收集器只等待已开始的调用，
//! 队列中剩余的工单不会再被提交。只有全部成功时才恰好收到 N 条消息。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::{RunCounters, Ticket, TicketAnalysis};
use crate::services::{AnalysisService, AnalyzedTicket};
use crate::utils::logging::log_batch_start;

/// 批次调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// 同时进行的调用数量上限
    pub max_concurrent: usize,
    /// 单次调用的超时时间
    pub call_timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent: config.max_concurrent_calls.max(1),
            call_timeout: (config.llm_request_timeout_secs > 0)
                .then(|| Duration::from_secs(config.llm_request_timeout_secs)),
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// 整批成功时的结果
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// 按完成顺序排列
    pub results: Vec<TicketAnalysis>,
    pub counters: RunCounters,
}

type Completion = (i64, AppResult<AnalyzedTicket>);

/// 批量分析调度器
pub struct BatchProcessor {
    service: Arc<AnalysisService>,
    options: BatchOptions,
}

impl BatchProcessor {
    pub fn new(service: Arc<AnalysisService>, options: BatchOptions) -> Self {
        Self { service, options }
    }

    /// 分析一批工单
    pub async fn process(&self, tickets: Vec<Ticket>) -> AppResult<BatchOutcome> {
        let total = tickets.len();
        if total == 0 {
            return Ok(BatchOutcome {
                results: Vec::new(),
                counters: RunCounters::default(),
            });
        }

        let workers = self.options.max_concurrent.max(1).min(total);
        log_batch_start(total, workers);

        let queue = Arc::new(Mutex::new(tickets.into_iter().collect::<VecDeque<_>>()));
        let abort = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 1..=workers {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&self.service),
                self.options.call_timeout,
                Arc::clone(&queue),
                Arc::clone(&abort),
                tx.clone(),
            )));
        }
        // 只保留 worker 手里的发送端，全部退出后通道关闭
        drop(tx);

        let mut results = Vec::with_capacity(total);
        let mut counters = RunCounters::default();
        let mut first_error: Option<AppError> = None;
        let mut received = 0;

        while received < total {
            let Some((ticket_id, outcome)) = rx.recv().await else {
                break;
            };
            received += 1;

            match outcome {
                Ok(analyzed) => {
                    counters.add(&analyzed.usage);
                    results.push(analyzed.analysis);
                    debug!("工单 {} 完成 ({}/{})", ticket_id, received, total);
                }
                Err(e) => {
                    if first_error.is_none() {
                        error!("❌ 工单 {} 分析失败，停止领取新工单: {}", ticket_id, e);
                        abort.store(true, Ordering::SeqCst);
                        first_error = Some(e);
                    } else {
                        warn!("工单 {} 也分析失败: {}", ticket_id, e);
                    }
                }
            }
        }

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("分析任务执行失败: {}", e);
                if first_error.is_none() {
                    first_error = Some(AppError::graph_execution(format!(
                        "分析任务执行失败: {}",
                        e
                    )));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        if results.len() != total {
            return Err(AppError::graph_execution(format!(
                "只收到 {}/{} 个分析结果",
                results.len(),
                total
            )));
        }

        info!(
            "✓ {} 个工单分析完成，tokens: {}，费用: ${:.6}",
            total, counters.total_tokens_used, counters.total_cost
        );

        Ok(BatchOutcome { results, counters })
    }
}

async fn run_worker(
    worker_id: usize,
    service: Arc<AnalysisService>,
    call_timeout: Option<Duration>,
    queue: Arc<Mutex<VecDeque<Ticket>>>,
    abort: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Completion>,
) {
    loop {
        if abort.load(Ordering::SeqCst) {
            debug!("worker {} 收到中止信号", worker_id);
            break;
        }

        let Some(ticket) = queue.lock().await.pop_front() else {
            break;
        };

        let outcome = match call_timeout {
            Some(limit) => match tokio::time::timeout(limit, service.analyze(&ticket)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LlmError::Timeout {
                    ticket_id: ticket.id,
                    secs: limit.as_secs(),
                }
                .into()),
            },
            None => service.analyze(&ticket).await,
        };

        if tx.send((ticket.id, outcome)).is_err() {
            break;
        }
    }
}
