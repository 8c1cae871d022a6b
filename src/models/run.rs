use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::StoredAnalysis;

/// 分析批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// 单次 LLM 调用的用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CallUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cost: f64,
}

impl CallUsage {
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// 批次累计的 token 与费用
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunCounters {
    pub total_tokens_used: u64,
    pub total_cost: f64,
}

impl RunCounters {
    pub fn add(&mut self, usage: &CallUsage) {
        self.total_tokens_used += usage.total_tokens();
        self.total_cost += usage.cost;
    }
}

/// 一次分析批次
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub status: RunStatus,
    #[serde(flatten)]
    pub counters: RunCounters,
}

/// 分析批次及其全部工单分析
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub analysis_run: AnalysisRun,
    pub ticket_analyses: Vec<StoredAnalysis>,
}

/// 历史批次列表
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisHistory {
    pub analysis_runs: Vec<AnalysisRun>,
}

/// 图表用的分布项
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub name: String,
    pub count: usize,
}

/// 最近一次批次的分类/优先级分布
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketsSummary {
    pub category_data: Vec<DistributionEntry>,
    pub priority_data: Vec<DistributionEntry>,
    pub total_analyzed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_additive() {
        let mut counters = RunCounters::default();
        counters.add(&CallUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
            cost: 0.001,
        });
        counters.add(&CallUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            cost: 0.0005,
        });

        assert_eq!(counters.total_tokens_used, 165);
        assert!((counters.total_cost - 0.0015).abs() < 1e-12);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }
}
