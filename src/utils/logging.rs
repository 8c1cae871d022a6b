/// 日志工具模块
///
/// 提供日志初始化和批次日志的格式化输出
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::models::RunCounters;

/// 初始化日志
///
/// 默认 `info` 级别，可以用 `RUST_LOG` 覆盖。重复调用不会报错
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `model`: 使用的模型
/// - `max_concurrent`: 最大并发调用数
pub fn log_startup(model: &str, max_concurrent: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 工单批量分析");
    info!("🤖 模型: {}", model);
    info!("📊 最大并发调用数: {}", max_concurrent);
    info!("{}", "=".repeat(60));
}

/// 记录分析批次开始
///
/// # 参数
/// - `run_id`: 批次 ID
/// - `requested`: 指定的工单 ID（`None` 表示全部工单）
pub fn log_run_start(run_id: i64, requested: Option<&[i64]>) {
    info!("\n{}", "=".repeat(60));
    match requested {
        Some(ids) => info!("📦 分析批次 #{} 开始，指定工单: {:?}", run_id, ids),
        None => info!("📦 分析批次 #{} 开始，分析全部工单", run_id),
    }
    info!("{}", "=".repeat(60));
}

/// 记录并发分析开始
///
/// # 参数
/// - `total`: 工单总数
/// - `workers`: 实际启动的 worker 数
pub fn log_batch_start(total: usize, workers: usize) {
    info!("🔍 开始分析 {} 个工单 (并发数: {})", total, workers);
}

/// 打印批次完成统计
///
/// # 参数
/// - `run_id`: 批次 ID
/// - `analyzed`: 分析的工单数
/// - `counters`: token 与费用
/// - `summary`: 批次摘要
pub fn log_run_complete(run_id: i64, analyzed: usize, counters: &RunCounters, summary: &str) {
    info!("\n{}", "─".repeat(60));
    info!("✅ 分析批次 #{} 完成: {} 个工单", run_id, analyzed);
    info!("🔢 tokens: {}", counters.total_tokens_used);
    info!("💰 费用: ${:.6}", counters.total_cost);
    info!("📝 摘要: {}", summary);
    info!("{}", "─".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("工单分析结果", 2), "工单...");
    }

    #[test]
    fn test_init_twice() {
        init();
        init();
    }
}
