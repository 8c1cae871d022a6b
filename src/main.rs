use anyhow::{Context, Result};
use ticket_analyst::utils::logging;
use ticket_analyst::{App, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env();

    // 命令行参数：要分析的工单 ID，不提供时分析全部
    let ids = std::env::args()
        .skip(1)
        .map(|arg| {
            arg.parse::<i64>()
                .with_context(|| format!("无效的工单ID: {}", arg))
        })
        .collect::<Result<Vec<_>>>()?;

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    let response = app.run(Some(ids)).await?;

    info!(
        "🏁 批次 #{} 状态: {}，共 {} 条分析记录",
        response.analysis_run.id,
        response.analysis_run.status.as_str(),
        response.ticket_analyses.len()
    );

    Ok(())
}
