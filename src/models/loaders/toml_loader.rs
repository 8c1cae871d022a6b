use crate::models::ticket::TicketCreate;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 示例工单文件结构
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    tickets: Vec<TicketCreate>,
}

/// 从 TOML 文件加载示例工单
pub async fn load_seed_tickets(toml_file_path: &Path) -> Result<Vec<TicketCreate>> {
    if !toml_file_path.exists() {
        anyhow::bail!("文件不存在: {}", toml_file_path.display());
    }

    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let tickets = parse_seed_tickets(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载 {} 个示例工单: {}",
        tickets.len(),
        toml_file_path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(tickets)
}

/// 解析 TOML 文本中的工单列表
pub fn parse_seed_tickets(content: &str) -> Result<Vec<TicketCreate>> {
    let seed: SeedFile = toml::from_str(content)?;

    for (index, ticket) in seed.tickets.iter().enumerate() {
        if let Err(detail) = ticket.check() {
            anyhow::bail!("第 {} 个工单不合法: {}", index + 1, detail);
        }
    }

    Ok(seed.tickets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_tickets() {
        let content = r#"
[[tickets]]
title = "App crashes on profile page"
description = "Every time I open my profile the app crashes."
status = "open"
tags = "bug,crash"

[[tickets]]
title = "Feature request: Dark mode"
description = "Would love a dark mode option."
"#;
        let tickets = parse_seed_tickets(content).unwrap();
        assert_eq!(tickets.len(), 2);
        assert_eq!(tickets[0].tags.as_deref(), Some("bug,crash"));
        assert_eq!(tickets[1].status.as_deref(), Some("open"));
        assert_eq!(tickets[1].tags, None);
    }

    #[test]
    fn test_parse_rejects_blank_title() {
        let content = r#"
[[tickets]]
title = ""
description = "Missing title"
"#;
        assert!(parse_seed_tickets(content).is_err());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = load_seed_tickets(Path::new("does/not/exist.toml")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_load_bundled_seed_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/tickets.toml");
        let tickets = load_seed_tickets(&path).await.unwrap();
        assert_eq!(tickets.len(), 20);
    }
}
