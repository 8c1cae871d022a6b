use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 工单标题最大长度
pub const TITLE_MAX_CHARS: usize = 255;

/// 支持工单
///
/// 一次分析中作为不可变的输入项，只用于构建 prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// open / in_progress / resolved / closed
    pub status: String,
    /// 逗号分隔的标签
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// prompt 中展示的标签
    pub fn tags_or_none(&self) -> &str {
        match self.tags.as_deref() {
            Some(tags) if !tags.trim().is_empty() => tags,
            _ => "None",
        }
    }
}

fn default_status() -> Option<String> {
    Some("open".to_string())
}

/// 创建工单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketCreate {
    pub title: String,
    pub description: String,
    #[serde(default = "default_status")]
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

impl TicketCreate {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            status: default_status(),
            tags: None,
        }
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// 校验字段，返回错误描述
    pub fn check(&self) -> Result<(), String> {
        check_title(&self.title)?;
        check_description(&self.description)
    }
}

/// 更新工单请求（只更新提供的字段）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub tags: Option<String>,
}

impl TicketUpdate {
    pub fn check(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            check_title(title)?;
        }
        if let Some(description) = &self.description {
            check_description(description)?;
        }
        Ok(())
    }

    /// 把更新应用到工单上
    pub fn apply(self, ticket: &mut Ticket, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            ticket.title = title;
        }
        if let Some(description) = self.description {
            ticket.description = description;
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(tags) = self.tags {
            ticket.tags = Some(tags);
        }
        ticket.updated_at = now;
    }
}

fn check_title(title: &str) -> Result<(), String> {
    if title.trim().is_empty() {
        return Err("title 不能为空".to_string());
    }
    let len = title.chars().count();
    if len > TITLE_MAX_CHARS {
        return Err(format!("title 最多 {} 个字符，实际 {}", TITLE_MAX_CHARS, len));
    }
    Ok(())
}

fn check_description(description: &str) -> Result<(), String> {
    if description.trim().is_empty() {
        return Err("description 不能为空".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_create_check() {
        assert!(TicketCreate::new("App crashes", "It crashes on start").check().is_ok());
        assert!(TicketCreate::new("  ", "desc").check().is_err());
        assert!(TicketCreate::new("title", "").check().is_err());
        assert!(TicketCreate::new("x".repeat(256), "desc").check().is_err());
    }

    #[test]
    fn test_update_apply_only_touches_given_fields() {
        let now = Utc::now();
        let mut ticket = Ticket {
            id: 1,
            title: "Old".to_string(),
            description: "Old description".to_string(),
            status: "open".to_string(),
            tags: None,
            created_at: now,
            updated_at: now,
        };

        let update = TicketUpdate {
            status: Some("resolved".to_string()),
            ..Default::default()
        };
        update.apply(&mut ticket, now);

        assert_eq!(ticket.status, "resolved");
        assert_eq!(ticket.title, "Old");
        assert_eq!(ticket.tags_or_none(), "None");
    }
}
