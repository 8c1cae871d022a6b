use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// LLM 原始响应在错误信息里保留的最大字符数
pub const RAW_PREFIX_CHARS: usize = 200;

/// 应用程序错误类型
///
/// 流水线的每个阶段只会返回这里的一种错误，外层处理器据此映射成不同的状态码
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入校验错误
    #[error("校验错误: {0}")]
    Validation(#[from] ValidationError),
    /// 资源不存在
    #[error("未找到: {0}")]
    NotFound(String),
    /// 存储错误
    #[error("数据库错误: {0}")]
    Database(#[from] DatabaseError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
    /// 流水线执行中的其他错误
    #[error("流水线执行失败: {message}")]
    GraphExecution { message: String },
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 输入校验错误
#[derive(Debug, Error)]
pub enum ValidationError {
    /// 请求的工单 ID 不存在
    #[error("部分工单ID不存在: {ids:?}")]
    MissingTickets { ids: Vec<i64> },
    /// 没有可分析的工单
    #[error("没有找到可分析的工单")]
    NoTickets,
    /// 创建工单时列表为空
    #[error("至少需要提供一个工单")]
    EmptyTicketBatch,
    /// 工单字段不合法
    #[error("工单字段不合法: {detail}")]
    InvalidTicket { detail: String },
    /// 分页参数不合法
    #[error("分页参数不合法: {detail}")]
    InvalidPagination { detail: String },
}

/// 存储错误
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// 分析批次不存在
    #[error("分析批次 {run_id} 不存在")]
    RunNotFound { run_id: i64 },
    /// 工单不存在
    #[error("工单 {ticket_id} 不存在")]
    TicketNotFound { ticket_id: i64 },
    /// 列表字段编码失败
    #[error("字段 {field} 编码失败: {source}")]
    Encode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// 列表字段解码失败
    #[error("字段 {field} 解码失败: {source}")]
    Decode {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// 保存分析结果失败
    #[error("保存分析结果失败: {detail}")]
    SaveFailed { detail: String },
    /// 存储不可用
    #[error("存储不可用: {detail}")]
    Unavailable { detail: String },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// 未配置 API Key
    #[error("未配置 OPENROUTER_API_KEY")]
    MissingApiKey,
    /// API 调用失败
    #[error("LLM API调用失败 (模型: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    #[error("LLM返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容不是合法 JSON
    #[error("LLM返回内容不是合法JSON (响应: {raw_prefix}): {source}")]
    InvalidJson {
        raw_prefix: String,
        #[source]
        source: serde_json::Error,
    },
    /// 返回内容不符合输出结构
    #[error("LLM返回字段 {field} 不符合要求: {detail} (响应: {raw_prefix})")]
    SchemaViolation {
        field: &'static str,
        detail: String,
        raw_prefix: String,
    },
    /// 单次调用超时
    #[error("工单 {ticket_id} 分析超时 ({secs}秒)")]
    Timeout { ticket_id: i64, secs: u64 },
    /// 某个工单分析失败
    #[error("工单 {ticket_id} 分析失败: {source}")]
    TicketFailed {
        ticket_id: i64,
        #[source]
        source: Box<LlmError>,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl AppError {
    /// 对外暴露的错误码
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Llm(_) => "LLM_ERROR",
            AppError::GraphExecution { .. } => "GRAPH_EXECUTION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::Llm(_) => 503,
            AppError::Database(_) | AppError::GraphExecution { .. } | AppError::Config(_) => 500,
        }
    }

    /// 外层处理器的兜底规则：已知错误原样返回，其余包装成 GraphExecution
    pub fn from_unexpected(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(app_err) => app_err,
            Err(other) => AppError::GraphExecution {
                message: format!("分析执行失败: {:#}", other),
            },
        }
    }

    /// 创建流水线执行错误
    pub fn graph_execution(message: impl Into<String>) -> Self {
        AppError::GraphExecution {
            message: message.into(),
        }
    }

    /// 创建LLM API调用错误
    pub fn llm_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Llm(LlmError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建存储不可用错误
    pub fn db_unavailable(detail: impl Into<String>) -> Self {
        AppError::Database(DatabaseError::Unavailable {
            detail: detail.into(),
        })
    }
}

/// 截取原始响应的前缀，用于错误诊断
pub fn raw_prefix(raw: &str) -> String {
    raw.chars().take(RAW_PREFIX_CHARS).collect()
}

// ========== 对外错误响应 ==========

/// 错误详情
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// 错误响应
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    #[serde(skip)]
    pub status_code: u16,
    pub error: ErrorDetail,
    pub timestamp: DateTime<Utc>,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let details = match err {
            AppError::Validation(ValidationError::MissingTickets { ids }) => {
                Some(format!("Missing ticket IDs: {:?}", ids))
            }
            AppError::Llm(LlmError::MissingApiKey) => {
                Some("Set OPENROUTER_API_KEY in environment variables".to_string())
            }
            _ => std::error::Error::source(err).map(|source| source.to_string()),
        };

        ErrorResponse {
            status_code: err.status_code(),
            error: ErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
                details,
            },
            timestamp: Utc::now(),
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        ErrorResponse::from(&err)
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_status() {
        let err: AppError = ValidationError::NoTickets.into();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(err.status_code(), 400);

        let err: AppError = LlmError::MissingApiKey.into();
        assert_eq!(err.code(), "LLM_ERROR");
        assert_eq!(err.status_code(), 503);

        let err: AppError = DatabaseError::RunNotFound { run_id: 7 }.into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_from_unexpected_keeps_known_errors() {
        let known = anyhow::Error::new(AppError::from(ValidationError::NoTickets));
        assert!(matches!(
            AppError::from_unexpected(known),
            AppError::Validation(ValidationError::NoTickets)
        ));

        let unknown = anyhow::anyhow!("socket closed");
        let wrapped = AppError::from_unexpected(unknown);
        assert_eq!(wrapped.code(), "GRAPH_EXECUTION_ERROR");
        assert!(wrapped.to_string().contains("socket closed"));
    }

    #[test]
    fn test_error_response_lists_missing_ids() {
        let err = AppError::from(ValidationError::MissingTickets { ids: vec![42] });
        let response = ErrorResponse::from(&err);
        assert_eq!(response.status_code, 400);
        assert_eq!(response.error.code, "VALIDATION_ERROR");
        assert_eq!(
            response.error.details.as_deref(),
            Some("Missing ticket IDs: [42]")
        );
    }

    #[test]
    fn test_raw_prefix_is_char_bounded() {
        let raw = "错".repeat(500);
        assert_eq!(raw_prefix(&raw).chars().count(), RAW_PREFIX_CHARS);
        assert_eq!(raw_prefix("{}"), "{}");
    }
}
