//! 工单分析服务 - 业务能力层
//!
//! 只负责"分析一个工单"：构建 prompt、请求结构化输出、校验结果、计算费用。
//! 不关心批量调度，也不写存储。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clients::{ChatBackend, StructuredRequest};
use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use crate::models::analysis::{
    ticket_analysis_schema, TicketAnalysis, TicketAnalysisOutput, TICKET_ANALYSIS_SCHEMA_NAME,
};
use crate::models::{CallUsage, Ticket};

const SYSTEM_MESSAGE: &str = "You are a support ticket analyst. Always respond with valid JSON only. \
Never include markdown, explanations, or extra text. Ensure all strings are properly escaped. \
The output will be validated against a strict schema.";

/// 两档计费：输入 token 便宜，输出 token 贵
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            input_per_million: config.input_token_price_per_million,
            output_per_million: config.output_token_price_per_million,
        }
    }

    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1_000_000.0) * self.input_per_million
            + (completion_tokens as f64 / 1_000_000.0) * self.output_per_million
    }
}

/// 一个工单的分析结果及其用量
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedTicket {
    pub analysis: TicketAnalysis,
    pub usage: CallUsage,
}

/// 工单分析服务
///
/// 职责：
/// - 为单个工单构建 prompt 和输出 schema
/// - 调用 LLM，解析并校验返回的 JSON
/// - 根据用量计算费用
pub struct AnalysisService {
    backend: Arc<dyn ChatBackend>,
    pricing: Pricing,
    max_tokens: u32,
    temperature: f32,
}

impl AnalysisService {
    /// 创建新的分析服务
    pub fn new(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        Self {
            backend,
            pricing: Pricing::from_config(config),
            max_tokens: config.llm_max_tokens,
            temperature: config.llm_temperature,
        }
    }

    /// 分析单个工单
    ///
    /// 任何调用、解析或校验失败都会返回带工单 ID 的 `LlmError::TicketFailed`
    pub async fn analyze(&self, ticket: &Ticket) -> AppResult<AnalyzedTicket> {
        info!("📝 正在分析工单 {}...", ticket.id);

        match self.analyze_inner(ticket).await {
            Ok(analyzed) => {
                info!(
                    "✅ 工单 {} 分析完成: {} / {}",
                    ticket.id,
                    analyzed.analysis.category.as_str(),
                    analyzed.analysis.priority.as_str()
                );
                Ok(analyzed)
            }
            Err(AppError::Llm(source)) => {
                warn!("❌ 工单 {} 分析失败: {}", ticket.id, source);
                Err(LlmError::TicketFailed {
                    ticket_id: ticket.id,
                    source: Box::new(source),
                }
                .into())
            }
            Err(other) => Err(other),
        }
    }

    async fn analyze_inner(&self, ticket: &Ticket) -> AppResult<AnalyzedTicket> {
        let request = self.build_request(ticket);
        let response = self.backend.complete(&request).await?;

        debug!("工单 {} 原始响应 {} 字符", ticket.id, response.content.len());

        let output = TicketAnalysisOutput::parse(&response.content)?;

        let usage = CallUsage {
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            cost: self
                .pricing
                .cost(response.prompt_tokens, response.completion_tokens),
        };

        Ok(AnalyzedTicket {
            analysis: TicketAnalysis::from_output(ticket.id, output),
            usage,
        })
    }

    /// 构建单个工单的结构化请求
    pub fn build_request(&self, ticket: &Ticket) -> StructuredRequest {
        StructuredRequest {
            system_message: SYSTEM_MESSAGE.to_string(),
            user_message: build_prompt(ticket),
            schema_name: TICKET_ANALYSIS_SCHEMA_NAME.to_string(),
            schema: ticket_analysis_schema(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

fn build_prompt(ticket: &Ticket) -> String {
    format!(
        r#"You are a support ticket analyst. Analyze this ticket and respond ONLY with valid JSON.

Ticket:
Title: {}
Description: {}
Status: {}
Tags: {}

Respond with ONLY this JSON structure (no markdown, no extra text):
{{
  "category": "bug" or "billing" or "feature_request" or "other",
  "priority": "low" or "medium" or "high",
  "analysis": "brief explanation of the issue (1-2 sentences)",
  "potential_causes": ["cause 1", "cause 2", "cause 3"],
  "suggested_solutions": ["solution 1", "solution 2", "solution 3"]
}}"#,
        ticket.title,
        ticket.description,
        ticket.status,
        ticket.tags_or_none()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::StructuredResponse;
    use async_trait::async_trait;
    use chrono::Utc;

    struct FixedBackend {
        content: String,
    }

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn complete(&self, request: &StructuredRequest) -> AppResult<StructuredResponse> {
            assert_eq!(request.schema_name, "TicketAnalysis");
            Ok(StructuredResponse {
                content: self.content.clone(),
                prompt_tokens: 1_000_000,
                completion_tokens: 500_000,
            })
        }
    }

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: 7,
            title: "Wrong billing amount charged".to_string(),
            description: "I was charged $150 instead of $50.".to_string(),
            status: "open".to_string(),
            tags: Some("billing,refund".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn service(content: &str) -> AnalysisService {
        let backend = Arc::new(FixedBackend {
            content: content.to_string(),
        });
        AnalysisService::new(backend, &Config::default())
    }

    #[test]
    fn test_pricing_two_tiers() {
        let pricing = Pricing::from_config(&Config::default());
        assert!((pricing.cost(1_000_000, 0) - 0.25).abs() < 1e-12);
        assert!((pricing.cost(0, 1_000_000) - 2.0).abs() < 1e-12);
        assert!((pricing.cost(400, 200) - 0.0005).abs() < 1e-12);
    }

    #[test]
    fn test_prompt_embeds_ticket_fields() {
        let request = service("{}").build_request(&ticket());
        assert!(request.user_message.contains("Title: Wrong billing amount charged"));
        assert!(request.user_message.contains("Tags: billing,refund"));
        assert_eq!(request.max_tokens, 800);
        assert_eq!(request.schema["additionalProperties"], serde_json::json!(false));
    }

    #[tokio::test]
    async fn test_analyze_success_computes_cost() {
        let content = serde_json::json!({
            "category": "billing",
            "priority": "high",
            "analysis": "Customer was overcharged for the subscription.",
            "potential_causes": ["Duplicate plan upgrade applied", "Currency conversion misconfigured"],
            "suggested_solutions": ["Refund the difference immediately", "Audit the billing pipeline"]
        })
        .to_string();

        let analyzed = service(&content).analyze(&ticket()).await.unwrap();
        assert_eq!(analyzed.analysis.ticket_id, 7);
        assert_eq!(analyzed.usage.total_tokens(), 1_500_000);
        assert!((analyzed.usage.cost - 1.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_analyze_invalid_json_is_llm_error() {
        let err = service("Sure! Here is the analysis").analyze(&ticket()).await.unwrap_err();
        match err {
            AppError::Llm(LlmError::TicketFailed { ticket_id, source }) => {
                assert_eq!(ticket_id, 7);
                assert!(matches!(*source, LlmError::InvalidJson { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
