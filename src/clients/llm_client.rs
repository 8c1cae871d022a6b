/// LLM API 客户端
///
/// 封装所有与 LLM API 相关的调用逻辑，兼容 OpenAI API 的服务（OpenRouter 等）
use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// 一次结构化输出请求
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub system_message: String,
    pub user_message: String,
    pub schema_name: String,
    pub schema: Value,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// LLM 返回的文本和用量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredResponse {
    pub content: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// 文本生成服务
///
/// 生产环境使用 [`LlmClient`]，测试中替换为脚本化的实现
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, request: &StructuredRequest) -> AppResult<StructuredResponse>;
}

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        if !config.has_api_key() {
            return Err(LlmError::MissingApiKey.into());
        }

        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Ok(Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn api_failed(&self, source: impl std::error::Error + Send + Sync + 'static) -> AppError {
        AppError::llm_api_failed(&self.model_name, source)
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn complete(&self, request: &StructuredRequest) -> AppResult<StructuredResponse> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", request.user_message.len());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_message.as_str())
            .build()
            .map_err(|e| self.api_failed(e))?;

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_message.as_str())
            .build()
            .map_err(|e| self.api_failed(e))?;

        let messages = vec![
            ChatCompletionRequestMessage::System(system_msg),
            ChatCompletionRequestMessage::User(user_msg),
        ];

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: None,
                name: request.schema_name.clone(),
                schema: Some(request.schema.clone()),
                strict: Some(true),
            },
        };

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .response_format(response_format)
            .max_completion_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(|e| self.api_failed(e))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            self.api_failed(e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|usage| (usage.prompt_tokens as u64, usage.completion_tokens as u64))
            .unwrap_or_default();

        Ok(StructuredResponse {
            content: content.trim().to_string(),
            prompt_tokens,
            completion_tokens,
        })
    }
}
