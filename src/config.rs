use crate::error::ConfigError;
use tracing::warn;

/// 程序配置
///
/// 进程启动时构建一次，之后只读，通过 `Arc<Config>` 传给各个组件
#[derive(Clone, Debug)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub llm_max_tokens: u32,
    pub llm_temperature: f32,
    /// 单次 LLM 调用的超时时间（秒）
    pub llm_request_timeout_secs: u64,
    // --- 计费（每百万 token 的美元价格）---
    pub input_token_price_per_million: f64,
    pub output_token_price_per_million: f64,
    // --- 批量分析 ---
    /// 同时进行的 LLM 调用数量
    pub max_concurrent_calls: usize,
    // --- 数据 ---
    /// 启动时是否写入示例工单
    pub seed_database: bool,
    /// 示例工单 TOML 文件
    pub seed_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://openrouter.ai/api/v1".to_string(),
            llm_model_name: "openai/gpt-5-mini".to_string(),
            llm_max_tokens: 800,
            llm_temperature: 0.3,
            llm_request_timeout_secs: 60,
            input_token_price_per_million: 0.25,
            output_token_price_per_million: 2.0,
            max_concurrent_calls: 5,
            seed_database: true,
            seed_file: "data/tickets.toml".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，无法解析的变量单独回退到默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|var_name| std::env::var(var_name).ok())
    }

    /// 从环境变量读取配置，遇到无法解析的值时报错
    pub fn try_from_env() -> Result<Self, ConfigError> {
        Self::try_from_lookup(|var_name| std::env::var(var_name).ok())
    }

    /// 按变量名取值构建配置，无法解析的变量记录警告并保留默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = VarParser {
            lookup: &lookup,
            lenient: true,
        };
        // 宽松模式下 build 不会返回错误
        Self::build(Self::default(), &parse).unwrap_or_default()
    }

    /// 按变量名取值构建配置，第一个无法解析的变量直接报错
    pub fn try_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse = VarParser {
            lookup: &lookup,
            lenient: false,
        };
        Self::build(Self::default(), &parse)
    }

    fn build(default: Self, vars: &VarParser<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            llm_api_key: vars.string("OPENROUTER_API_KEY", default.llm_api_key),
            llm_api_base_url: vars.string("LLM_API_BASE_URL", default.llm_api_base_url),
            llm_model_name: vars.string("LLM_MODEL_NAME", default.llm_model_name),
            llm_max_tokens: vars.parse("LLM_MAX_TOKENS", default.llm_max_tokens)?,
            llm_temperature: vars.parse("LLM_TEMPERATURE", default.llm_temperature)?,
            llm_request_timeout_secs: vars
                .parse("LLM_REQUEST_TIMEOUT", default.llm_request_timeout_secs)?,
            input_token_price_per_million: vars.parse(
                "INPUT_TOKEN_PRICE_PER_MILLION",
                default.input_token_price_per_million,
            )?,
            output_token_price_per_million: vars.parse(
                "OUTPUT_TOKEN_PRICE_PER_MILLION",
                default.output_token_price_per_million,
            )?,
            max_concurrent_calls: vars
                .parse("MAX_CONCURRENT_CALLS", default.max_concurrent_calls)?,
            seed_database: vars.parse("SEED_DATABASE", default.seed_database)?,
            seed_file: vars.string("SEED_FILE", default.seed_file),
            verbose_logging: vars.parse("VERBOSE_LOGGING", default.verbose_logging)?,
        })
    }

    /// 是否配置了 API Key
    pub fn has_api_key(&self) -> bool {
        !self.llm_api_key.trim().is_empty()
    }
}

/// 变量读取器：`lenient` 时解析失败只警告并使用默认值
struct VarParser<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
    lenient: bool,
}

impl VarParser<'_> {
    fn string(&self, var_name: &str, default: String) -> String {
        (self.lookup)(var_name).unwrap_or(default)
    }

    fn parse<T: std::str::FromStr>(&self, var_name: &str, default: T) -> Result<T, ConfigError> {
        let Some(value) = (self.lookup)(var_name) else {
            return Ok(default);
        };
        match parse_value(var_name, &value) {
            Ok(parsed) => Ok(parsed),
            Err(e) if self.lenient => {
                warn!("⚠️ {}，使用默认值", e);
                Ok(default)
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_value<T: std::str::FromStr>(var_name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.to_string(),
            expected_type: std::any::type_name::<T>().to_string(),
        })
}
