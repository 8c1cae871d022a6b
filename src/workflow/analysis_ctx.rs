//! 分析流程上下文
//!
//! 封装一次分析流程需要的外部依赖：存储句柄、配置和分析服务

use std::fmt::Display;
use std::sync::Arc;

use crate::config::Config;
use crate::services::AnalysisService;
use crate::store::Stores;

/// 分析流程上下文
///
/// 各阶段函数只通过它访问外部资源，本身不保存任何流程状态
#[derive(Clone)]
pub struct AnalysisCtx {
    pub stores: Stores,
    pub config: Arc<Config>,
    pub service: Arc<AnalysisService>,
}

impl AnalysisCtx {
    /// 创建新的流程上下文
    pub fn new(stores: Stores, config: Arc<Config>, service: Arc<AnalysisService>) -> Self {
        Self {
            stores,
            config,
            service,
        }
    }
}

impl Display for AnalysisCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[模型#{} 并发#{}]",
            self.config.llm_model_name, self.config.max_concurrent_calls
        )
    }
}
