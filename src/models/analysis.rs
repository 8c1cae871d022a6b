//! 工单分析结果
//!
//! LLM 输出结构与请求时使用的 JSON Schema 放在同一个文件里，
//! 测试会检查两者保持一致。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{raw_prefix, DatabaseError, LlmError};

pub const ANALYSIS_MIN_CHARS: usize = 10;
pub const ANALYSIS_MAX_CHARS: usize = 500;
pub const LIST_MIN_ITEMS: usize = 2;
pub const LIST_MAX_ITEMS: usize = 3;
pub const LIST_ITEM_MIN_CHARS: usize = 10;
pub const LIST_ITEM_MAX_CHARS: usize = 150;

/// 请求结构化输出时使用的 schema 名称
pub const TICKET_ANALYSIS_SCHEMA_NAME: &str = "TicketAnalysis";

/// 工单分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bug,
    Billing,
    FeatureRequest,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Bug,
        Category::Billing,
        Category::FeatureRequest,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Bug => "bug",
            Category::Billing => "billing",
            Category::FeatureRequest => "feature_request",
            Category::Other => "other",
        }
    }

    /// 展示用名称（下划线替换为空格）
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }
}

/// 工单优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    /// 摘要中使用的展示顺序
    pub const DISPLAY_ORDER: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// LLM 的结构化输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicketAnalysisOutput {
    pub category: Category,
    pub priority: Priority,
    /// 1-2 句话的问题说明
    pub analysis: String,
    pub potential_causes: Vec<String>,
    pub suggested_solutions: Vec<String>,
}

impl TicketAnalysisOutput {
    /// 解析并校验 LLM 返回的原始文本
    ///
    /// 即使请求时带了 strict schema，也不信任服务端的约束
    pub fn parse(raw: &str) -> Result<Self, LlmError> {
        let output: Self = serde_json::from_str(raw.trim()).map_err(|source| {
            LlmError::InvalidJson {
                raw_prefix: raw_prefix(raw),
                source,
            }
        })?;
        output.validate(raw)?;
        Ok(output)
    }

    /// 按 schema 的长度/数量约束校验各字段
    pub fn validate(&self, raw: &str) -> Result<(), LlmError> {
        let violation = |field: &'static str, detail: String| LlmError::SchemaViolation {
            field,
            detail,
            raw_prefix: raw_prefix(raw),
        };

        let len = self.analysis.chars().count();
        if !(ANALYSIS_MIN_CHARS..=ANALYSIS_MAX_CHARS).contains(&len) {
            return Err(violation(
                "analysis",
                format!(
                    "长度应在 {}-{} 个字符之间，实际 {}",
                    ANALYSIS_MIN_CHARS, ANALYSIS_MAX_CHARS, len
                ),
            ));
        }

        for (field, items) in [
            ("potential_causes", &self.potential_causes),
            ("suggested_solutions", &self.suggested_solutions),
        ] {
            if !(LIST_MIN_ITEMS..=LIST_MAX_ITEMS).contains(&items.len()) {
                return Err(violation(
                    field,
                    format!(
                        "应包含 {}-{} 项，实际 {}",
                        LIST_MIN_ITEMS,
                        LIST_MAX_ITEMS,
                        items.len()
                    ),
                ));
            }
            for item in items {
                let len = item.chars().count();
                if !(LIST_ITEM_MIN_CHARS..=LIST_ITEM_MAX_CHARS).contains(&len) {
                    return Err(violation(
                        field,
                        format!(
                            "每项长度应在 {}-{} 个字符之间，实际 {}: {}",
                            LIST_ITEM_MIN_CHARS,
                            LIST_ITEM_MAX_CHARS,
                            len,
                            item.chars().take(50).collect::<String>()
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// 请求 LLM 时附带的 JSON Schema
pub fn ticket_analysis_schema() -> Value {
    let string_list = |description: &str| {
        json!({
            "type": "array",
            "items": {
                "type": "string",
                "minLength": LIST_ITEM_MIN_CHARS,
                "maxLength": LIST_ITEM_MAX_CHARS,
            },
            "minItems": LIST_MIN_ITEMS,
            "maxItems": LIST_MAX_ITEMS,
            "description": description,
        })
    };

    json!({
        "type": "object",
        "properties": {
            "category": {
                "type": "string",
                "enum": ["bug", "billing", "feature_request", "other"],
                "description": "Category of the ticket: bug, billing, feature_request, or other",
            },
            "priority": {
                "type": "string",
                "enum": ["low", "medium", "high"],
                "description": "Priority level: low, medium, or high",
            },
            "analysis": {
                "type": "string",
                "minLength": ANALYSIS_MIN_CHARS,
                "maxLength": ANALYSIS_MAX_CHARS,
                "description": "Brief explanation of the issue (1-2 sentences, 10-500 characters)",
            },
            "potential_causes": string_list("List of 2-3 likely root causes (each 10-150 characters)"),
            "suggested_solutions": string_list("List of 2-3 actionable next steps (each 10-150 characters)"),
        },
        "required": ["category", "priority", "analysis", "potential_causes", "suggested_solutions"],
        "additionalProperties": false,
    })
}

/// 单个工单的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketAnalysis {
    pub ticket_id: i64,
    pub category: Category,
    pub priority: Priority,
    pub analysis: String,
    pub potential_causes: Vec<String>,
    pub suggested_solutions: Vec<String>,
}

impl TicketAnalysis {
    pub fn from_output(ticket_id: i64, output: TicketAnalysisOutput) -> Self {
        Self {
            ticket_id,
            category: output.category,
            priority: output.priority,
            analysis: output.analysis,
            potential_causes: output.potential_causes,
            suggested_solutions: output.suggested_solutions,
        }
    }
}

/// 持久化后的分析记录，列表字段以 JSON 文本保存
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub id: i64,
    pub analysis_run_id: i64,
    pub ticket_id: i64,
    pub category: String,
    pub priority: String,
    /// 旧字段，内容与 analysis 相同
    pub notes: Option<String>,
    pub analysis: Option<String>,
    pub potential_causes: Option<String>,
    pub suggested_solutions: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredAnalysis {
    /// 把分析结果编码成一行记录
    pub fn encode(
        id: i64,
        analysis_run_id: i64,
        result: &TicketAnalysis,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DatabaseError> {
        let potential_causes = serde_json::to_string(&result.potential_causes).map_err(|source| {
            DatabaseError::Encode {
                field: "potential_causes",
                source,
            }
        })?;
        let suggested_solutions =
            serde_json::to_string(&result.suggested_solutions).map_err(|source| {
                DatabaseError::Encode {
                    field: "suggested_solutions",
                    source,
                }
            })?;

        Ok(Self {
            id,
            analysis_run_id,
            ticket_id: result.ticket_id,
            category: result.category.as_str().to_string(),
            priority: result.priority.as_str().to_string(),
            notes: Some(result.analysis.clone()),
            analysis: Some(result.analysis.clone()),
            potential_causes: Some(potential_causes),
            suggested_solutions: Some(suggested_solutions),
            created_at,
        })
    }

    pub fn causes(&self) -> Result<Vec<String>, DatabaseError> {
        decode_list("potential_causes", self.potential_causes.as_deref())
    }

    pub fn solutions(&self) -> Result<Vec<String>, DatabaseError> {
        decode_list("suggested_solutions", self.suggested_solutions.as_deref())
    }
}

fn decode_list(field: &'static str, raw: Option<&str>) -> Result<Vec<String>, DatabaseError> {
    match raw {
        None => Ok(Vec::new()),
        Some(text) => {
            serde_json::from_str(text).map_err(|source| DatabaseError::Decode { field, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> String {
        json!({
            "category": "bug",
            "priority": "high",
            "analysis": "The profile page crashes after the latest update.",
            "potential_causes": [
                "Null pointer in profile rendering",
                "Corrupted cached profile data"
            ],
            "suggested_solutions": [
                "Roll back the profile page change",
                "Clear the profile cache on login"
            ]
        })
        .to_string()
    }

    #[test]
    fn test_parse_valid_output() {
        let output = TicketAnalysisOutput::parse(&valid_json()).unwrap();
        assert_eq!(output.category, Category::Bug);
        assert_eq!(output.priority, Priority::High);
        assert_eq!(output.potential_causes.len(), 2);
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = TicketAnalysisOutput::parse("```json\n{not json").unwrap_err();
        match err {
            LlmError::InvalidJson { raw_prefix, .. } => assert!(raw_prefix.starts_with("```json")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_enum_and_fields() {
        let raw = valid_json().replace("\"bug\"", "\"outage\"");
        assert!(matches!(
            TicketAnalysisOutput::parse(&raw),
            Err(LlmError::InvalidJson { .. })
        ));

        let mut value: Value = serde_json::from_str(&valid_json()).unwrap();
        value["confidence"] = json!(0.9);
        assert!(TicketAnalysisOutput::parse(&value.to_string()).is_err());
    }

    #[test]
    fn test_validate_bounds() {
        let mut value: Value = serde_json::from_str(&valid_json()).unwrap();
        value["analysis"] = json!("too short");
        match TicketAnalysisOutput::parse(&value.to_string()) {
            Err(LlmError::SchemaViolation { field, .. }) => assert_eq!(field, "analysis"),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut value: Value = serde_json::from_str(&valid_json()).unwrap();
        value["suggested_solutions"] = json!(["Only one solution here"]);
        match TicketAnalysisOutput::parse(&value.to_string()) {
            Err(LlmError::SchemaViolation { field, .. }) => assert_eq!(field, "suggested_solutions"),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut value: Value = serde_json::from_str(&valid_json()).unwrap();
        value["potential_causes"] = json!(["short", "Corrupted cached profile data"]);
        match TicketAnalysisOutput::parse(&value.to_string()) {
            Err(LlmError::SchemaViolation { field, .. }) => assert_eq!(field, "potential_causes"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_schema_matches_output_type() {
        let schema = ticket_analysis_schema();

        let categories: Vec<&str> = schema["properties"]["category"]["enum"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let expected: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(categories, expected);

        let priorities: Vec<&str> = schema["properties"]["priority"]["enum"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let expected: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(priorities, expected);

        // required 与结构体字段一一对应
        let output = TicketAnalysisOutput::parse(&valid_json()).unwrap();
        let serialized = serde_json::to_value(&output).unwrap();
        let mut fields: Vec<&str> = serialized
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        let mut required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        fields.sort();
        required.sort();
        assert_eq!(fields, required);

        let mut properties: Vec<&str> = schema["properties"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        properties.sort();
        assert_eq!(properties, required);
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_stored_analysis_round_trip() {
        let result = TicketAnalysis::from_output(
            3,
            TicketAnalysisOutput::parse(&valid_json()).unwrap(),
        );
        let stored = StoredAnalysis::encode(1, 9, &result, Utc::now()).unwrap();

        assert_eq!(stored.category, "bug");
        assert_eq!(stored.notes, stored.analysis);
        assert_eq!(stored.causes().unwrap(), result.potential_causes);
        assert_eq!(stored.solutions().unwrap(), result.suggested_solutions);
    }

    #[test]
    fn test_category_label() {
        assert_eq!(Category::FeatureRequest.label(), "feature request");
        assert_eq!(Category::Bug.label(), "bug");
    }
}
