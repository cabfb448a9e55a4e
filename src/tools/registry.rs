//! 工具注册表
//!
//! 所有工具实现 Tool trait（名称 / 描述 / 分类 / 参数说明 / execute），由 ToolRegistry 按名注册与查找。
//! 注册表在启动时构建一次，以 Arc 注入 Session 与执行器；describe_for_planner 生成规划提示词中的工具目录。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait：元数据供规划器理解，execute 的 Err 文本即步骤错误信息
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称，形如 `herbs.lookup`
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 分类（herbs / meridians / safety / literature ...）
    fn category(&self) -> &str;

    /// (参数名, 说明)，按声明顺序
    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// 依赖的本地数据集
    fn requires_data(&self) -> &[&'static str] {
        &[]
    }

    /// 规划提示词中的 `USE WHEN:` 说明
    fn usage_guide(&self) -> &str {
        ""
    }

    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 工具注册表：按名称有序存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 按名称排序；category 为 None 时返回全部
    pub fn list(&self, category: Option<&str>) -> Vec<Arc<dyn Tool>> {
        self.tools
            .values()
            .filter(|t| category.map_or(true, |c| t.category() == c))
            .cloned()
            .collect()
    }

    pub fn categories(&self) -> Vec<String> {
        self.tools
            .values()
            .map(|t| t.category().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 规划用工具目录：按分类分组，跳过 exclude 中的工具（如被抑制的工具）；空分类不输出
    pub fn describe_for_planner(&self, exclude: &BTreeSet<String>) -> String {
        let mut lines = Vec::new();
        for category in self.categories() {
            let tools: Vec<_> = self
                .list(Some(&category))
                .into_iter()
                .filter(|t| !exclude.contains(t.name()))
                .collect();
            if tools.is_empty() {
                continue;
            }
            lines.push(format!("\n## {category}"));
            for tool in tools {
                let params = tool
                    .parameters()
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!("- **{}**({}): {}", tool.name(), params, tool.description()));
                if !tool.usage_guide().is_empty() {
                    lines.push(format!("  USE WHEN: {}", tool.usage_guide()));
                }
            }
        }
        lines.join("\n")
    }
}

/// 读取必填字符串参数
pub fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(format!(
            "Parameter '{key}' must be a string, got {}",
            type_name(other)
        )),
        None => Err(format!("Missing required parameter '{key}'")),
    }
}

/// 读取数值参数，兼容字符串形式的数字（LLM 常把数字写成字符串）
pub fn num_arg(args: &Value, key: &str) -> Result<Option<f64>, String> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("Parameter '{key}' must be a number, got '{s}'")),
        Some(other) => Err(format!(
            "Parameter '{key}' must be a number, got {}",
            type_name(other)
        )),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fake {
        name: &'static str,
        category: &'static str,
    }

    #[async_trait]
    impl Tool for Fake {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake tool"
        }
        fn category(&self) -> &str {
            self.category
        }
        fn parameters(&self) -> &[(&'static str, &'static str)] {
            &[("query", "Search text")]
        }
        fn usage_guide(&self) -> &str {
            if self.name.ends_with("lookup") {
                "When a herb is named."
            } else {
                ""
            }
        }
        async fn execute(&self, args: Value) -> Result<Value, String> {
            Ok(args)
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Fake { name: "herbs.lookup", category: "herbs" });
        r.register(Fake { name: "herbs.by_category", category: "herbs" });
        r.register(Fake { name: "safety.toxicity_check", category: "safety" });
        r
    }

    #[test]
    fn test_list_and_categories() {
        let r = registry();
        assert_eq!(r.len(), 3);
        assert_eq!(r.categories(), vec!["herbs", "safety"]);
        let herbs: Vec<_> = r.list(Some("herbs")).iter().map(|t| t.name().to_string()).collect();
        assert_eq!(herbs, vec!["herbs.by_category", "herbs.lookup"]);
        assert!(r.get("nope").is_none());
    }

    #[test]
    fn test_describe_for_planner_excludes_tools() {
        let r = registry();
        let text = r.describe_for_planner(&BTreeSet::new());
        assert!(text.contains("## herbs"));
        assert!(text.contains("- **herbs.lookup**(query: Search text): fake tool"));
        assert!(text.contains("  USE WHEN: When a herb is named."));

        let exclude: BTreeSet<String> = ["safety.toxicity_check".to_string()].into();
        let text = r.describe_for_planner(&exclude);
        assert!(!text.contains("## safety"));
        assert!(!text.contains("safety.toxicity_check"));
    }

    #[test]
    fn test_arg_helpers() {
        let args = json!({"query": "人参", "dosage_g": "12", "n": true});
        assert_eq!(str_arg(&args, "query").unwrap(), "人参");
        assert!(str_arg(&args, "missing").unwrap_err().contains("Missing required parameter"));
        assert_eq!(num_arg(&args, "dosage_g").unwrap(), Some(12.0));
        assert_eq!(num_arg(&args, "absent").unwrap(), None);
        assert!(num_arg(&args, "n").is_err());
    }
}
