//! 经络工具：十二正经的五行、阴阳与表里配属

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::tools::registry::str_arg;
use crate::tools::Tool;

#[derive(Debug, Serialize)]
pub struct Meridian {
    pub name: &'static str,
    pub pinyin: &'static str,
    pub english: &'static str,
    pub element: &'static str,
    pub yin_yang: &'static str,
    pub paired: &'static str,
}

const fn m(
    name: &'static str,
    pinyin: &'static str,
    english: &'static str,
    element: &'static str,
    yin_yang: &'static str,
    paired: &'static str,
) -> Meridian {
    Meridian {
        name,
        pinyin,
        english,
        element,
        yin_yang,
        paired,
    }
}

pub static MERIDIANS: &[Meridian] = &[
    m("肝经", "Gān Jīng", "Liver Meridian", "木 (Wood)", "Yin", "胆经"),
    m("心经", "Xīn Jīng", "Heart Meridian", "火 (Fire)", "Yin", "小肠经"),
    m("脾经", "Pí Jīng", "Spleen Meridian", "土 (Earth)", "Yin", "胃经"),
    m("肺经", "Fèi Jīng", "Lung Meridian", "金 (Metal)", "Yin", "大肠经"),
    m("肾经", "Shèn Jīng", "Kidney Meridian", "水 (Water)", "Yin", "膀胱经"),
    m("胆经", "Dǎn Jīng", "Gallbladder Meridian", "木 (Wood)", "Yang", "肝经"),
    m("小肠经", "Xiǎo Cháng Jīng", "Small Intestine Meridian", "火 (Fire)", "Yang", "心经"),
    m("胃经", "Wèi Jīng", "Stomach Meridian", "土 (Earth)", "Yang", "脾经"),
    m("大肠经", "Dà Cháng Jīng", "Large Intestine Meridian", "金 (Metal)", "Yang", "肺经"),
    m("膀胱经", "Páng Guāng Jīng", "Bladder Meridian", "水 (Water)", "Yang", "肾经"),
    m("心包经", "Xīn Bāo Jīng", "Pericardium Meridian", "火 (Fire)", "Yin", "三焦经"),
    m("三焦经", "Sān Jiāo Jīng", "Triple Burner Meridian", "火 (Fire)", "Yang", "心包经"),
];

/// 先精确匹配（中文名、英文名或省略 "Meridian" 的英文名），再退回子串匹配；
/// 否则 "bladder" 会先命中 "Gallbladder"
fn find_meridian(q: &str) -> Option<&'static Meridian> {
    if q.is_empty() {
        return None;
    }
    let exact = MERIDIANS.iter().find(|m| {
        let english = m.english.to_lowercase();
        m.name == q
            || m.name.trim_end_matches('经') == q
            || english == q
            || english == format!("{q} meridian")
    });
    exact.or_else(|| {
        MERIDIANS
            .iter()
            .find(|m| m.name.contains(q) || m.english.to_lowercase().contains(q))
    })
}

pub struct MeridianLookupTool;

#[async_trait]
impl Tool for MeridianLookupTool {
    fn name(&self) -> &str {
        "meridians.lookup"
    }

    fn description(&self) -> &str {
        "Look up meridian information by name. Returns Five Element association, Yin/Yang, and paired meridian."
    }

    fn category(&self) -> &str {
        "meridians"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("meridian", "Meridian name (Chinese or English)")]
    }

    fn usage_guide(&self) -> &str {
        "When analyzing meridian tropism for herbs or treatment planning."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let meridian = str_arg(&args, "meridian")?;
        let q = meridian.trim().to_lowercase();
        Ok(match find_meridian(&q) {
            Some(m) => json!({ "status": "found", "meridian": m }),
            _ => json!({
                "status": "not_found",
                "message": format!("Meridian '{meridian}' not found."),
            }),
        })
    }
}

pub struct MeridianListTool;

#[async_trait]
impl Tool for MeridianListTool {
    fn name(&self) -> &str {
        "meridians.list_all"
    }

    fn description(&self) -> &str {
        "List all 12 primary meridians with their Five Element associations."
    }

    fn category(&self) -> &str {
        "meridians"
    }

    fn usage_guide(&self) -> &str {
        "When providing an overview of the meridian system."
    }

    async fn execute(&self, _args: Value) -> Result<Value, String> {
        Ok(json!({ "status": "found", "count": MERIDIANS.len(), "meridians": MERIDIANS }))
    }
}

pub struct MeridiansByElementTool;

#[async_trait]
impl Tool for MeridiansByElementTool {
    fn name(&self) -> &str {
        "meridians.by_element"
    }

    fn description(&self) -> &str {
        "Find meridians associated with a specific Five Element (五行): Wood, Fire, Earth, Metal, Water."
    }

    fn category(&self) -> &str {
        "meridians"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("element", "Five Element name (Chinese or English)")]
    }

    fn usage_guide(&self) -> &str {
        "When analyzing Five Element relationships in treatment."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let element = str_arg(&args, "element")?;
        let q = element.trim().to_lowercase();
        let matches: Vec<&Meridian> = MERIDIANS
            .iter()
            .filter(|m| !q.is_empty() && m.element.to_lowercase().contains(&q))
            .collect();
        if matches.is_empty() {
            return Ok(json!({
                "status": "not_found",
                "message": format!("No meridians found for element '{element}'."),
            }));
        }
        Ok(json!({ "status": "found", "element": element, "meridians": matches }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_chinese_and_english() {
        let out = MeridianLookupTool.execute(json!({"meridian": "肝"})).await.unwrap();
        assert_eq!(out["meridian"]["name"], "肝经");
        let out = MeridianLookupTool.execute(json!({"meridian": "bladder"})).await.unwrap();
        assert_eq!(out["meridian"]["paired"], "肾经");
    }

    #[tokio::test]
    async fn test_lookup_prefers_exact_names() {
        let out = MeridianLookupTool.execute(json!({"meridian": "Gallbladder"})).await.unwrap();
        assert_eq!(out["meridian"]["name"], "胆经");
        let out = MeridianLookupTool.execute(json!({"meridian": "Bladder Meridian"})).await.unwrap();
        assert_eq!(out["meridian"]["name"], "膀胱经");
        let out = MeridianLookupTool.execute(json!({"meridian": "心"})).await.unwrap();
        assert_eq!(out["meridian"]["name"], "心经");
        let out = MeridianLookupTool.execute(json!({"meridian": "intestine"})).await.unwrap();
        assert_eq!(out["status"], "found");
        let out = MeridianLookupTool.execute(json!({"meridian": "  "})).await.unwrap();
        assert_eq!(out["status"], "not_found");
    }

    #[tokio::test]
    async fn test_by_element_fire_has_four() {
        let out = MeridiansByElementTool.execute(json!({"element": "Fire"})).await.unwrap();
        assert_eq!(out["meridians"].as_array().unwrap().len(), 4);
        let out = MeridiansByElementTool.execute(json!({"element": "Aether"})).await.unwrap();
        assert_eq!(out["status"], "not_found");
    }

    #[tokio::test]
    async fn test_list_all() {
        let out = MeridianListTool.execute(json!({})).await.unwrap();
        assert_eq!(out["count"], 12);
    }
}
