//! 中药查询工具：按中文名 / 拼音 / 英文名 / 拉丁名查找性味归经、功效与用量
//!
//! 内置一个离线小型药典子集；未命中返回 `status: not_found`，不视为工具失败。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::tools::registry::str_arg;
use crate::tools::Tool;

#[derive(Debug, Serialize)]
pub struct Herb {
    #[serde(rename = "chinese_name")]
    pub chinese: &'static str,
    pub pinyin: &'static str,
    pub latin: &'static str,
    pub english: &'static str,
    pub nature: &'static str,
    pub flavor: &'static str,
    pub meridians: &'static [&'static str],
    pub category: &'static str,
    pub functions: &'static [&'static str],
    pub dosage: &'static str,
    pub contraindications: &'static str,
    pub key_compounds: &'static [&'static str],
}

pub static HERBS: &[Herb] = &[
    Herb {
        chinese: "人参",
        pinyin: "Rén Shēn",
        latin: "Radix et Rhizoma Ginseng",
        english: "Ginseng",
        nature: "微温 (Slightly Warm)",
        flavor: "甘、微苦 (Sweet, Slightly Bitter)",
        meridians: &["脾 (Spleen)", "肺 (Lung)", "心 (Heart)", "肾 (Kidney)"],
        category: "补气药 (Qi-Tonifying)",
        functions: &[
            "大补元气 (Greatly tonifies original Qi)",
            "复脉固脱 (Restores pulse and prevents collapse)",
            "补脾益肺 (Tonifies Spleen and benefits Lung)",
            "生津养血 (Generates fluids and nourishes Blood)",
            "安神益智 (Calms spirit and benefits intelligence)",
        ],
        dosage: "3-9g; 15-30g for rescue from collapse",
        contraindications: "Not for excess heat or Qi stagnation. Incompatible with 藜芦 (Veratrum).",
        key_compounds: &["Ginsenoside Rg1", "Ginsenoside Rb1", "Ginsenoside Re"],
    },
    Herb {
        chinese: "黄芪",
        pinyin: "Huáng Qí",
        latin: "Radix Astragali",
        english: "Astragalus",
        nature: "微温 (Slightly Warm)",
        flavor: "甘 (Sweet)",
        meridians: &["脾 (Spleen)", "肺 (Lung)"],
        category: "补气药 (Qi-Tonifying)",
        functions: &[
            "补气升阳 (Tonifies Qi and raises Yang)",
            "固表止汗 (Consolidates exterior and stops sweating)",
            "利水消肿 (Promotes urination and reduces edema)",
            "生津养血 (Generates fluids and nourishes Blood)",
            "托毒排脓 (Expels toxins and drains pus)",
        ],
        dosage: "9-30g",
        contraindications: "Not for excess exterior or Qi stagnation with food retention.",
        key_compounds: &["Astragaloside IV", "Cycloastragenol", "Calycosin"],
    },
    Herb {
        chinese: "当归",
        pinyin: "Dāng Guī",
        latin: "Radix Angelicae Sinensis",
        english: "Chinese Angelica",
        nature: "温 (Warm)",
        flavor: "甘、辛 (Sweet, Acrid)",
        meridians: &["肝 (Liver)", "心 (Heart)", "脾 (Spleen)"],
        category: "补血药 (Blood-Tonifying)",
        functions: &[
            "补血活血 (Tonifies and activates Blood)",
            "调经止痛 (Regulates menstruation and relieves pain)",
            "润肠通便 (Moistens intestines and unblocks bowels)",
        ],
        dosage: "6-12g",
        contraindications: "Not for diarrhea due to dampness or abdominal fullness.",
        key_compounds: &["Ligustilide", "Ferulic acid", "Angelica polysaccharides"],
    },
    Herb {
        chinese: "甘草",
        pinyin: "Gān Cǎo",
        latin: "Radix et Rhizoma Glycyrrhizae",
        english: "Licorice",
        nature: "平 (Neutral)",
        flavor: "甘 (Sweet)",
        meridians: &["心 (Heart)", "肺 (Lung)", "脾 (Spleen)", "胃 (Stomach)"],
        category: "补气药 (Qi-Tonifying)",
        functions: &[
            "补脾益气 (Tonifies Spleen and benefits Qi)",
            "清热解毒 (Clears heat and resolves toxins)",
            "祛痰止咳 (Expels phlegm and stops coughing)",
            "缓急止痛 (Relaxes urgency and relieves pain)",
            "调和诸药 (Harmonizes other herbs)",
        ],
        dosage: "2-10g",
        contraindications: "Prolonged high-dose use may cause edema and hypertension.",
        key_compounds: &["Glycyrrhizin", "Liquiritin", "Isoliquiritigenin"],
    },
    Herb {
        chinese: "黄连",
        pinyin: "Huáng Lián",
        latin: "Rhizoma Coptidis",
        english: "Coptis",
        nature: "寒 (Cold)",
        flavor: "苦 (Bitter)",
        meridians: &[
            "心 (Heart)",
            "脾 (Spleen)",
            "胃 (Stomach)",
            "肝 (Liver)",
            "胆 (Gallbladder)",
            "大肠 (Large Intestine)",
        ],
        category: "清热燥湿药 (Heat-Clearing, Dampness-Drying)",
        functions: &[
            "清热燥湿 (Clears heat and dries dampness)",
            "泻火解毒 (Drains fire and resolves toxins)",
        ],
        dosage: "2-5g",
        contraindications: "Not for Spleen and Stomach deficiency cold.",
        key_compounds: &["Berberine", "Coptisine", "Palmatine"],
    },
    Herb {
        chinese: "柴胡",
        pinyin: "Chái Hú",
        latin: "Radix Bupleuri",
        english: "Bupleurum",
        nature: "微寒 (Slightly Cold)",
        flavor: "辛、苦 (Acrid, Bitter)",
        meridians: &["肝 (Liver)", "胆 (Gallbladder)", "肺 (Lung)"],
        category: "解表药 (Exterior-Releasing)",
        functions: &[
            "和解表里 (Harmonizes exterior and interior)",
            "疏肝升阳 (Courses Liver and raises Yang)",
            "退热 (Reduces fever)",
        ],
        dosage: "3-10g",
        contraindications: "Not for Liver-Wind-moving or Yin deficiency with fire.",
        key_compounds: &["Saikosaponin A", "Saikosaponin D", "Bupleurumol"],
    },
    Herb {
        chinese: "白术",
        pinyin: "Bái Zhú",
        latin: "Rhizoma Atractylodis Macrocephalae",
        english: "White Atractylodes",
        nature: "温 (Warm)",
        flavor: "甘、苦 (Sweet, Bitter)",
        meridians: &["脾 (Spleen)", "胃 (Stomach)"],
        category: "补气药 (Qi-Tonifying)",
        functions: &[
            "健脾益气 (Strengthens Spleen and benefits Qi)",
            "燥湿利水 (Dries dampness and promotes urination)",
            "止汗 (Stops sweating)",
            "安胎 (Calms fetus)",
        ],
        dosage: "6-12g",
        contraindications: "Not for Yin deficiency with internal heat.",
        key_compounds: &["Atractylenolide I", "Atractylenolide III", "Atractylone"],
    },
    Herb {
        chinese: "茯苓",
        pinyin: "Fú Líng",
        latin: "Poria",
        english: "Poria",
        nature: "平 (Neutral)",
        flavor: "甘、淡 (Sweet, Bland)",
        meridians: &["心 (Heart)", "肺 (Lung)", "脾 (Spleen)", "肾 (Kidney)"],
        category: "利水渗湿药 (Dampness-Draining)",
        functions: &[
            "利水渗湿 (Promotes urination and drains dampness)",
            "健脾 (Strengthens Spleen)",
            "宁心安神 (Calms heart and tranquilizes spirit)",
        ],
        dosage: "10-15g",
        contraindications: "Not for frequent urination due to deficiency cold.",
        key_compounds: &["Pachymic acid", "Poricoic acid", "Beta-pachyman"],
    },
];

/// 名称完全匹配（中文 / 拼音 / 英文，大小写不敏感）或拉丁名包含
pub fn search_herb(query: &str) -> Option<&'static Herb> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return None;
    }
    HERBS.iter().find(|h| {
        q == h.chinese.to_lowercase()
            || q == h.pinyin.to_lowercase()
            || q == h.english.to_lowercase()
            || h.latin.to_lowercase().contains(&q)
    })
}

pub struct HerbLookupTool;

#[async_trait]
impl Tool for HerbLookupTool {
    fn name(&self) -> &str {
        "herbs.lookup"
    }

    fn description(&self) -> &str {
        "Look up a Chinese herb by name (Chinese, pinyin, English, or Latin). Returns properties, functions, dosage, and key compounds."
    }

    fn category(&self) -> &str {
        "herbs"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("query", "Herb name to search for")]
    }

    fn usage_guide(&self) -> &str {
        "When user asks about a specific herb's properties, dosage, or classification."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = str_arg(&args, "query")?;
        Ok(match search_herb(query) {
            Some(herb) => json!({ "status": "found", "herb": herb }),
            None => json!({
                "status": "not_found",
                "message": format!("Herb '{query}' not found in local database."),
            }),
        })
    }
}

pub struct HerbsByCategoryTool;

#[async_trait]
impl Tool for HerbsByCategoryTool {
    fn name(&self) -> &str {
        "herbs.by_category"
    }

    fn description(&self) -> &str {
        "List herbs in a specific therapeutic category (e.g., 补气药, 清热药, 活血化瘀药)."
    }

    fn category(&self) -> &str {
        "herbs"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("category", "Therapeutic category name (Chinese or English)")]
    }

    fn usage_guide(&self) -> &str {
        "When looking for herbs within a specific therapeutic group."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let category = str_arg(&args, "category")?;
        let needle = category.trim().to_lowercase();
        let matches: Vec<Value> = HERBS
            .iter()
            .filter(|h| h.category.to_lowercase().contains(&needle))
            .map(|h| {
                json!({
                    "chinese_name": h.chinese,
                    "pinyin": h.pinyin,
                    "english": h.english,
                    "category": h.category,
                })
            })
            .collect();
        if matches.is_empty() {
            return Ok(json!({
                "status": "not_found",
                "message": format!("No herbs found in category '{category}'."),
            }));
        }
        Ok(json!({ "status": "found", "count": matches.len(), "herbs": matches }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_by_any_name() {
        assert_eq!(search_herb("人参").unwrap().english, "Ginseng");
        assert_eq!(search_herb("huáng qí").unwrap().chinese, "黄芪");
        assert_eq!(search_herb("Licorice").unwrap().chinese, "甘草");
        assert_eq!(search_herb("bupleuri").unwrap().chinese, "柴胡");
        assert!(search_herb("").is_none());
        assert!(search_herb("unicorn horn").is_none());
    }

    #[tokio::test]
    async fn test_lookup_tool() {
        let out = HerbLookupTool.execute(json!({"query": "Astragalus"})).await.unwrap();
        assert_eq!(out["status"], "found");
        assert_eq!(out["herb"]["chinese_name"], "黄芪");
        assert_eq!(out["herb"]["dosage"], "9-30g");

        let out = HerbLookupTool.execute(json!({"query": "龙骨"})).await.unwrap();
        assert_eq!(out["status"], "not_found");

        assert!(HerbLookupTool.execute(json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_by_category() {
        let out = HerbsByCategoryTool
            .execute(json!({"category": "Qi-Tonifying"}))
            .await
            .unwrap();
        assert_eq!(out["count"], 4);
    }
}
