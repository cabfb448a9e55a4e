//! 用药安全工具：毒性查询、妊娠禁忌、剂量核对

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::herbs::search_herb;
use crate::tools::registry::{num_arg, str_arg};
use crate::tools::Tool;

struct Toxicity {
    herb: &'static str,
    level: &'static str,
    compounds: &'static [&'static str],
    max_dosage: &'static str,
    notes: &'static str,
}

static TOXIC_HERBS: &[Toxicity] = &[
    Toxicity {
        herb: "附子",
        level: "有毒 (Toxic)",
        compounds: &["Aconitine"],
        max_dosage: "3-15g (processed)",
        notes: "Must be processed (炮制). Raw aconite is extremely toxic.",
    },
    Toxicity {
        herb: "半夏",
        level: "有毒 (Toxic)",
        compounds: &["3,4-dihydroxybenzaldehyde"],
        max_dosage: "3-9g (processed)",
        notes: "Must use processed form (制半夏). Raw is irritating and toxic.",
    },
    Toxicity {
        herb: "马钱子",
        level: "大毒 (Very Toxic)",
        compounds: &["Strychnine", "Brucine"],
        max_dosage: "0.3-0.6g (processed)",
        notes: "Extremely narrow therapeutic window. External use preferred.",
    },
    Toxicity {
        herb: "雷公藤",
        level: "大毒 (Very Toxic)",
        compounds: &["Triptolide", "Celastrol"],
        max_dosage: "10-25g (root, decocted 2h+)",
        notes: "Hepatotoxic, nephrotoxic, gonadotoxic. Requires careful monitoring.",
    },
    Toxicity {
        herb: "细辛",
        level: "有毒 (Toxic)",
        compounds: &["Aristolochic acid (in root)"],
        max_dosage: "1-3g",
        notes: "Use above-ground parts only. Root contains aristolochic acid (carcinogenic).",
    },
];

static PREGNANCY_CONTRAINDICATED: &[&str] = &[
    "附子", "大黄", "芒硝", "巴豆", "牵牛子", "芫花", "大戟", "甘遂", "麝香", "三棱", "莪术", "水蛭",
    "虻虫", "马钱子", "雷公藤",
];

static PREGNANCY_CAUTION: &[&str] = &[
    "桃仁", "红花", "牛膝", "王不留行", "川芎", "丹参", "半夏", "薏苡仁", "肉桂", "枳实", "干姜",
];

pub struct ToxicityCheckTool;

#[async_trait]
impl Tool for ToxicityCheckTool {
    fn name(&self) -> &str {
        "safety.toxicity_check"
    }

    fn description(&self) -> &str {
        "Check if a herb has known toxicity. Returns toxicity level, toxic compounds, and safe dosage range."
    }

    fn category(&self) -> &str {
        "safety"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("herb_name", "Herb name (Chinese)")]
    }

    fn usage_guide(&self) -> &str {
        "When evaluating safety of a potentially toxic herb."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let herb = str_arg(&args, "herb_name")?.trim();
        Ok(match TOXIC_HERBS.iter().find(|t| t.herb == herb) {
            Some(t) => json!({
                "status": "toxic",
                "herb": herb,
                "toxicity": t.level,
                "toxic_compounds": t.compounds,
                "max_dosage": t.max_dosage,
                "notes": t.notes,
            }),
            None => json!({
                "status": "not_toxic",
                "herb": herb,
                "message": "No known toxicity in standard pharmacopoeia dosages.",
            }),
        })
    }
}

pub struct PregnancyCheckTool;

#[async_trait]
impl Tool for PregnancyCheckTool {
    fn name(&self) -> &str {
        "safety.pregnancy_check"
    }

    fn description(&self) -> &str {
        "Check if herbs are safe during pregnancy. Identifies contraindicated and cautionary herbs."
    }

    fn category(&self) -> &str {
        "safety"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("herbs", "Comma-separated list of herb names")]
    }

    fn usage_guide(&self) -> &str {
        "When checking formula safety for pregnant patients."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        // 引用上一步结果时可能拿到数组
        let herbs: Vec<String> = match args.get("herbs") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => str_arg(&args, "herbs")?
                .split([',', '，', '、'])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let mut contraindicated = Vec::new();
        let mut caution = Vec::new();
        let mut safe = Vec::new();
        for herb in herbs {
            if PREGNANCY_CONTRAINDICATED.contains(&herb.as_str()) {
                contraindicated.push(herb);
            } else if PREGNANCY_CAUTION.contains(&herb.as_str()) {
                caution.push(herb);
            } else {
                safe.push(herb);
            }
        }
        let status = if !contraindicated.is_empty() {
            "contraindicated"
        } else if !caution.is_empty() {
            "caution"
        } else {
            "safe"
        };
        Ok(json!({
            "status": status,
            "contraindicated": contraindicated,
            "caution": caution,
            "safe": safe,
        }))
    }
}

pub struct DosageValidateTool;

#[async_trait]
impl Tool for DosageValidateTool {
    fn name(&self) -> &str {
        "safety.dosage_validate"
    }

    fn description(&self) -> &str {
        "Validate if a herb dosage is within the recommended range."
    }

    fn category(&self) -> &str {
        "safety"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("herb_name", "Herb name"), ("dosage_g", "Dosage in grams")]
    }

    fn usage_guide(&self) -> &str {
        "When verifying prescription dosages."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let name = str_arg(&args, "herb_name")?;
        let dosage = num_arg(&args, "dosage_g")?
            .ok_or_else(|| "Missing required parameter 'dosage_g'".to_string())?;
        let Some(herb) = search_herb(name) else {
            return Ok(json!({
                "status": "unknown",
                "message": format!("Herb '{name}' not found for dosage validation."),
            }));
        };
        Ok(json!({
            "status": "info",
            "herb": herb.chinese,
            "requested_dosage": format!("{dosage}g"),
            "recommended_range": herb.dosage,
            "message": "Compare requested dosage against the recommended range. Adjust based on patient condition and formula context.",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_toxicity() {
        let out = ToxicityCheckTool.execute(json!({"herb_name": "附子"})).await.unwrap();
        assert_eq!(out["status"], "toxic");
        assert_eq!(out["toxic_compounds"][0], "Aconitine");
        let out = ToxicityCheckTool.execute(json!({"herb_name": "甘草"})).await.unwrap();
        assert_eq!(out["status"], "not_toxic");
    }

    #[tokio::test]
    async fn test_pregnancy_string_and_array() {
        let out = PregnancyCheckTool
            .execute(json!({"herbs": "附子, 红花,甘草"}))
            .await
            .unwrap();
        assert_eq!(out["status"], "contraindicated");
        assert_eq!(out["caution"], json!(["红花"]));
        assert_eq!(out["safe"], json!(["甘草"]));

        let out = PregnancyCheckTool
            .execute(json!({"herbs": ["川芎", "当归"]}))
            .await
            .unwrap();
        assert_eq!(out["status"], "caution");
    }

    #[tokio::test]
    async fn test_dosage_validate() {
        let out = DosageValidateTool
            .execute(json!({"herb_name": "Astragalus", "dosage_g": "30"}))
            .await
            .unwrap();
        assert_eq!(out["herb"], "黄芪");
        assert_eq!(out["recommended_range"], "9-30g");
        assert_eq!(out["requested_dosage"], "30g");

        let err = DosageValidateTool
            .execute(json!({"herb_name": "黄芪", "dosage_g": "a lot"}))
            .await
            .unwrap_err();
        assert!(err.contains("must be a number"));
    }
}
