//! 文献工具：通过 NCBI E-utilities（esearch + esummary）检索 PubMed
//!
//! 网络或上游错误以 Err 返回，由执行器重试并计入工具健康度。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::tools::registry::{num_arg, str_arg};
use crate::tools::Tool;

pub const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const MAX_RESULTS_CAP: u64 = 20;

/// PubMed 客户端；两个文献工具共用
#[derive(Clone)]
pub struct PubMed {
    client: Client,
    base_url: String,
}

impl PubMed {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("tcm/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, String> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(describe_send_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("PubMed search failed: HTTP {}", status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("PubMed search failed: invalid response: {e}"))
    }

    pub async fn search(&self, query: &str, max_results: u64) -> Result<Value, String> {
        let retmax = max_results.clamp(1, MAX_RESULTS_CAP);
        let search = self
            .get_json(
                "esearch.fcgi",
                &[
                    ("db", "pubmed".into()),
                    ("term", query.to_string()),
                    ("retmax", retmax.to_string()),
                    ("retmode", "json".into()),
                ],
            )
            .await?;
        let ids: Vec<String> = search["esearchresult"]["idlist"]
            .as_array()
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(json!({
                "status": "no_results",
                "query": query,
                "message": "No PubMed articles found.",
            }));
        }

        let summary = self
            .get_json(
                "esummary.fcgi",
                &[
                    ("db", "pubmed".into()),
                    ("id", ids.join(",")),
                    ("retmode", "json".into()),
                ],
            )
            .await?;
        let articles = articles_from_summary(&ids, &summary["result"]);
        Ok(json!({
            "status": "found",
            "query": query,
            "count": articles.len(),
            "articles": articles,
        }))
    }
}

/// 超时与连接失败带上可被健康度识别的关键词
fn describe_send_error(e: reqwest::Error) -> String {
    if e.is_timeout() {
        format!("PubMed search failed: timeout: {e}")
    } else if e.is_connect() {
        format!("PubMed search failed: connection error: {e}")
    } else {
        format!("PubMed search failed: {e}")
    }
}

fn articles_from_summary(ids: &[String], result: &Value) -> Vec<Value> {
    ids.iter()
        .filter_map(|pmid| {
            let article = result.get(pmid)?;
            if !article.is_object() {
                return None;
            }
            let authors = article["authors"]
                .as_array()
                .map(|a| {
                    a.iter()
                        .take(3)
                        .filter_map(|x| x["name"].as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default();
            Some(json!({
                "pmid": pmid,
                "title": article["title"].as_str().unwrap_or_default(),
                "authors": authors,
                "journal": article["fulljournalname"].as_str().unwrap_or_default(),
                "pub_date": article["pubdate"].as_str().unwrap_or_default(),
                "url": format!("https://pubmed.ncbi.nlm.nih.gov/{pmid}/"),
            }))
        })
        .collect()
}

pub struct PubMedSearchTool {
    pubmed: PubMed,
}

impl PubMedSearchTool {
    pub fn new(pubmed: PubMed) -> Self {
        Self { pubmed }
    }
}

#[async_trait]
impl Tool for PubMedSearchTool {
    fn name(&self) -> &str {
        "literature.pubmed_search"
    }

    fn description(&self) -> &str {
        "Search PubMed for research articles on TCM topics. Returns titles, authors, journals, and PMIDs."
    }

    fn category(&self) -> &str {
        "literature"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("query", "Search query"), ("max_results", "Maximum results (default 5)")]
    }

    fn usage_guide(&self) -> &str {
        "When searching for published research evidence on TCM herbs, formulas, or compounds."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let query = str_arg(&args, "query")?;
        let max_results = num_arg(&args, "max_results")?.map_or(5, |n| n.max(1.0) as u64);
        self.pubmed.search(query, max_results).await
    }
}

pub struct SystematicReviewTool {
    pubmed: PubMed,
}

impl SystematicReviewTool {
    pub fn new(pubmed: PubMed) -> Self {
        Self { pubmed }
    }
}

pub fn systematic_review_query(topic: &str) -> String {
    format!(
        "({topic}) AND (systematic review[pt] OR meta-analysis[pt]) AND (traditional Chinese medicine OR herbal medicine)"
    )
}

#[async_trait]
impl Tool for SystematicReviewTool {
    fn name(&self) -> &str {
        "literature.systematic_review"
    }

    fn description(&self) -> &str {
        "Find systematic reviews and meta-analyses for a TCM topic on PubMed."
    }

    fn category(&self) -> &str {
        "literature"
    }

    fn parameters(&self) -> &[(&'static str, &'static str)] {
        &[("topic", "Research topic")]
    }

    fn usage_guide(&self) -> &str {
        "When looking for high-level evidence summaries."
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let topic = str_arg(&args, "topic")?;
        self.pubmed.search(&systematic_review_query(topic), 10).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_articles_from_summary() {
        let ids = vec!["111".to_string(), "222".to_string()];
        let result = json!({
            "uids": ["111", "222"],
            "111": {
                "title": "Astragaloside IV in heart failure",
                "authors": [{"name": "Li X"}, {"name": "Wang Y"}, {"name": "Zhang Z"}, {"name": "Chen Q"}],
                "fulljournalname": "Phytomedicine",
                "pubdate": "2023 Jan"
            }
        });
        let articles = articles_from_summary(&ids, &result);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0]["authors"], "Li X, Wang Y, Zhang Z");
        assert_eq!(articles[0]["url"], "https://pubmed.ncbi.nlm.nih.gov/111/");
    }

    #[test]
    fn test_review_query() {
        let q = systematic_review_query("黄芪 heart failure");
        assert!(q.starts_with("(黄芪 heart failure) AND (systematic review[pt]"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let tool = PubMedSearchTool::new(PubMed::new("http://127.0.0.1:9", Duration::from_secs(2)));
        let err = tool.execute(json!({"query": "ginseng"})).await.unwrap_err();
        assert!(err.starts_with("PubMed search failed"));
        assert!(crate::agent::is_transient_tool_error(&err));
    }
}
