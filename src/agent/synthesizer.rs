//! 综合器：把步骤结果整理成提示词，流式调用 LLM 生成最终回答
//!
//! 直接回答哨兵不再调用 LLM；失败步骤明确标注，要求模型在回答中说明局限。

use futures_util::{stream, StreamExt};

use crate::agent::plan::{Plan, StepResult};
use crate::agent::session::Session;
use crate::core::AgentError;
use crate::llm::{Message, TextStream};

pub const SYNTHESIS_TEMPERATURE: f32 = 0.2;

/// 单步输出进入提示词前的最大字符数
const MAX_OUTPUT_CHARS: usize = 3000;

const BASE_SYNTHESIS_SYSTEM: &str = "You are an expert Traditional Chinese Medicine (TCM) research assistant.
You are given a user's question and the results from executing a research plan.

Your task: synthesize these results into a clear, well-structured answer.

GUIDELINES:
1. Be specific and cite data from tool results.
2. Structure your response with clear headings when appropriate.
3. Include dosage information when relevant.
4. Note any safety concerns or contraindications.
5. If results are incomplete or a step failed, acknowledge limitations.
6. End with 2-3 suggested follow-up questions.
";

fn language_instructions(language: &str) -> &'static str {
    match language.to_lowercase().as_str() {
        "zh" => {
            "OUTPUT LANGUAGE:\n\
             - 仅用中文回答，不要包含英文。\n\
             - 标题与结构使用中文（例如：'## 关键信息'、'## 建议的下一步'）。\n\
             - 术语应包含中医术语并在必要时给出现代医学对照。\n"
        }
        "bi" => {
            "OUTPUT LANGUAGE:\n\
             - 提供中英双语内容。先中文段落，再对应的英文段落。\n\
             - 对每个主要标题使用并列标题，例如：'## 关键信息 | Key Findings'。\n\
             - 在要点层面尽量对齐中英文内容。\n"
        }
        _ => {
            "OUTPUT LANGUAGE:\n\
             - Answer in English only (no Chinese characters unless quoted from sources).\n\
             - Use English headings such as '## Key Findings' and '## Suggested Next Steps'.\n\
             - Include pinyin in parentheses when helpful (e.g., Ren Shen (ginseng)).\n"
        }
    }
}

pub fn synthesis_system(language: &str) -> String {
    format!("{BASE_SYNTHESIS_SYSTEM}\n{}", language_instructions(language))
}

/// 步骤结果 → Markdown；成功输出按 JSON 美化并截断
pub fn format_results(results: &[StepResult]) -> String {
    results
        .iter()
        .map(|r| {
            let header = format!("### Step {}: {}\n**Purpose:** {}\n", r.step, r.tool, r.purpose);
            if r.is_success() {
                let output = r
                    .output
                    .as_ref()
                    .and_then(|o| serde_json::to_string_pretty(o).ok())
                    .unwrap_or_else(|| "{}".to_string());
                let output = if output.chars().count() > MAX_OUTPUT_CHARS {
                    let head: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
                    format!("{head}\n... (truncated)")
                } else {
                    output
                };
                format!("{header}**Status:** ✓ Success\n```json\n{output}\n```\n")
            } else {
                let error = r.error.as_deref().unwrap_or("Unknown error");
                format!("{header}**Status:** ✗ Error: {error}\n")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_user_message(query: &str, plan: &Plan, results: &[StepResult]) -> String {
    let reasoning = if plan.reasoning.is_empty() {
        "N/A"
    } else {
        plan.reasoning.as_str()
    };
    format!(
        "**User Question:** {query}\n\n**Plan Reasoning:** {reasoning}\n\n**Tool Results:**\n{}\n\nPlease synthesize these results into a comprehensive answer.",
        format_results(results)
    )
}

fn direct_answer(results: &[StepResult]) -> Option<&str> {
    match results {
        [only] => only.direct_answer(),
        _ => None,
    }
}

/// 流式综合；直接回答时返回只含一段文本的流
pub async fn synthesize_stream(
    session: &Session,
    query: &str,
    plan: &Plan,
    results: &[StepResult],
) -> Result<TextStream, AgentError> {
    if let Some(answer) = direct_answer(results) {
        return Ok(Box::pin(stream::iter([Ok(answer.to_string())])));
    }

    let llm = session.get_llm()?;
    let stream = llm
        .stream(
            &synthesis_system(&session.config().ui.language),
            &[Message::user(build_user_message(query, plan, results))],
            SYNTHESIS_TEMPERATURE,
            session.config().synthesis_max_tokens(),
        )
        .await?;
    Ok(stream)
}

/// 消费完整个流并拼接
pub async fn synthesize(
    session: &Session,
    query: &str,
    plan: &Plan,
    results: &[StepResult],
) -> Result<String, AgentError> {
    let mut stream = synthesize_stream(session, query, plan, results).await?;
    let mut answer = String::new();
    while let Some(chunk) = stream.next().await {
        answer.push_str(&chunk?);
    }
    Ok(answer)
}
