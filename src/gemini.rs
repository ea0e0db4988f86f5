//! Client for the Gemini generateContent API.
//!
//! Three call kinds back the interview: a schema-validated follow-up
//! question for phases 2-5, the ten-item builder list at generation time,
//! and free-form continuation replies afterwards. All calls are single
//! attempt with no retry; the credential is resolved at call time.

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::KeyStore;
use crate::conversation::QuestionKind;

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const NOT_YET_DEFINED: &str = "아직 정의되지 않음";

/// Follow-up question as declared in the response schema. Three examples are
/// expected but not enforced.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FollowUpQuestion {
    pub question: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    keys: KeyStore,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(keys: KeyStore, model: Option<String>, api_base: Option<String>) -> Self {
        Self {
            client: Client::new(),
            keys,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate the follow-up question for one interview step, constrained
    /// to the declared JSON schema. Bold markers are stripped from every
    /// field before the result reaches the conversation.
    pub async fn follow_up_question(
        &self,
        kind: QuestionKind,
        answers: &[String],
    ) -> Result<FollowUpQuestion> {
        let raw = self
            .generate(&follow_up_prompt(kind, answers), Some(follow_up_schema()))
            .await?;
        let parsed: FollowUpQuestion = serde_json::from_str(raw.trim())
            .context("follow-up response did not match the declared schema")?;
        Ok(FollowUpQuestion {
            question: clean_markdown(&parsed.question),
            examples: parsed.examples.iter().map(|e| clean_markdown(e)).collect(),
            suggestion: clean_markdown(&parsed.suggestion),
        })
    }

    /// Generate the final builder list: a header line followed by ten
    /// numbered instructions.
    pub async fn builder_requests(&self, answers: &[String]) -> Result<String> {
        let raw = self.generate(&builder_prompt(answers), None).await?;
        Ok(clean_markdown(&raw))
    }

    /// Open-ended reply after generation. Bold markers are kept; the
    /// transcript renderer styles them.
    pub async fn continue_chat(&self, answers: &[String], message: &str) -> Result<String> {
        self.generate(&continuation_prompt(answers, message), None)
            .await
    }

    async fn generate(&self, prompt: &str, schema: Option<Value>) -> Result<String> {
        let key = self.keys.resolve().ok_or_else(|| {
            anyhow!("API Key가 설정되지 않았습니다. 설정 메뉴에서 API Key를 입력해주세요.")
        })?;
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base, self.model, key
        );

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: schema.map(|response_schema| GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
            }),
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini API error {}: {}", status, body));
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("Gemini response contained no text"))
    }
}

/// Remove `**` bold markers the model emits despite instructions.
pub fn clean_markdown(text: &str) -> String {
    text.replace("**", "")
}

fn follow_up_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "question": { "type": "STRING", "description": "사용자에게 할 질문" },
            "examples": {
                "type": "ARRAY",
                "description": "영감을 줄 수 있는 예시 3개",
                "items": { "type": "STRING" }
            },
            "suggestion": { "type": "STRING", "description": "사용자를 위한 답변 예시" }
        },
        "required": ["question", "examples", "suggestion"]
    })
}

fn answer(answers: &[String], index: usize) -> &str {
    answers.get(index).map(String::as_str).unwrap_or("")
}

fn follow_up_prompt(kind: QuestionKind, answers: &[String]) -> String {
    let idea = answer(answers, 0);
    let core_feature = answer(answers, 1);
    let vibe = answer(answers, 2);
    let target_audience = answer(answers, 3);

    match kind {
        QuestionKind::CoreFeature => format!(
            "사용자가 앱 아이디어를 구체화하도록 돕는 AI 챗봇입니다. 사용자는 방금 만들고 싶은 앱에 대해 다음과 같이 말했습니다: \"{idea}\"\n\n\
             이제 이 앱의 가장 핵심적인 기능에 대해 질문해야 합니다.\n\n\
             다음 지침에 따라 JSON 객체를 생성해주세요 (마크다운 형식은 제외):\n\
             - \"question\": 사용자에게 앱의 핵심 기능을 묻는 친절하고 명확한 질문입니다.\n\
             - \"examples\": 사용자의 아이디어(\"{idea}\")와 관련된 창의적인 핵심 기능 예시 3개입니다.\n\
             - \"suggestion\": 사용자가 어떻게 답변하면 좋을지 보여주는 구체적인 답변 예시입니다. 이 예시는 사용자의 아이디어(\"{idea}\")에 맞춰져야 합니다."
        ),
        QuestionKind::Vibe => format!(
            "사용자가 앱 아이디어를 구체화하도록 돕는 AI 챗봇입니다. 사용자의 아이디어는 다음과 같습니다:\n\
             - 앱 종류: \"{idea}\"\n\
             - 핵심 기능: \"{core_feature}\"\n\n\
             이제 이 앱의 전반적인 '분위기' 또는 '바이브'에 대해 질문해야 합니다.\n\n\
             다음 지침에 따라 JSON 객체를 생성해주세요 (마크다운 형식은 제외):\n\
             - \"question\": 사용자에게 앱의 분위기에 대해 묻는 친절하고 감성적인 질문입니다.\n\
             - \"examples\": 사용자의 아이디어(\"{idea}\")와 관련된 창의적인 분위기 예시 3개입니다.\n\
             - \"suggestion\": 사용자가 어떻게 답변하면 좋을지 보여주는 구체적인 답변 예시입니다. 이 예시는 사용자의 아이디어(\"{idea}\")에 맞춰져야 합니다."
        ),
        QuestionKind::TargetAudience => format!(
            "사용자가 앱 아이디어를 구체화하도록 돕는 AI 챗봇입니다. 사용자의 아이디어는 다음과 같습니다:\n\
             - 앱 종류: \"{idea}\"\n\
             - 핵심 기능: \"{core_feature}\"\n\
             - 앱 분위기: \"{vibe}\"\n\n\
             이제 이 앱의 '주요 타겟 사용자'는 누구인지 질문해야 합니다.\n\n\
             다음 지침에 따라 JSON 객체를 생성해주세요 (마크다운 형식은 제외):\n\
             - \"question\": 사용자에게 앱의 타겟 사용자에 대해 묻는 명확한 질문입니다.\n\
             - \"examples\": 사용자의 아이디어(\"{idea}\")를 사용할 만한 다양한 사용자 그룹 예시 3개입니다.\n\
             - \"suggestion\": 사용자가 어떻게 답변하면 좋을지 보여주는 구체적인 답변 예시입니다."
        ),
        QuestionKind::Goal => format!(
            "사용자가 앱 아이디어를 구체화하도록 돕는 AI 챗봇입니다. 사용자의 아이디어는 다음과 같습니다:\n\
             - 앱 종류: \"{idea}\"\n\
             - 핵심 기능: \"{core_feature}\"\n\
             - 앱 분위기: \"{vibe}\"\n\
             - 타겟 사용자: \"{target_audience}\"\n\n\
             이제 이 앱을 통해 사용자가 달성하길 바라는 '최종 목표'는 무엇인지 질문해야 합니다.\n\n\
             다음 지침에 따라 JSON 객체를 생성해주세요 (마크다운 형식은 제외):\n\
             - \"question\": 사용자에게 앱의 궁극적인 목표에 대해 묻는 질문입니다.\n\
             - \"examples\": 사용자의 아이디어(\"{idea}\")를 통해 사용자가 얻을 수 있는 가치나 경험에 대한 예시 3개입니다.\n\
             - \"suggestion\": 사용자가 어떻게 답변하면 좋을지 보여주는 구체적인 답변 예시입니다."
        ),
    }
}

fn builder_prompt(answers: &[String]) -> String {
    let idea = answer(answers, 0);
    let core_feature = answer(answers, 1);
    let vibe = answer(answers, 2);
    let target_audience = answer(answers, 3);
    let goal = answer(answers, 4);

    format!(
        "당신은 사용자의 앱 아이디어를 구체화하여 '바이브코딩 빌더'가 사용할 수 있는 개발 지시사항을 생성하는 AI 어시스턴트입니다.\n\n\
         다음은 사용자와의 대화 요약입니다:\n\
         - 앱 종류: {idea}\n\
         - 핵심 기능: {core_feature}\n\
         - 앱 분위기: {vibe}\n\
         - 타겟 사용자: {target_audience}\n\
         - 최종 목표: {goal}\n\n\
         이 내용을 바탕으로, 실제 개발 초기 단계에 사용할 수 있는 구체적이고 실행 가능한 지시사항 10개를 한국어로, 번호가 매겨진 목록 형식으로 생성해주세요.\n\n\
         매우 중요한 규칙:\n\
         1. 첫 번째 지시사항은 사용자와의 대화 내용 전체를 요약하여 앱의 핵심 정체성을 담은, 구체적이고 명확한 앱 제작 요청이어야 합니다. 예를 들어, 단순히 '{idea}' 앱을 만들어달라고 하는 대신, '{target_audience}를 위한 {vibe} 분위기의, {core_feature} 기능이 있는 {idea} 앱을 만들어줘' 와 같이 종합적인 내용을 담아주세요.\n\
         2. 이후 9개의 지시사항은 첫 번째 요청을 바탕으로 점진적으로 기능을 추가하고 구체화하는 순서로 작성되어야 합니다. (예: 기본 UI 생성 -> 핵심 기능 구현 -> 세부 디자인 추가 -> 데이터베이스 설정 등)\n\
         3. 각 요청은 '...을 만들어줘', '...을 디자인해줘'와 같이 개발자가 실행할 수 있는 명확한 한국어 지시사항이어야 합니다.\n\
         4. 결과물은 UI/UX 디자인, 핵심 로직, 데이터 관리 등 개발의 여러 측면을 균형 있게 포함해야 합니다.\n\n\
         최종 결과물은 \"좋습니다! 대화 내용을 바탕으로 실제 개발에 필요한 '초기 요청 10가지'를 생성했습니다.\" 라는 문장으로 시작해야 하며, 그 뒤에 번호 목록이 와야 합니다.\n\
         결과에서 마크다운 형식(**)은 절대 사용하지 마세요."
    )
}

fn continuation_prompt(answers: &[String], message: &str) -> String {
    let field = |index: usize| {
        let value = answer(answers, index);
        if value.is_empty() {
            NOT_YET_DEFINED
        } else {
            value
        }
    };

    format!(
        "당신은 사용자의 앱 아이디어 구체화를 돕는 AI 어시스턴트입니다.\n\
         이미 사용자와의 대화를 통해 아래와 같은 아이디어를 정리했고, 10가지 개발 요청사항도 생성해서 전달했습니다.\n\n\
         - 앱 종류: {}\n\
         - 핵심 기능: {}\n\
         - 앱 분위기: {}\n\
         - 타겟 사용자: {}\n\
         - 최종 목표: {}\n\n\
         이제 사용자가 대화를 계속 이어나가고 있습니다. 다음은 사용자의 새로운 메시지입니다:\n\
         \"{message}\"\n\n\
         이 메시지에 대해 친절하고 유용하게 답변해주세요. 사용자가 기존 아이디어를 수정하고 싶어하는지, 아니면 그냥 대화를 나누고 싶은지 파악하고 그에 맞게 응답하세요. 답변의 핵심 키워드나 중요한 부분은 **굵은 글씨**로 강조하고, 가독성을 위해 필요하다면 문단을 나눠주세요. 답변은 반드시 한국어로 해주세요.",
        field(0),
        field(1),
        field(2),
        field(3),
        field(4),
    )
}

// Gemini wire types

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> Vec<String> {
        ["감정 일기 앱", "이모티콘 기록", "따뜻함", "20대 직장인", "꾸준한 기록 습관"]
            .map(String::from)
            .to_vec()
    }

    #[test]
    fn clean_markdown_strips_bold_markers() {
        assert_eq!(clean_markdown("**중요** 내용"), "중요 내용");
        assert_eq!(clean_markdown("그대로"), "그대로");
    }

    #[test]
    fn follow_up_question_deserializes_from_schema_shape() {
        let raw = r#"{
            "question": "핵심 기능은 무엇인가요?",
            "examples": ["감정 그래프", "회고 알림", "공유 카드"],
            "suggestion": "이모티콘으로 하루를 기록하고 싶어요"
        }"#;
        let parsed: FollowUpQuestion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.examples.len(), 3);
        assert!(!parsed.suggestion.is_empty());
    }

    #[test]
    fn missing_optional_fields_default_to_empty() {
        let parsed: FollowUpQuestion =
            serde_json::from_str(r#"{"question": "질문만"}"#).unwrap();
        assert!(parsed.examples.is_empty());
        assert!(parsed.suggestion.is_empty());
    }

    #[test]
    fn candidate_text_extraction_handles_empty_response() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert!(parsed.candidates.is_empty());

        let parsed: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "답변"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, "답변");
    }

    #[test]
    fn prompts_carry_the_collected_answers() {
        let answers = answers();
        let prompt = follow_up_prompt(QuestionKind::Goal, &answers);
        for value in &answers[..4] {
            assert!(prompt.contains(value.as_str()));
        }

        let prompt = builder_prompt(&answers);
        for value in &answers {
            assert!(prompt.contains(value.as_str()));
        }

        let prompt = continuation_prompt(&answers, "파란색으로 바꿔줘");
        assert!(prompt.contains("파란색으로 바꿔줘"));
        assert!(prompt.contains("꾸준한 기록 습관"));
    }

    #[test]
    fn continuation_prompt_marks_missing_answers() {
        let prompt = continuation_prompt(&[], "안녕하세요");
        assert!(prompt.contains(NOT_YET_DEFINED));
    }

    #[test]
    fn follow_up_schema_declares_all_fields() {
        let schema = follow_up_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert_eq!(schema["properties"]["examples"]["type"], "ARRAY");
    }
}
