//! Phase-driven conversation controller
//!
//! The guided interview is a linear funnel: five question phases, a yes/no
//! confirmation, one generation step, then open-ended chat. Transitions
//! mutate only owned state and hand any required I/O back to the caller as
//! [`Command`] values, so the whole machine is testable without a network.

use std::time::Duration;

use crate::gemini::FollowUpQuestion;

/// Cosmetic pacing before a follow-up question call is issued.
pub const PACING_DELAY: Duration = Duration::from_millis(500);

/// Tokens that count as a "yes" at the confirmation step (substring match
/// against the lowercased input).
const AFFIRMATIVE: &[&str] = &["네", "좋아요", "생성해줘", "ㅇ", "yes", "y", "예"];

const OPENING_QUESTION: &str =
    "어떤 종류의 앱을 만들고 싶으신가요?\n떠오르는 아이디어를 자유롭게 이야기해주세요.";
const OPENING_EXAMPLES_HEADER: &str = "참고로 이런 아이디어는 어떠세요?";
const OPENING_EXAMPLES: [&str; 3] = [
    "요즘 유행하는 챌린지를 친구들과 함께 기록하고 공유하는 소셜 앱",
    "매일의 기분과 생각을 간단한 이모티콘으로 기록하는 감정 일기 앱",
    "내가 읽은 책들을 등록하고, 인상 깊은 구절을 저장하는 북 아카이브 앱",
];

const CONFIRM_PROMPT: &str = "충분히 아이디어가 구체화된 것 같아요!\n이제 이 내용을 바탕으로 실제 개발에 필요한 '빌더 요청' 10가지를 생성해 드릴까요?\n\"네\" 또는 \"아니요\"로 답해주세요.";
const GENERATING_NOTICE: &str =
    "좋습니다! 대화 내용을 바탕으로 최종 결과를 생성하고 있어요. 잠시만 기다려주세요...";
const GENERATION_DONE: &str = "결과 생성이 완료되었습니다. 오른쪽 패널에서 확인해주세요! 추가적으로 궁금한 점이나 수정하고 싶은 부분이 있다면 계속 대화해주세요.";
const DECLINE_ACK: &str = "알겠습니다. 준비가 되시면 다시 요청해주세요.";

const APOLOGY_FOLLOW_UP: &str =
    "죄송합니다. 응답을 처리하는 중 오류가 발생했습니다. 다시 시도해주세요.";
const APOLOGY_BUILDER: &str =
    "죄송합니다. 빌더 요청을 생성하는 데 실패했습니다. 설정에서 API Key를 확인해주세요.";
const APOLOGY_CHAT: &str = "죄송합니다, 답변을 생성하는 중 오류가 발생했습니다.";

/// Discrete step of the guided interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    AskIdea,
    AskFeature,
    AskVibe,
    AskAudience,
    AskGoal,
    ConfirmGenerate,
    Generating,
    PostChat,
}

impl Phase {
    fn next(self) -> Phase {
        match self {
            Phase::Init => Phase::AskIdea,
            Phase::AskIdea => Phase::AskFeature,
            Phase::AskFeature => Phase::AskVibe,
            Phase::AskVibe => Phase::AskAudience,
            Phase::AskAudience => Phase::AskGoal,
            Phase::AskGoal => Phase::ConfirmGenerate,
            Phase::ConfirmGenerate => Phase::Generating,
            Phase::Generating | Phase::PostChat => Phase::PostChat,
        }
    }

    fn question_kind(self) -> Option<QuestionKind> {
        match self {
            Phase::AskFeature => Some(QuestionKind::CoreFeature),
            Phase::AskVibe => Some(QuestionKind::Vibe),
            Phase::AskAudience => Some(QuestionKind::TargetAudience),
            Phase::AskGoal => Some(QuestionKind::Goal),
            _ => None,
        }
    }
}

/// Which follow-up question the model is asked to produce (phases 2-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    CoreFeature,
    Vibe,
    TargetAudience,
    Goal,
}

impl QuestionKind {
    /// Short bot line shown before the generated question arrives.
    fn transition_line(self) -> &'static str {
        match self {
            QuestionKind::CoreFeature => "좋은 아이디어네요!",
            QuestionKind::Vibe => "알겠습니다. 그렇다면,",
            QuestionKind::TargetAudience => "흥미롭네요! 다음으로,",
            QuestionKind::Goal => "거의 다 왔습니다!",
        }
    }

    fn examples_header(self) -> &'static str {
        match self {
            QuestionKind::CoreFeature => "예를 들면 이런 것들이 있을 수 있겠네요.",
            QuestionKind::Vibe => "이런 분위기를 생각해 볼 수 있어요.",
            QuestionKind::TargetAudience => "예를 들어 이런 사용자는 어떨까요?",
            QuestionKind::Goal => "이런 목표를 생각해 볼 수 있겠네요.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

/// A generated (or scripted) question with inspiration examples and an
/// optional suggested answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionCard {
    pub question: String,
    pub examples_header: String,
    pub examples: Vec<String>,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Question(QuestionCard),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub sender: Sender,
    pub payload: Payload,
}

/// External call requested by a transition. The caller performs the I/O and
/// feeds the outcome back through the matching `apply_*` method, passing the
/// epoch captured here so results from before a restart are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    FollowUp {
        kind: QuestionKind,
        answers: Vec<String>,
        epoch: u64,
    },
    BuilderList {
        answers: Vec<String>,
        epoch: u64,
    },
    Continuation {
        answers: Vec<String>,
        text: String,
        epoch: u64,
    },
}

pub struct Conversation {
    phase: Phase,
    answers: Vec<String>,
    transcript: Vec<Message>,
    builder_result: String,
    busy: bool,
    epoch: u64,
    next_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        let mut conversation = Self {
            phase: Phase::Init,
            answers: Vec::new(),
            transcript: Vec::new(),
            builder_result: String::new(),
            busy: false,
            epoch: 0,
            next_id: 0,
        };
        conversation.begin();
        conversation
    }

    /// Clear the session and rerun the Init -> AskIdea cascade. Does not
    /// abort an in-flight call; bumping the epoch makes its eventual result
    /// a no-op.
    pub fn restart(&mut self) {
        self.transcript.clear();
        self.answers.clear();
        self.builder_result.clear();
        self.busy = false;
        self.epoch += 1;
        self.next_id = 0;
        self.phase = Phase::Init;
        self.begin();
    }

    // Init exists only so first load and restart share one code path.
    fn begin(&mut self) {
        self.phase = Phase::Init.next();
        self.push_bot(Payload::Question(QuestionCard {
            question: OPENING_QUESTION.to_string(),
            examples_header: OPENING_EXAMPLES_HEADER.to_string(),
            examples: OPENING_EXAMPLES.iter().map(|s| s.to_string()).collect(),
            suggestion: String::new(),
        }));
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn busy(&self) -> bool {
        self.busy
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn builder_result(&self) -> &str {
        &self.builder_result
    }

    /// Process a submitted line of user input. The input surface must not
    /// call this while [`busy`](Self::busy) is true.
    pub fn submit(&mut self, text: &str) -> Option<Command> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        self.push_user(text.to_string());

        match self.phase {
            Phase::Init => None,
            Phase::AskIdea
            | Phase::AskFeature
            | Phase::AskVibe
            | Phase::AskAudience
            | Phase::AskGoal => {
                self.answers.push(text.to_string());
                self.advance()
            }
            Phase::ConfirmGenerate => {
                let lowered = text.to_lowercase();
                if AFFIRMATIVE.iter().any(|token| lowered.contains(token)) {
                    self.advance()
                } else {
                    self.push_bot_text(DECLINE_ACK);
                    self.phase = Phase::PostChat;
                    None
                }
            }
            Phase::Generating | Phase::PostChat => {
                self.busy = true;
                Some(Command::Continuation {
                    answers: self.answers.clone(),
                    text: text.to_string(),
                    epoch: self.epoch,
                })
            }
        }
    }

    fn advance(&mut self) -> Option<Command> {
        self.phase = self.phase.next();
        self.enter()
    }

    /// Entry action for the phase just entered.
    fn enter(&mut self) -> Option<Command> {
        if let Some(kind) = self.phase.question_kind() {
            self.push_bot_text(kind.transition_line());
            self.busy = true;
            return Some(Command::FollowUp {
                kind,
                answers: self.answers.clone(),
                epoch: self.epoch,
            });
        }
        match self.phase {
            Phase::ConfirmGenerate => {
                self.push_bot_text(CONFIRM_PROMPT);
                None
            }
            Phase::Generating => {
                self.push_bot_text(GENERATING_NOTICE);
                self.busy = true;
                Some(Command::BuilderList {
                    answers: self.answers.clone(),
                    epoch: self.epoch,
                })
            }
            _ => None,
        }
    }

    /// Outcome of a [`Command::FollowUp`] call. A failure leaves the phase
    /// where it was so the user can answer again.
    pub fn apply_follow_up(
        &mut self,
        epoch: u64,
        kind: QuestionKind,
        result: anyhow::Result<FollowUpQuestion>,
    ) {
        if epoch != self.epoch {
            return;
        }
        self.busy = false;
        match result {
            Ok(generated) => self.push_bot(Payload::Question(QuestionCard {
                question: generated.question,
                examples_header: kind.examples_header().to_string(),
                examples: generated.examples,
                suggestion: generated.suggestion,
            })),
            Err(_) => self.push_bot_text(APOLOGY_FOLLOW_UP),
        }
    }

    /// Outcome of a [`Command::BuilderList`] call. The phase moves to
    /// PostChat even on failure, leaving the previous builder result intact.
    pub fn apply_builder_list(&mut self, epoch: u64, result: anyhow::Result<String>) {
        if epoch != self.epoch {
            return;
        }
        self.busy = false;
        match result {
            Ok(text) => {
                self.builder_result = text;
                self.push_bot_text(GENERATION_DONE);
            }
            Err(_) => self.push_bot_text(APOLOGY_BUILDER),
        }
        self.phase = Phase::PostChat;
    }

    /// Outcome of a [`Command::Continuation`] call.
    pub fn apply_continuation(&mut self, epoch: u64, result: anyhow::Result<String>) {
        if epoch != self.epoch {
            return;
        }
        self.busy = false;
        match result {
            Ok(reply) => self.push_bot_text(reply),
            Err(_) => self.push_bot_text(APOLOGY_CHAT),
        }
    }

    fn push_user(&mut self, text: String) {
        self.push(Sender::User, Payload::Text(text));
    }

    fn push_bot_text(&mut self, text: impl Into<String>) {
        self.push(Sender::Bot, Payload::Text(text.into()));
    }

    fn push_bot(&mut self, payload: Payload) {
        self.push(Sender::Bot, payload);
    }

    fn push(&mut self, sender: Sender, payload: Payload) {
        let id = self.next_id;
        self.next_id += 1;
        self.transcript.push(Message {
            id,
            sender,
            payload,
        });
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    const ANSWERS: [&str; 5] = [
        "감정 일기 앱",
        "이모티콘 기록",
        "따뜻함",
        "20대 직장인",
        "꾸준한 기록 습관",
    ];

    fn sample_question() -> FollowUpQuestion {
        FollowUpQuestion {
            question: "핵심 기능은 무엇인가요?".to_string(),
            examples: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            suggestion: "이렇게 답해보세요".to_string(),
        }
    }

    /// Walk the interview up to the confirmation prompt, resolving each
    /// follow-up call along the way.
    fn conversation_at_confirm() -> Conversation {
        let mut conv = Conversation::new();
        for answer in ANSWERS {
            let command = conv.submit(answer);
            if let Some(Command::FollowUp { kind, epoch, .. }) = command {
                conv.apply_follow_up(epoch, kind, Ok(sample_question()));
            }
        }
        assert_eq!(conv.phase(), Phase::ConfirmGenerate);
        conv
    }

    #[test]
    fn starts_with_opening_question_at_phase_one() {
        let conv = Conversation::new();
        assert_eq!(conv.phase(), Phase::AskIdea);
        assert!(!conv.busy());
        assert!(conv.answers.is_empty());
        assert!(conv.builder_result().is_empty());
        assert_eq!(conv.transcript().len(), 1);
        match &conv.transcript()[0].payload {
            Payload::Question(card) => {
                assert_eq!(card.examples.len(), 3);
                assert!(card.suggestion.is_empty());
            }
            other => panic!("expected opening question card, got {other:?}"),
        }
    }

    #[test]
    fn restart_matches_fresh_state() {
        let mut conv = conversation_at_confirm();
        conv.submit("네");
        conv.restart();

        let fresh = Conversation::new();
        assert_eq!(conv.phase(), fresh.phase());
        assert_eq!(conv.answers, fresh.answers);
        assert_eq!(conv.builder_result(), fresh.builder_result());
        assert_eq!(conv.busy(), fresh.busy());
        assert_eq!(conv.transcript(), fresh.transcript());
    }

    #[test]
    fn question_phases_record_one_answer_and_advance_once() {
        let mut conv = Conversation::new();
        let mut expected = Vec::new();
        for (i, answer) in ANSWERS.iter().enumerate() {
            let before = conv.transcript().len();
            let phase_before = conv.phase();
            let command = conv.submit(answer);
            expected.push(answer.to_string());
            assert_eq!(conv.answers, expected);
            assert_eq!(conv.phase(), phase_before.next());

            let user_messages = conv.transcript()[before..]
                .iter()
                .filter(|m| m.sender == Sender::User)
                .count();
            assert_eq!(user_messages, 1);

            if i < 4 {
                let Some(Command::FollowUp { kind, epoch, .. }) = command else {
                    panic!("expected follow-up command at answer {i}");
                };
                assert!(conv.busy());
                conv.apply_follow_up(epoch, kind, Ok(sample_question()));
                assert!(!conv.busy());
            } else {
                assert_eq!(command, None);
            }
        }
        assert_eq!(conv.phase(), Phase::ConfirmGenerate);
    }

    #[test]
    fn affirmative_tokens_reach_generating() {
        for token in ["네", "yes", "Y", "예", "ㅇ", "좋아요", "생성해줘"] {
            let mut conv = conversation_at_confirm();
            let command = conv.submit(token);
            assert_eq!(conv.phase(), Phase::Generating, "token {token:?}");
            assert!(matches!(command, Some(Command::BuilderList { .. })));
        }
    }

    #[test]
    fn decline_jumps_straight_to_post_chat() {
        let mut conv = conversation_at_confirm();
        let before = conv.transcript().len();
        let command = conv.submit("아니");
        assert_eq!(command, None);
        assert_eq!(conv.phase(), Phase::PostChat);
        assert!(!conv.busy());
        // user message plus the decline acknowledgement
        assert_eq!(conv.transcript().len(), before + 2);
        assert!(conv.builder_result().is_empty());
    }

    #[test]
    fn busy_spans_exactly_the_call_bearing_transition() {
        let mut conv = Conversation::new();
        assert!(!conv.busy());
        let Some(Command::FollowUp { kind, epoch, .. }) = conv.submit(ANSWERS[0]) else {
            panic!("expected follow-up command");
        };
        assert!(conv.busy());
        conv.apply_follow_up(epoch, kind, Ok(sample_question()));
        assert!(!conv.busy());
    }

    #[test]
    fn follow_up_failure_keeps_phase_and_adds_one_apology() {
        let mut conv = Conversation::new();
        let Some(Command::FollowUp { kind, epoch, .. }) = conv.submit(ANSWERS[0]) else {
            panic!("expected follow-up command");
        };
        let before = conv.transcript().len();
        conv.apply_follow_up(epoch, kind, Err(anyhow!("boom")));
        assert_eq!(conv.phase(), Phase::AskFeature);
        assert!(!conv.busy());
        assert_eq!(conv.transcript().len(), before + 1);
        assert_eq!(conv.answers.len(), 1);
    }

    #[test]
    fn builder_failure_still_advances_to_post_chat() {
        let mut conv = conversation_at_confirm();
        let Some(Command::BuilderList { epoch, .. }) = conv.submit("네") else {
            panic!("expected builder command");
        };
        conv.apply_builder_list(epoch, Err(anyhow!("boom")));
        assert_eq!(conv.phase(), Phase::PostChat);
        assert!(!conv.busy());
        assert!(conv.builder_result().is_empty());
    }

    #[test]
    fn full_funnel_issues_one_builder_call_with_ordered_answers() {
        let mut conv = conversation_at_confirm();
        let Some(Command::BuilderList { answers, epoch }) = conv.submit("네") else {
            panic!("expected builder command");
        };
        assert_eq!(answers, ANSWERS.map(String::from).to_vec());
        assert!(conv.busy());

        conv.apply_builder_list(epoch, Ok("좋습니다! 생성했습니다.\n1. 앱을 만들어줘".to_string()));
        assert_eq!(conv.phase(), Phase::PostChat);
        assert!(!conv.builder_result().is_empty());
        assert!(!conv.busy());
    }

    #[test]
    fn post_chat_issues_continuation_with_context_and_stays_put() {
        let mut conv = conversation_at_confirm();
        let Some(Command::BuilderList { epoch, .. }) = conv.submit("네") else {
            panic!("expected builder command");
        };
        conv.apply_builder_list(epoch, Ok("header\n1. item".to_string()));

        let command = conv.submit("파란색으로 바꿔줘");
        let Some(Command::Continuation {
            answers,
            text,
            epoch,
        }) = command
        else {
            panic!("expected continuation command");
        };
        assert_eq!(answers, ANSWERS.map(String::from).to_vec());
        assert_eq!(text, "파란색으로 바꿔줘");

        let before = conv.transcript().len();
        conv.apply_continuation(epoch, Ok("알겠습니다, 파란색으로 바꿨어요.".to_string()));
        assert_eq!(conv.transcript().len(), before + 1);
        assert_eq!(conv.phase(), Phase::PostChat);
    }

    #[test]
    fn stale_epoch_result_is_discarded_after_restart() {
        let mut conv = Conversation::new();
        let Some(Command::FollowUp { kind, epoch, .. }) = conv.submit(ANSWERS[0]) else {
            panic!("expected follow-up command");
        };
        conv.restart();
        let fresh_len = conv.transcript().len();
        conv.apply_follow_up(epoch, kind, Ok(sample_question()));
        assert_eq!(conv.transcript().len(), fresh_len);
        assert_eq!(conv.phase(), Phase::AskIdea);
        assert!(!conv.busy());
    }

    #[test]
    fn blank_input_is_ignored() {
        let mut conv = Conversation::new();
        assert_eq!(conv.submit("   "), None);
        assert!(conv.answers.is_empty());
        assert_eq!(conv.transcript().len(), 1);
    }
}
