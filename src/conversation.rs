use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Instruction pinned to the head of every conversation. The tutor guides the
/// student toward answers instead of handing them over.
pub const SYSTEM_PROMPT: &str = "\
You are a patient, encouraging tutor helping students learn MATH and SCIENCE \
through scaffolding, not by giving direct answers.

Guide the student to discover answers through their own reasoning. Ask open-ended \
questions, offer small hints and analogies when they are stuck, and celebrate \
effort. Use simple language suited to middle- and high-school students.

Do NOT state final answers or solve a problem in one step; only confirm an answer \
the student has already worked out themselves. End each reply with a question that \
keeps the student thinking.

When an image is attached, first describe what you observe in it (equations, \
diagrams, text), then ask the student what they understand so far before guiding \
them.";

/// Text part sent alongside an image when the student gives no caption.
pub const DEFAULT_IMAGE_PROMPT: &str = "Can you help me understand this problem?";

/// How many non-system messages are kept when the history is trimmed before a
/// request. A product default, overridable via CLI flag and config.
pub const DEFAULT_MAX_TURNS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One element of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Image carried inline as a `data:<mime>;base64,<payload>` URI.
    Image { data_uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn system(text: &str) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.to_string()),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.to_string()),
        }
    }

    pub fn user_text(text: &str) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.to_string()),
        }
    }

    /// Build an image turn: a text part (the caption, or the canned prompt when
    /// none is given) followed by the image as a base64 data URI. Part order is
    /// fixed; the API expects the text before the image.
    pub fn user_image(bytes: &[u8], mime: &str, caption: Option<&str>) -> Self {
        let text = match caption {
            Some(c) if !c.trim().is_empty() => c.to_string(),
            _ => DEFAULT_IMAGE_PROMPT.to_string(),
        };
        let data_uri = format!("data:{};base64,{}", mime, BASE64.encode(bytes));
        Self {
            role: Role::User,
            content: Content::Parts(vec![Part::Text(text), Part::Image { data_uri }]),
        }
    }

    /// The human-readable text of this message: the plain body, or the caption
    /// part of an image turn.
    pub fn display_text(&self) -> &str {
        match &self.content {
            Content::Text(t) => t,
            Content::Parts(parts) => parts
                .iter()
                .find_map(|p| match p {
                    Part::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .unwrap_or(""),
        }
    }

    pub fn has_image(&self) -> bool {
        match &self.content {
            Content::Text(_) => false,
            Content::Parts(parts) => parts.iter().any(|p| matches!(p, Part::Image { .. })),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject {
    Math,
    Science,
}

impl Subject {
    pub fn all() -> Vec<Subject> {
        vec![Subject::Math, Subject::Science]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Science => "science",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Subject::Math => "Math",
            Subject::Science => "Science",
        }
    }

    /// Assistant greeting seeded into a fresh conversation for this subject.
    pub fn greeting(&self) -> &'static str {
        match self {
            Subject::Math => {
                "Hi there! I'm your math buddy. I'll help you understand math \
                 concepts by guiding you through problems step by step. What math \
                 topic are you working on today?"
            }
            Subject::Science => {
                "Hi there! I'm your science buddy. I'll help you explore scientific \
                 concepts through questions and experiments. What science topic are \
                 you curious about today?"
            }
        }
    }
}

/// Session-scoped chat history. The first entry is always the system
/// instruction; it survives every reset and every trim.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: &str) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Drop everything but the system instruction, then seed the subject
    /// greeting when a subject is given.
    pub fn reset(&mut self, subject: Option<Subject>) {
        self.messages.truncate(1);
        if let Some(subject) = subject {
            self.messages.push(Message::assistant(subject.greeting()));
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Keep the system instruction plus the newest `max_turns` non-system
    /// messages, discarding older ones. Lossy; trimmed messages are gone.
    pub fn trim_to_window(&mut self, max_turns: usize) {
        let non_system = self.messages.len().saturating_sub(1);
        if non_system > max_turns {
            let drop = non_system - max_turns;
            self.messages.drain(1..1 + drop);
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Messages shown in the transcript (everything but the system instruction).
    pub fn transcript(&self) -> &[Message] {
        &self.messages[1..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation_with_turns(n: usize) -> Conversation {
        let mut conv = Conversation::new(SYSTEM_PROMPT);
        for i in 0..n {
            if i % 2 == 0 {
                conv.push(Message::user_text(&format!("question {}", i)));
            } else {
                conv.push(Message::assistant(&format!("reply {}", i)));
            }
        }
        conv
    }

    #[test]
    fn new_conversation_is_system_only() {
        let conv = Conversation::new(SYSTEM_PROMPT);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert!(conv.transcript().is_empty());
    }

    #[test]
    fn reset_returns_to_system_only() {
        let mut conv = conversation_with_turns(6);
        conv.reset(None);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
        assert_eq!(conv.messages()[0].display_text(), SYSTEM_PROMPT);
    }

    #[test]
    fn reset_with_subject_seeds_greeting() {
        let mut conv = conversation_with_turns(4);
        conv.reset(Some(Subject::Math));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[1].role, Role::Assistant);
        assert_eq!(conv.messages()[1].display_text(), Subject::Math.greeting());
    }

    #[test]
    fn trim_below_limit_is_noop() {
        let mut conv = conversation_with_turns(5);
        conv.trim_to_window(20);
        assert_eq!(conv.len(), 6);
    }

    #[test]
    fn trim_keeps_system_plus_newest_window() {
        let mut conv = conversation_with_turns(30);
        conv.trim_to_window(20);
        assert_eq!(conv.len(), 21);
        assert_eq!(conv.messages()[0].role, Role::System);
        // The oldest surviving non-system message is turn 10 of 0..30.
        assert_eq!(conv.messages()[1].display_text(), "question 10");
        assert_eq!(conv.messages()[20].display_text(), "reply 29");
    }

    #[test]
    fn trim_preserves_order() {
        let mut conv = conversation_with_turns(25);
        conv.trim_to_window(10);
        let texts: Vec<&str> = conv.transcript().iter().map(|m| m.display_text()).collect();
        let expected: Vec<String> = (15..25)
            .map(|i| {
                if i % 2 == 0 {
                    format!("question {}", i)
                } else {
                    format!("reply {}", i)
                }
            })
            .collect();
        assert_eq!(texts, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn trim_survives_system_even_at_zero_window() {
        let mut conv = conversation_with_turns(3);
        conv.trim_to_window(0);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role, Role::System);
    }

    #[test]
    fn image_turn_without_caption_uses_default_prompt() {
        let msg = Message::user_image(b"fake image bytes", "image/png", None);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.display_text(), DEFAULT_IMAGE_PROMPT);
        assert!(msg.has_image());
    }

    #[test]
    fn image_turn_blank_caption_uses_default_prompt() {
        let msg = Message::user_image(b"bytes", "image/jpeg", Some("   "));
        assert_eq!(msg.display_text(), DEFAULT_IMAGE_PROMPT);
    }

    #[test]
    fn image_turn_keeps_caption_verbatim() {
        let msg = Message::user_image(b"bytes", "image/jpeg", Some("I don't get step 3"));
        assert_eq!(msg.display_text(), "I don't get step 3");
    }

    #[test]
    fn image_turn_has_fixed_part_order_and_data_uri() {
        let msg = Message::user_image(b"pixels", "image/png", Some("what is this?"));
        let Content::Parts(parts) = &msg.content else {
            panic!("expected parts content");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Part::Text("what is this?".to_string()));
        let Part::Image { data_uri } = &parts[1] else {
            panic!("expected image part second");
        };
        let payload = data_uri.strip_prefix("data:image/png;base64,").unwrap();
        assert_eq!(BASE64.decode(payload).unwrap(), b"pixels");
    }

    #[test]
    fn text_turn_wraps_raw_string() {
        let msg = Message::user_text("what is 2+2");
        assert_eq!(msg.content, Content::Text("what is 2+2".to_string()));
        assert!(!msg.has_image());
    }
}
