use serde::{Deserialize, Serialize};

/// Student feedback pulse kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackKind {
    Ok,
    Hard,
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Hard => write!(f, "HARD"),
        }
    }
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OK" => Ok(Self::Ok),
            "HARD" => Ok(Self::Hard),
            other => Err(format!("unknown feedback kind: {other}")),
        }
    }
}

/// What created an important moment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MomentTrigger {
    /// Instructor pressed "mark important".
    Manual,
    /// Capture attached to a student question.
    Question,
    /// Hard-feedback ratio crossed the client-side threshold.
    Hard,
}

impl std::fmt::Display for MomentTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "MANUAL"),
            Self::Question => write!(f, "QUESTION"),
            Self::Hard => write!(f, "HARD"),
        }
    }
}

impl std::str::FromStr for MomentTrigger {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(Self::Manual),
            "QUESTION" => Ok(Self::Question),
            "HARD" => Ok(Self::Hard),
            other => Err(format!("unknown moment trigger: {other}")),
        }
    }
}

/// Question lifecycle state. Forward-only; `rank` orders the states so a
/// transition can be checked against regression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Intent,
    TextSubmitted,
    AiAnswered,
    Forwarded,
}

impl QuestionStatus {
    pub fn rank(self) -> u8 {
        match self {
            Self::Intent => 0,
            Self::TextSubmitted => 1,
            Self::AiAnswered => 2,
            Self::Forwarded => 3,
        }
    }

    /// Whether moving to `next` would regress the lifecycle. Equal rank is
    /// allowed (re-running a step), going backwards is not.
    pub fn would_regress(self, next: QuestionStatus) -> bool {
        next.rank() < self.rank()
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intent => write!(f, "intent"),
            Self::TextSubmitted => write!(f, "text_submitted"),
            Self::AiAnswered => write!(f, "ai_answered"),
            Self::Forwarded => write!(f, "forwarded"),
        }
    }
}

impl std::str::FromStr for QuestionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "intent" => Ok(Self::Intent),
            "text_submitted" => Ok(Self::TextSubmitted),
            "ai_answered" => Ok(Self::AiAnswered),
            "forwarded" => Ok(Self::Forwarded),
            other => Err(format!("unknown question status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_kind_roundtrip() {
        assert_eq!("OK".parse::<FeedbackKind>().unwrap(), FeedbackKind::Ok);
        assert_eq!("HARD".parse::<FeedbackKind>().unwrap(), FeedbackKind::Hard);
        assert!("MEH".parse::<FeedbackKind>().is_err());
        assert_eq!(FeedbackKind::Hard.to_string(), "HARD");
    }

    #[test]
    fn feedback_kind_serde_is_uppercase() {
        assert_eq!(serde_json::to_string(&FeedbackKind::Ok).unwrap(), "\"OK\"");
    }

    #[test]
    fn trigger_roundtrip() {
        for t in [MomentTrigger::Manual, MomentTrigger::Question, MomentTrigger::Hard] {
            assert_eq!(t.to_string().parse::<MomentTrigger>().unwrap(), t);
        }
    }

    #[test]
    fn status_ranks_are_ordered() {
        assert!(QuestionStatus::Intent.rank() < QuestionStatus::TextSubmitted.rank());
        assert!(QuestionStatus::TextSubmitted.rank() < QuestionStatus::AiAnswered.rank());
        assert!(QuestionStatus::AiAnswered.rank() < QuestionStatus::Forwarded.rank());
    }

    #[test]
    fn regression_check() {
        assert!(QuestionStatus::AiAnswered.would_regress(QuestionStatus::TextSubmitted));
        assert!(!QuestionStatus::AiAnswered.would_regress(QuestionStatus::AiAnswered));
        assert!(!QuestionStatus::Intent.would_regress(QuestionStatus::Forwarded));
    }

    #[test]
    fn status_parse_rejects_unknown() {
        assert!("pending".parse::<QuestionStatus>().is_err());
    }
}
