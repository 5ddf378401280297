use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// Connection role within a session. Partitions the broadcast groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Broadcast target: one role group of one session. Derived at send time,
/// never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub session_id: SessionId,
    pub role: Role,
}

impl GroupKey {
    pub fn new(session_id: SessionId, role: Role) -> Self {
        Self { session_id, role }
    }

    pub fn teacher(session_id: &SessionId) -> Self {
        Self::new(session_id.clone(), Role::Teacher)
    }

    pub fn student(session_id: &SessionId) -> Self {
        Self::new(session_id.clone(), Role::Student)
    }

    /// Both role groups of a session, for events everyone must see.
    pub fn both(session_id: &SessionId) -> [Self; 2] {
        [Self::teacher(session_id), Self::student(session_id)]
    }
}
