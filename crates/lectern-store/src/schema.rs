/// SQL DDL for the lectern store.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    instructor TEXT NOT NULL,
    time_slot TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id),
    date TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE (course_id, date)
);

CREATE TABLE IF NOT EXISTS questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    device_id TEXT NOT NULL,
    original_text TEXT NOT NULL DEFAULT '',
    cleaned_text TEXT,
    ai_answer TEXT,
    forwarded INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'intent',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS question_likes (
    question_id INTEGER NOT NULL REFERENCES questions(id),
    device_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (question_id, device_id)
);

CREATE TABLE IF NOT EXISTS feedback_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    device_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS important_moments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    trigger_kind TEXT NOT NULL,
    question_id INTEGER REFERENCES questions(id),
    note TEXT NOT NULL DEFAULT '',
    capture_url TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_session ON questions(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_likes_question ON question_likes(question_id);
CREATE INDEX IF NOT EXISTS idx_feedback_rate ON feedback_events(session_id, device_id, created_at);
CREATE INDEX IF NOT EXISTS idx_moments_session ON important_moments(session_id, created_at);
CREATE INDEX IF NOT EXISTS idx_moments_question ON important_moments(question_id, created_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
