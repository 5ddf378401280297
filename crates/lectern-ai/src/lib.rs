pub mod fallback;
pub mod gemini;
pub mod offline;
pub mod prompts;

pub mod mock;

pub use fallback::{FallbackAssistant, FallbackConfig, ANSWER_FALLBACK};
pub use gemini::GeminiAssistant;
pub use mock::MockAssistant;
pub use offline::OfflineAssistant;
