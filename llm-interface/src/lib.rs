pub mod chat;
pub mod extractor;
pub mod fallback;

pub use chat::{ChatMessage, ChatModel, OpenAiCompatibleChat};
pub use extractor::{strip_markdown_fences, LlmExtractor};
pub use fallback::{calculate_delay, FallbackConfig, ModelFallback};
