pub mod providers;

pub use providers::mock::MockProvider;
pub use providers::openai_compat::OpenAiCompatProvider;
