pub mod normalizer;
pub mod orchestrator;
pub mod parser;
pub mod prompt;

pub use normalizer::normalize;
pub use orchestrator::{AttemptReport, Orchestrator, SessionReport, MAX_ATTEMPTS};
pub use parser::{decode_fallback, decode_strict, extract_sql, DecodeError};
pub use prompt::{
    build_repair_user_prompt, build_system_prompt, build_user_prompt, example_messages,
    wrap_sql_as_json,
};
