pub mod error;
pub mod excluded;
pub mod id;
pub mod string_ext;

pub use error::{ApiError, ApiResult, EngineError, EngineResult};
pub use excluded::{EXCLUDED_FIELDS, is_excluded};
pub use string_ext::{StringExt, clean_optional_string, identifier_tokens, token_similarity};
