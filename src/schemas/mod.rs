//! Input validation: form checks before anything is written, and schema checks
//! on arguments extracted by the LLM.

pub mod validation;
pub mod validator;

pub use validation::{coerce_arguments, validate_arguments};
pub use validator::{
    deserialize_with_path, validate_build_request, validate_function_name, validate_parameters,
};
