pub mod call_structs;
pub mod env_utils;
pub mod utils;
