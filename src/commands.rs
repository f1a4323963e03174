pub mod retrieve_token;
pub mod run_lifecycle;
