//! Reqwest based implementation of the crate [HttpClient](crate::http_client::HttpClient).

pub mod client;
pub mod config;
