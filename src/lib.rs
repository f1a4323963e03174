pub mod authenticator;
pub mod commands;
pub mod config;
pub mod environment;
pub mod http;
pub mod http_client;
pub mod lifecycle;
pub mod parameters;
pub mod resource;
pub mod token;
pub mod token_retriever;

use crate::token::Token;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TokenRetrieverError {
    #[error("retrieving token: `{0}`")]
    TokenRetrieverError(String),
    #[error("fetching access token: `{0}`")]
    AuthenticatorError(#[from] authenticator::AuthenticateError),
    #[error("acquiring cache mutex lock")]
    PoisonError,
}

/// The TokenRetriever is responsible for handing out the bearer token used against the
/// resource management API.
pub trait TokenRetriever {
    fn retrieve(&self) -> Result<Token, TokenRetrieverError>;
}
