use crate::authenticator::{Authenticator, TokenRetrievalRequest};
use crate::config::IdentitySelector;
use crate::token::Token;
use crate::{TokenRetriever, TokenRetrieverError};

use std::sync::Mutex;
use tracing::debug;

/// Retrieves managed identity tokens and keeps the last one until it expires.
///
/// A run asks for a token once and reuses it for every call, so failures are not retried:
/// the first error is returned to the caller.
#[derive(Debug)]
pub struct TokenRetrieverWithCache<A>
where
    A: Authenticator,
{
    request: TokenRetrievalRequest,
    tokens: Mutex<Option<Token>>,
    authenticator: A,
}

impl<A> TokenRetriever for TokenRetrieverWithCache<A>
where
    A: Authenticator,
{
    fn retrieve(&self) -> Result<Token, TokenRetrieverError> {
        let mut cached_token = self
            .tokens
            .lock()
            .map_err(|_| TokenRetrieverError::PoisonError)?;

        if let Some(token) = cached_token.as_ref().filter(|t| !t.is_expired()) {
            debug!("using cached managed identity token");
            return Ok(token.to_owned());
        }

        let token = self.fetch_token().inspect_err(|e| {
            debug!("error fetching managed identity token: {e}");
        })?;
        debug!(expires_at = %token.expires_at(), "managed identity token obtained");
        *cached_token = Some(token.clone());

        Ok(token)
    }
}

impl<A> TokenRetrieverWithCache<A>
where
    A: Authenticator,
{
    /// Creates a retriever asking the authenticator for tokens valid for `resource`, on behalf
    /// of the identity picked by `selector`.
    pub fn new(authenticator: A, resource: String, selector: IdentitySelector) -> Self {
        Self {
            request: TokenRetrievalRequest { resource, selector },
            tokens: Mutex::new(None),
            authenticator,
        }
    }

    fn fetch_token(&self) -> Result<Token, TokenRetrieverError> {
        let response = self.authenticator.authenticate(self.request.clone())?;

        Token::try_from(response)
    }
}
