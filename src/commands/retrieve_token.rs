use crate::authenticator::Authenticator;
use crate::config::IdentitySelector;
use crate::token::Token;
use crate::token_retriever::TokenRetrieverWithCache;
use crate::{TokenRetriever, TokenRetrieverError};

pub struct RetrieveTokenCommand<A>
where
    A: Authenticator,
{
    authenticator: A,
}

impl<A> RetrieveTokenCommand<A>
where
    A: Authenticator,
{
    pub fn new(authenticator: A) -> Self {
        Self { authenticator }
    }

    /// Asks the identity endpoint for a token valid for `resource`.
    pub fn retrieve_token(
        self,
        resource: &str,
        selector: IdentitySelector,
    ) -> Result<Token, TokenRetrieverError> {
        TokenRetrieverWithCache::new(self.authenticator, resource.to_string(), selector).retrieve()
    }
}
