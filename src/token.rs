use std::fmt;

use crate::{TokenRetrieverError, authenticator::TokenRetrievalResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type AccessToken = String;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum TokenType {
    Bearer,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Token {
    expires_at: DateTime<Utc>,
    access_token: AccessToken,
    token_type: TokenType,
}

impl TryFrom<&str> for TokenType {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Bearer" | "bearer" => Ok(TokenType::Bearer),
            _ => Err(format!("Invalid token type: {value}")),
        }
    }
}

impl Token {
    pub fn new(
        access_token: AccessToken,
        token_type: TokenType,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Token {
            access_token,
            token_type,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.lt(&Utc::now())
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.access_token
    }

    pub fn token_type(&self) -> &TokenType {
        &self.token_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Value for the `Authorization` header of outgoing requests.
    pub fn authorization_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Bearer => write!(f, "Bearer"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.token_type, self.access_token)
    }
}

impl TryFrom<TokenRetrievalResponse> for Token {
    type Error = TokenRetrieverError;

    fn try_from(response: TokenRetrievalResponse) -> Result<Self, Self::Error> {
        let token_type = TokenType::try_from(response.token_type.as_str())
            .map_err(TokenRetrieverError::TokenRetrieverError)?;

        // The identity endpoint reports an absolute expiry in epoch seconds.
        let expires_on = i64::try_from(response.expires_on).map_err(|_| {
            TokenRetrieverError::TokenRetrieverError(format!(
                "expiration out of range: {}",
                response.expires_on
            ))
        })?;
        let expires_at = DateTime::<Utc>::from_timestamp(expires_on, 0).ok_or_else(|| {
            TokenRetrieverError::TokenRetrieverError(format!(
                "expiration out of range: {expires_on}"
            ))
        })?;

        Ok(Token::new(response.access_token, token_type, expires_at))
    }
}
