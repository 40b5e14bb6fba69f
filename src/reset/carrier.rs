//! Hands a verified reset token back to the browser client.
//!
//! The carrier is a JSON object `{"authorization": "Bearer <fragment> <token>"}` passed as
//! the `headers` query parameter of the redirect to the client's reset page. The client
//! sends the same JSON back as `isAuthor` when it submits the new password.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SCHEME: &str = "Bearer";
pub const FRAGMENT_LEN: usize = 7;
pub const QUERY_PARAM: &str = "headers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub authorization: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarrierError {
    Malformed(String),
    WrongScheme,
    MissingToken,
    FragmentMismatch,
}

impl std::fmt::Display for CarrierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CarrierError::Malformed(msg) => write!(f, "malformed carrier: {msg}"),
            CarrierError::WrongScheme => write!(f, "authorization is not a Bearer value"),
            CarrierError::MissingToken => write!(f, "no token in authorization"),
            CarrierError::FragmentMismatch => write!(f, "user fragment does not match"),
        }
    }
}

/// Last `FRAGMENT_LEN` characters of the hyphenated user id.
pub fn user_fragment(user_id: Uuid) -> String {
    let id = user_id.to_string();
    id[id.len() - FRAGMENT_LEN..].to_string()
}

impl Carrier {
    pub fn new(user_id: Uuid, token: &str) -> Self {
        Self {
            authorization: format!("{SCHEME} {} {token}", user_fragment(user_id)),
        }
    }

    pub fn to_json(&self) -> Result<String, CarrierError> {
        serde_json::to_string(self).map_err(|e| CarrierError::Malformed(e.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self, CarrierError> {
        serde_json::from_str(raw).map_err(|e| CarrierError::Malformed(e.to_string()))
    }

    /// Extracts the embedded token, checking the scheme and the user fragment field by field.
    pub fn token_for(&self, user_id: Uuid) -> Result<&str, CarrierError> {
        let mut fields = self.authorization.split(' ');

        if fields.next() != Some(SCHEME) {
            return Err(CarrierError::WrongScheme);
        }
        let fragment = fields.next().ok_or(CarrierError::MissingToken)?;
        let token = fields
            .next()
            .filter(|t| !t.is_empty())
            .ok_or(CarrierError::MissingToken)?;
        if fields.next().is_some() {
            return Err(CarrierError::Malformed(
                "unexpected trailing field".to_string(),
            ));
        }

        if fragment != user_fragment(user_id) {
            return Err(CarrierError::FragmentMismatch);
        }

        Ok(token)
    }

    /// Client reset page URL with this carrier URL-encoded in the query string.
    pub fn redirect_url(&self, client_url: &str, user_id: Uuid) -> Result<String, CarrierError> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(QUERY_PARAM, &self.to_json()?)
            .finish();
        Ok(format!(
            "{}/reset_password/{user_id}?{query}",
            client_url.trim_end_matches('/')
        ))
    }
}

/// What the client may send back: the raw JSON string it read from the query, or the
/// object itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CarrierInput {
    Structured(Carrier),
    Raw(String),
}

impl CarrierInput {
    pub fn into_carrier(self) -> Result<Carrier, CarrierError> {
        match self {
            CarrierInput::Structured(c) => Ok(c),
            CarrierInput::Raw(raw) => Carrier::from_json(&raw),
        }
    }
}
