use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,     // user ID
    pub email: String, // normalized email
    pub name: String,  // display name at issuance
    pub jti: Uuid,     // unique token ID
    pub iat: i64,      // issued at (unix timestamp)
    pub exp: i64,      // expires at (unix timestamp)
    pub iss: String,   // issuer
    pub aud: String,   // audience
}
