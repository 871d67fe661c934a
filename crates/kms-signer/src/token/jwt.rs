use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;
use crate::signing::{HashAlgorithm, Signer, sign_message};

#[derive(Debug, Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

/// JWT claims used for both assertion grants and self-signed access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Build an RS256 JWT whose signature comes from `signer`.
pub async fn encode_signed<S>(
    signer: &S,
    key_id: Option<&str>,
    claims: &Claims,
) -> Result<String, TokenError>
where
    S: Signer + ?Sized,
{
    let header = Header {
        alg: "RS256",
        typ: "JWT",
        kid: key_id,
    };
    let header = serde_json::to_vec(&header).map_err(|e| TokenError::Decode(e.to_string()))?;
    let claims = serde_json::to_vec(claims).map_err(|e| TokenError::Decode(e.to_string()))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(claims)
    );
    let signature = sign_message(signer, HashAlgorithm::Sha256, signing_input.as_bytes()).await?;

    Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Read the claims of a JWT without checking its signature.
pub fn decode_claims(jwt: &str) -> Result<Claims, TokenError> {
    let mut parts = jwt.split('.');
    let (Some(_), Some(claims), Some(_), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Decode("JWT must have three segments".into()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(claims)
        .map_err(|e| TokenError::Decode(format!("claims are not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Decode(e.to_string()))
}
