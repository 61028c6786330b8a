use thiserror::Error;

/// Failure kinds of the certificate-bound token check.
///
/// These stay inside the server: the access middleware logs them and answers
/// every one of them with the same 403.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    MissingCredentials(&'static str),

    #[error("invalid certificate format")]
    InvalidCertificateFormat,

    #[error("signing key source unavailable: {0}")]
    SigningKeySourceUnavailable(String),

    #[error("JSON Web Keys are not found by JWKS URL")]
    JwksNotFound,

    #[error("JSON Web Key not found by Key ID: {kid}")]
    JwkNotFoundByKeyId { kid: String },

    #[error("unusable JSON Web Key: {kid}")]
    InvalidSigningKey { kid: String },

    #[error("malformed token")]
    TokenMalformed,

    #[error("token validation failed")]
    TokenValidationFailed,

    #[error("token is not bound to the presented certificate")]
    NotBound,
}

impl AuthError {
    /// Network-class failure that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SigningKeySourceUnavailable(_))
    }
}
