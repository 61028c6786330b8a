//! SHA-256 thumbprint of a PEM encoded X.509 client certificate.
//!
//! The thumbprint is taken over the complete DER encoding of the certificate,
//! which is what `x5t#S256`-style bindings and `openssl x509 -fingerprint
//! -sha256` use, rendered as lowercase hex without separators.

use std::fmt;

use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::services::auth::AuthError;

const CERTIFICATE_TAG: &str = "CERTIFICATE";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CertificateThumbprint(String);

impl CertificateThumbprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CertificateThumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes the thumbprint of the single certificate in `pem_text`.
///
/// Anything that is not exactly one `CERTIFICATE` block holding one
/// well-formed X.509 structure is rejected with
/// [`AuthError::InvalidCertificateFormat`].
pub fn thumbprint(pem_text: &str) -> Result<CertificateThumbprint, AuthError> {
    let der = certificate_der(pem_text)?;
    let digest = Sha256::digest(&der);
    Ok(CertificateThumbprint(hex::encode(digest)))
}

fn certificate_der(pem_text: &str) -> Result<Vec<u8>, AuthError> {
    let mut blocks = pem::parse_many(pem_text.trim().as_bytes()).map_err(|e| {
        debug!(error = %e, "client certificate is not valid PEM");
        AuthError::InvalidCertificateFormat
    })?;

    if blocks.len() != 1 {
        debug!(blocks = blocks.len(), "expected exactly one PEM block");
        return Err(AuthError::InvalidCertificateFormat);
    }
    let block = blocks.remove(0);

    if !block.tag().eq_ignore_ascii_case(CERTIFICATE_TAG) {
        debug!(tag = %block.tag(), "PEM block is not a certificate");
        return Err(AuthError::InvalidCertificateFormat);
    }

    let der = block.into_contents();
    match x509_parser::parse_x509_certificate(&der) {
        Ok((rest, _)) if rest.is_empty() => Ok(der),
        Ok((rest, _)) => {
            debug!(trailing = rest.len(), "trailing bytes after certificate");
            Err(AuthError::InvalidCertificateFormat)
        }
        Err(e) => {
            debug!(error = %e, "certificate DER does not parse");
            Err(AuthError::InvalidCertificateFormat)
        }
    }
}

/// Restores line breaks in a certificate forwarded through an HTTP header.
///
/// Proxies either URL-encode the whole PEM (nginx
/// `$ssl_client_escaped_cert`, Envoy XFCC, AWS ALB), escape newlines as `\n`,
/// or fold lines with a leading tab (nginx `$ssl_client_cert`).
pub fn normalize_header_pem(raw: &str) -> String {
    // PEM text never contains '%', so its presence means URL encoding.
    let decoded = if raw.contains('%') {
        percent_decode_str(raw).decode_utf8_lossy().into_owned()
    } else {
        raw.to_string()
    };
    decoded.replace("\\n", "\n").replace('\t', "\n")
}
