use std::error::Error as StdError;

use thiserror::Error;

/// Classified fetch failure. Every variant's `Display` impl renders
/// exactly the string a `FetcherResponse::last_error` should carry, so
/// downstream log matching on `"ClientError:"` or `"TimeoutError"`
/// keeps working verbatim.
///
/// Cancellation is deliberately absent from this enum: it's represented
/// by ordinary Rust task cancellation (a dropped future, or a `select!`
/// against the caller's own cancellation signal), never by a variant
/// here.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("TimeoutError")]
    Timeout,
    #[error("ClientError: {kind}: {message}")]
    Client { kind: String, message: String },
    #[error("CertificateError: {message}")]
    Certificate { message: String },
    #[error("ValueError: {message}")]
    InvalidUrl { message: String },
    #[error("AttributeError: {message}")]
    Attribute { message: String },
    #[error("RuntimeError: {message}")]
    Runtime { message: String },
    #[error("Exception: {message}")]
    Other { message: String },
}

impl FetchError {
    pub fn to_classified_string(&self) -> String {
        self.to_string()
    }
}

/// Walks `err`'s `source()` chain looking for a TLS peer-certificate
/// failure (rustls/webpki surface these as plain `Display` messages, not
/// a distinguishable type), returning the innermost message that matches.
fn certificate_cause(err: &reqwest::Error) -> Option<String> {
    let mut source = StdError::source(err);
    while let Some(cause) = source {
        let message = cause.to_string();
        if is_certificate_message(&message) {
            return Some(message);
        }
        source = cause.source();
    }
    None
}

fn is_certificate_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("certificate") || lower.contains("unknownissuer") || lower.contains("notvalidfor")
}

/// Maps a `reqwest::Error` onto the classified taxonomy. This is the
/// single inspection point the rest of the crate relies on to turn a
/// transport-library error into one of the kinds above.
pub fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if err.is_builder() {
        return FetchError::InvalidUrl {
            message: err.to_string(),
        };
    }
    if let Some(message) = certificate_cause(err) {
        return FetchError::Certificate { message };
    }

    let kind = if err.is_connect() {
        "ConnectError"
    } else if err.is_redirect() {
        "TooManyRedirects"
    } else if err.is_decode() {
        "DecodeError"
    } else if err.is_body() {
        "BodyError"
    } else if err.is_request() {
        "RequestError"
    } else {
        "ClientError"
    };

    FetchError::Client {
        kind: kind.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_exactly_the_documented_prefixes() {
        assert_eq!(FetchError::Timeout.to_classified_string(), "TimeoutError");
        assert_eq!(
            FetchError::Client {
                kind: "ConnectError".to_string(),
                message: "dns error".to_string()
            }
            .to_classified_string(),
            "ClientError: ConnectError: dns error"
        );
        assert_eq!(
            FetchError::InvalidUrl {
                message: "relative redirect".to_string()
            }
            .to_classified_string(),
            "ValueError: relative redirect"
        );
        assert_eq!(
            FetchError::Certificate {
                message: "certificate has expired".to_string()
            }
            .to_classified_string(),
            "CertificateError: certificate has expired"
        );
    }

    #[test]
    fn certificate_message_matcher_recognizes_common_tls_failures() {
        assert!(is_certificate_message("invalid peer certificate: UnknownIssuer"));
        assert!(is_certificate_message("certificate has expired"));
        assert!(is_certificate_message("NotValidForName"));
        assert!(!is_certificate_message("connection refused"));
    }
}
