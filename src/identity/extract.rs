//! Identity extraction from a verified peer certificate chain.
//!
//! The TLS layer has already verified the chain; this only reads the leaf.

use rustls::pki_types::CertificateDer;
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use super::{Identity, IdentityError};

/// Why no identity could be derived from a peer certificate.
#[derive(Debug, Error)]
pub enum IdentityExtractionError {
    #[error("no peer certificate presented")]
    NoCertificate,

    #[error("could not parse leaf certificate: {0}")]
    Certificate(String),

    #[error("expected 1 URI SAN, got {0}")]
    UriSanCount(usize),

    #[error("URI SAN {uri:?} is not a valid identity: {source}")]
    InvalidIdentity {
        uri: String,
        #[source]
        source: IdentityError,
    },
}

/// Derive the caller identity from the leaf of a verified chain.
pub fn extract_identity(chain: &[CertificateDer<'_>]) -> Result<Identity, IdentityExtractionError> {
    let leaf = chain.first().ok_or(IdentityExtractionError::NoCertificate)?;

    let (_, cert) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| IdentityExtractionError::Certificate(e.to_string()))?;

    let uris = uri_sans(&cert)?;
    if uris.len() != 1 {
        return Err(IdentityExtractionError::UriSanCount(uris.len()));
    }

    let uri = uris[0];
    Identity::parse(uri).map_err(|source| IdentityExtractionError::InvalidIdentity {
        uri: uri.to_owned(),
        source,
    })
}

fn uri_sans<'a>(cert: &'a X509Certificate<'_>) -> Result<Vec<&'a str>, IdentityExtractionError> {
    // A duplicated SAN extension is reported as an error by the parser.
    let san = cert
        .subject_alternative_name()
        .map_err(|e| IdentityExtractionError::Certificate(e.to_string()))?;

    let Some(san) = san else {
        return Ok(Vec::new());
    };

    Ok(san
        .value
        .general_names
        .iter()
        .filter_map(|name| match name {
            GeneralName::URI(uri) => Some(*uri),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DistinguishedName, DnType, Ia5String, KeyPair, SanType};

    fn cert_with_sans(sans: Vec<SanType>) -> CertificateDer<'static> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "workload");
        params.distinguished_name = dn;
        params.subject_alt_names = sans;

        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn uri(s: &str) -> SanType {
        SanType::URI(Ia5String::try_from(s).unwrap())
    }

    fn dns(s: &str) -> SanType {
        SanType::DnsName(Ia5String::try_from(s).unwrap())
    }

    #[test]
    fn extracts_single_uri_san() {
        let cert = cert_with_sans(vec![uri("spiffe://example.org/workload"), dns("workload.local")]);
        let id = extract_identity(&[cert]).unwrap();
        assert_eq!(id.as_str(), "spiffe://example.org/workload");
    }

    #[test]
    fn only_the_leaf_is_consulted() {
        let leaf = cert_with_sans(vec![uri("spiffe://example.org/leaf")]);
        let other = cert_with_sans(vec![uri("spiffe://example.org/other")]);
        let id = extract_identity(&[leaf, other]).unwrap();
        assert_eq!(id.as_str(), "spiffe://example.org/leaf");
    }

    #[test]
    fn empty_chain_is_an_error() {
        assert!(matches!(extract_identity(&[]), Err(IdentityExtractionError::NoCertificate)));
    }

    #[test]
    fn no_uri_san_is_an_error() {
        let cert = cert_with_sans(vec![dns("workload.local")]);
        assert!(matches!(
            extract_identity(&[cert]),
            Err(IdentityExtractionError::UriSanCount(0))
        ));
    }

    #[test]
    fn several_uri_sans_are_ambiguous() {
        let cert = cert_with_sans(vec![
            uri("spiffe://example.org/a"),
            uri("spiffe://example.org/b"),
        ]);
        assert!(matches!(
            extract_identity(&[cert]),
            Err(IdentityExtractionError::UriSanCount(2))
        ));
    }

    #[test]
    fn malformed_identity_uri_is_rejected() {
        let cert = cert_with_sans(vec![uri("https://example.org/a")]);
        assert!(matches!(
            extract_identity(&[cert]),
            Err(IdentityExtractionError::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn garbage_der_is_rejected() {
        let cert = CertificateDer::from(b"not a certificate".to_vec());
        assert!(matches!(
            extract_identity(&[cert]),
            Err(IdentityExtractionError::Certificate(_))
        ));
    }
}
