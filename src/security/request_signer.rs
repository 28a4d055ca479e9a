use base64::{engine::general_purpose, Engine};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

// PKCS#7 signed-data over the TRA, unwrapped from its S/MIME envelope → CMS (base64)

const PAYLOAD_NAME: &str = "smime.p7m";

/// Cryptographic collaborator producing an S/MIME message whose attachment
/// carries the signed payload.
pub trait SigningBackend {
    fn sign_smime(&self, content: &[u8], cert_path: &Path, key_path: &Path) -> Result<String>;
}

/// Base64 CMS payload, sent once to the login endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedArtifact(String);

impl SignedArtifact {
    /// Wrap an already-encoded payload.
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Signs login requests and strips the collaborator's S/MIME wrapping.
#[derive(Debug, Clone)]
pub struct RequestSigner<B> {
    backend: B,
}

impl<B: SigningBackend> RequestSigner<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sign(&self, document: &str, cert_path: &Path, key_path: &Path) -> Result<SignedArtifact> {
        let mime = self
            .backend
            .sign_smime(document.as_bytes(), cert_path, key_path)?;
        let payload = extract_payload(&mime)?;
        debug!(
            cert = %cert_path.display(),
            payload_len = payload.len(),
            "signed login ticket request"
        );
        Ok(SignedArtifact(payload))
    }
}

/// Find the `smime.p7m` part of an S/MIME message and return its body with
/// line breaks removed.
pub fn extract_payload(mime: &str) -> Result<String> {
    let normalized = mime.replace("\r\n", "\n");
    let body = find_payload_part(&normalized)
        .ok_or_else(|| Error::Signing(format!("no {} part in signed message", PAYLOAD_NAME)))?;

    let payload: String = body.split_whitespace().collect();
    if payload.is_empty() {
        return Err(Error::Signing("signed payload is empty".into()));
    }
    general_purpose::STANDARD
        .decode(&payload)
        .map_err(|e| Error::Signing(format!("signed payload is not base64: {}", e)))?;
    Ok(payload)
}

fn find_payload_part(part: &str) -> Option<&str> {
    let (headers, body) = split_part(part);
    let content_type = header_value(&headers, "content-type").unwrap_or_default();

    if content_type.to_ascii_lowercase().starts_with("multipart/") {
        let boundary = param(&content_type, "boundary")?;
        let delimiter = format!("--{}", boundary);
        return body
            .split(delimiter.as_str())
            .skip(1)
            .take_while(|section| !section.starts_with("--"))
            .find_map(|section| find_payload_part(section.trim_start_matches('\n')));
    }

    let disposition = header_value(&headers, "content-disposition").unwrap_or_default();
    let named = [param(&disposition, "filename"), param(&content_type, "name")]
        .into_iter()
        .flatten()
        .any(|name| name == PAYLOAD_NAME);
    named.then_some(body)
}

/// Split a MIME part into unfolded headers and body.
fn split_part(part: &str) -> (Vec<(String, String)>, &str) {
    let (head, body) = part.split_once("\n\n").unwrap_or((part, ""));

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in head.lines() {
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }
    (headers, body)
}

fn header_value(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.clone())
}

fn param(value: &str, name: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|p| {
        let (key, val) = p.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| val.trim().trim_matches('"').to_string())
    })
}

#[cfg(feature = "openssl")]
mod openssl_backend {
    use openssl::pkcs7::{Pkcs7, Pkcs7Flags};
    use openssl::pkey::PKey;
    use openssl::stack::Stack;
    use openssl::x509::X509;
    use std::fs;
    use std::path::Path;

    use super::SigningBackend;
    use crate::error::{Error, Result};

    /// Signs with OpenSSL: opaque PKCS#7 signed-data rendered as S/MIME.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct OpensslBackend;

    fn signing_err(what: &str) -> impl Fn(openssl::error::ErrorStack) -> Error + '_ {
        move |e| Error::Signing(format!("{}: {}", what, e))
    }

    impl SigningBackend for OpensslBackend {
        fn sign_smime(&self, content: &[u8], cert_path: &Path, key_path: &Path) -> Result<String> {
            let cert_pem = fs::read(cert_path).map_err(|e| {
                Error::Signing(format!("reading certificate {}: {}", cert_path.display(), e))
            })?;
            let key_pem = fs::read(key_path).map_err(|e| {
                Error::Signing(format!("reading private key {}: {}", key_path.display(), e))
            })?;

            let cert = X509::from_pem(&cert_pem).map_err(signing_err("parsing certificate"))?;
            let key = PKey::private_key_from_pem(&key_pem).map_err(signing_err("parsing private key"))?;
            let public = cert.public_key().map_err(signing_err("reading certificate key"))?;
            if !public.public_eq(&key) {
                return Err(Error::Signing(
                    "private key does not match certificate".into(),
                ));
            }

            let chain: Stack<X509> = Stack::new().map_err(signing_err("allocating chain"))?;
            let flags = Pkcs7Flags::BINARY;
            let p7 = Pkcs7::sign(&cert, &key, &chain, content, flags)
                .map_err(signing_err("signing"))?;
            let smime = p7
                .to_smime(content, flags)
                .map_err(signing_err("rendering S/MIME"))?;
            String::from_utf8(smime).map_err(|e| Error::Signing(format!("S/MIME output: {}", e)))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::security::request_signer::RequestSigner;
        use base64::{engine::general_purpose, Engine};
        use openssl::asn1::Asn1Time;
        use openssl::bn::BigNum;
        use openssl::hash::MessageDigest;
        use openssl::pkey::Private;
        use openssl::rsa::Rsa;
        use openssl::x509::X509NameBuilder;
        use std::path::PathBuf;
        use tempfile::TempDir;

        fn rsa_key() -> PKey<Private> {
            PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
        }

        fn self_signed(key: &PKey<Private>) -> X509 {
            let mut name = X509NameBuilder::new().unwrap();
            name.append_entry_by_text("CN", "afip-wsaa").unwrap();
            let name = name.build();

            let mut builder = X509::builder().unwrap();
            builder.set_version(2).unwrap();
            let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
            builder.set_serial_number(&serial).unwrap();
            builder.set_subject_name(&name).unwrap();
            builder.set_issuer_name(&name).unwrap();
            builder.set_pubkey(key).unwrap();
            builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
            builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
            builder.sign(key, MessageDigest::sha256()).unwrap();
            builder.build()
        }

        fn write_pem(dir: &TempDir, cert: &X509, key: &PKey<Private>) -> (PathBuf, PathBuf) {
            let cert_path = dir.path().join("acme.crt");
            let key_path = dir.path().join("acme.key");
            fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
            fs::write(&key_path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();
            (cert_path, key_path)
        }

        #[test]
        fn test_signs_into_bare_cms() {
            let dir = tempfile::tempdir().unwrap();
            let key = rsa_key();
            let (cert_path, key_path) = write_pem(&dir, &self_signed(&key), &key);

            let artifact = RequestSigner::new(OpensslBackend)
                .sign("<loginTicketRequest version=\"1.0\"/>", &cert_path, &key_path)
                .unwrap();

            assert!(!artifact.as_str().contains("MIME"));
            assert!(!artifact.as_str().contains(char::is_whitespace));
            let der = general_purpose::STANDARD.decode(artifact.as_str()).unwrap();
            assert!(Pkcs7::from_der(&der).is_ok());
        }

        #[test]
        fn test_mismatched_key_is_signing_error() {
            let dir = tempfile::tempdir().unwrap();
            let cert = self_signed(&rsa_key());
            let (cert_path, key_path) = write_pem(&dir, &cert, &rsa_key());

            let err = OpensslBackend
                .sign_smime(b"<loginTicketRequest/>", &cert_path, &key_path)
                .unwrap_err();
            assert!(matches!(err, Error::Signing(ref m) if m.contains("does not match")));
        }

        #[test]
        fn test_missing_certificate_is_signing_error() {
            let dir = tempfile::tempdir().unwrap();
            let err = OpensslBackend
                .sign_smime(b"<x/>", &dir.path().join("none.crt"), &dir.path().join("none.key"))
                .unwrap_err();
            assert!(matches!(err, Error::Signing(ref m) if m.contains("none.crt")));
        }
    }
}

#[cfg(feature = "openssl")]
pub use openssl_backend::OpensslBackend;
