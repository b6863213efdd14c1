use envoy_types::pb::envoy::config::core::v3::data_source::Specifier;
use envoy_types::pb::envoy::config::core::v3::DataSource;
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::secret::Type as SecretTypeOneof;
use envoy_types::pb::envoy::extensions::transport_sockets::tls::v3::{Secret, TlsCertificate};

use crate::domain::resources::SecretRef;
use crate::domain::secret::{SecretObject, SecretType};
use crate::errors::{RevisionError, Result};

/// Resolves `secret_object` (already fetched by the caller from the
/// orchestrator's secret store) into the Envoy SDS secret Envoy will
/// receive under resource name `local_name`.
///
/// `secret_object` must declare [`SecretType::TlsPair`] and carry a
/// [`TlsPair`](crate::domain::secret::TlsPair); any other shape is rejected
/// as a user-data fault, never an infrastructure one.
pub fn resolve(
    secret_ref: &SecretRef,
    local_name: &str,
    secret_object: &SecretObject,
) -> Result<Secret> {
    if secret_object.secret_type != SecretType::TlsPair {
        return Err(RevisionError::secret_wrong_type(
            secret_ref.namespace.as_str(),
            secret_ref.name.as_str(),
            secret_object.secret_type.as_str(),
        ));
    }

    let pair = secret_object.tls.as_ref().ok_or_else(|| {
        RevisionError::secret_wrong_type(
            secret_ref.namespace.as_str(),
            secret_ref.name.as_str(),
            "tls-pair (missing key material)",
        )
    })?;

    let certificate = TlsCertificate {
        certificate_chain: Some(inline_bytes(pair.cert_pem.as_bytes())),
        private_key: Some(inline_bytes(pair.key_pem.as_bytes())),
        ..Default::default()
    };

    Ok(Secret {
        name: local_name.to_string(),
        r#type: Some(SecretTypeOneof::TlsCertificate(certificate)),
    })
}

fn inline_bytes(bytes: &[u8]) -> DataSource {
    DataSource { specifier: Some(Specifier::InlineBytes(bytes.to_vec())), ..Default::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::id::{Name, Namespace};
    use crate::domain::secret::TlsPair;

    fn tls_secret() -> SecretObject {
        SecretObject {
            namespace: Namespace::new("default"),
            name: Name::new("server-cert"),
            secret_type: SecretType::TlsPair,
            tls: Some(TlsPair { cert_pem: "CERT".to_string(), key_pem: "KEY".to_string() }),
        }
    }

    #[test]
    fn resolves_a_tls_pair_into_inline_bytes() {
        let secret_ref = SecretRef::new("default", "server-cert");
        let resolved = resolve(&secret_ref, "server-cert", &tls_secret()).unwrap();
        assert_eq!(resolved.name, "server-cert");
        match resolved.r#type {
            Some(SecretTypeOneof::TlsCertificate(cert)) => {
                let Some(DataSource { specifier: Some(Specifier::InlineBytes(chain)) }) =
                    cert.certificate_chain
                else {
                    panic!("expected inline certificate chain");
                };
                assert_eq!(chain, b"CERT");
            }
            other => panic!("unexpected secret type: {other:?}"),
        }
    }

    #[test]
    fn rejects_an_opaque_secret() {
        let secret_ref = SecretRef::new("default", "api-key");
        let mut secret = tls_secret();
        secret.secret_type = SecretType::Opaque;
        secret.tls = None;
        let err = resolve(&secret_ref, "api-key", &secret).unwrap_err();
        assert!(!err.is_infra());
        assert!(err.to_string().contains("unsupported type"));
    }

    #[test]
    fn rejects_a_tls_pair_type_missing_key_material() {
        let secret_ref = SecretRef::new("default", "server-cert");
        let mut secret = tls_secret();
        secret.tls = None;
        let err = resolve(&secret_ref, "server-cert", &secret).unwrap_err();
        assert!(!err.is_infra());
    }
}
