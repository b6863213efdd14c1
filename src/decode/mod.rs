//! # Resource Decoder (C1)
//!
//! Parses a revision's textual resource values into typed Envoy protobuf
//! messages. Decoding is always strict: an unknown field anywhere in the
//! value is rejected, so an operator typo in a resource value surfaces as a
//! taint rather than being silently dropped.

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::endpoint::v3::ClusterLoadAssignment;
use envoy_types::pb::envoy::config::listener::v3::Listener;
use envoy_types::pb::envoy::config::route::v3::RouteConfiguration;
use envoy_types::pb::envoy::service::runtime::v3::Runtime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::domain::resources::{ResourceFamily, Serialization};
use crate::errors::{RevisionError, Result};

/// A resource decoded into its typed protobuf form. Carries `PartialEq`
/// (derived by `prost` on each inner message) so the snapshot cache can
/// compare resource content while ignoring the revision's version tag.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResource {
    Endpoint(ClusterLoadAssignment),
    Cluster(Cluster),
    Route(RouteConfiguration),
    Listener(Listener),
    Runtime(Runtime),
}

/// Decode one named resource value for `family`. `path` is the structured
/// diagnostic path to attach to a decode failure, e.g.
/// `spec.resources.clusters[0].value`.
pub fn decode(
    family: ResourceFamily,
    name: &str,
    path: &str,
    value: &str,
    serialization: Serialization,
) -> Result<DecodedResource> {
    let json = to_json_value(name, path, value, serialization)?;

    match family {
        ResourceFamily::Endpoints => {
            decode_strict::<ClusterLoadAssignment>(family, name, path, &json).map(DecodedResource::Endpoint)
        }
        ResourceFamily::Clusters => {
            decode_strict::<Cluster>(family, name, path, &json).map(DecodedResource::Cluster)
        }
        ResourceFamily::Routes => {
            decode_strict::<RouteConfiguration>(family, name, path, &json).map(DecodedResource::Route)
        }
        ResourceFamily::Listeners => {
            decode_strict::<Listener>(family, name, path, &json).map(DecodedResource::Listener)
        }
        ResourceFamily::Runtimes => {
            decode_strict::<Runtime>(family, name, path, &json).map(DecodedResource::Runtime)
        }
        ResourceFamily::Secrets => Err(RevisionError::internal(
            "the secrets family is resolved via the secret resolver, never decoded directly",
        )),
    }
}

fn to_json_value(
    name: &str,
    path: &str,
    value: &str,
    serialization: Serialization,
) -> Result<Value> {
    match serialization {
        Serialization::Json => serde_json::from_str(value)
            .map_err(|e| RevisionError::decode("resource", name, path, e)),
        Serialization::Yaml => {
            let yaml_value: serde_yaml::Value = serde_yaml::from_str(value)
                .map_err(|e| RevisionError::decode("resource", name, path, e))?;
            serde_json::to_value(yaml_value)
                .map_err(|e| RevisionError::decode("resource", name, path, e))
        }
    }
}

fn decode_strict<T>(family: ResourceFamily, name: &str, path: &str, json: &Value) -> Result<T>
where
    T: DeserializeOwned + Serialize,
{
    let decoded: T = serde_json::from_value(json.clone())
        .map_err(|e| RevisionError::decode(family.as_str(), name, path, e))?;

    let roundtripped = serde_json::to_value(&decoded)
        .map_err(|e| RevisionError::decode(family.as_str(), name, path, e))?;

    if let Some(unknown) = first_dropped_field(json, &roundtripped) {
        return Err(RevisionError::decode(
            family.as_str(),
            name,
            path,
            format!("unknown field '{}'", unknown),
        ));
    }

    Ok(decoded)
}

/// Finds a field present in `raw` that vanished after decode-and-re-encode,
/// which is how an unrecognized key surfaces on types without
/// `#[serde(deny_unknown_fields)]`. Returns the first dotted path found.
fn first_dropped_field(raw: &Value, roundtripped: &Value) -> Option<String> {
    fn walk(raw: &Value, roundtripped: &Value, prefix: &str) -> Option<String> {
        match (raw, roundtripped) {
            (Value::Object(raw_map), Value::Object(decoded_map)) => {
                for (key, raw_val) in raw_map {
                    let field_path =
                        if prefix.is_empty() { key.clone() } else { format!("{}.{}", prefix, key) };
                    match decoded_map.get(key) {
                        None => return Some(field_path),
                        Some(decoded_val) => {
                            if let Some(found) = walk(raw_val, decoded_val, &field_path) {
                                return Some(found);
                            }
                        }
                    }
                }
                None
            }
            (Value::Array(raw_items), Value::Array(decoded_items)) => {
                for (i, raw_item) in raw_items.iter().enumerate() {
                    let decoded_item = decoded_items.get(i)?;
                    if let Some(found) = walk(raw_item, decoded_item, &format!("{}[{}]", prefix, i)) {
                        return Some(found);
                    }
                }
                None
            }
            _ => None,
        }
    }
    walk(raw, roundtripped, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_minimal_cluster_from_json() {
        let value = r#"{"name": "my-cluster"}"#;
        let decoded = decode(
            ResourceFamily::Clusters,
            "my-cluster",
            "spec.resources.clusters[0].value",
            value,
            Serialization::Json,
        )
        .unwrap();
        assert!(matches!(decoded, DecodedResource::Cluster(c) if c.name == "my-cluster"));
    }

    #[test]
    fn decodes_the_same_cluster_from_yaml() {
        let value = "name: my-cluster\n";
        let decoded = decode(
            ResourceFamily::Clusters,
            "my-cluster",
            "spec.resources.clusters[0].value",
            value,
            Serialization::Yaml,
        )
        .unwrap();
        assert!(matches!(decoded, DecodedResource::Cluster(c) if c.name == "my-cluster"));
    }

    #[test]
    fn rejects_an_unknown_top_level_field() {
        let value = r#"{"name": "my-cluster", "nmae": "typo"}"#;
        let result = decode(
            ResourceFamily::Clusters,
            "my-cluster",
            "spec.resources.clusters[0].value",
            value,
            Serialization::Json,
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("nmae"));
    }

    #[test]
    fn rejects_malformed_json() {
        let result = decode(
            ResourceFamily::Clusters,
            "my-cluster",
            "spec.resources.clusters[0].value",
            "{not json",
            Serialization::Json,
        );
        assert!(result.is_err());
    }

    #[test]
    fn secrets_family_is_never_decoded_here() {
        let result = decode(
            ResourceFamily::Secrets,
            "my-secret",
            "spec.resources.secrets[0].value",
            "{}",
            Serialization::Json,
        );
        assert!(result.is_err());
    }
}
