//! Contract manifests.
//!
//! The manifest is the JSON document shipped alongside a contract's NEF:
//! name, groups, supported standards, ABI, permissions and trusts. The
//! serialized form is capped at 64 KiB.

use crate::error::TypeError;
use crate::hashes::Hash160;
use serde::{Deserialize, Serialize};

/// Maximum serialized manifest size in bytes.
pub const MAX_MANIFEST_SIZE: usize = 0xFFFF;

/// Parameter and return types of the contract ABI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractParameterType {
    /// Any type.
    Any,
    /// Boolean flag.
    Boolean,
    /// Arbitrary-precision integer.
    Integer,
    /// Raw bytes.
    ByteArray,
    /// UTF-8 string.
    String,
    /// 20-byte hash.
    Hash160,
    /// 32-byte hash.
    Hash256,
    /// 33-byte compressed public key.
    PublicKey,
    /// 64-byte signature.
    Signature,
    /// Ordered list.
    Array,
    /// Key-value map.
    Map,
    /// Opaque host handle.
    InteropInterface,
    /// No value.
    Void,
}

/// A named, typed ABI parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    #[serde(rename = "type")]
    pub parameter_type: ContractParameterType,
}

/// An ABI method descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMethod {
    /// Method name.
    pub name: String,
    /// Declared parameters.
    pub parameters: Vec<ContractParameter>,
    /// Return type.
    #[serde(rename = "returntype")]
    pub return_type: ContractParameterType,
    /// Entry offset into the contract script.
    pub offset: u32,
    /// Safe methods are callable without write permissions.
    pub safe: bool,
}

/// An ABI event descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    /// Event name.
    pub name: String,
    /// Event parameters.
    pub parameters: Vec<ContractParameter>,
}

/// The contract ABI: methods and events.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractAbi {
    /// Exported methods.
    pub methods: Vec<ContractMethod>,
    /// Declared events.
    pub events: Vec<ContractEvent>,
}

impl ContractAbi {
    /// Find a method by name and parameter count.
    #[must_use]
    pub fn method(&self, name: &str, parameter_count: usize) -> Option<&ContractMethod> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.parameters.len() == parameter_count)
    }
}

/// A group a contract belongs to: a public key plus its signature over
/// the contract hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGroup {
    /// Compressed public key, hex-encoded.
    pub pubkey: String,
    /// Base64 signature of the contract hash.
    pub signature: String,
}

/// A wildcard-or-list container used by permissions and trusts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wildcard<T> {
    /// Matches anything (serialized as `"*"`).
    Any,
    /// Matches only the listed values.
    List(Vec<T>),
}

impl<T> Wildcard<T> {
    /// True for the wildcard.
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Wildcard::Any)
    }

    /// Check membership with a predicate over the listed values.
    pub fn permits(&self, predicate: impl Fn(&T) -> bool) -> bool {
        match self {
            Wildcard::Any => true,
            Wildcard::List(items) => items.iter().any(predicate),
        }
    }
}

impl<T: Serialize> Serialize for Wildcard<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Wildcard::Any => serializer.serialize_str("*"),
            Wildcard::List(items) => items.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Wildcard<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::String(s) if s == "*" => Ok(Wildcard::Any),
            serde_json::Value::Array(_) => {
                let items = Vec::<T>::deserialize(value).map_err(D::Error::custom)?;
                Ok(Wildcard::List(items))
            }
            _ => Err(D::Error::custom("expected \"*\" or an array")),
        }
    }
}

/// What a contract is allowed to call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPermission {
    /// `"*"`, a contract hash, or a group public key.
    pub contract: Wildcard<String>,
    /// `"*"` or a list of callable method names.
    pub methods: Wildcard<String>,
}

impl ContractPermission {
    /// The catch-all permission.
    #[must_use]
    pub fn default_permission() -> Self {
        Self {
            contract: Wildcard::Any,
            methods: Wildcard::Any,
        }
    }
}

/// A deployed contract's manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractManifest {
    /// Contract name.
    pub name: String,
    /// Groups the contract belongs to.
    pub groups: Vec<ContractGroup>,
    /// Reserved feature object.
    #[serde(default)]
    pub features: serde_json::Map<String, serde_json::Value>,
    /// NEP standards the contract claims to implement.
    #[serde(rename = "supportedstandards")]
    pub supported_standards: Vec<String>,
    /// The ABI.
    pub abi: ContractAbi,
    /// Call permissions.
    pub permissions: Vec<ContractPermission>,
    /// Contracts this one trusts to call it.
    pub trusts: Wildcard<String>,
    /// Free-form metadata.
    pub extra: serde_json::Value,
}

impl ContractManifest {
    /// A minimal manifest with no groups and full permissions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            features: serde_json::Map::new(),
            supported_standards: Vec::new(),
            abi: ContractAbi::default(),
            permissions: vec![ContractPermission::default_permission()],
            trusts: Wildcard::List(Vec::new()),
            extra: serde_json::Value::Null,
        }
    }

    /// Parse from JSON, enforcing the size cap and a non-empty name.
    pub fn from_json(json: &str) -> Result<Self, TypeError> {
        if json.len() > MAX_MANIFEST_SIZE {
            return Err(TypeError::InvalidManifest(format!(
                "{} bytes exceeds the 64 KiB cap",
                json.len()
            )));
        }
        let manifest: Self = serde_json::from_str(json)
            .map_err(|e| TypeError::InvalidManifest(e.to_string()))?;
        if manifest.name.is_empty() {
            return Err(TypeError::InvalidManifest("empty name".into()));
        }
        Ok(manifest)
    }

    /// Canonical JSON rendering.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("manifest serialization is infallible")
    }

    /// True if this manifest may call `method` on the contract `target`.
    #[must_use]
    pub fn can_call(&self, target: &Hash160, method: &str) -> bool {
        let target_text = target.to_string();
        self.permissions.iter().any(|permission| {
            permission
                .contract
                .permits(|c| c.eq_ignore_ascii_case(&target_text))
                && permission.methods.permits(|m| m == method)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_json_round_trip() {
        let mut manifest = ContractManifest::new("token");
        manifest.supported_standards = vec!["NEP-17".into()];
        manifest.abi.methods.push(ContractMethod {
            name: "transfer".into(),
            parameters: vec![
                ContractParameter {
                    name: "from".into(),
                    parameter_type: ContractParameterType::Hash160,
                },
                ContractParameter {
                    name: "to".into(),
                    parameter_type: ContractParameterType::Hash160,
                },
            ],
            return_type: ContractParameterType::Boolean,
            offset: 0,
            safe: false,
        });

        let json = manifest.to_json();
        let parsed = ContractManifest::from_json(&json).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_wildcard_serialization() {
        let manifest = ContractManifest::new("anything");
        let json = manifest.to_json();
        assert!(json.contains("\"contract\":\"*\""));

        let parsed = ContractManifest::from_json(&json).unwrap();
        assert!(parsed.permissions[0].contract.is_any());
    }

    #[test]
    fn test_size_cap() {
        let huge = format!(
            "{{\"name\":\"{}\"}}",
            "x".repeat(MAX_MANIFEST_SIZE)
        );
        assert!(matches!(
            ContractManifest::from_json(&huge),
            Err(TypeError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_method_lookup() {
        let mut manifest = ContractManifest::new("m");
        manifest.abi.methods.push(ContractMethod {
            name: "balanceOf".into(),
            parameters: vec![ContractParameter {
                name: "account".into(),
                parameter_type: ContractParameterType::Hash160,
            }],
            return_type: ContractParameterType::Integer,
            offset: 4,
            safe: true,
        });
        assert!(manifest.abi.method("balanceOf", 1).is_some());
        assert!(manifest.abi.method("balanceOf", 2).is_none());
        assert!(manifest.abi.method("transfer", 1).is_none());
    }
}
