//! RoleManagement: committee-designated node role lists.
//!
//! Designations are indexed by the block height at which they take
//! effect; lookups return the most recent designation at or before the
//! queried height.

use super::{check_committee, get_item, put_item, NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::engine::HostState;
use crate::error::ContractError;
use neo_crypto::ecdsa::ECPoint;
use neo_store::DataCache;
use neo_types::io::{BinaryReader, BinaryWriter};
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_traits::ToPrimitive;

/// Contract id.
pub const ID: i32 = -8;

/// Designatable node roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Role {
    /// State-root signers.
    StateValidator = 4,
    /// Oracle responders.
    Oracle = 8,
    /// NeoFS alphabet nodes.
    NeoFsAlphabet = 16,
    /// Notary service nodes.
    P2PNotary = 32,
}

impl Role {
    /// Decode a role byte.
    pub fn from_byte(byte: u8) -> Result<Self, ContractError> {
        match byte {
            4 => Ok(Role::StateValidator),
            8 => Ok(Role::Oracle),
            16 => Ok(Role::NeoFsAlphabet),
            32 => Ok(Role::P2PNotary),
            other => Err(ContractError::InvalidArgument(format!("role {other}"))),
        }
    }
}

fn designation_suffix(role: Role, index: u32) -> Vec<u8> {
    let mut suffix = Vec::with_capacity(5);
    suffix.push(role as u8);
    suffix.extend_from_slice(&index.to_be_bytes());
    suffix
}

fn encode_nodes(nodes: &[ECPoint]) -> Vec<u8> {
    let mut writer = BinaryWriter::new();
    writer.write_var_int(nodes.len() as u64);
    for node in nodes {
        writer.write_bytes(&node.encode_compressed());
    }
    writer.into_bytes()
}

fn decode_nodes(bytes: &[u8]) -> Result<Vec<ECPoint>, ContractError> {
    let mut reader = BinaryReader::new(bytes);
    let count = reader.read_var_int(256)? as usize;
    let mut nodes = Vec::with_capacity(count);
    for _ in 0..count {
        let raw = reader.read_bytes(33)?;
        nodes.push(
            ECPoint::from_bytes(&raw).map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
        );
    }
    Ok(nodes)
}

/// Nodes designated for `role`, effective at `index`.
pub fn designated_by_role(
    cache: &mut DataCache,
    role: Role,
    index: u32,
) -> Result<Vec<ECPoint>, ContractError> {
    let mut prefix = neo_store::StorageKey::prefix_for(ID);
    prefix.push(role as u8);
    let mut best: Option<(u32, Vec<u8>)> = None;
    for (key, item) in cache.find(&prefix)? {
        let raw: [u8; 4] = key.suffix[1..]
            .try_into()
            .map_err(|_| ContractError::Other("bad designation key".into()))?;
        let at = u32::from_be_bytes(raw);
        if at <= index && best.as_ref().map_or(true, |(current, _)| at >= *current) {
            best = Some((at, item.value));
        }
    }
    match best {
        Some((_, bytes)) => decode_nodes(&bytes),
        None => Ok(Vec::new()),
    }
}

/// The role native.
pub struct RoleManagement {
    methods: Vec<NativeMethod>,
}

impl RoleManagement {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            NativeMethod {
                name: "getDesignatedByRole",
                required_flags: CallFlags::READ_STATES,
                price: 1 << 15,
                handler: get_designated_method,
            },
            NativeMethod {
                name: "designateAsRole",
                required_flags: CallFlags::STATES,
                price: 1 << 15,
                handler: designate_method,
            },
        ];
        Self { methods }
    }
}

impl Default for RoleManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for RoleManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "RoleManagement"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }
}

fn arg_role(args: &mut Vec<StackItem>) -> Result<Role, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing role".into()));
    }
    let byte = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_u8()
        .ok_or_else(|| ContractError::InvalidArgument("role out of range".into()))?;
    Role::from_byte(byte)
}

fn get_designated_method(
    host: &mut HostState,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let role = arg_role(&mut args)?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing index".into()));
    }
    let index = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_u32()
        .ok_or_else(|| ContractError::InvalidArgument("index out of range".into()))?;
    let nodes = designated_by_role(&mut host.snapshot, role, index)?;
    Ok(StackItem::array(
        nodes
            .into_iter()
            .map(|node| StackItem::byte_string(node.encode_compressed().to_vec()))
            .collect(),
    ))
}

fn designate_method(
    host: &mut HostState,
    engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let role = arg_role(&mut args)?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing node list".into()));
    }
    let nodes_item = args.remove(0);
    let StackItem::Array(items) = &nodes_item else {
        return Err(ContractError::InvalidArgument("nodes must be an array".into()));
    };
    let mut nodes = Vec::new();
    for item in items.borrow().iter() {
        let bytes = item.to_byte_vec().map_err(ContractError::from)?;
        nodes.push(
            ECPoint::from_bytes(&bytes)
                .map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
        );
    }
    if nodes.is_empty() || nodes.len() > 32 {
        return Err(ContractError::InvalidArgument(format!(
            "{} nodes designated",
            nodes.len()
        )));
    }
    if !check_committee(host, engine)? {
        return Err(ContractError::CheckWitnessFailed);
    }
    // The designation takes effect from the block after the current one.
    let index = host
        .persisting_block
        .as_ref()
        .map(|b| b.header.index + 1)
        .unwrap_or(0);
    nodes.sort();
    put_item(
        &mut host.snapshot,
        ID,
        &designation_suffix(role, index),
        encode_nodes(&nodes),
    )?;
    Ok(StackItem::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_crypto::KeyPair;
    use neo_store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_latest_designation_wins() {
        let mut cache = DataCache::new(Arc::new(MemoryStore::new()));
        let early: Vec<ECPoint> = vec![KeyPair::generate().public_key().clone()];
        let late: Vec<ECPoint> = vec![
            KeyPair::generate().public_key().clone(),
            KeyPair::generate().public_key().clone(),
        ];
        put_item(
            &mut cache,
            ID,
            &designation_suffix(Role::Oracle, 10),
            encode_nodes(&early),
        )
        .unwrap();
        put_item(
            &mut cache,
            ID,
            &designation_suffix(Role::Oracle, 20),
            encode_nodes(&late),
        )
        .unwrap();

        assert_eq!(
            designated_by_role(&mut cache, Role::Oracle, 15).unwrap().len(),
            1
        );
        assert_eq!(
            designated_by_role(&mut cache, Role::Oracle, 25).unwrap().len(),
            2
        );
        assert!(designated_by_role(&mut cache, Role::Oracle, 5)
            .unwrap()
            .is_empty());
        assert!(designated_by_role(&mut cache, Role::P2PNotary, 25)
            .unwrap()
            .is_empty());
    }
}
