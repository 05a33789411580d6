//! CryptoLib: hashing, ECDSA verification and BLS12-381 group ops.

use super::{NativeContract, NativeMethod};
use crate::call_flags::CallFlags;
use crate::error::ContractError;
use neo_crypto::bls::BlsPoint;
use neo_crypto::ecdsa::{ECPoint, Secp256r1Signature};
use neo_crypto::{hash160, hash256, murmur32, ripemd160, sha256};
use neo_types::Hash160;
use neo_vm::{ExecutionEngine, StackItem};
use num_traits::ToPrimitive;
use std::rc::Rc;

/// Contract id.
pub const ID: i32 = -3;

/// Curve selector for `verifyWithECDsa`.
pub const CURVE_SECP256R1: i64 = 23;

/// The CryptoLib native.
pub struct CryptoLib {
    methods: Vec<NativeMethod>,
}

macro_rules! method {
    ($name:literal, $price:expr, $handler:expr) => {
        NativeMethod {
            name: $name,
            required_flags: CallFlags::NONE,
            price: $price,
            handler: $handler,
        }
    };
}

impl CryptoLib {
    /// Build the method table.
    #[must_use]
    pub fn new() -> Self {
        let methods = vec![
            method!("sha256", 1 << 15, sha256_method),
            method!("ripemd160", 1 << 15, ripemd160_method),
            method!("hash160", 1 << 15, hash160_method),
            method!("hash256", 1 << 15, hash256_method),
            method!("murmur32", 1 << 13, murmur32_method),
            method!("verifyWithECDsa", 1 << 15, verify_with_ecdsa_method),
            method!("bls12381Serialize", 1 << 19, bls_serialize_method),
            method!("bls12381Deserialize", 1 << 19, bls_deserialize_method),
            method!("bls12381Equal", 1 << 5, bls_equal_method),
            method!("bls12381Add", 1 << 19, bls_add_method),
            method!("bls12381Mul", 1 << 21, bls_mul_method),
            method!("bls12381Pairing", 1 << 23, bls_pairing_method),
        ];
        Self { methods }
    }
}

impl Default for CryptoLib {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for CryptoLib {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "CryptoLib"
    }

    fn hash(&self) -> Hash160 {
        super::native_contract_hash(self.name())
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

type Host<'a> = &'a mut crate::engine::HostState;

fn arg_bytes(args: &mut Vec<StackItem>, what: &str) -> Result<Vec<u8>, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument(format!("missing {what}")));
    }
    args.remove(0).to_byte_vec().map_err(ContractError::from)
}

fn sha256_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let data = arg_bytes(&mut args, "data")?;
    Ok(StackItem::byte_string(sha256(&data).to_vec()))
}

fn ripemd160_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let data = arg_bytes(&mut args, "data")?;
    Ok(StackItem::byte_string(ripemd160(&data).to_vec()))
}

fn hash160_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let data = arg_bytes(&mut args, "data")?;
    Ok(StackItem::byte_string(hash160(&data).to_vec()))
}

fn hash256_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let data = arg_bytes(&mut args, "data")?;
    Ok(StackItem::byte_string(hash256(&data).to_vec()))
}

fn murmur32_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let data = arg_bytes(&mut args, "data")?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing seed".into()));
    }
    let seed = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_u32()
        .ok_or_else(|| ContractError::InvalidArgument("seed out of range".into()))?;
    Ok(StackItem::byte_string(
        murmur32(&data, seed).to_le_bytes().to_vec(),
    ))
}

fn verify_with_ecdsa_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let message = arg_bytes(&mut args, "message")?;
    let pubkey = arg_bytes(&mut args, "public key")?;
    let signature = arg_bytes(&mut args, "signature")?;
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing curve".into()));
    }
    let curve = args
        .remove(0)
        .to_integer()
        .map_err(ContractError::from)?
        .to_i64()
        .unwrap_or(0);
    if curve != CURVE_SECP256R1 {
        return Err(ContractError::InvalidArgument(format!(
            "unsupported curve {curve}"
        )));
    }
    let result = match (
        ECPoint::from_bytes(&pubkey),
        Secp256r1Signature::from_bytes(&signature),
    ) {
        (Ok(point), Ok(signature)) => point.verify(&message, &signature),
        _ => false,
    };
    Ok(StackItem::Boolean(result))
}

// =============================================================================
// BLS12-381
// =============================================================================

fn pop_bls(args: &mut Vec<StackItem>) -> Result<BlsPoint, ContractError> {
    if args.is_empty() {
        return Err(ContractError::InvalidArgument("missing point".into()));
    }
    let item = args.remove(0);
    let StackItem::InteropInterface(handle) = item else {
        return Err(ContractError::InvalidArgument("expected a point handle".into()));
    };
    handle
        .downcast_ref::<BlsPoint>()
        .copied()
        .ok_or_else(|| ContractError::InvalidArgument("expected a point handle".into()))
}

fn bls_serialize_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let point = pop_bls(&mut args)?;
    Ok(StackItem::byte_string(point.serialize()))
}

fn bls_deserialize_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let bytes = arg_bytes(&mut args, "point")?;
    let point = BlsPoint::deserialize(&bytes)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    Ok(StackItem::InteropInterface(Rc::new(point)))
}

fn bls_equal_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let a = pop_bls(&mut args)?;
    let b = pop_bls(&mut args)?;
    Ok(StackItem::Boolean(
        a.equals(&b)
            .map_err(|e| ContractError::InvalidArgument(e.to_string()))?,
    ))
}

fn bls_add_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let a = pop_bls(&mut args)?;
    let b = pop_bls(&mut args)?;
    let sum = a
        .add(&b)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    Ok(StackItem::InteropInterface(Rc::new(sum)))
}

fn bls_mul_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let point = pop_bls(&mut args)?;
    let scalar_bytes = arg_bytes(&mut args, "scalar")?;
    let scalar: [u8; 32] = scalar_bytes
        .try_into()
        .map_err(|_| ContractError::InvalidArgument("scalar must be 32 bytes".into()))?;
    let negate = if args.is_empty() {
        false
    } else {
        args.remove(0).to_boolean()
    };
    let product = point
        .mul(&scalar, negate)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    Ok(StackItem::InteropInterface(Rc::new(product)))
}

fn bls_pairing_method(
    _host: Host<'_>,
    _engine: &mut ExecutionEngine,
    mut args: Vec<StackItem>,
) -> Result<StackItem, ContractError> {
    let g1 = pop_bls(&mut args)?;
    let g2 = pop_bls(&mut args)?;
    let gt = BlsPoint::pairing(&g1, &g2)
        .map_err(|e| ContractError::InvalidArgument(e.to_string()))?;
    Ok(StackItem::InteropInterface(Rc::new(gt)))
}
