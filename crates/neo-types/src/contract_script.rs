//! Verification-script builders and classifiers.
//!
//! Signature and multi-signature accounts are ordinary scripts with a
//! fixed shape; building and recognizing those shapes is needed by
//! address derivation, block witness checks and the notary service.

use crate::error::TypeError;
use neo_crypto::ecdsa::ECPoint;
use neo_crypto::sha256;

const OP_PUSHDATA1: u8 = 0x0C;
const OP_PUSHINT8: u8 = 0x00;
const OP_PUSH0: u8 = 0x10;
const OP_SYSCALL: u8 = 0x41;

/// Interop routine consumed by single-signature scripts.
pub const SYSCALL_CHECK_SIG: &str = "System.Crypto.CheckSig";
/// Interop routine consumed by multi-signature scripts.
pub const SYSCALL_CHECK_MULTISIG: &str = "System.Crypto.CheckMultisig";

/// The 32-bit interop number for a syscall name: first four bytes of
/// SHA-256(name), little-endian.
#[must_use]
pub fn syscall_number(name: &str) -> u32 {
    let digest = sha256(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

fn emit_push_int(script: &mut Vec<u8>, value: u8) {
    debug_assert!(value <= 16 || value <= 127);
    if value <= 16 {
        script.push(OP_PUSH0 + value);
    } else {
        script.push(OP_PUSHINT8);
        script.push(value);
    }
}

fn emit_syscall(script: &mut Vec<u8>, name: &str) {
    script.push(OP_SYSCALL);
    script.extend_from_slice(&syscall_number(name).to_le_bytes());
}

/// Build the verification script for a single public key.
#[must_use]
pub fn signature_redeem_script(key: &ECPoint) -> Vec<u8> {
    let mut script = Vec::with_capacity(40);
    script.push(OP_PUSHDATA1);
    script.push(33);
    script.extend_from_slice(&key.encode_compressed());
    emit_syscall(&mut script, SYSCALL_CHECK_SIG);
    script
}

/// Build the verification script for an m-of-n multi-signature account.
/// Keys are sorted by their compressed encoding before emission, so the
/// same key set always yields the same script hash.
pub fn multisig_redeem_script(m: usize, keys: &[ECPoint]) -> Result<Vec<u8>, TypeError> {
    let n = keys.len();
    if m == 0 || m > n || n > 16 {
        return Err(TypeError::OutOfRange(format!("multisig {m}-of-{n}")));
    }
    let mut sorted: Vec<&ECPoint> = keys.iter().collect();
    sorted.sort();

    let mut script = Vec::with_capacity(3 + 35 * n + 5);
    emit_push_int(&mut script, m as u8);
    for key in sorted {
        script.push(OP_PUSHDATA1);
        script.push(33);
        script.extend_from_slice(&key.encode_compressed());
    }
    emit_push_int(&mut script, n as u8);
    emit_syscall(&mut script, SYSCALL_CHECK_MULTISIG);
    Ok(script)
}

/// True for the exact single-signature script shape.
#[must_use]
pub fn is_signature_script(script: &[u8]) -> bool {
    script.len() == 40
        && script[0] == OP_PUSHDATA1
        && script[1] == 33
        && script[35] == OP_SYSCALL
        && script[36..40] == syscall_number(SYSCALL_CHECK_SIG).to_le_bytes()
}

/// Parse a multi-signature script, returning `(m, public keys)`.
pub fn parse_multisig_script(script: &[u8]) -> Option<(usize, Vec<ECPoint>)> {
    let mut position = 0;
    let read_small_int = |script: &[u8], position: &mut usize| -> Option<usize> {
        let opcode = *script.get(*position)?;
        if (OP_PUSH0 + 1..=OP_PUSH0 + 16).contains(&opcode) {
            *position += 1;
            Some((opcode - OP_PUSH0) as usize)
        } else if opcode == OP_PUSHINT8 {
            let value = *script.get(*position + 1)?;
            *position += 2;
            Some(value as usize)
        } else {
            None
        }
    };

    let m = read_small_int(script, &mut position)?;
    let mut keys = Vec::new();
    while script.get(position) == Some(&OP_PUSHDATA1) {
        if script.get(position + 1) != Some(&33) {
            return None;
        }
        let bytes = script.get(position + 2..position + 35)?;
        keys.push(ECPoint::from_bytes(bytes).ok()?);
        position += 35;
    }
    let n = read_small_int(script, &mut position)?;
    if n != keys.len() || m == 0 || m > n {
        return None;
    }
    if script.get(position) != Some(&OP_SYSCALL) {
        return None;
    }
    let number = script.get(position + 1..position + 5)?;
    if number != syscall_number(SYSCALL_CHECK_MULTISIG).to_le_bytes() {
        return None;
    }
    if position + 5 != script.len() {
        return None;
    }
    Some((m, keys))
}

/// True for the multi-signature script shape.
#[must_use]
pub fn is_multisig_script(script: &[u8]) -> bool {
    parse_multisig_script(script).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo_crypto::KeyPair;

    #[test]
    fn test_signature_script_shape() {
        let keypair = KeyPair::generate();
        let script = signature_redeem_script(keypair.public_key());
        assert_eq!(script.len(), 40);
        assert!(is_signature_script(&script));
        assert!(!is_multisig_script(&script));
    }

    #[test]
    fn test_multisig_script_parses_back() {
        let keys: Vec<_> = (0..4)
            .map(|_| KeyPair::generate().public_key().clone())
            .collect();
        let script = multisig_redeem_script(3, &keys).unwrap();
        let (m, parsed) = parse_multisig_script(&script).unwrap();
        assert_eq!(m, 3);
        assert_eq!(parsed.len(), 4);
        assert!(is_multisig_script(&script));
        assert!(!is_signature_script(&script));
    }

    #[test]
    fn test_multisig_script_is_order_independent() {
        let keys: Vec<_> = (0..3)
            .map(|_| KeyPair::generate().public_key().clone())
            .collect();
        let mut shuffled = keys.clone();
        shuffled.reverse();
        assert_eq!(
            multisig_redeem_script(2, &keys).unwrap(),
            multisig_redeem_script(2, &shuffled).unwrap()
        );
    }

    #[test]
    fn test_multisig_bounds() {
        let keys: Vec<_> = (0..2)
            .map(|_| KeyPair::generate().public_key().clone())
            .collect();
        assert!(multisig_redeem_script(0, &keys).is_err());
        assert!(multisig_redeem_script(3, &keys).is_err());
    }
}
