//! BLS12-381 group operations via blst.
//!
//! Backs the CryptoLib native contract: points arrive from scripts as
//! compressed G1 (48 bytes), compressed G2 (96 bytes) or raw Gt (576
//! bytes, twelve big-endian fp components), and scripts combine them with
//! add / scalar-mul / pairing. All points are subgroup-checked on decode.

use crate::errors::CryptoError;
use blst::{
    blst_bendian_from_fp, blst_final_exp, blst_fp, blst_fp12, blst_fp12_inverse,
    blst_fp12_is_equal, blst_fp12_mul, blst_fp12_one, blst_fp12_sqr, blst_fp_from_bendian,
    blst_miller_loop, blst_p1, blst_p1_add_or_double, blst_p1_affine, blst_p1_affine_compress,
    blst_p1_affine_in_g1, blst_p1_affine_is_equal, blst_p1_cneg, blst_p1_from_affine,
    blst_p1_mult, blst_p1_to_affine, blst_p1_uncompress, blst_p2, blst_p2_add_or_double,
    blst_p2_affine, blst_p2_affine_compress, blst_p2_affine_in_g2, blst_p2_affine_is_equal,
    blst_p2_cneg, blst_p2_from_affine, blst_p2_mult, blst_p2_to_affine, blst_p2_uncompress,
    blst_scalar, blst_scalar_from_lendian, BLST_ERROR,
};

/// Compressed G1 length.
pub const G1_LEN: usize = 48;
/// Compressed G2 length.
pub const G2_LEN: usize = 96;
/// Serialized Gt length (12 fp components, 48 bytes each).
pub const GT_LEN: usize = 576;

/// A point in one of the three BLS12-381 groups.
#[derive(Clone, Copy)]
pub enum BlsPoint {
    /// G1 affine point.
    G1(blst_p1_affine),
    /// G2 affine point.
    G2(blst_p2_affine),
    /// Target-group element.
    Gt(blst_fp12),
}

impl BlsPoint {
    /// Decode a serialized point; the group is inferred from the length.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            G1_LEN => {
                let mut point = unsafe { std::mem::zeroed::<blst_p1_affine>() };
                let err = unsafe { blst_p1_uncompress(&mut point, bytes.as_ptr()) };
                if err != BLST_ERROR::BLST_SUCCESS || !unsafe { blst_p1_affine_in_g1(&point) } {
                    return Err(CryptoError::InvalidBlsPoint);
                }
                Ok(BlsPoint::G1(point))
            }
            G2_LEN => {
                let mut point = unsafe { std::mem::zeroed::<blst_p2_affine>() };
                let err = unsafe { blst_p2_uncompress(&mut point, bytes.as_ptr()) };
                if err != BLST_ERROR::BLST_SUCCESS || !unsafe { blst_p2_affine_in_g2(&point) } {
                    return Err(CryptoError::InvalidBlsPoint);
                }
                Ok(BlsPoint::G2(point))
            }
            GT_LEN => {
                let mut fp12 = unsafe { std::mem::zeroed::<blst_fp12>() };
                let mut offset = 0;
                for fp6 in fp12.fp6.iter_mut() {
                    for fp2 in fp6.fp2.iter_mut() {
                        for fp in fp2.fp.iter_mut() {
                            unsafe { blst_fp_from_bendian(fp, bytes[offset..].as_ptr()) };
                            offset += G1_LEN;
                        }
                    }
                }
                Ok(BlsPoint::Gt(fp12))
            }
            _ => Err(CryptoError::InvalidBlsPoint),
        }
    }

    /// Serialize back to the wire form used by `deserialize`.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            BlsPoint::G1(point) => {
                let mut out = vec![0u8; G1_LEN];
                unsafe { blst_p1_affine_compress(out.as_mut_ptr(), point) };
                out
            }
            BlsPoint::G2(point) => {
                let mut out = vec![0u8; G2_LEN];
                unsafe { blst_p2_affine_compress(out.as_mut_ptr(), point) };
                out
            }
            BlsPoint::Gt(fp12) => {
                let mut out = vec![0u8; GT_LEN];
                let mut offset = 0;
                for fp6 in fp12.fp6.iter() {
                    for fp2 in fp6.fp2.iter() {
                        for fp in fp2.fp.iter() {
                            unsafe { blst_bendian_from_fp(out[offset..].as_mut_ptr(), fp) };
                            offset += G1_LEN;
                        }
                    }
                }
                out
            }
        }
    }

    /// Group equality.
    pub fn equals(&self, other: &BlsPoint) -> Result<bool, CryptoError> {
        match (self, other) {
            (BlsPoint::G1(a), BlsPoint::G1(b)) => Ok(unsafe { blst_p1_affine_is_equal(a, b) }),
            (BlsPoint::G2(a), BlsPoint::G2(b)) => Ok(unsafe { blst_p2_affine_is_equal(a, b) }),
            (BlsPoint::Gt(a), BlsPoint::Gt(b)) => Ok(unsafe { blst_fp12_is_equal(a, b) }),
            _ => Err(CryptoError::BlsGroupMismatch),
        }
    }

    /// Group addition (Gt elements multiply).
    pub fn add(&self, other: &BlsPoint) -> Result<BlsPoint, CryptoError> {
        match (self, other) {
            (BlsPoint::G1(a), BlsPoint::G1(b)) => unsafe {
                let mut pa = std::mem::zeroed::<blst_p1>();
                let mut pb = std::mem::zeroed::<blst_p1>();
                blst_p1_from_affine(&mut pa, a);
                blst_p1_from_affine(&mut pb, b);
                let mut sum = std::mem::zeroed::<blst_p1>();
                blst_p1_add_or_double(&mut sum, &pa, &pb);
                let mut out = std::mem::zeroed::<blst_p1_affine>();
                blst_p1_to_affine(&mut out, &sum);
                Ok(BlsPoint::G1(out))
            },
            (BlsPoint::G2(a), BlsPoint::G2(b)) => unsafe {
                let mut pa = std::mem::zeroed::<blst_p2>();
                let mut pb = std::mem::zeroed::<blst_p2>();
                blst_p2_from_affine(&mut pa, a);
                blst_p2_from_affine(&mut pb, b);
                let mut sum = std::mem::zeroed::<blst_p2>();
                blst_p2_add_or_double(&mut sum, &pa, &pb);
                let mut out = std::mem::zeroed::<blst_p2_affine>();
                blst_p2_to_affine(&mut out, &sum);
                Ok(BlsPoint::G2(out))
            },
            (BlsPoint::Gt(a), BlsPoint::Gt(b)) => unsafe {
                let mut out = std::mem::zeroed::<blst_fp12>();
                blst_fp12_mul(&mut out, a, b);
                Ok(BlsPoint::Gt(out))
            },
            _ => Err(CryptoError::BlsGroupMismatch),
        }
    }

    /// Scalar multiplication by a 32-byte little-endian scalar; `negate`
    /// multiplies by the scalar's negation.
    pub fn mul(&self, scalar_le: &[u8; 32], negate: bool) -> Result<BlsPoint, CryptoError> {
        let mut scalar = unsafe { std::mem::zeroed::<blst_scalar>() };
        unsafe { blst_scalar_from_lendian(&mut scalar, scalar_le.as_ptr()) };

        match self {
            BlsPoint::G1(point) => unsafe {
                let mut proj = std::mem::zeroed::<blst_p1>();
                blst_p1_from_affine(&mut proj, point);
                let mut result = std::mem::zeroed::<blst_p1>();
                blst_p1_mult(&mut result, &proj, scalar.b.as_ptr(), 256);
                blst_p1_cneg(&mut result, negate);
                let mut out = std::mem::zeroed::<blst_p1_affine>();
                blst_p1_to_affine(&mut out, &result);
                Ok(BlsPoint::G1(out))
            },
            BlsPoint::G2(point) => unsafe {
                let mut proj = std::mem::zeroed::<blst_p2>();
                blst_p2_from_affine(&mut proj, point);
                let mut result = std::mem::zeroed::<blst_p2>();
                blst_p2_mult(&mut result, &proj, scalar.b.as_ptr(), 256);
                blst_p2_cneg(&mut result, negate);
                let mut out = std::mem::zeroed::<blst_p2_affine>();
                blst_p2_to_affine(&mut out, &result);
                Ok(BlsPoint::G2(out))
            },
            BlsPoint::Gt(fp12) => {
                // Exponentiation by square-and-multiply; negation inverts the base.
                let base = if negate {
                    let mut inv = unsafe { std::mem::zeroed::<blst_fp12>() };
                    unsafe { blst_fp12_inverse(&mut inv, fp12) };
                    inv
                } else {
                    *fp12
                };
                let mut acc = unsafe { *blst_fp12_one() };
                for byte in scalar_le.iter().rev() {
                    for bit in (0..8).rev() {
                        let mut sq = unsafe { std::mem::zeroed::<blst_fp12>() };
                        unsafe { blst_fp12_sqr(&mut sq, &acc) };
                        acc = sq;
                        if byte & (1 << bit) != 0 {
                            let mut prod = unsafe { std::mem::zeroed::<blst_fp12>() };
                            unsafe { blst_fp12_mul(&mut prod, &acc, &base) };
                            acc = prod;
                        }
                    }
                }
                Ok(BlsPoint::Gt(acc))
            }
        }
    }

    /// Optimal ate pairing `e(g1, g2)`.
    pub fn pairing(g1: &BlsPoint, g2: &BlsPoint) -> Result<BlsPoint, CryptoError> {
        let (BlsPoint::G1(p), BlsPoint::G2(q)) = (g1, g2) else {
            return Err(CryptoError::BlsGroupMismatch);
        };
        let mut loop_out = unsafe { std::mem::zeroed::<blst_fp12>() };
        unsafe { blst_miller_loop(&mut loop_out, q, p) };
        let mut out = unsafe { std::mem::zeroed::<blst_fp12>() };
        unsafe { blst_final_exp(&mut out, &loop_out) };
        Ok(BlsPoint::Gt(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // G1 and G2 generators, compressed.
    const G1_GEN: &str = "97f1d3a73197d7942695638c4fa9ac0fc3688c4f9774b905a14e3a3f171bac586c55e83ff97a1aeffb3af00adb22c6bb";
    const G2_GEN: &str = "93e02b6052719f607dacd3a088274f65596bd0d09920b61ab5da61bbdc7f5049334cf11213945d57e5ac7d055d042b7e024aa2b2f08f0a91260805272dc51051c6e47ad4fa403b02b4510b647ae3d1770bac0326a805bbefd48056c8c121bdb8";

    fn g1() -> BlsPoint {
        BlsPoint::deserialize(&hex::decode(G1_GEN).unwrap()).unwrap()
    }

    fn g2() -> BlsPoint {
        BlsPoint::deserialize(&hex::decode(G2_GEN).unwrap()).unwrap()
    }

    #[test]
    fn test_generator_round_trip() {
        let point = g1();
        assert_eq!(hex::encode(point.serialize()), G1_GEN);
        let point = g2();
        assert_eq!(hex::encode(point.serialize()), G2_GEN);
    }

    #[test]
    fn test_add_matches_double_via_mul() {
        let mut two = [0u8; 32];
        two[0] = 2;
        let doubled = g1().add(&g1()).unwrap();
        let multiplied = g1().mul(&two, false).unwrap();
        assert!(doubled.equals(&multiplied).unwrap());
    }

    #[test]
    fn test_group_mismatch_rejected() {
        assert!(g1().add(&g2()).is_err());
        assert!(BlsPoint::pairing(&g2(), &g1()).is_err());
    }

    #[test]
    fn test_pairing_bilinearity() {
        // e(2*G1, G2) == e(G1, G2)^2
        let mut two = [0u8; 32];
        two[0] = 2;
        let lhs = BlsPoint::pairing(&g1().mul(&two, false).unwrap(), &g2()).unwrap();
        let base = BlsPoint::pairing(&g1(), &g2()).unwrap();
        let rhs = base.mul(&two, false).unwrap();
        assert!(lhs.equals(&rhs).unwrap());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(BlsPoint::deserialize(&[0u8; 48]).is_err());
        assert!(BlsPoint::deserialize(&[1u8; 47]).is_err());
    }
}
