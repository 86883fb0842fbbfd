// EdDSA over Baby Jubjub with a Poseidon challenge
// The curve's base field is the BN254 scalar field, so keys and the R point
// are plain field elements and the signed message is one field element.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bn254::{EdwardsAffine, Fr as Scalar};
use ark_ff::{BigInteger, PrimeField};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha512};
use std::str::FromStr;

use super::poseidon::PoseidonHasher;
use super::{CryptoError, Result, SignatureScheme};
use crate::primitives::FieldElement;

pub const SECRET_KEY_LENGTH: usize = 32;

/// 32-byte issuer secret; the signing scalar and nonce prefix are derived
/// from its SHA-512 expansion.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey([u8; SECRET_KEY_LENGTH]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LENGTH]) -> Self {
        SecretKey(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; SECRET_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidSecretKey(format!(
                "expected {} bytes, got {}",
                SECRET_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(SecretKey(array))
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0u8; SECRET_KEY_LENGTH];
        rng.fill_bytes(&mut bytes);
        SecretKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECRET_KEY_LENGTH] {
        &self.0
    }

    fn expand(&self) -> (Scalar, [u8; 32]) {
        let digest = Sha512::digest(self.0);
        let scalar = Scalar::from_le_bytes_mod_order(&digest[..32]);
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&digest[32..]);
        (scalar, prefix)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Affine point `(x, y)` on Baby Jubjub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    pub x: FieldElement,
    pub y: FieldElement,
}

impl PublicKey {
    fn from_point(point: &EdwardsAffine) -> Self {
        PublicKey {
            x: FieldElement(point.x),
            y: FieldElement(point.y),
        }
    }

    /// Decode and check the point is a usable key: on the curve, in the
    /// prime-order subgroup and not the identity
    pub fn to_point(&self) -> Result<EdwardsAffine> {
        let point = checked_point(&self.x, &self.y)
            .map_err(|reason| CryptoError::InvalidPublicKey(reason.to_string()))?;
        if point == EdwardsAffine::zero() {
            return Err(CryptoError::InvalidPublicKey("identity point".to_string()));
        }
        Ok(point)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "R_x")]
    pub r_x: FieldElement,
    #[serde(rename = "R_y")]
    pub r_y: FieldElement,
    #[serde(serialize_with = "serialize_scalar", deserialize_with = "deserialize_scalar")]
    pub s: Scalar,
}

fn checked_point(x: &FieldElement, y: &FieldElement) -> std::result::Result<EdwardsAffine, &'static str> {
    let point = EdwardsAffine::new_unchecked(x.inner(), y.inner());
    if !point.is_on_curve() {
        return Err("point not on curve");
    }
    if !point.is_in_correct_subgroup_assuming_on_curve() {
        return Err("point not in prime-order subgroup");
    }
    Ok(point)
}

fn challenge(r: &EdwardsAffine, a: &EdwardsAffine, message: &FieldElement) -> Scalar {
    let c = PoseidonHasher::hash_native(&[r.x, r.y, a.x, a.y, message.inner()]);
    Scalar::from_le_bytes_mod_order(&c.into_bigint().to_bytes_le())
}

/// Signature scheme marker type
#[derive(Debug, Clone, Copy, Default)]
pub struct BabyJubjubEddsa;

impl SignatureScheme for BabyJubjubEddsa {
    type SecretKey = SecretKey;
    type PublicKey = PublicKey;
    type Signature = Signature;

    fn public_key(secret: &SecretKey) -> PublicKey {
        let (a, _) = secret.expand();
        PublicKey::from_point(&(EdwardsAffine::generator() * a).into_affine())
    }

    fn sign(secret: &SecretKey, message: &FieldElement) -> Result<Signature> {
        let (a, prefix) = secret.expand();
        let generator = EdwardsAffine::generator();
        let a_point = (generator * a).into_affine();

        // Nonce is derived, never sampled
        let mut hasher = Sha512::new();
        hasher.update(prefix);
        hasher.update(message.to_bytes_le());
        let r = Scalar::from_le_bytes_mod_order(&hasher.finalize());
        let r_point = (generator * r).into_affine();

        let c = challenge(&r_point, &a_point, message);
        let s = r + c * a;

        Ok(Signature {
            r_x: FieldElement(r_point.x),
            r_y: FieldElement(r_point.y),
            s,
        })
    }

    fn verify(public: &PublicKey, message: &FieldElement, signature: &Signature) -> bool {
        let a_point = match public.to_point() {
            Ok(point) => point,
            Err(_) => return false,
        };
        let r_point = match checked_point(&signature.r_x, &signature.r_y) {
            Ok(point) => point,
            Err(_) => return false,
        };

        let c = challenge(&r_point, &a_point, message);
        let lhs = EdwardsAffine::generator() * signature.s;
        let rhs = r_point.into_group() + a_point * c;
        lhs == rhs
    }
}

fn serialize_scalar<S>(scalar: &Scalar, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&scalar.into_bigint().to_string())
}

fn deserialize_scalar<'de, D>(deserializer: D) -> std::result::Result<Scalar, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_scalar(&raw).map_err(serde::de::Error::custom)
}

/// Parse a signature scalar; it must already be reduced (`s < l`)
pub fn parse_scalar(raw: &str) -> Result<Scalar> {
    let invalid = || CryptoError::InvalidScalar(format!("{:?}", raw));

    let scalar = if let Some(digits) = raw.strip_prefix("0x") {
        if digits.is_empty() || digits.len() > 64 {
            return Err(invalid());
        }
        let bytes = hex::decode(format!("{:0>64}", digits)).map_err(|_| invalid())?;
        let scalar = Scalar::from_be_bytes_mod_order(&bytes);
        if scalar.into_bigint().to_bytes_be() != bytes {
            return Err(invalid());
        }
        scalar
    } else {
        let well_formed = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_digit())
            && (raw == "0" || !raw.starts_with('0'));
        if !well_formed {
            return Err(invalid());
        }
        let scalar = Scalar::from_str(raw).map_err(|_| invalid())?;
        if scalar.into_bigint().to_string() != raw {
            return Err(invalid());
        }
        scalar
    };

    Ok(scalar)
}
