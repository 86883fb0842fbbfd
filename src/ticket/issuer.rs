// Issuing authority: holds the signing key and signs the fixed ticket tuple
use rand::{CryptoRng, RngCore};
use tracing::info;

use crate::crypto::{BabyJubjubEddsa, FieldHasher, PoseidonHasher, PublicKey, SecretKey, Signature, SignatureScheme};
use crate::primitives::{FieldElement, Result, TicketError, TicketMetadata};

pub const TA_PRIVATE_KEY_ENV: &str = "TA_PRIVATE_KEY";

/// Signed field order: `[origin, destination, date, class, product_type, ticket_id, C]`
pub fn signing_message(
    metadata: &TicketMetadata,
    ticket_id: &FieldElement,
    commitment: &FieldElement,
) -> [FieldElement; 7] {
    let [origin, destination, date, class, product_type] = metadata.to_fields();
    [origin, destination, date, class, product_type, *ticket_id, *commitment]
}

/// Poseidon digest of the signing tuple; the value the issuer signs
pub fn signing_hash(metadata: &TicketMetadata, ticket_id: &FieldElement, commitment: &FieldElement) -> FieldElement {
    PoseidonHasher::hash(&signing_message(metadata, ticket_id, commitment))
}

/// Check an issuer signature by rebuilding the signed tuple
pub fn verify_ticket_signature(
    public_key: &PublicKey,
    metadata: &TicketMetadata,
    ticket_id: &FieldElement,
    commitment: &FieldElement,
    signature: &Signature,
) -> bool {
    let message = signing_hash(metadata, ticket_id, commitment);
    BabyJubjubEddsa::verify(public_key, &message, signature)
}

pub struct Issuer {
    secret: SecretKey,
    public: PublicKey,
}

impl Issuer {
    pub fn new(secret: SecretKey) -> Self {
        let public = BabyJubjubEddsa::public_key(&secret);
        Self { secret, public }
    }

    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::new(SecretKey::generate(rng))
    }

    /// Load from exactly 64 hex characters (32 bytes)
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let trimmed = secret_hex.trim();
        if trimmed.len() != 64 {
            return Err(TicketError::Config(format!(
                "issuer key must be 64 hex characters, got {}",
                trimmed.len()
            )));
        }

        let bytes = hex::decode(trimmed)
            .map_err(|e| TicketError::Config(format!("issuer key is not hex: {}", e)))?;
        let secret = SecretKey::from_slice(&bytes)
            .map_err(|e| TicketError::Config(e.to_string()))?;

        let issuer = Self::new(secret);
        info!("🔑 Loaded issuer key, public key x={}", issuer.public.x);
        Ok(issuer)
    }

    /// Load from `TA_PRIVATE_KEY`; a missing variable is fatal
    pub fn from_env() -> Result<Self> {
        let raw = std::env::var(TA_PRIVATE_KEY_ENV)
            .map_err(|_| TicketError::Config(format!("{} is not set", TA_PRIVATE_KEY_ENV)))?;
        Self::from_secret_hex(&raw)
    }

    /// Hex form of the secret, for key generation only
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret.as_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    pub fn sign_ticket(
        &self,
        metadata: &TicketMetadata,
        ticket_id: &FieldElement,
        commitment: &FieldElement,
    ) -> Result<Signature> {
        let message = signing_hash(metadata, ticket_id, commitment);
        Ok(BabyJubjubEddsa::sign(&self.secret, &message)?)
    }

    pub fn verify(
        &self,
        metadata: &TicketMetadata,
        ticket_id: &FieldElement,
        commitment: &FieldElement,
        signature: &Signature,
    ) -> bool {
        verify_ticket_signature(&self.public, metadata, ticket_id, commitment, signature)
    }
}

impl std::fmt::Debug for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Issuer").field("public", &self.public).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::{ProductType, Station, TicketClass};
    use crate::ticket::{CommitmentScheme, RiderSecret};
    use ark_ec::{AffineRepr, CurveGroup};
    use ark_ed_on_bn254::{EdwardsAffine, Fr as Scalar};
    use std::str::FromStr;

    const TEST_KEY: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    fn metadata() -> TicketMetadata {
        TicketMetadata::new(
            Station::Bern,
            Station::Zurich,
            1735689600,
            TicketClass::Second,
            ProductType::Single,
        )
        .unwrap()
    }

    #[test]
    fn test_signing_message_order() {
        let fields = signing_message(&metadata(), &FieldElement::from_u64(42), &FieldElement::from_u64(99));
        let codes: Vec<u64> = fields.iter().map(|f| f.to_u64().unwrap()).collect();
        assert_eq!(codes, vec![1, 2, 1735689600, 2, 1, 42, 99]);
    }

    #[test]
    fn test_issuance_is_reproducible() {
        let a = Issuer::from_secret_hex(TEST_KEY).unwrap();
        let b = Issuer::from_secret_hex(TEST_KEY).unwrap();
        let id = FieldElement::from_u64(42);
        let c = FieldElement::from_u64(99);

        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(
            a.sign_ticket(&metadata(), &id, &c).unwrap(),
            b.sign_ticket(&metadata(), &id, &c).unwrap()
        );
        assert_eq!(a.secret_hex(), TEST_KEY);
    }

    #[test]
    fn test_bern_zurich_known_answers() {
        let scheme = CommitmentScheme::<PoseidonHasher>::default();
        let ticket_id = FieldElement::from_u64(42);
        let secret = RiderSecret::from_field(FieldElement::from_u64(7));
        let fe = |raw: &str| raw.parse::<FieldElement>().unwrap();

        let c = scheme.commitment(&ticket_id, &secret);
        assert_eq!(c, fe("21406510021306439879447157090569763470904033564654545261032142618742912635243"));
        assert_eq!(
            scheme.nullifier(&secret),
            fe("6924652330281588541671422991040032125683882746001665544416539639141173336167")
        );
        assert_eq!(
            signing_hash(&metadata(), &ticket_id, &c),
            fe("19600358329177490998762583179253565956007348210064621697126758287254114148099")
        );

        // Key scalar and nonce come from SHA-512 of the key, then the key
        // prefix and the message
        let issuer = Issuer::from_secret_hex(&"07".repeat(32)).unwrap();
        let key_scalar =
            Scalar::from_str("67414466445797431246064751754330490461650535592903579183677687266768744598").unwrap();
        let nonce =
            Scalar::from_str("975643988723074614524673253450545131544418672947174606305724682476885494962").unwrap();

        let public = (EdwardsAffine::generator() * key_scalar).into_affine();
        assert_eq!(issuer.public_key().x.inner(), public.x);
        assert_eq!(issuer.public_key().y.inner(), public.y);

        let sig = issuer.sign_ticket(&metadata(), &ticket_id, &c).unwrap();
        let r_point = (EdwardsAffine::generator() * nonce).into_affine();
        assert_eq!(sig.r_x.inner(), r_point.x);
        assert_eq!(sig.r_y.inner(), r_point.y);
        assert!(issuer.verify(&metadata(), &ticket_id, &c, &sig));
    }

    #[test]
    fn test_signature_binds_every_field() {
        let issuer = Issuer::from_secret_hex(TEST_KEY).unwrap();
        let id = FieldElement::from_u64(42);
        let c = FieldElement::from_u64(99);
        let sig = issuer.sign_ticket(&metadata(), &id, &c).unwrap();

        assert!(issuer.verify(&metadata(), &id, &c, &sig));
        assert!(!issuer.verify(&metadata(), &FieldElement::from_u64(43), &c, &sig));
        assert!(!issuer.verify(&metadata(), &id, &FieldElement::from_u64(98), &sig));

        let mut other = metadata();
        other.class = TicketClass::First;
        assert!(!issuer.verify(&other, &id, &c, &sig));
    }

    #[test]
    fn test_bad_key_material_is_fatal() {
        assert!(matches!(Issuer::from_secret_hex("abcd"), Err(TicketError::Config(_))));
        let not_hex = "zz".repeat(32);
        assert!(matches!(Issuer::from_secret_hex(&not_hex), Err(TicketError::Config(_))));
    }
}
