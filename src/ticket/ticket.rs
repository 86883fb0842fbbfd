// Wire types exchanged between rider, issuer and verifying contexts
use serde::{Deserialize, Serialize};

use super::commitment::RiderCredentials;
use crate::crypto::{PublicKey, Signature};
use crate::merkle::MerkleProof;
use crate::primitives::{FieldElement, RejectReason, Result, TicketError, TicketMetadata, Timestamp, ValidityWindow};
use crate::zkp::ProofEnvelope;

/// Fresh ticket id handed to the rider before issuance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedTicket {
    pub ticket_id: FieldElement,
    pub metadata: TicketMetadata,
    pub validity: ValidityWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceRequest {
    pub metadata: TicketMetadata,
    pub ticket_id: FieldElement,
    #[serde(rename = "C")]
    pub commitment: FieldElement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceResponse {
    #[serde(rename = "pk_TA")]
    pub issuer_key: PublicKey,
    pub sig: Signature,
    pub merkle_root: FieldElement,
    pub merkle_proof: MerkleProof,
    pub leaf_index: usize,
}

/// Portable ticket held by the rider and shown as a QR code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: FieldElement,
    pub metadata: TicketMetadata,
    #[serde(rename = "C")]
    pub commitment: FieldElement,
    #[serde(rename = "N")]
    pub nullifier: FieldElement,
    pub signature: Signature,
    pub merkle_root: FieldElement,
    #[serde(rename = "merkleProof")]
    pub merkle_proof: MerkleProof,
    pub validity: ValidityWindow,
}

impl Ticket {
    /// Combine the rider's credentials with the issuer's response
    pub fn assemble(
        credentials: &RiderCredentials,
        allocation: &AllocatedTicket,
        response: IssuanceResponse,
    ) -> Result<Self> {
        if credentials.ticket_id != allocation.ticket_id {
            return Err(TicketError::Validation(
                "credentials were derived for a different ticket id".to_string(),
            ));
        }

        Ok(Self {
            ticket_id: allocation.ticket_id,
            metadata: allocation.metadata,
            commitment: credentials.commitment,
            nullifier: credentials.nullifier,
            signature: response.sig,
            merkle_root: response.merkle_root,
            merkle_proof: response.merkle_proof,
            validity: allocation.validity,
        })
    }

    pub fn public_inputs(&self, issuer_key: PublicKey) -> PublicInputs {
        PublicInputs {
            metadata: self.metadata,
            ticket_id: self.ticket_id,
            commitment: self.commitment,
            nullifier: self.nullifier,
            issuer_key,
            sig: self.signature,
        }
    }

    /// JSON payload encoded into the QR code
    pub fn to_qr_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_qr_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Values a check-in discloses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicInputs {
    pub metadata: TicketMetadata,
    pub ticket_id: FieldElement,
    #[serde(rename = "C")]
    pub commitment: FieldElement,
    #[serde(rename = "N")]
    pub nullifier: FieldElement,
    #[serde(rename = "pk_TA")]
    pub issuer_key: PublicKey,
    pub sig: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofEnvelope>,
    #[serde(rename = "publicInputs")]
    pub public_inputs: PublicInputs,
    pub context_id: String,
    pub segment: String,
    /// Defaults to the service clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInResponse {
    pub ok: bool,
    pub fraud: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

impl CheckInResponse {
    pub fn accepted(fraud: bool) -> Self {
        Self {
            ok: true,
            fraud,
            reason: fraud.then_some(RejectReason::ParallelUseDifferentContexts),
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self { ok: false, fraud: false, reason: Some(reason) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_request_optional_fields() {
        let json = r#"{
            "publicInputs": {
                "metadata": {"origin":1,"destination":2,"date":1735689600,"class":2,"product_type":1},
                "ticket_id": "42",
                "C": "0x10",
                "N": "17",
                "pk_TA": {"x": "1", "y": "2"},
                "sig": {"R_x": "3", "R_y": "4", "s": "5"}
            },
            "context_id": "IC-712",
            "segment": "Bern-Zurich"
        }"#;

        let request: CheckInRequest = serde_json::from_str(json).unwrap();
        assert!(request.proof.is_none());
        assert!(request.timestamp.is_none());
        assert_eq!(request.public_inputs.commitment, FieldElement::from_u64(16));
    }

    #[test]
    fn test_check_in_response_shape() {
        let json = serde_json::to_value(CheckInResponse::accepted(true)).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["fraud"], true);
        assert_eq!(json["reason"], "parallel_use_different_contexts");

        let json = serde_json::to_value(CheckInResponse::accepted(false)).unwrap();
        assert!(json.get("reason").is_none());
    }
}
