// Check-in and fraud window tests
use anon_transit_tickets::zkp::SimplifiedBackend;
use anon_transit_tickets::*;
use chrono::TimeZone;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;

const DEPARTURE_MS: i64 = 1_735_722_000_000;
const MINUTE_MS: i64 = 60 * 1000;

async fn service_with_ticket() -> (TicketService, Ticket, ProofEnvelope) {
    let clock = Arc::new(ManualClock::new(DEPARTURE_MS));
    let config = ServiceConfig {
        copy_sweep_interval_ms: 0,
        ..ServiceConfig::default()
    };
    let issuer = Issuer::generate(&mut StdRng::seed_from_u64(3));
    let proofs = Arc::new(SimplifiedBackend::<PoseidonHasher>::new(None));
    let service = TicketService::with_proof_backend(config, issuer, proofs, clock).unwrap();

    let metadata = TicketMetadata::from_names("Lausanne", "Geneva", 1735689600, "first", "day-pass").unwrap();
    let departure = chrono::Utc.timestamp_millis_opt(DEPARTURE_MS).unwrap();
    let allocation = service.allocate_ticket(metadata, departure).await.unwrap();

    let secret = RiderSecret::generate(&mut StdRng::seed_from_u64(11));
    let credentials = service.commitment_scheme().derive(allocation.ticket_id, secret);
    let response = service
        .issue_ticket(IssuanceRequest {
            metadata,
            ticket_id: allocation.ticket_id,
            commitment: credentials.commitment,
        })
        .await
        .unwrap();
    let ticket = Ticket::assemble(&credentials, &allocation, response).unwrap();

    let statement = ProofStatement {
        metadata,
        ticket_id: ticket.ticket_id,
        commitment: ticket.commitment,
        nullifier: ticket.nullifier,
    };
    let proof = service
        .proof_backend()
        .prove(&ProofWitness { statement, secret })
        .await
        .unwrap();

    (service, ticket, proof)
}

fn request(service: &TicketService, ticket: &Ticket, proof: Option<&ProofEnvelope>, context: &str, at: i64) -> CheckInRequest {
    CheckInRequest {
        proof: proof.cloned(),
        public_inputs: ticket.public_inputs(service.issuer_key()),
        context_id: context.to_string(),
        segment: "Lausanne-Geneva".to_string(),
        timestamp: Some(at),
    }
}

#[tokio::test]
async fn test_parallel_use_within_window_is_fraud() {
    let (service, ticket, proof) = service_with_ticket().await;

    let first = service.check_in(request(&service, &ticket, Some(&proof), "IC-712", DEPARTURE_MS)).await;
    assert_eq!(first, CheckInResponse::accepted(false));

    let second = service
        .check_in(request(&service, &ticket, Some(&proof), "IR-2519", DEPARTURE_MS + 19 * MINUTE_MS))
        .await;
    assert!(second.ok);
    assert!(second.fraud);
    assert_eq!(second.reason, Some(RejectReason::ParallelUseDifferentContexts));

    // Both entries are kept
    assert_eq!(service.ledger().history(&ticket.nullifier).await.len(), 2);
    println!("✅ Parallel use flagged inside the fraud window");
}

#[tokio::test]
async fn test_other_context_outside_window_is_not_fraud() {
    let (service, ticket, proof) = service_with_ticket().await;

    service.check_in(request(&service, &ticket, Some(&proof), "IC-712", DEPARTURE_MS)).await;
    let later = service
        .check_in(request(&service, &ticket, Some(&proof), "IR-2519", DEPARTURE_MS + 21 * MINUTE_MS))
        .await;
    assert_eq!(later, CheckInResponse::accepted(false));

    // Exactly the window apart is outside it
    let edge = service
        .check_in(request(&service, &ticket, Some(&proof), "S-3", DEPARTURE_MS + 41 * MINUTE_MS))
        .await;
    assert!(!edge.fraud);
}

#[tokio::test]
async fn test_same_context_repeated_is_not_fraud() {
    let (service, ticket, proof) = service_with_ticket().await;

    for minute in [0, 1, 5, 12] {
        let response = service
            .check_in(request(&service, &ticket, Some(&proof), "IC-712", DEPARTURE_MS + minute * MINUTE_MS))
            .await;
        assert_eq!(response, CheckInResponse::accepted(false));
    }
    assert_eq!(service.ledger().len().await, 4);
}

#[tokio::test]
async fn test_check_in_without_proof_is_logged() {
    let (service, ticket, _) = service_with_ticket().await;

    let response = service.check_in(request(&service, &ticket, None, "IC-712", DEPARTURE_MS)).await;
    assert!(response.ok);
    assert_eq!(service.ledger().history(&ticket.nullifier).await.len(), 1);
}

#[tokio::test]
async fn test_check_in_rejections_are_not_logged() {
    let (service, ticket, proof) = service_with_ticket().await;

    // Proof for a different nullifier
    let mut inputs_ticket = ticket.clone();
    inputs_ticket.nullifier = FieldElement::from_u64(5);
    let bad_proof = service
        .check_in(request(&service, &inputs_ticket, Some(&proof), "IC-712", DEPARTURE_MS))
        .await;
    assert_eq!(bad_proof, CheckInResponse::rejected(RejectReason::ProofUnavailable));

    // Signature does not cover altered metadata
    let mut altered = ticket.clone();
    altered.metadata.class = TicketClass::Second;
    let bad_sig = service.check_in(request(&service, &altered, None, "IC-712", DEPARTURE_MS)).await;
    assert_eq!(bad_sig, CheckInResponse::rejected(RejectReason::InvalidSignature));

    // Untrusted issuer key
    let mut foreign = request(&service, &ticket, None, "IC-712", DEPARTURE_MS);
    foreign.public_inputs.issuer_key = Issuer::generate(&mut StdRng::seed_from_u64(4)).public_key();
    let bad_key = service.check_in(foreign).await;
    assert_eq!(bad_key, CheckInResponse::rejected(RejectReason::InvalidSignature));

    assert!(service.ledger().is_empty().await);
}

#[tokio::test]
async fn test_swapped_nullifier_is_refused() {
    let (service, ticket, proof) = service_with_ticket().await;

    let first = service.check_in(request(&service, &ticket, Some(&proof), "IC-712", DEPARTURE_MS)).await;
    assert_eq!(first, CheckInResponse::accepted(false));

    // Same signed tuple, fresh N, no proof
    let mut copied = ticket.clone();
    copied.nullifier = FieldElement::from_u64(12345);
    let second = service
        .check_in(request(&service, &copied, None, "IR-2519", DEPARTURE_MS + MINUTE_MS))
        .await;
    assert_eq!(second, CheckInResponse::rejected(RejectReason::CommitmentMismatch));
    assert!(service.ledger().history(&copied.nullifier).await.is_empty());
    assert_eq!(service.ledger().history(&ticket.nullifier).await.len(), 1);

    // The binding is shared with verification
    let verified = service.verify(&copied, None, "IR-2519").await;
    assert_eq!(verified, VerificationResult::rejected(RejectReason::CommitmentMismatch));
}

#[tokio::test]
async fn test_check_in_after_eviction_is_refused() {
    let (service, ticket, proof) = service_with_ticket().await;
    assert!(service.evict_ticket(&ticket.ticket_id).await.unwrap());

    let response = service.check_in(request(&service, &ticket, Some(&proof), "IC-712", DEPARTURE_MS)).await;
    assert_eq!(response, CheckInResponse::rejected(RejectReason::TicketNotFound));
    assert!(service.ledger().is_empty().await);
}

#[tokio::test]
async fn test_concurrent_check_ins_flag_one_side() {
    let (service, ticket, proof) = service_with_ticket().await;

    let check_ins = ["IC-712", "IR-2519"]
        .map(|context| service.check_in(request(&service, &ticket, Some(&proof), context, DEPARTURE_MS)));
    let responses = futures::future::join_all(check_ins).await;

    assert!(responses.iter().all(|r| r.ok));
    assert_eq!(responses.iter().filter(|r| r.fraud).count(), 1);
}

#[tokio::test]
async fn test_check_in_request_json_shape() {
    let (service, ticket, proof) = service_with_ticket().await;

    let json = serde_json::to_value(request(&service, &ticket, Some(&proof), "IC-712", DEPARTURE_MS)).unwrap();
    assert_eq!(json["proof"]["type"], "simplified");
    assert!(json["publicInputs"]["N"].is_string());
    assert!(json["publicInputs"]["pk_TA"]["x"].is_string());

    let parsed: CheckInRequest = serde_json::from_value(json).unwrap();
    let response = service.check_in(parsed).await;
    assert_eq!(serde_json::to_value(response).unwrap(), serde_json::json!({"ok": true, "fraud": false}));
}
