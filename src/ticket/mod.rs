// Ticket lifecycle: rider-side commitments, issuer signatures, the issued
// record store and the portable ticket wire types
pub mod commitment;
pub mod issuer;
pub mod store;
pub mod ticket;

pub use commitment::{CommitmentScheme, RiderCredentials, RiderSecret};
pub use issuer::{signing_hash, signing_message, verify_ticket_signature, Issuer, TA_PRIVATE_KEY_ENV};
pub use store::{InMemoryTicketStore, TicketHandle, TicketRecord, TicketStore};
pub use ticket::*;
