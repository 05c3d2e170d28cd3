//! Entities owned by the remote API. The client only ever holds cached copies.

pub mod accrual;
pub mod id;
pub mod ledger;
pub mod page;
pub mod profile;

pub use accrual::{AccrualRequest, AccrualRequestForm, AccrualStatus};
pub use id::EntityId;
pub use ledger::MileageLedgerEntry;
pub use page::Page;
pub use profile::{CustomerUpdate, OnboardRequest, Profile, ProfileUpdate, Tier};
