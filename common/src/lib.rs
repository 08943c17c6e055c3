pub mod config;
pub mod credential;
pub mod identity;
pub mod messages;
pub mod reporting;
pub mod utils;

pub use config::*;
pub use credential::{Credential, CredentialError};
pub use identity::{Identity, IdentityError, IdentityId, IdentityVerifier};
pub use messages::*;
pub use reporting::{init_reporting, report_error};
pub use utils::*;
