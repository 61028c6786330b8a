pub mod access_jwt;
pub mod cnf;
pub mod error;
pub mod factory;
pub mod gate;
pub mod jwks;
pub mod thumbprint;

pub use error::AuthError;
pub use factory::build_authorization_gate;
pub use gate::{AuthorizationGate, Principal, ValidationOutcome};
