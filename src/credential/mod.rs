mod business_jwt;
mod refresh;
mod validator;
mod variant;

pub use business_jwt::BusinessJwtMinter;
pub use refresh::{CredentialRefresher, NoRefresh};
pub use validator::{CredentialValidator, ValidatorOutcome};
pub use variant::Credential;
