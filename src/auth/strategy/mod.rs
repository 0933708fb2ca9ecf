//! Authentication schemes.

mod api_token;
mod basic;
mod jwt;
mod traits;

pub use api_token::ApiTokenAuth;
pub use basic::BasicAuth;
pub use jwt::{JwtAuth, REFRESH_PATH, TOKEN_PATH};
pub use traits::{Authenticator, TENANT_HEADER};

pub(crate) use traits::{insert_authorization, insert_tenant};
