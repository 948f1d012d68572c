//! Service-account credentials and the builder that assembles them.

mod builder;
mod key_material;
mod service_account;
mod resources;
mod scope;

pub use builder::CredentialBuilder;
pub use key_material::P12_PASSWORD;
pub use service_account::{Credential, DEFAULT_TOKEN_URI};
pub(crate) use service_account::unix_now;
pub use resources::{DirectoryResources, EmbeddedResources, ResourceContext};
pub use scope::StorageScope;
