pub mod registration;
pub mod directory;

pub use registration::RegistrationRequest;
pub use directory::{Role, UserDirectory, UserProfile};
