pub mod authentication;
pub mod password;
pub mod permissions;
pub mod provisioning;
pub mod session;
pub mod user;

pub use authentication::*;
pub use password::*;
pub use permissions::*;
pub use provisioning::*;
pub use session::*;
pub use user::*;
