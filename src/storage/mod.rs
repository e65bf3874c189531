//! Encrypted local storage: vault, pending session queue, user directory.
//!
//! Everything under the data directory is encrypted at rest with one
//! process-wide key. The pending queue is the durability contract: a
//! session file exists from the moment persistence succeeds until the
//! sync collaborator confirms upstream delivery.

mod pending;
mod users;
mod vault;

pub use pending::PendingStore;
pub use users::{DirectoryError, NewUser, Role, User, UserDirectory};
pub use vault::Vault;
