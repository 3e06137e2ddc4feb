pub mod service;
pub mod session;
pub mod storage;
pub mod token;

pub use service::{AuthApi, Credentials, LoginData};
pub use session::{SessionKeys, SessionManager, SessionStatus, Sessions, TokenUpdate};
pub use storage::{JsonFileStore, MemoryStore, SessionStore};
pub use token::{Role, TokenClaims, TokenPair};
