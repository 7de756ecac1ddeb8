/// 認証機能のモジュール
pub mod models;
pub mod session;

pub use models::{AuthIdentity, SessionState};
pub use session::SessionProvider;
