// 認証機能のデータモデル

use serde::{Deserialize, Serialize};

/// 認証済みユーザーの識別情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
    /// ユーザーID（すべてのリポジトリ操作のパーティションキー）
    pub uid: String,
    /// メールアドレス（表示用）
    pub email: String,
}

/// セッションの現在状態
///
/// 認証プロバイダからの初回応答が届くまでは`is_loading`がtrueになります。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// 現在の認証済みユーザー（未サインインの場合はNone）
    pub identity: Option<AuthIdentity>,
    /// 認証状態の読み込み中かどうか
    pub is_loading: bool,
}

impl SessionState {
    /// 初期状態（読み込み中、未サインイン）を作成する
    pub fn initial() -> Self {
        Self {
            identity: None,
            is_loading: true,
        }
    }
}
