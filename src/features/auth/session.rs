use crate::features::auth::models::{AuthIdentity, SessionState};
use crate::shared::errors::AppResult;
use tokio::sync::watch;

/// 認証セッションを提供する構造体
///
/// 現在の認証済みユーザーをプロセス内のリアクティブな値として公開します。
/// グローバルなシングルトンではなく、ビューモデルのコンストラクタへ明示的に
/// 渡して使用します。認証バックエンドとの通信はホスト側の責務で、
/// サインイン完了時に`sign_in`を呼び出して状態を反映します。
pub struct SessionProvider {
    /// セッション状態を保持するチャンネル
    state: watch::Sender<SessionState>,
}

impl SessionProvider {
    /// 新しいSessionProviderを作成する
    ///
    /// # 戻り値
    /// 読み込み中・未サインイン状態のSessionProvider
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::initial());
        Self { state }
    }

    /// サインイン完了を反映する
    ///
    /// # 引数
    /// * `identity` - 認証済みユーザーの識別情報
    pub fn sign_in(&self, identity: AuthIdentity) {
        log::info!("サインインしました: uid={}", identity.uid);
        self.state.send_replace(SessionState {
            identity: Some(identity),
            is_loading: false,
        });
    }

    /// サインアウトする
    ///
    /// # 戻り値
    /// 成功時はOk(())
    pub async fn sign_out(&self) -> AppResult<()> {
        let previous = self.state.send_replace(SessionState {
            identity: None,
            is_loading: false,
        });

        match previous.identity {
            Some(identity) => log::info!("サインアウトしました: uid={}", identity.uid),
            None => log::warn!("サインインしていない状態でサインアウトが要求されました"),
        }

        Ok(())
    }

    /// 現在の認証済みユーザーを取得する
    ///
    /// # 戻り値
    /// 認証済みユーザー、未サインインの場合はNone
    pub fn current_identity(&self) -> Option<AuthIdentity> {
        self.state.borrow().identity.clone()
    }

    /// 認証状態の読み込み中かどうかを取得する
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// セッション状態の変更を購読する
    ///
    /// # 戻り値
    /// セッション状態のレシーバ（変更のたびに最新状態を観測できる）
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_identity() -> AuthIdentity {
        AuthIdentity {
            uid: "u1".to_string(),
            email: "user@example.com".to_string(),
        }
    }

    #[test]
    fn test_initial_state_is_loading() {
        let provider = SessionProvider::new();

        assert!(provider.is_loading());
        assert!(provider.current_identity().is_none());
    }

    #[test]
    fn test_sign_in() {
        let provider = SessionProvider::new();

        provider.sign_in(test_identity());

        assert!(!provider.is_loading());
        let identity = provider.current_identity().unwrap();
        assert_eq!(identity.uid, "u1");
        assert_eq!(identity.email, "user@example.com");
    }

    #[tokio::test]
    async fn test_sign_out_clears_identity() {
        let provider = SessionProvider::new();
        provider.sign_in(test_identity());

        provider.sign_out().await.unwrap();

        assert!(provider.current_identity().is_none());
        assert!(!provider.is_loading());
    }

    #[tokio::test]
    async fn test_subscriber_observes_changes() {
        let provider = SessionProvider::new();
        let mut rx = provider.subscribe();

        provider.sign_in(test_identity());

        rx.changed().await.unwrap();
        let state = rx.borrow().clone();
        assert_eq!(state.identity, Some(test_identity()));
        assert!(!state.is_loading);

        provider.sign_out().await.unwrap();

        rx.changed().await.unwrap();
        assert!(rx.borrow().identity.is_none());
    }
}
