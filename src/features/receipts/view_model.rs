use crate::features::auth::{SessionProvider, SessionState};
use crate::features::images::ImageStore;
use crate::features::receipts::models::{parse_amount, Receipt, ReceiptInput};
use crate::features::receipts::repository::ReceiptRepository;
use crate::shared::errors::{AppError, AppResult};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// ユーザー操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// 領収書の追加
    Add,
    /// 領収書の編集
    Edit,
    /// 領収書の削除
    Delete,
}

/// 操作結果の通知
///
/// すべての追加・編集・削除操作はこの1つの通知に集約され、
/// 操作種別×成否の6種類の固定メッセージのいずれかに対応付けられます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionResult {
    /// 操作の種類
    pub kind: ActionKind,
    /// 操作が成功したかどうか
    pub success: bool,
}

impl ActionResult {
    /// ユーザー向けの通知メッセージを取得する
    pub fn message(&self) -> &'static str {
        match (self.kind, self.success) {
            (ActionKind::Add, true) => "領収書を追加しました",
            (ActionKind::Add, false) => "領収書の追加に失敗しました",
            (ActionKind::Edit, true) => "領収書を更新しました",
            (ActionKind::Edit, false) => "領収書の更新に失敗しました",
            (ActionKind::Delete, true) => "領収書を削除しました",
            (ActionKind::Delete, false) => "領収書の削除に失敗しました",
        }
    }
}

/// 進行中のユーザー操作
///
/// 同時に進行できる操作は1つだけです。並行した操作の開始を防ぐのは
/// プレゼンテーション層の責務（ダイアログ表示中のボタン無効化など）です。
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PendingAction {
    /// 操作なし
    #[default]
    None,
    /// 追加ダイアログを表示中
    Add,
    /// 編集対象を保持して編集ダイアログを表示中
    Edit(Receipt),
    /// 削除対象のIDと画像参照を保持して確認ダイアログを表示中
    Delete { id: String, image_bucket: String },
}

/// ビューモデルが公開するリアクティブな状態
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptListState {
    /// 表示中の領収書一覧（ライブクエリが配信した最新スナップショット）
    pub receipts: Vec<Receipt>,
    /// 合計支出（サーバー側の集計結果）
    pub total_spent: f64,
    /// 初回スナップショットの配信を待っているかどうか
    pub is_loading: bool,
    /// 進行中のユーザー操作
    pub pending_action: PendingAction,
    /// 直近の操作結果
    pub last_result: Option<ActionResult>,
}

impl ReceiptListState {
    /// 初期状態（読み込み中・一覧なし）を作成する
    pub fn initial() -> Self {
        Self {
            receipts: Vec::new(),
            total_spent: 0.0,
            is_loading: true,
            pending_action: PendingAction::None,
            last_result: None,
        }
    }
}

/// 領収書画面のビューモデル
///
/// ライブクエリに同期した一覧と派生集計を保持し、追加・編集・削除の
/// 操作手順（画像とドキュメントの連携書き込み）を調整します。一覧は
/// リポジトリのキャッシュであり、直接変更せず、必ず書き込み後の
/// スナップショット配信によって更新されます。
pub struct ReceiptViewModel {
    /// 所有ユーザーのID
    uid: String,
    /// セッション状態の購読（サインアウトの検知に使用）
    session: watch::Receiver<SessionState>,
    /// 領収書リポジトリ
    repository: Arc<ReceiptRepository>,
    /// 画像ストアクライアント
    images: Arc<dyn ImageStore>,
    /// プレゼンテーション層へ公開する状態チャンネル
    state: Arc<watch::Sender<ReceiptListState>>,
    /// スナップショットを状態へ反映するタスク
    pump: Option<JoinHandle<()>>,
}

impl ReceiptViewModel {
    /// 新しいReceiptViewModelを作成する
    ///
    /// セッションを明示的な依存として受け取り、現在の認証済みユーザーの
    /// uidをすべてのリポジトリ操作のパーティションキーにします。グローバル
    /// な認証状態を参照することはありません。
    ///
    /// # 引数
    /// * `session` - セッションプロバイダ（サインイン済みであること）
    /// * `repository` - 領収書リポジトリ
    /// * `images` - 画像ストアクライアント
    ///
    /// # 戻り値
    /// ReceiptViewModel、未サインインの場合はバリデーションエラー
    pub fn new(
        session: &SessionProvider,
        repository: Arc<ReceiptRepository>,
        images: Arc<dyn ImageStore>,
    ) -> AppResult<Self> {
        let identity = session
            .current_identity()
            .ok_or_else(|| AppError::validation("サインインしていません"))?;

        let (state, _) = watch::channel(ReceiptListState::initial());
        Ok(Self {
            uid: identity.uid,
            session: session.subscribe(),
            repository,
            images,
            state: Arc::new(state),
            pump: None,
        })
    }

    /// ライブクエリの購読を開始する
    ///
    /// 初回スナップショットの配信で読み込み完了となり、あわせて合計支出を
    /// 取得します。以降はバッキングストアの変更のたびに一覧が置き換わり
    /// ます（合計はスナップショット配信では再計算されません）。セッション
    /// のサインアウトを検知すると配信を停止します。
    pub fn start(&mut self) {
        if self.pump.is_some() {
            log::warn!("ライブクエリはすでに開始されています: uid={}", self.uid);
            return;
        }

        let mut subscription = self.repository.subscribe(&self.uid);
        let mut session = self.session.clone();
        let state = Arc::clone(&self.state);
        let repository = Arc::clone(&self.repository);
        let uid = self.uid.clone();

        self.pump = Some(tokio::spawn(async move {
            let mut first_delivery = true;

            loop {
                tokio::select! {
                    snapshot = subscription.next_snapshot() => {
                        let Some(snapshot) = snapshot else { break };

                        state.send_modify(|s| {
                            s.receipts = snapshot;
                            s.is_loading = false;
                        });

                        // 初回配信後に1度だけ合計支出を取得する
                        if first_delivery {
                            first_delivery = false;
                            match repository.sum_spent(&uid).await {
                                Ok(total) => state.send_modify(|s| s.total_spent = total),
                                Err(e) => log::error!(
                                    "初回の合計支出の取得に失敗しました: uid={uid}, error={e}"
                                ),
                            }
                        }
                    }
                    changed = session.changed() => {
                        if changed.is_err() {
                            break;
                        }

                        let signed_out = {
                            let current = session.borrow();
                            current.identity.as_ref().map(|i| i.uid.as_str())
                                != Some(uid.as_str())
                        };
                        if signed_out {
                            log::info!(
                                "サインアウトによりライブクエリの配信を停止します: uid={uid}"
                            );
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// ライブクエリを配信中かどうか
    pub fn is_delivering(&self) -> bool {
        self.pump.as_ref().is_some_and(|pump| !pump.is_finished())
    }

    /// ライブクエリの購読を停止する
    ///
    /// 以後のスナップショット配信は停止しますが、実行中の書き込みは
    /// キャンセルされません。
    pub fn shutdown(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            log::debug!("ライブクエリの購読を停止しました: uid={}", self.uid);
        }
    }

    /// 状態の変更を購読する
    pub fn subscribe(&self) -> watch::Receiver<ReceiptListState> {
        self.state.subscribe()
    }

    /// 表示中の領収書一覧を取得する
    pub fn receipts(&self) -> Vec<Receipt> {
        self.state.borrow().receipts.clone()
    }

    /// 合計支出を取得する
    pub fn total_spent(&self) -> f64 {
        self.state.borrow().total_spent
    }

    /// 初回スナップショットの配信を待っているかどうか
    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    /// 進行中のユーザー操作を取得する
    pub fn pending_action(&self) -> PendingAction {
        self.state.borrow().pending_action.clone()
    }

    /// 直近の操作結果を取得する
    pub fn last_result(&self) -> Option<ActionResult> {
        self.state.borrow().last_result
    }

    /// 表示中の一覧に対する最小支出を取得する
    ///
    /// # 戻り値
    /// 最小の金額、一覧が空の場合はNone
    pub fn min_spent(&self) -> Option<f64> {
        fold_bounds(&self.state.borrow().receipts).0
    }

    /// 表示中の一覧に対する最大支出を取得する
    ///
    /// # 戻り値
    /// 最大の金額、一覧が空の場合はNone
    pub fn max_spent(&self) -> Option<f64> {
        fold_bounds(&self.state.borrow().receipts).1
    }

    /// 追加操作を開始する（追加ダイアログの表示）
    ///
    /// 保持していた編集対象はクリアされます。
    pub fn request_add(&self) {
        self.state
            .send_modify(|s| s.pending_action = PendingAction::Add);
    }

    /// 編集操作を開始する（編集対象を保持して編集ダイアログの表示）
    ///
    /// # 引数
    /// * `receipt` - 編集対象の領収書
    pub fn request_edit(&self, receipt: Receipt) {
        self.state
            .send_modify(|s| s.pending_action = PendingAction::Edit(receipt));
    }

    /// 削除操作を開始する（削除対象を保持して確認ダイアログの表示）
    ///
    /// # 引数
    /// * `id` - 削除対象の領収書ID
    /// * `image_bucket` - 削除対象の画像参照
    pub fn request_delete(&self, id: &str, image_bucket: &str) {
        let id = id.to_string();
        let image_bucket = image_bucket.to_string();
        self.state
            .send_modify(|s| s.pending_action = PendingAction::Delete { id, image_bucket });
    }

    /// 進行中の操作をキャンセルする（ダイアログを閉じる）
    pub fn cancel_pending_action(&self) {
        self.state
            .send_modify(|s| s.pending_action = PendingAction::None);
    }

    /// 領収書を追加する
    ///
    /// 画像のアップロード、ドキュメントの追加、合計支出の再計算の順に
    /// 実行します。成否にかかわらず進行中の操作はクリアされ、結果が
    /// 通知されます。
    ///
    /// # 引数
    /// * `input` - 領収書の入力フィールド
    /// * `image` - 領収書画像のバイト列
    pub async fn submit_add(&self, input: &ReceiptInput, image: Vec<u8>) -> AppResult<()> {
        let result = self.run_add(input, image).await;
        self.finish_action(ActionKind::Add, result.is_ok());
        result
    }

    async fn run_add(&self, input: &ReceiptInput, image: Vec<u8>) -> AppResult<()> {
        let bucket = self.images.upload(image, &self.uid).await?;
        self.repository.add(&self.uid, input, &bucket).await?;
        self.refresh_total().await?;
        Ok(())
    }

    /// 保持している編集対象を上書きする
    ///
    /// 新しい画像が指定された場合は既存の画像参照をそのまま使って
    /// 置き換えます。成否にかかわらず進行中の操作はクリアされ、結果が
    /// 通知されます。
    ///
    /// # 引数
    /// * `input` - 領収書の入力フィールド
    /// * `new_image` - 置き換える画像のバイト列（変更しない場合はNone）
    pub async fn submit_edit(
        &self,
        input: &ReceiptInput,
        new_image: Option<Vec<u8>>,
    ) -> AppResult<()> {
        let staged = match self.pending_action() {
            PendingAction::Edit(receipt) => receipt,
            other => {
                log::warn!("編集対象が保持されていない状態で編集が要求されました: {other:?}");
                return Err(AppError::validation("編集対象が選択されていません"));
            }
        };

        let result = self.run_edit(&staged, input, new_image).await;
        self.finish_action(ActionKind::Edit, result.is_ok());
        result
    }

    async fn run_edit(
        &self,
        staged: &Receipt,
        input: &ReceiptInput,
        new_image: Option<Vec<u8>>,
    ) -> AppResult<()> {
        if let Some(image) = new_image {
            self.images.replace(image, &staged.image_bucket).await?;
        }
        self.repository
            .update(&staged.id, &self.uid, input, &staged.image_bucket)
            .await?;
        self.refresh_total().await?;
        Ok(())
    }

    /// 保持している削除対象を削除する
    ///
    /// ドキュメントの削除、画像の削除、合計支出の再計算の順に実行します。
    /// 途中で失敗した場合は直ちに中断し、合計は再計算されません（次回の
    /// 成功した書き込みまたは購読の更新まで古い値のままになります）。
    /// 成否にかかわらず削除対象はクリアされ、結果が通知されます。
    pub async fn confirm_delete(&self) -> AppResult<()> {
        let (id, image_bucket) = match self.pending_action() {
            PendingAction::Delete { id, image_bucket } => (id, image_bucket),
            other => {
                log::warn!("削除対象が保持されていない状態で削除が要求されました: {other:?}");
                return Err(AppError::validation("削除対象が選択されていません"));
            }
        };

        let result = self.run_delete(&id, &image_bucket).await;
        self.finish_action(ActionKind::Delete, result.is_ok());
        result
    }

    async fn run_delete(&self, id: &str, image_bucket: &str) -> AppResult<()> {
        self.repository.delete(id).await?;
        self.images.delete(image_bucket).await?;
        self.refresh_total().await?;
        Ok(())
    }

    /// 合計支出を取得して状態へ反映する
    async fn refresh_total(&self) -> AppResult<()> {
        let total = self.repository.sum_spent(&self.uid).await?;
        self.state.send_modify(|s| s.total_spent = total);
        Ok(())
    }

    /// 操作の完了を状態へ反映し、結果を通知する
    fn finish_action(&self, kind: ActionKind, success: bool) {
        let result = ActionResult { kind, success };
        if success {
            log::info!("{}: uid={}", result.message(), self.uid);
        } else {
            log::error!("{}: uid={}", result.message(), self.uid);
        }

        self.state.send_modify(|s| {
            s.pending_action = PendingAction::None;
            s.last_result = Some(result);
        });
    }
}

impl Drop for ReceiptViewModel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 一覧に対する最小・最大支出を計算する
///
/// 解析できない金額は集計と同様にスキップします。一覧が空の場合は
/// (None, None)を返します。
fn fold_bounds(receipts: &[Receipt]) -> (Option<f64>, Option<f64>) {
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    for receipt in receipts {
        let Ok(value) = parse_amount(&receipt.amount) else {
            continue;
        };
        min = Some(min.map_or(value, |m| m.min(value)));
        max = Some(max.map_or(value, |m| m.max(value)));
    }

    (min, max)
}
