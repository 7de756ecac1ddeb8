use crate::features::images::ImageStore;
use crate::features::receipts::models::{parse_amount, Receipt, ReceiptInput};
use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use futures::future;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// 変更通知チャンネルの容量
///
/// あふれた通知は購読側で1つのスナップショット再構築へ合流するため、
/// 容量超過が配信漏れになることはない。
const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// 領収書リポジトリ
///
/// ドキュメントストアへのCRUD操作と、uidで絞り込んだライブクエリを提供します。
/// ライブクエリは変更のたびに完全なスナップショット（差分ではない）を
/// date降順で配信し、各ドキュメントの`image_url`をImageStoreで解決します。
pub struct ReceiptRepository {
    /// データベース接続
    conn: Arc<Mutex<Connection>>,
    /// 画像ストアクライアント（URL解決に使用）
    images: Arc<dyn ImageStore>,
    /// 書き込みを購読者へ通知するチャンネル
    changes: broadcast::Sender<()>,
}

impl ReceiptRepository {
    /// 新しいReceiptRepositoryを作成する
    ///
    /// # 引数
    /// * `conn` - データベース接続
    /// * `images` - 画像ストアクライアント
    pub fn new(conn: Arc<Mutex<Connection>>, images: Arc<dyn ImageStore>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            conn,
            images,
            changes,
        }
    }

    /// 領収書を追加する
    ///
    /// # 引数
    /// * `uid` - 所有ユーザーのID
    /// * `input` - 領収書の入力フィールド
    /// * `image_bucket` - アップロード済み画像のバケット参照
    ///
    /// # 戻り値
    /// 採番されたID、または失敗時はエラー
    pub async fn add(
        &self,
        uid: &str,
        input: &ReceiptInput,
        image_bucket: &str,
    ) -> AppResult<String> {
        // 書き込み境界で金額を検証し、解析不能な行の新規作成を防ぐ
        parse_amount(&input.amount)?;

        let id = Uuid::new_v4().to_string();
        let items_json = serde_json::to_string(&input.items)?;

        {
            let conn = lock_connection(&self.conn)?;
            conn.execute(
                "INSERT INTO receipts (id, uid, date, location_name, address, items, amount, image_bucket)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    uid,
                    input.date.to_rfc3339(),
                    input.location_name,
                    input.address,
                    items_json,
                    input.amount,
                    image_bucket
                ],
            )?;
        }

        log::info!("領収書を追加しました: id={id}, uid={uid}");
        self.notify_changed();

        Ok(id)
    }

    /// 領収書を更新する（IDによる完全上書き）
    ///
    /// 部分的なフィールドのマージは行わないため、呼び出し側は完全なレコード
    /// を渡す必要があります。
    ///
    /// # 引数
    /// * `id` - 領収書ID
    /// * `uid` - 所有ユーザーのID
    /// * `input` - 領収書の入力フィールド
    /// * `image_bucket` - 画像のバケット参照
    ///
    /// # 戻り値
    /// 成功時はOk(())、対象が存在しない場合はNotFoundエラー
    pub async fn update(
        &self,
        id: &str,
        uid: &str,
        input: &ReceiptInput,
        image_bucket: &str,
    ) -> AppResult<()> {
        parse_amount(&input.amount)?;

        let items_json = serde_json::to_string(&input.items)?;

        let affected_rows = {
            let conn = lock_connection(&self.conn)?;
            conn.execute(
                "UPDATE receipts
                 SET uid = ?1, date = ?2, location_name = ?3, address = ?4,
                     items = ?5, amount = ?6, image_bucket = ?7
                 WHERE id = ?8",
                params![
                    uid,
                    input.date.to_rfc3339(),
                    input.location_name,
                    input.address,
                    items_json,
                    input.amount,
                    image_bucket,
                    id
                ],
            )?
        };

        if affected_rows == 0 {
            return Err(AppError::not_found("領収書"));
        }

        log::info!("領収書を更新しました: id={id}");
        self.notify_changed();

        Ok(())
    }

    /// 領収書を削除する
    ///
    /// 画像の削除はカスケードしません（呼び出し側の責務）。
    ///
    /// # 引数
    /// * `id` - 領収書ID
    ///
    /// # 戻り値
    /// 成功時はOk(())、対象が存在しない場合はNotFoundエラー
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        let affected_rows = {
            let conn = lock_connection(&self.conn)?;
            conn.execute("DELETE FROM receipts WHERE id = ?1", params![id])?
        };

        if affected_rows == 0 {
            return Err(AppError::not_found("領収書"));
        }

        log::info!("領収書を削除しました: id={id}");
        self.notify_changed();

        Ok(())
    }

    /// ユーザーの合計支出を集計する
    ///
    /// # 引数
    /// * `uid` - 所有ユーザーのID
    ///
    /// # 戻り値
    /// 金額の合計（領収書が1件もない場合は0）
    pub async fn sum_spent(&self, uid: &str) -> AppResult<f64> {
        let amounts: Vec<String> = {
            let conn = lock_connection(&self.conn)?;
            let mut stmt = conn.prepare("SELECT amount FROM receipts WHERE uid = ?1")?;
            let rows = stmt.query_map(params![uid], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut total = 0.0;
        for amount in &amounts {
            match parse_amount(amount) {
                Ok(value) => total += value,
                Err(_) => {
                    // 書き込み境界の検証以前に作られた行が残っている可能性がある
                    log::warn!(
                        "数値として解釈できない金額をスキップしました: uid={uid}, amount={amount}"
                    );
                }
            }
        }

        Ok(total)
    }

    /// ライブクエリを開始する
    ///
    /// uidで絞り込んだ領収書一覧への購読を確立します。初回および
    /// 書き込みのたびに、date降順の完全なスナップショットが配信されます。
    /// 連続した書き込みは1つのスナップショットに合流することがあるため、
    /// 購読側は各配信を全状態の置き換えとして扱う必要があります。
    ///
    /// # 引数
    /// * `uid` - 所有ユーザーのID
    ///
    /// # 戻り値
    /// スナップショットを受信する購読ハンドル
    pub fn subscribe(&self, uid: &str) -> ReceiptSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        // 取りこぼしを防ぐため、初回スナップショット構築の前に購読を確立する
        let mut changes = self.changes.subscribe();
        let conn = Arc::clone(&self.conn);
        let images = Arc::clone(&self.images);
        let uid = uid.to_string();

        let task = tokio::spawn(async move {
            // 初回スナップショットを配信する
            match build_snapshot(&conn, &images, &uid).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    log::error!("初回スナップショットの構築に失敗しました: uid={uid}, error={e}")
                }
            }

            loop {
                match changes.recv().await {
                    Ok(()) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("変更通知を{skipped}件まとめて処理します: uid={uid}");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }

                match build_snapshot(&conn, &images, &uid).await {
                    Ok(snapshot) => {
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!(
                            "スナップショットの構築に失敗しました: uid={uid}, error={e}"
                        );
                    }
                }
            }
        });

        ReceiptSubscription { rx, task }
    }

    /// 書き込みをライブクエリの購読者へ通知する
    fn notify_changed(&self) {
        // 購読者がいない場合の送信エラーは無視する
        let _ = self.changes.send(());
    }
}

/// ライブクエリの購読ハンドル
///
/// ドロップまたは`unsubscribe`で配信が停止します。停止後も実行中の
/// 書き込みはキャンセルされません。
pub struct ReceiptSubscription {
    rx: mpsc::UnboundedReceiver<Vec<Receipt>>,
    task: JoinHandle<()>,
}

impl ReceiptSubscription {
    /// 次のスナップショットを受信する
    ///
    /// # 戻り値
    /// 完全な領収書一覧、購読が停止した場合はNone
    pub async fn next_snapshot(&mut self) -> Option<Vec<Receipt>> {
        self.rx.recv().await
    }

    /// 購読を停止する
    pub fn unsubscribe(self) {
        // Dropで配信タスクが停止する
    }
}

impl Drop for ReceiptSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// データベース接続をロックする
fn lock_connection(conn: &Arc<Mutex<Connection>>) -> AppResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| AppError::concurrency("データベース接続のロックに失敗しました"))
}

/// uidで絞り込んだスナップショットを構築する
///
/// 各ドキュメントの画像URLをImageStoreで解決し、date降順の完全な一覧を
/// 返します。
async fn build_snapshot(
    conn: &Arc<Mutex<Connection>>,
    images: &Arc<dyn ImageStore>,
    uid: &str,
) -> AppResult<Vec<Receipt>> {
    let mut receipts = {
        let conn = lock_connection(conn)?;
        fetch_receipts(&conn, uid)?
    };

    // 画像URLの解決はネットワーク往復になるため並行して行う
    let urls = future::try_join_all(
        receipts
            .iter()
            .map(|receipt| images.resolve_url(&receipt.image_bucket)),
    )
    .await?;

    for (receipt, url) in receipts.iter_mut().zip(urls) {
        receipt.image_url = url;
    }

    Ok(receipts)
}

/// uidで絞り込んだ領収書をdate降順で読み出す（image_urlは未解決）
fn fetch_receipts(conn: &Connection, uid: &str) -> AppResult<Vec<Receipt>> {
    let mut stmt = conn.prepare(
        "SELECT id, uid, date, location_name, address, items, amount, image_bucket
         FROM receipts WHERE uid = ?1 ORDER BY date DESC",
    )?;

    let rows = stmt.query_map(params![uid], |row| {
        let date_str: String = row.get(2)?;
        let date = DateTime::parse_from_rfc3339(&date_str)
            .map_err(|_e| {
                rusqlite::Error::InvalidColumnType(2, "date".to_string(), rusqlite::types::Type::Text)
            })?
            .with_timezone(&Utc);

        let items_json: String = row.get(5)?;
        let items: Vec<String> = serde_json::from_str(&items_json).map_err(|_e| {
            rusqlite::Error::InvalidColumnType(5, "items".to_string(), rusqlite::types::Type::Text)
        })?;

        Ok(Receipt {
            id: row.get(0)?,
            uid: row.get(1)?,
            date,
            location_name: row.get(3)?,
            address: row.get(4)?,
            items,
            amount: row.get(6)?,
            image_bucket: row.get(7)?,
            // 呼び出し側がImageStoreで解決する
            image_url: String::new(),
        })
    })?;

    rows.collect::<Result<Vec<_>, _>>().map_err(AppError::Database)
}
