use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;

/// 画像の最大サイズ（10MB）
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// 領収書画像のブロブストレージクライアント
///
/// 領収書1件につきちょうど1つの画像オブジェクトを、パスで内容参照する
/// ストレージに保存します。バケット参照（パス）はドキュメント側の
/// `image_bucket`フィールドに保持され、レコード削除時に画像も削除されます。
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// 画像をアップロードし、バケット参照を返す
    ///
    /// # 引数
    /// * `image` - 画像のバイト列（JPEG）
    /// * `uid` - 所有ユーザーのID（パスの名前空間に使用）
    ///
    /// # 戻り値
    /// 保存先のバケット参照、または失敗時はエラー
    async fn upload(&self, image: Vec<u8>, uid: &str) -> AppResult<String>;

    /// バケット参照から取得用URLを解決する
    ///
    /// # 引数
    /// * `bucket` - バケット参照
    ///
    /// # 戻り値
    /// 取得用URL、オブジェクトが存在しない場合はNotFoundエラー
    async fn resolve_url(&self, bucket: &str) -> AppResult<String>;

    /// 既存のバケット参照の画像を上書きする
    ///
    /// # 引数
    /// * `image` - 新しい画像のバイト列
    /// * `bucket` - 既存のバケット参照（パスは再利用される）
    async fn replace(&self, image: Vec<u8>, bucket: &str) -> AppResult<()>;

    /// 画像を削除する
    ///
    /// すでに削除済みのオブジェクトに対する削除は致命的エラーとしない
    /// （呼び出し側から見て冪等）。
    ///
    /// # 引数
    /// * `bucket` - バケット参照
    async fn delete(&self, bucket: &str) -> AppResult<()>;
}

/// 画像のバケット参照キーを生成する
///
/// # 引数
/// * `uid` - 所有ユーザーのID
///
/// # 戻り値
/// `receipts/{uid}/{タイムスタンプ}.jpg` 形式のキー
///
/// # 既知の制限
/// タイムスタンプは秒粒度のため、同一ユーザーが同一秒内に複数アップロード
/// するとキーが衝突します。個人利用では発生確率が無視できるため許容します。
pub fn generate_bucket_key(uid: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!("receipts/{uid}/{timestamp}.jpg")
}

/// アップロード前の画像を検証する
///
/// # 引数
/// * `image` - 画像のバイト列
///
/// # 戻り値
/// 成功時はOk(())、空またはサイズ超過の場合はエラー
pub fn validate_image(image: &[u8]) -> AppResult<()> {
    if image.is_empty() {
        return Err(AppError::validation("画像データが空です"));
    }

    if image.len() > MAX_IMAGE_SIZE {
        return Err(AppError::validation(
            "画像サイズが10MBを超えています",
        ));
    }

    Ok(())
}
