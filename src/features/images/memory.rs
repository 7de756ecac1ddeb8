// インメモリのImageStore実装（テスト・オフライン動作用）

use crate::features::images::store::{generate_bucket_key, validate_image, ImageStore};
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// プロセス内のマップに画像を保持するImageStore実装
///
/// テストとオフライン動作のために使用します。URLは`memory://{key}`形式で、
/// 実際のHTTP取得はできません。
#[derive(Default)]
pub struct MemoryImageStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    /// 空のMemoryImageStoreを作成する
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存されているオブジェクト数を取得する
    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// 保存されている画像のバイト列を取得する
    pub fn object_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok().and_then(|m| m.get(key).cloned())
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| AppError::concurrency("画像ストアのロックに失敗しました"))
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, image: Vec<u8>, uid: &str) -> AppResult<String> {
        validate_image(&image)?;

        let key = generate_bucket_key(uid);
        self.lock()?.insert(key.clone(), image);

        log::debug!("画像をメモリに保存しました: key={key}");
        Ok(key)
    }

    async fn resolve_url(&self, bucket: &str) -> AppResult<String> {
        if self.lock()?.contains_key(bucket) {
            Ok(format!("memory://{bucket}"))
        } else {
            Err(AppError::not_found("領収書画像"))
        }
    }

    async fn replace(&self, image: Vec<u8>, bucket: &str) -> AppResult<()> {
        validate_image(&image)?;

        // 同じキーをそのまま上書きする
        self.lock()?.insert(bucket.to_string(), image);
        Ok(())
    }

    async fn delete(&self, bucket: &str) -> AppResult<()> {
        // 存在しないキーの削除は冪等に成功させる
        if self.lock()?.remove(bucket).is_none() {
            log::debug!("削除対象の画像が存在しませんでした: key={bucket}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_resolve() {
        let store = MemoryImageStore::new();

        let bucket = store.upload(vec![1, 2, 3], "u1").await.unwrap();
        assert!(bucket.starts_with("receipts/u1/"));

        let url = store.resolve_url(&bucket).await.unwrap();
        assert_eq!(url, format!("memory://{bucket}"));
    }

    #[tokio::test]
    async fn test_resolve_missing_is_not_found() {
        let store = MemoryImageStore::new();

        let result = store.resolve_url("receipts/u1/missing.jpg").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_replace_reuses_key() {
        let store = MemoryImageStore::new();

        let bucket = store.upload(vec![1], "u1").await.unwrap();
        store.replace(vec![2, 3], &bucket).await.unwrap();

        // キーが変わらず、オブジェクト数も増えないことを確認
        assert_eq!(store.object_count(), 1);
        assert!(store.resolve_url(&bucket).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryImageStore::new();

        let bucket = store.upload(vec![1], "u1").await.unwrap();
        store.delete(&bucket).await.unwrap();

        // 削除後の解決はNotFound
        assert!(store.resolve_url(&bucket).await.is_err());

        // 二重削除もエラーにならない
        assert!(store.delete(&bucket).await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_rejects_empty_image() {
        let store = MemoryImageStore::new();

        let result = store.upload(vec![], "u1").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
