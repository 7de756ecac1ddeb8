// 領収書画像のR2（S3互換）ストアクライアント

use crate::features::images::store::{generate_bucket_key, validate_image, ImageStore};
use crate::shared::config::environment::R2Config;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::{Client, Config};
use log::{debug, error, info};
use std::time::Duration;

/// 取得用Presigned URLの有効期限（1時間）
const DOWNLOAD_URL_EXPIRY: Duration = Duration::from_secs(60 * 60);

/// R2に領収書画像を保存するImageStore実装
#[derive(Clone)]
pub struct R2ImageStore {
    client: Client,
    bucket_name: String,
}

impl R2ImageStore {
    /// R2クライアントを初期化する
    ///
    /// # 引数
    /// * `config` - R2設定
    ///
    /// # 戻り値
    /// 初期化されたクライアント、または失敗時はエラー
    pub async fn new(config: R2Config) -> AppResult<Self> {
        info!("R2クライアントを初期化しています...");

        // 設定を検証
        config.validate().map_err(|e| {
            error!("R2設定の検証に失敗しました: {e:?}");
            e
        })?;

        // 認証情報を設定（ログには出力しない）
        debug!("認証情報を設定中...");
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        // S3互換設定を構築
        debug!("AWS設定を構築中... エンドポイント: {}", config.endpoint_url);
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(config.endpoint_url.clone())
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .load()
            .await;

        let s3_config = Config::from(&aws_config);
        let client = Client::from_conf(s3_config);

        // 環境別バケット名を使用
        let bucket_name = config.get_environment_bucket_name();

        info!("R2クライアントの初期化が完了しました。バケット: {bucket_name}");

        Ok(Self {
            client,
            bucket_name,
        })
    }

    /// 接続テストを実行する
    ///
    /// # 戻り値
    /// バケットにアクセスできる場合はOk(())、失敗時はエラー
    pub async fn test_connection(&self) -> AppResult<()> {
        info!("R2接続テストを開始します: bucket={}", self.bucket_name);

        self.client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "R2接続テスト失敗: bucket={}, error={}",
                    self.bucket_name, e
                );
                AppError::ExternalService(format!("R2接続テストに失敗しました: {e}"))
            })?;

        info!("R2接続テスト成功: bucket={}", self.bucket_name);
        Ok(())
    }

    /// キーにオブジェクトを書き込む
    async fn put_object(&self, key: &str, image: Vec<u8>) -> AppResult<()> {
        let file_size = image.len();
        info!("画像アップロード開始: key={key}, size={file_size} bytes");

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(image.into())
            .content_type("image/jpeg")
            .send()
            .await
            .map_err(|e| {
                error!(
                    "画像アップロード失敗: key={}, bucket={}, error={}",
                    key, self.bucket_name, e
                );
                AppError::ExternalService(format!("R2アップロードに失敗しました: {e}"))
            })?;

        info!("画像アップロード成功: key={key}");
        Ok(())
    }
}

#[async_trait]
impl ImageStore for R2ImageStore {
    async fn upload(&self, image: Vec<u8>, uid: &str) -> AppResult<String> {
        validate_image(&image)?;

        let key = generate_bucket_key(uid);
        self.put_object(&key, image).await?;

        Ok(key)
    }

    async fn resolve_url(&self, bucket: &str) -> AppResult<String> {
        // 存在確認（欠損参照はNotFoundとして報告する）
        self.client
            .head_object()
            .bucket(&self.bucket_name)
            .key(bucket)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    debug!("画像オブジェクトが存在しません: key={bucket}");
                    AppError::not_found("領収書画像")
                } else {
                    AppError::ExternalService(format!(
                        "R2オブジェクト確認エラー: {service_error}"
                    ))
                }
            })?;

        // ダウンロード用のPresigned URLを生成
        let presigning_config = PresigningConfig::expires_in(DOWNLOAD_URL_EXPIRY)
            .map_err(|e| AppError::ExternalService(format!("Presigned URL設定エラー: {e}")))?;

        let presigned_request = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(bucket)
            .presigned(presigning_config)
            .await
            .map_err(|e| AppError::ExternalService(format!("Presigned URL生成エラー: {e}")))?;

        Ok(presigned_request.uri().to_string())
    }

    async fn replace(&self, image: Vec<u8>, bucket: &str) -> AppResult<()> {
        validate_image(&image)?;

        // 既存のキーを再利用してそのまま上書きする
        self.put_object(bucket, image).await
    }

    async fn delete(&self, bucket: &str) -> AppResult<()> {
        // S3互換APIでは存在しないキーの削除も成功として扱われるため、
        // この操作は呼び出し側から見て冪等になる
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(bucket)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("R2削除エラー: {e}")))?;

        info!("画像を削除しました: key={bucket}");
        Ok(())
    }
}
