use crate::shared::errors::{AppError, AppResult};

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: String,
    /// デバッグモードの有効/無効
    pub debug_mode: bool,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// 環境設定
    pub fn from_env() -> Self {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;
        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        Self {
            environment: format!("{environment:?}").to_lowercase(),
            debug_mode,
            log_level,
        }
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 開発環境かどうかを判定
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

/// 現在の実行環境を判定する
///
/// # 戻り値
/// 現在の実行環境（Development または Production）
///
/// # 判定ロジック
/// 1. コンパイル時埋め込み環境変数を最優先
/// 2. 実行時環境変数 ENVIRONMENT を確認
/// 3. デバッグビルドの場合は Development
/// 4. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    // コンパイル時埋め込み環境変数を最優先
    if let Some(embedded_env) = option_env!("EMBEDDED_ENVIRONMENT") {
        let env = match embedded_env {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: コンパイル時埋め込み値を使用 -> {embedded_env} -> {env:?}");
        return env;
    }

    // 実行時環境変数を確認
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    // フォールバック: ビルド設定に基づく判定
    if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    }
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # 引数
/// * `env` - 実行環境
///
/// # 戻り値
/// データベースファイル名
///
/// # ファイル名の規則
/// - 開発環境: "dev_receipts.db"
/// - プロダクション環境: "receipts.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_receipts.db",
        Environment::Production => "receipts.db",
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// # 処理内容
/// 1. ENVIRONMENTに応じた.envファイルのパスを決定
/// 2. 指定された.envファイルを読み込み
/// 3. 見つからない場合はデフォルトの.envへフォールバック
pub fn load_environment_variables() {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    // 環境に応じた.envファイルのパスを決定
    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            log::info!("{env_file}ファイルを読み込みました");
        }
        Err(_) => {
            if env_file != ".env" && dotenv::dotenv().is_ok() {
                log::warn!("{env_file}が見つからないため、デフォルトの.envファイルを読み込みました");
            } else {
                log::warn!("環境変数ファイルが見つかりません。直接設定された環境変数を使用します。");
            }
        }
    }
}

/// ログシステムを初期化する
///
/// # 処理内容
/// 1. 環境設定を取得
/// 2. ログレベルを設定
/// 3. env_loggerを初期化
pub fn initialize_logging_system() {
    let env_config = EnvironmentConfig::from_env();

    let log_level = match env_config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .init();

    log::info!(
        "ログシステムを初期化しました: level={}, environment={}",
        env_config.log_level,
        env_config.environment
    );
}

/// R2（Cloudflare R2）の設定を管理する構造体
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2のアクセスキーID
    pub access_key_id: String,
    /// R2のシークレットアクセスキー
    pub secret_access_key: String,
    /// R2のバケット名
    pub bucket_name: String,
    /// R2のエンドポイントURL
    pub endpoint_url: String,
    /// R2のリージョン
    pub region: String,
}

impl R2Config {
    /// 環境変数からR2設定を読み込む
    ///
    /// # 戻り値
    /// R2設定、または設定が不完全な場合はエラー
    pub fn from_env() -> AppResult<Self> {
        log::debug!("R2Config::from_env() - 環境変数の読み込みを開始");

        let access_key_id = require_env("R2_ACCESS_KEY_ID")?;
        let secret_access_key = require_env("R2_SECRET_ACCESS_KEY")?;
        let bucket_name = require_env("R2_BUCKET_NAME")?;
        let endpoint_url = require_env("R2_ENDPOINT_URL")?;
        let region = std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string());

        let config = Self {
            access_key_id,
            secret_access_key,
            bucket_name,
            endpoint_url,
            region,
        };
        config.validate()?;

        log::debug!("R2Config::from_env() - 設定の読み込みが完了しました");
        Ok(config)
    }

    /// 設定を検証する
    ///
    /// # 戻り値
    /// 設定が有効な場合はOk(())、無効な場合はエラー
    pub fn validate(&self) -> AppResult<()> {
        if self.access_key_id.is_empty()
            || self.secret_access_key.is_empty()
            || self.bucket_name.is_empty()
        {
            return Err(AppError::configuration("R2設定が不完全です"));
        }

        if !self.endpoint_url.starts_with("https://") {
            return Err(AppError::configuration(
                "R2エンドポイントURLはHTTPS形式である必要があります",
            ));
        }

        Ok(())
    }

    /// 環境別バケット名を取得する
    ///
    /// # 戻り値
    /// 開発環境では"-dev"サフィックス付きのバケット名
    pub fn get_environment_bucket_name(&self) -> String {
        match get_environment() {
            Environment::Production => self.bucket_name.clone(),
            Environment::Development => format!("{}-dev", self.bucket_name),
        }
    }

    /// デバッグ情報を取得（シークレットはマスクする）
    ///
    /// # 戻り値
    /// デバッグ情報のマップ
    pub fn get_debug_info(&self) -> std::collections::HashMap<String, String> {
        let mut info = std::collections::HashMap::new();
        info.insert(
            "access_key_id".to_string(),
            format!("{}****", &self.access_key_id[..4.min(self.access_key_id.len())]),
        );
        info.insert("bucket_name".to_string(), self.bucket_name.clone());
        info.insert("endpoint_url".to_string(), self.endpoint_url.clone());
        info.insert("region".to_string(), self.region.clone());
        info
    }
}

/// 必須環境変数を取得する
///
/// # 引数
/// * `name` - 環境変数名
fn require_env(name: &str) -> AppResult<String> {
    std::env::var(name).map_err(|_| {
        log::error!("{name} が見つかりません");
        AppError::configuration(format!("環境変数 {name} が設定されていません"))
    })
}
