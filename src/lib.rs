//! レシート画像付き経費トラッカーの同期・集計コア
//!
//! ユーザーが撮影したレシート画像をアップロードし、構造化された経費エントリ
//! （日付・店舗名・住所・品目・金額）を記録・編集・削除するアプリケーションの
//! データ層を提供します。表示用のUI（ダイアログ、テーマ、ルーティング）は
//! このクレートの範囲外で、ホスト側が`ReceiptViewModel`の公開インターフェース
//! を通じて操作します。

/// 機能別モジュール
pub mod features;

/// 共有モジュール（エラー型、設定、データベース接続）
pub mod shared;

// 便利な再エクスポート
pub use features::auth::{AuthIdentity, SessionProvider, SessionState};
pub use features::images::{ImageStore, MemoryImageStore, R2ImageStore};
pub use features::receipts::{
    ActionKind, ActionResult, PendingAction, Receipt, ReceiptInput, ReceiptListState,
    ReceiptRepository, ReceiptSubscription, ReceiptViewModel,
};
pub use shared::errors::{AppError, AppResult};
