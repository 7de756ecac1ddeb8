/// 領収書機能モジュール
///
/// このモジュールは領収書管理に関連するすべての機能を提供します：
/// - 領収書の作成、読み取り、更新、削除（CRUD操作）
/// - ライブクエリによる一覧の購読
/// - 合計・最小・最大支出の集計
/// - 画像とドキュメントのライフサイクルの調整
// サブモジュールの宣言
pub mod models;
pub mod repository;
pub mod view_model;

// 公開インターフェース

// モデル
pub use models::{parse_amount, Receipt, ReceiptInput};

// リポジトリ（データベース操作とライブクエリ）
pub use repository::{ReceiptRepository, ReceiptSubscription};

// ビューモデル（操作のシーケンスと派生状態）
pub use view_model::{
    ActionKind, ActionResult, PendingAction, ReceiptListState, ReceiptViewModel,
};
