// 領収書機能のデータモデル

use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 領収書レコード
///
/// 1人のユーザーが所有する1件の購入記録です。`image_url`は永続化されず、
/// 読み取り時に`image_bucket`から解決される派生フィールドです。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// リポジトリが採番する不変のID
    pub id: String,
    /// 所有ユーザーのID（作成時に設定され、以後変更されない）
    pub uid: String,
    /// 購入日時（一覧の唯一のソートキー、降順）
    pub date: DateTime<Utc>,
    /// 店舗名
    pub location_name: String,
    /// 店舗の住所
    pub address: String,
    /// 購入した品目の一覧
    pub items: Vec<String>,
    /// 金額（ワイヤ上は十進文字列）
    pub amount: String,
    /// 画像のバケット参照
    pub image_bucket: String,
    /// 画像の取得用URL（読み取り時に解決される、永続化されない）
    pub image_url: String,
}

/// 領収書の作成・更新用の入力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptInput {
    /// 購入日時
    pub date: DateTime<Utc>,
    /// 店舗名
    pub location_name: String,
    /// 店舗の住所
    pub address: String,
    /// 購入した品目の一覧
    pub items: Vec<String>,
    /// 金額（十進文字列）
    pub amount: String,
}

/// 金額文字列を数値として解析する
///
/// 書き込み時の境界バリデーションと集計時の解析の両方で使用します。
///
/// # 引数
/// * `amount` - 十進文字列の金額
///
/// # 戻り値
/// 解析された金額、解析できない場合はバリデーションエラー
pub fn parse_amount(amount: &str) -> AppResult<f64> {
    let value: f64 = amount
        .trim()
        .parse()
        .map_err(|_| AppError::validation(format!("金額を数値として解釈できません: {amount}")))?;

    if !value.is_finite() {
        return Err(AppError::validation(format!(
            "金額が有限の数値ではありません: {amount}"
        )));
    }

    Ok(value)
}
