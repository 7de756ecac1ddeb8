use crate::shared::config::environment::{get_database_filename, get_environment};
use crate::shared::errors::{AppError, AppResult};
use rusqlite::Connection;
use std::path::PathBuf;

/// データベース接続を初期化し、テーブルを作成する
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. アプリケーションデータディレクトリの確保
/// 2. データベースファイルパスの決定
/// 3. データベース接続の開設
/// 4. テーブルとインデックスの作成
pub fn initialize_database() -> AppResult<Connection> {
    let database_path = get_database_path()?;

    let conn = Connection::open(&database_path)?;
    create_tables(&conn)?;

    log::info!("データベースを初期化しました: {:?}", database_path);

    Ok(conn)
}

/// アプリデータディレクトリ内のデータベースファイルパスを取得する
///
/// # 戻り値
/// データベースファイルのパス、または失敗時はエラー
pub fn get_database_path() -> AppResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| AppError::configuration("アプリデータディレクトリの取得に失敗しました"))?
        .join("receipt-tracker");

    // ディレクトリが存在しない場合は作成
    if !data_dir.exists() {
        std::fs::create_dir_all(&data_dir).map_err(|e| {
            AppError::configuration(format!("アプリデータディレクトリの作成に失敗: {e}"))
        })?;
        log::info!("アプリケーションデータディレクトリを作成: {:?}", data_dir);
    }

    let db_filename = get_database_filename(get_environment());
    Ok(data_dir.join(db_filename))
}

/// テスト用のインメモリデータベース接続を作成する
///
/// # 戻り値
/// テーブル作成済みのインメモリ接続、または失敗時はエラー
pub fn create_in_memory_connection() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

/// データベーステーブルを作成する
///
/// # 引数
/// * `conn` - データベース接続
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    // 領収書テーブル。idはリポジトリが採番するUUID、dateはRFC3339形式、
    // itemsはJSON配列、amountは十進文字列のまま保存する
    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            uid TEXT NOT NULL,
            date TEXT NOT NULL,
            location_name TEXT NOT NULL,
            address TEXT NOT NULL,
            items TEXT NOT NULL,
            amount TEXT NOT NULL,
            image_bucket TEXT NOT NULL
        )",
        [],
    )?;

    create_indexes(conn)?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    // すべての読み取りがuidで絞り込み、date降順で並べ替えるため
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_uid ON receipts(uid)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_date ON receipts(date)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables() {
        let conn = Connection::open_in_memory().unwrap();

        // テーブル作成が成功することを確認
        let result = create_tables(&conn);
        assert!(result.is_ok());

        // receiptsテーブルが作成されていることを確認
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='receipts'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1, "receiptsテーブルが作成されていません");

        // インデックスが作成されていることを確認
        let index_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name LIKE 'idx_receipts_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(index_count, 2);
    }

    #[test]
    fn test_create_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // 複数回実行してもエラーにならないことを確認
        assert!(create_tables(&conn).is_ok());
        assert!(create_tables(&conn).is_ok());
    }

    #[test]
    fn test_file_backed_database_persists_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("receipts.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            create_tables(&conn).unwrap();
            conn.execute(
                "INSERT INTO receipts (id, uid, date, location_name, address, items, amount, image_bucket)
                 VALUES ('r1', 'u1', '2024-01-01T00:00:00+00:00', '店', '住所', '[]', '10.00', 'b')",
                [],
            )
            .unwrap();
        }

        // 接続を閉じて開き直しても行が残っている
        let conn = Connection::open(&db_path).unwrap();
        create_tables(&conn).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_create_in_memory_connection() {
        let conn = create_in_memory_connection().unwrap();

        // テーブルが使用可能であることを確認
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM receipts", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
