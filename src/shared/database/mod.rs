/// データベース接続と初期化
pub mod connection;

pub use connection::{
    create_in_memory_connection, create_tables, get_database_path, initialize_database,
};
