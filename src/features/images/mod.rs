// 領収書画像ストレージ機能モジュール

pub mod memory;
pub mod r2;
pub mod store;

// 公開インターフェース
pub use memory::MemoryImageStore;
pub use r2::R2ImageStore;
pub use store::{generate_bucket_key, validate_image, ImageStore, MAX_IMAGE_SIZE};
