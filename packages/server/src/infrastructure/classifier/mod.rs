//! コード分類サービスの実装
//!
//! - `http`: 外部の分類サービスに JSON で問い合わせる

pub mod http;

pub use http::HttpCodeClassifier;
