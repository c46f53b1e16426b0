pub mod astra_client;
pub mod embedding_client;

pub use astra_client::AstraClient;
pub use embedding_client::{Embedder, EmbeddingClient};
