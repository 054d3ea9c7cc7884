pub mod daft;
pub mod error;
pub mod extract;
pub mod traits;
pub mod types;

pub use daft::DaftFetcher;
pub use error::FetchError;
pub use extract::{ExtractPolicy, Extractor};
pub use traits::ListingFetcher;
pub use types::{RawDocument, SearchParams};
