pub mod bucket;
pub mod index;
pub mod scanner;
pub mod signature;

pub use bucket::{distance, BucketKey, Bucketer};
pub use index::{DesignToken, InferredComponent, ScanIndex};
pub use scanner::{scan, DesignSystemScanner};
pub use signature::StructuralSignature;
