//! Output generation for collected reviews.
//!
//! # Submodules
//!
//! - [`partition`]: flattens buffered reviews and encodes them as numbered,
//!   gzip-compressed CSV partitions
//!
//! # Output Structure
//!
//! ```text
//! storage root/
//! ├── metadata/metadata.json             # progress table
//! └── reviews/
//!     ├── reviews_partition_1.csv.gz
//!     └── reviews_partition_2.csv.gz
//! ```

pub mod partition;
