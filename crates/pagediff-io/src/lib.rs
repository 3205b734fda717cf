//! pagediff-io: Filesystem and process I/O for pagediff.
//!
//! Everything in `pagediff-core` is in-memory; this crate connects it to
//! the outside world:
//!
//! - [`DirectoryStore`]: baselines as `{stem}_page_{n}.png` files with
//!   atomic replacement.
//! - [`Renderer`]s: `pdftoppm` and pre-rendered page directories.
//! - [`save_diff_images`] / [`write_report`]: run artifacts.

use std::path::PathBuf;

pub mod output;
pub mod raster;
pub mod render;
pub mod store;

pub use output::{diff_image_name, save_diff_images, write_report};
pub use raster::{read_grid, write_png_atomic};
pub use render::{DocumentSource, PageImageRenderer, PdftoppmRenderer, Renderer, render_all};
pub use store::DirectoryStore;

/// Errors from filesystem and image codec operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// A filesystem operation failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An image could not be decoded or encoded.
    #[error("{}: {reason}", path.display())]
    Image {
        /// Image file involved.
        path: PathBuf,
        /// Codec diagnostic.
        reason: String,
    },
}
