//! # Strata
//!
//! `strata-core` renders vector-image documents into raster pixmaps.
//!
//! A document is built from a stream of start/end element events into an
//! arena of drawable nodes. Rendering is a separate recursive walk that keeps
//! an inheritable paint/transform state, resolves indirect references between
//! nodes and isolates subtrees in offscreen layers so that group effects
//! (opacity, clipping, masking, filter effects) apply once per subtree.
//!
//! ## Core Features
//!
//! *   **Scene Graph**: Arena of drawable nodes with parent back-references.
//! *   **Deferred References**: `use`, `filter`, `clip-path` and `mask` links
//!     may point forward; they are bound once the document is complete.
//! *   **Layer Isolation**: Group effects composite through offscreen layers.
//! *   **Filter Effects**: Sixteen primitives over named pixel buffers.
//! *   **Rasterizer**: [tiny-skia](https://crates.io/crates/tiny-skia).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use strata_core::{load_document, RenderOptions};
//!
//! let options = RenderOptions::default();
//! let json = std::fs::read_to_string("drawing.json").unwrap();
//! let document = load_document(&json, &options).unwrap();
//! let (width, height) = document.intrinsic_size(&options).unwrap_or((100, 100));
//! let mut pixmap = tiny_skia::Pixmap::new(width, height).unwrap();
//! document.render(&mut pixmap, &options).unwrap();
//! ```

/// Shared data structures (colors, rectangles, node ids).
pub mod types;

pub mod errors;

/// Affine transforms and viewport mapping.
pub mod transform;

/// Length parsing and unit resolution.
pub mod units;

/// Attribute value parsers.
pub mod parsers;

/// The inheritable drawing state and its stack.
pub mod state;

/// The definition registry and deferred reference resolution.
pub mod defs;

/// The Scene Graph Data Structure.
pub mod scene;

/// Variant data of drawable nodes (viewports, `use`, shapes, clip paths, masks).
pub mod node;

/// Property bags and style resolution.
pub mod style;

/// Filter definitions, primitives and the filter pipeline.
pub mod filters;

/// Core systems (rendering traversal, layers, assets).
pub mod systems;

/// Element events to document construction.
pub mod builder;

/// JSON element trees.
pub mod markup;

/// Built documents and the render entry point.
pub mod document;

pub use builder::DocumentBuilder;
pub use document::{Document, RenderOptions};
pub use errors::{BuildError, FilterError, RenderError};
pub use markup::{load_document, ElementNode};
pub use style::{PresentationStyles, PropertyBag, StyleResolver};
pub use systems::RenderStats;

use anyhow::Result;
use tracing::instrument;

/// Environment variable naming an extra directory searched for assets.
pub const ASSET_DIR_ENV: &str = "STRATA_ASSET_DIR";

/// A trait for abstracting file system access.
///
/// This allows the engine to be embedded in environments where direct file system access
/// might be restricted or virtualized (e.g., loading images from an archive).
pub trait AssetLoader: Send + Sync {
    /// Loads the raw bytes of an asset from the given path.
    ///
    /// # Arguments
    /// * `path` - The string path or identifier for the asset.
    ///
    /// # Returns
    /// * `Result<Vec<u8>>` - The bytes of the file or an error.
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>>;
}

/// The default implementation of `AssetLoader` using the standard `std::fs` filesystem.
pub struct DefaultAssetLoader;

impl AssetLoader for DefaultAssetLoader {
    /// Loads bytes from the local filesystem, then from `$STRATA_ASSET_DIR`.
    #[instrument(level = "debug", skip(self), fields(path = path))]
    fn load_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let first = match std::fs::read(path) {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        let Ok(dir) = std::env::var(ASSET_DIR_ENV) else {
            return Err(anyhow::anyhow!("Asset not found: {}: {}", path, first));
        };
        let alt = std::path::Path::new(&dir).join(path);
        std::fs::read(&alt).map_err(|e| {
            anyhow::anyhow!(
                "Asset not found: {} (checked '{}' and '{}'): {}",
                path,
                path,
                alt.display(),
                e
            )
        })
    }
}
