//! # Gallery Engine
//!
//! Derivative generation and cache consistency for media galleries.
//! Originals live in a directory tree below a gallery's media root; the
//! engine keeps a store of albums and media assets in line with that tree,
//! produces the thumbnail and optimized derivatives of every media asset, and
//! maintains a read-optimized projection cache over the store.
//!
//! # Architecture: Asset Lifecycle
//!
//! Every mutation flows through the asset lifecycle:
//!
//! ```text
//! load (lazy inflate)  →  edit  →  save   →  derivatives  →  cache invalidation
//!                                  delete →  files         →  cache invalidation
//! ```
//!
//! - **Assets** are created uninflated (only an id) and inflate from the store
//!   on first access. An asset created in memory is *new* until its first save.
//! - **Behaviors** are picked by asset kind and run an explicit list of
//!   post-save steps: backfill derivative ids, register with the parent,
//!   adopt as album thumbnail, generate the optimized file, refresh the cache.
//! - **Generators** decide whether a derivative needs (re)creating and do it,
//!   either in-process through an [`imaging::ImageBackend`] or by running the
//!   external encoder.
//! - **The cache controller** is told exactly which projections a mutation
//!   made stale; nothing is rebuilt eagerly.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`asset`] | Albums and media assets, lazy inflation, save/delete behaviors |
//! | [`derivative`] | Generator registry and the regeneration decision for every kind × derivative pair |
//! | [`imaging`] | Pure-Rust image operations: identify, scale, rotate/flip, placeholder |
//! | [`encoder`] | External encoder runner with timeout and cancellation, argument templates, output parsing |
//! | [`cache`] | Projection cache and its invalidation operations |
//! | [`store`] | Repository contract and the JSON-snapshot `MemoryRepository` |
//! | [`config`] | Layered `gallery.toml` loading, validation and the documented stock config |
//! | [`context`] | The service bundle handed to every lifecycle operation |
//! | [`events`] | Fire-and-forget error events |
//! | [`sync`] | Directory-tree synchronization and the per-gallery guard |
//! | [`regenerate`] | Parallel bulk regeneration below an album |
//! | [`naming`] | `NNN-name` parsing and collision-free file and directory names |
//! | [`metadata`] | Title, caption, tags and technical metadata of media |
//! | [`types`] | Ids, media kinds, orientations, derivative types |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Explicit Context Over Globals
//!
//! Lifecycle operations receive a [`context::GalleryContext`] holding the
//! store, settings provider, cache, event recorder and image backend. Tests
//! build one around a temp directory and an in-memory store; hosts build one
//! around their own repository. The only process-wide state is the
//! synchronization guard, which must be shared by every caller to be useful.
//!
//! ## Soft Encoder Failures
//!
//! The external encoder is unreliable by nature: missing, slow, or unhappy
//! with a file. Its failures are recorded as events and turned into empty
//! output; generators then fall back to a placeholder thumbnail or serve the
//! original as the optimized file. A media asset is never lost because a
//! transcode failed.
//!
//! ## Filesystem Mirrors the Tree
//!
//! Album directories follow the album tree below the media root. Moving or
//! renaming an album moves its directory, and the directories below any
//! alternate derivative roots, along with it.

pub mod asset;
pub mod cache;
pub mod config;
pub mod context;
pub mod derivative;
pub mod encoder;
pub mod events;
pub mod imaging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod regenerate;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
