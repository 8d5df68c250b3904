//! Bulk derivative regeneration.
//!
//! Forces every media asset below an album to rebuild its derivatives. The
//! album tree is walked first to collect the media per album; each album's
//! media are then saved in parallel on the rayon pool with the
//! "regenerate on save" flag set, so the usual lifecycle decides what is
//! written.
//!
//! Progress can be streamed through an optional channel. The CLI prints the
//! events from a separate thread while the pool works.

use crate::asset::{Album, AssetError, MediaAsset};
use crate::context::GalleryContext;
use crate::types::AssetId;
use rayon::prelude::*;
use std::sync::mpsc::Sender;

/// Progress of a regeneration run.
#[derive(Debug, Clone, PartialEq)]
pub enum RegenerateEvent {
    AlbumStarted {
        title: String,
        media_count: usize,
    },
    MediaRegenerated {
        /// 1-based position inside the album.
        index: usize,
        title: String,
        file_name: String,
    },
    MediaFailed {
        index: usize,
        id: AssetId,
        error: String,
    },
}

/// What a regeneration run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegenerateSummary {
    pub albums: usize,
    pub regenerated: usize,
    pub failures: Vec<(AssetId, String)>,
}

/// Regenerate the derivatives of all media below `album_id`, the album
/// itself included.
///
/// A failing media asset is reported and skipped; store or settings errors
/// while walking the tree abort the run.
pub fn regenerate_album(
    ctx: &GalleryContext,
    album_id: AssetId,
    events: Option<Sender<RegenerateEvent>>,
) -> Result<RegenerateSummary, AssetError> {
    let mut summary = RegenerateSummary::default();
    let mut pending = vec![album_id];

    while let Some(id) = pending.pop() {
        let album = Album::load(ctx, id)?;
        summary.albums += 1;
        if let Some(tx) = &events {
            tx.send(RegenerateEvent::AlbumStarted {
                title: album.title.clone(),
                media_count: album.child_media_ids.len(),
            })
            .ok();
        }

        let results: Vec<(usize, AssetId, Result<MediaAsset, AssetError>)> = album
            .child_media_ids
            .par_iter()
            .enumerate()
            .map_with(events.clone(), |tx, (i, media_id)| {
                let result = regenerate_media(ctx, *media_id);
                if let Some(tx) = tx {
                    let event = match &result {
                        Ok(media) => RegenerateEvent::MediaRegenerated {
                            index: i + 1,
                            title: media.title.clone(),
                            file_name: media.original.file_name.clone(),
                        },
                        Err(e) => RegenerateEvent::MediaFailed {
                            index: i + 1,
                            id: *media_id,
                            error: e.to_string(),
                        },
                    };
                    tx.send(event).ok();
                }
                (i, *media_id, result)
            })
            .collect();

        for (_, media_id, result) in results {
            match result {
                Ok(_) => summary.regenerated += 1,
                Err(e) => {
                    tracing::warn!(media = %media_id, "regeneration failed: {e}");
                    summary.failures.push((media_id, e.to_string()));
                }
            }
        }

        // Children are visited in ascending order.
        pending.extend(album.child_album_ids.iter().rev().copied());
    }

    tracing::info!(
        album = %album_id,
        albums = summary.albums,
        regenerated = summary.regenerated,
        failed = summary.failures.len(),
        "regeneration complete"
    );
    Ok(summary)
}

fn regenerate_media(ctx: &GalleryContext, id: AssetId) -> Result<MediaAsset, AssetError> {
    let mut media = MediaAsset::load(ctx, id)?;
    media.regenerate_on_save = true;
    media.save(ctx)?;
    Ok(media)
}

// =============================================================================
// Tests
// =============================================================================
