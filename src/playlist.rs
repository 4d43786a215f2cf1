use crate::error::Result;
use crate::spotify::{PlaylistService, PLAYLIST_PAGE};

/// Clears and refills one playlist in service-sized batches.
pub struct PlaylistSyncer<'a, P: PlaylistService + ?Sized> {
    service: &'a mut P,
}

impl<'a, P: PlaylistService + ?Sized> PlaylistSyncer<'a, P> {
    pub fn new(service: &'a mut P) -> Self {
        PlaylistSyncer { service }
    }

    /// Remove every item, one page at a time. Returns how many were removed.
    ///
    /// Items without a removable uri (unavailable tracks, local files) are
    /// cleared by replacing the playlist with an empty one.
    pub fn empty(&mut self, playlist_id: &str) -> Result<usize> {
        let mut removed = 0;
        let mut remaining = self.service.playlist_len(playlist_id)?;

        while remaining > 0 {
            let items = self.service.playlist_items(playlist_id)?;
            for batch in items.chunks(PLAYLIST_PAGE) {
                self.service.remove_items(playlist_id, batch)?;
                removed += batch.len();
            }

            let left = self.service.playlist_len(playlist_id)?;
            if items.is_empty() || left >= remaining {
                log::info!(
                    "playlist {} keeps {} items that cannot be removed by uri, clearing it wholesale",
                    playlist_id,
                    left
                );
                self.service.replace_items(playlist_id, &[])?;
                let after = self.service.playlist_len(playlist_id)?;
                removed += left.saturating_sub(after);
                if after > 0 {
                    log::warn!("playlist {} still has {} items after clearing", playlist_id, after);
                }
                break;
            }
            remaining = left;
        }

        log::info!("removed {} items from playlist {}", removed, playlist_id);
        Ok(removed)
    }

    /// Append `tracks` in order. Returns how many were added.
    pub fn populate(&mut self, playlist_id: &str, tracks: &[String]) -> Result<usize> {
        let mut added = 0;
        for batch in tracks.chunks(PLAYLIST_PAGE) {
            self.service.add_items(playlist_id, batch)?;
            added += batch.len();
            log::debug!("added {}/{} tracks", added, tracks.len());
        }
        log::info!("added {} tracks to playlist {}", added, playlist_id);
        Ok(added)
    }
}
