//! Network completions spliced into editor state.
//!
//! Each function awaits the backend and then applies the result to the
//! catalog adapter or session it was handed. Failures that the editor should
//! survive become session notifications instead of errors.

use std::sync::Arc;

use bookwiki_editor_core::{
    CatalogAdapter, EditorSession, EntityCatalog, Namespace, NotificationLevel,
};
use tokio::sync::Mutex;

use crate::backend::{ChapterRecord, StoryBackend};
use crate::error::{BookwikiError, Result};

/// Fetch every namespace of `story_id` into `adapter` and return the merged
/// catalog.
pub async fn load_catalog<B: StoryBackend>(
    backend: &B,
    adapter: &mut CatalogAdapter,
    story_id: u64,
) -> Result<Arc<EntityCatalog>> {
    let (characters, items, locations, lore, emotes) = tokio::try_join!(
        backend.fetch_entities(story_id, Namespace::Character),
        backend.fetch_entities(story_id, Namespace::Item),
        backend.fetch_entities(story_id, Namespace::Location),
        backend.fetch_entities(story_id, Namespace::Lore),
        backend.fetch_emotes(story_id),
    )?;
    adapter.set_collection(Namespace::Character, characters);
    adapter.set_collection(Namespace::Item, items);
    adapter.set_collection(Namespace::Location, locations);
    adapter.set_collection(Namespace::Lore, lore);
    adapter.set_emotes(story_id, emotes);
    let catalog = adapter.catalog();
    tracing::debug!(story_id, entries = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// Re-fetch only the emotes, after they were managed elsewhere.
pub async fn refresh_emotes<B: StoryBackend>(
    backend: &B,
    adapter: &mut CatalogAdapter,
    story_id: u64,
) -> Result<Arc<EntityCatalog>> {
    let emotes = backend.fetch_emotes(story_id).await?;
    adapter.set_emotes(story_id, emotes);
    Ok(adapter.catalog())
}

/// Rename an emote, refusing names already used in the story before asking
/// the backend.
pub async fn rename_emote<B: StoryBackend>(
    backend: &B,
    adapter: &mut CatalogAdapter,
    story_id: u64,
    emote_id: u64,
    name: &str,
) -> Result<Arc<EntityCatalog>> {
    let name = name.trim();
    if adapter.catalog().emote_name_taken(emote_id, name) {
        return Err(BookwikiError::Conflict {
            name: name.to_string(),
        });
    }
    let renamed = backend.rename_emote(story_id, emote_id, name).await?;
    adapter.rename_emote(emote_id, renamed.name);
    Ok(adapter.catalog())
}

/// Delete an emote. Images already embedded in chapters keep their `src`.
pub async fn delete_emote<B: StoryBackend>(
    backend: &B,
    adapter: &mut CatalogAdapter,
    story_id: u64,
    emote_id: u64,
) -> Result<Arc<EntityCatalog>> {
    backend.delete_emote(story_id, emote_id).await?;
    adapter.remove_emote(emote_id);
    Ok(adapter.catalog())
}

/// Upload an image and insert it wherever the session's cursor is once the
/// upload finishes. The session is only locked around the start and the
/// completion, so editing carries on meanwhile. A failed upload inserts
/// nothing and leaves a notification. Returns the image's offset.
pub async fn upload_into_session<B: StoryBackend>(
    backend: &B,
    session: &Mutex<EditorSession>,
    bytes: Vec<u8>,
    file_name: &str,
) -> Result<Option<usize>> {
    let ticket = session.lock().await.begin_upload(file_name);
    let result = backend
        .upload_image(bytes, file_name)
        .await
        .map(|uploaded| uploaded.url);
    let inserted = session.lock().await.complete_upload(ticket, result)?;
    Ok(inserted)
}

/// Persist the session's document as chapter `chapter_id`. Only a successful
/// save clears the dirty flag. A failed save is also queued as a notification
/// and leaves the document untouched.
pub async fn save_session<B: StoryBackend>(
    backend: &B,
    session: &mut EditorSession,
    chapter_id: u64,
    title: &str,
) -> Result<ChapterRecord> {
    let content = session.stored();
    match backend.save_chapter(chapter_id, title, &content).await {
        Ok(record) => {
            session.mark_saved(&content);
            tracing::debug!(chapter_id, bytes = content.len(), "chapter saved");
            Ok(record)
        }
        Err(err) => {
            tracing::warn!(chapter_id, error = %err, "chapter save failed");
            session.notify(NotificationLevel::Error, format!("Error saving chapter: {err}"));
            Err(err)
        }
    }
}
