//! List and Delete commands.

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};

use crate::config::Settings;
use crate::library::DocumentLibrary;
use crate::storage::{FileIndexStore, IndexMetadata, IndexStore};

/// Run list command - show every stored index.
pub fn run_list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let store = FileIndexStore::new(settings.index_path.clone());
    let entries: Vec<IndexMetadata> = store
        .list()?
        .iter()
        .filter_map(|id| store.load(id))
        .map(|stored| stored.metadata)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No documents indexed in {}", settings.index_path.display());
        return Ok(());
    }

    println!("{}", render_table(&entries));
    Ok(())
}

fn render_table(entries: &[IndexMetadata]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Document", "Source", "Sections", "Chunks", "Model", "Built",
        ]);

    for meta in entries {
        let built = chrono::DateTime::from_timestamp(meta.built_at as i64, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(&meta.document_id),
            Cell::new(&meta.source_file),
            Cell::new(meta.section_count),
            Cell::new(meta.chunk_count),
            Cell::new(&meta.model),
            Cell::new(built),
        ]);
    }
    table
}

/// Run delete command - remove one document's stored index.
pub fn run_delete(settings: &Settings, document: &str) -> anyhow::Result<()> {
    let document_id = DocumentLibrary::resolve_id(document);
    let store = FileIndexStore::new(settings.index_path.clone());

    if store.delete(&document_id)? {
        println!("Deleted index for '{document_id}'");
    } else {
        eprintln!("No index found for '{document_id}'");
    }
    Ok(())
}
