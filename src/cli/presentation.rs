//! CLI presentation: text and json formatters for change sets and items.

use crate::change_set::ChangeSet;
use crate::error::VfsError;
use crate::item::FilesystemItem;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

fn short_hash(hash: &[u8; 32]) -> String {
    hex::encode(&hash[..4])
}

/// Format a section heading with bold/underline.
fn heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn format_change_set_text(change_set: &ChangeSet, applied: bool) -> String {
    let title = if applied { "Applied changes" } else { "Pending changes" };
    if change_set.is_empty(true) {
        return format!("{}\n\n  Up to date.", heading(title));
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Action", "Path", "Detail"]);
    for create in change_set.items_to_create() {
        table.add_row(vec![
            "create".green().to_string(),
            create.path.clone(),
            format!("{} {}", create.item_type.record_type(), short_hash(&create.hash)),
        ]);
    }
    for (path, delta) in change_set.items_to_update(false) {
        let mut detail = Vec::new();
        if let Some(target) = &delta.path {
            detail.push(format!("-> {}", target));
        }
        if let Some(hash) = &delta.hash {
            detail.push(format!("hash {}", short_hash(hash)));
        }
        table.add_row(vec!["update".yellow().to_string(), path, detail.join(", ")]);
    }
    for (path, item_type) in change_set.items_to_delete() {
        table.add_row(vec![
            "delete".red().to_string(),
            path.clone(),
            item_type.record_type().to_string(),
        ]);
    }
    for (path, timestamp) in change_set.last_modified_updates() {
        table.add_row(vec![
            "touch".dimmed().to_string(),
            path.clone(),
            timestamp.to_string(),
        ]);
    }
    format!("{}\n\n{}", heading(title), table)
}

pub fn format_change_set_json(change_set: &ChangeSet) -> Result<String, VfsError> {
    let creates: Vec<_> = change_set
        .items_to_create()
        .iter()
        .map(|c| {
            json!({
                "path": c.path,
                "type": c.item_type.record_type(),
                "hash": hex::encode(c.hash),
                "last_modified": c.last_modified,
            })
        })
        .collect();
    let updates: serde_json::Map<String, serde_json::Value> = change_set
        .items_to_update(true)
        .into_iter()
        .map(|(path, delta)| {
            let value = json!({
                "path": delta.path,
                "hash": delta.hash.map(hex::encode),
                "last_modified": delta.last_modified,
            });
            (path, value)
        })
        .collect();
    let deletes: serde_json::Map<String, serde_json::Value> = change_set
        .items_to_delete()
        .iter()
        .map(|(path, t)| (path.clone(), json!(t.record_type())))
        .collect();

    let out = json!({
        "create": creates,
        "update": updates,
        "delete": deletes,
    });
    serde_json::to_string_pretty(&out).map_err(|e| VfsError::Logic(e.to_string()))
}

fn format_timestamp(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_listing_text(items: &[FilesystemItem]) -> String {
    if items.is_empty() {
        return "Directory is empty.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Type", "Path", "Size", "Modified", "Uuid"]);
    for item in items {
        let kind = if item.is_directory() { "dir" } else { "file" };
        let size = match item.file_size() {
            Ok(Some(size)) => size.to_string(),
            _ => "-".to_string(),
        };
        let uuid = item
            .uuid()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            kind.to_string(),
            item.path().to_string(),
            size,
            format_timestamp(item.last_modified()),
            uuid,
        ]);
    }
    table.to_string()
}

pub fn format_item_text(item: &FilesystemItem) -> String {
    let mut out = format!("{}\n\n", heading(item.path()));
    let kind = if item.is_directory() { "directory" } else { "file" };
    out.push_str(&format!("  Type: {}\n", kind));
    if let Some(uuid) = item.uuid() {
        out.push_str(&format!("  Uuid: {}\n", uuid));
    }
    out.push_str(&format!("  Modified: {}\n", format_timestamp(item.last_modified())));
    if item.is_file() {
        if let Ok(Some(size)) = item.file_size() {
            out.push_str(&format!("  Size: {}\n", size));
        }
        if let Ok(Some(mime)) = item.mime_type() {
            out.push_str(&format!("  Mime type: {}\n", mime));
        }
    }
    let metadata = item.extra_metadata();
    if let Some(part) = &metadata.important_part {
        out.push_str(&format!(
            "  Important part: {} {} {} {}\n",
            part.x, part.y, part.width, part.height
        ));
    }
    out
}
