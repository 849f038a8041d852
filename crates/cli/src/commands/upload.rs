//! `deepdive upload`: Create an upload from a query and image embeddings.

use std::path::PathBuf;

use deepdive_config::AppConfig;
use deepdive_core::upload::{Upload, UploadStatus, UploadedFile};

use crate::runtime;

pub async fn run(user: String, query: Option<String>, images: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = runtime::open_store(&config).await?;

    let mut upload = Upload::new(user);
    if let Some(query) = query.filter(|q| !q.trim().is_empty()) {
        upload = upload.with_initial_query(query);
    }
    for path in &images {
        upload = upload.with_file(read_image(path)?);
    }
    if !images.is_empty() {
        upload.status = UploadStatus::ScreenshotsProcessed;
    }

    let upload_id = store.create_upload(upload).await?;
    println!("{upload_id}");
    Ok(())
}

/// An image file here is its precomputed embedding as a JSON float array.
fn read_image(path: &PathBuf) -> Result<UploadedFile, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let embedding: Vec<f32> = serde_json::from_str(&content)
        .map_err(|e| format!("{} is not a JSON array of floats: {e}", path.display()))?;
    if embedding.is_empty() {
        return Err(format!("{} holds an empty embedding", path.display()).into());
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    Ok(UploadedFile::new(name, content.len() as u64, "application/json").with_embedding(embedding))
}
