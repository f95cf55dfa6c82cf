//! Address extraction from page images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use console::style;
use tokio::sync::Semaphore;
use tracing::warn;

use lienscan::{Config, DocumentImage, ExtractionResult, Pipeline, RecordMetadata};

use crate::cli::helpers::print_result;

pub struct ExtractOptions {
    pub id: Option<String>,
    pub meta: Vec<String>,
    pub debug_dir: Option<PathBuf>,
    pub json: bool,
    pub workers: Option<usize>,
    pub best: bool,
}

pub async fn cmd_extract(
    mut config: Config,
    images: &[PathBuf],
    options: ExtractOptions,
) -> anyhow::Result<()> {
    let metadata = parse_metadata(&options.meta)?;
    if let Some(dir) = &options.debug_dir {
        config.diagnostics.dir = Some(dir.display().to_string());
    }
    let pipeline = Arc::new(Pipeline::from_config(&config).context("Failed to build pipeline")?);

    let results = if options.best {
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| document_id(&images[0]));
        extract_best(pipeline, images, id, metadata).await?
    } else {
        let workers = options.workers.unwrap_or_else(default_workers).max(1);
        extract_each(pipeline, images, options.id.as_deref(), metadata, workers).await
    };

    if options.json {
        let json = match results.as_slice() {
            [single] => serde_json::to_string_pretty(single)?,
            many => serde_json::to_string_pretty(many)?,
        };
        println!("{}", json);
    } else {
        for result in &results {
            print_result(result);
        }
        if results.len() > 1 {
            let found = results.iter().filter(|r| r.is_found()).count();
            println!(
                "\n{} {} of {} documents yielded an address",
                style("→").cyan(),
                found,
                results.len()
            );
        }
    }
    Ok(())
}

fn parse_metadata(pairs: &[String]) -> anyhow::Result<RecordMetadata> {
    let mut metadata = RecordMetadata::new();
    for pair in pairs {
        match RecordMetadata::parse_pair(pair) {
            Some((key, value)) => metadata.insert(key, value),
            None => bail!("Invalid --meta value {:?} (expected KEY=VALUE)", pair),
        }
    }
    Ok(metadata)
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Identifier derived from the image file name.
fn document_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One document per image, bounded by `workers` blocking tasks. Images
/// that fail to decode still get an `unreadable` result.
async fn extract_each(
    pipeline: Arc<Pipeline>,
    images: &[PathBuf],
    id: Option<&str>,
    metadata: RecordMetadata,
    workers: usize,
) -> Vec<ExtractionResult> {
    let semaphore = Arc::new(Semaphore::new(workers));
    let metadata = Arc::new(metadata);
    let single = images.len() == 1;

    let handles: Vec<_> = images
        .iter()
        .map(|path| {
            let document_identifier = match id {
                Some(id) if single => id.to_string(),
                Some(id) => format!("{}_{}", id, document_id(path)),
                None => document_id(path),
            };
            let path = path.clone();
            let pipeline = pipeline.clone();
            let metadata = metadata.clone();
            let semaphore = semaphore.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                let handle = tokio::task::spawn_blocking(move || {
                    pipeline.extract_path(&path, &document_identifier, &metadata)
                });
                match handle.await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        warn!("Extraction task failed: {}", e);
                        None
                    }
                }
            })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(|joined| joined.ok().flatten())
        .collect()
}

/// All images are captures of the same document.
async fn extract_best(
    pipeline: Arc<Pipeline>,
    images: &[PathBuf],
    document_identifier: String,
    metadata: RecordMetadata,
) -> anyhow::Result<Vec<ExtractionResult>> {
    let images = images.to_vec();
    let result = tokio::task::spawn_blocking(move || {
        let mut decoded = Vec::with_capacity(images.len());
        let mut unreadable = Vec::new();
        for path in &images {
            match DocumentImage::open(path) {
                Ok(image) => decoded.push(image),
                Err(e) => {
                    warn!("{}: input rejected: {}", path.display(), e);
                    unreadable.push(path);
                }
            }
        }
        match unreadable.first() {
            Some(path) if decoded.is_empty() => {
                pipeline.extract_path(path, &document_identifier, &metadata)
            }
            _ => pipeline.extract_best(&decoded, &document_identifier, &metadata),
        }
    })
    .await
    .context("Extraction task failed")?;

    Ok(vec![result])
}

#[cfg(test)]
mod tests {
    use super::*;
    use lienscan::ExtractionMethod;

    #[test]
    fn test_parse_metadata() {
        let metadata =
            parse_metadata(&["case=2023-CV-1".to_string(), "grantor=Dennis Hogan".to_string()])
                .unwrap();
        assert_eq!(metadata.get("grantor"), Some("Dennis Hogan"));
        assert!(parse_metadata(&["oops".to_string()]).is_err());
    }

    #[tokio::test]
    async fn test_undecodable_image_still_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("capture.png");
        std::fs::write(&path, b"not an image at all").unwrap();
        let pipeline = Arc::new(Pipeline::builder().build().unwrap());

        let results =
            extract_each(pipeline, &[path], Some("2023-CV-9"), RecordMetadata::new(), 2).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_identifier, "2023-CV-9");
        assert_eq!(results[0].method_used, ExtractionMethod::Unreadable);

        let json = serde_json::to_value(&results[0]).unwrap();
        assert!(json["address"].is_null());
        assert_eq!(json["method_used"], "unreadable");
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id(Path::new("/scans/2023-CV-0042.png")), "2023-CV-0042");
    }
}
