//! Merge rendered PDFs into one document and optionally transcode it.
//!
//! The artifacts arrive already sorted by sequence index; this stage never
//! reorders them. Each file is checked before anything is sent: a successful
//! render whose file has since vanished or is empty is an invariant breach,
//! not a per-product failure, and aborts the run.
//!
//! A single artifact still goes through the merge call so every run produces
//! a document the backend has normalised the same way.

use crate::backend::{ConversionBackend, NamedDocument};
use crate::error::CollectionError;
use crate::output::{DocumentFormat, FinalArtifact, RenderedArtifact};
use tracing::info;

/// File name the merged PDF carries when sent for transcoding.
const MERGED_NAME: &str = "merged.pdf";

/// Merge `artifacts` in the given order, then transcode to `target` unless
/// it is PDF.
///
/// # Errors
/// * [`CollectionError::MissingArtifact`] if a file is missing or empty
/// * [`CollectionError::MergeFailed`] if the backend rejects the merge
/// * [`CollectionError::TranscodeFailed`] if the backend rejects the transcode
pub async fn assemble(
    artifacts: &[RenderedArtifact],
    target: DocumentFormat,
    backend: &dyn ConversionBackend,
) -> Result<FinalArtifact, CollectionError> {
    let documents = load_documents(artifacts).await?;
    let merged = merge(&documents, backend).await?;

    if target == DocumentFormat::Pdf {
        return Ok(FinalArtifact {
            bytes: merged,
            format: DocumentFormat::Pdf,
        });
    }

    let bytes = transcode(merged, target, backend).await?;
    Ok(FinalArtifact {
        bytes,
        format: target,
    })
}

/// Merge only. Exposed for callers that render on their own.
pub async fn merge(
    documents: &[NamedDocument],
    backend: &dyn ConversionBackend,
) -> Result<Vec<u8>, CollectionError> {
    info!("Merging {} PDFs", documents.len());
    let merged = backend
        .merge(documents)
        .await
        .map_err(|e| CollectionError::MergeFailed {
            count: documents.len(),
            reason: e.to_string(),
        })?;
    if merged.is_empty() {
        return Err(CollectionError::MergeFailed {
            count: documents.len(),
            reason: "backend returned an empty document".into(),
        });
    }
    Ok(merged)
}

/// Convert a merged PDF into `target`.
pub async fn transcode(
    merged: Vec<u8>,
    target: DocumentFormat,
    backend: &dyn ConversionBackend,
) -> Result<Vec<u8>, CollectionError> {
    info!("Converting merged PDF ({} bytes) to {}", merged.len(), target);
    let document = NamedDocument {
        name: MERGED_NAME.to_string(),
        bytes: merged,
    };
    let bytes = backend
        .transcode(&document, target)
        .await
        .map_err(|e| CollectionError::TranscodeFailed {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
    if bytes.is_empty() {
        return Err(CollectionError::TranscodeFailed {
            target: target.to_string(),
            reason: "backend returned an empty document".into(),
        });
    }
    Ok(bytes)
}

/// Read every artifact from the workspace, in order.
async fn load_documents(
    artifacts: &[RenderedArtifact],
) -> Result<Vec<NamedDocument>, CollectionError> {
    let mut documents = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let missing = || CollectionError::MissingArtifact {
            index: artifact.index,
            path: artifact.path.clone(),
        };
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|_| missing())?;
        if bytes.is_empty() {
            return Err(missing());
        }
        let name = artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{:03}.pdf", artifact.index));
        documents.push(NamedDocument { name, bytes });
    }
    Ok(documents)
}
