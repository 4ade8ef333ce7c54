//! Off-thread units of work for interactive hosts.
//!
//! Every job runs the synchronous core on tokio's blocking pool so slider
//! drags and file loads on the host side stay responsive. Scans that accept a
//! [`CancelToken`] stop at the next chunk boundary once it fires.

use crate::cancel::{CancelToken, Cancelled};
use crate::enums::Orientation;
use crate::metrics::{ComparisonMetrics, Foreground, MetricsEngine, MetricsError};
use crate::normalizer::IntensityNormalizer;
use crate::point_cloud::{PointCloud, PointCloudBuilder, PointCloudOptions};
use crate::volume::{SliceImage, Volume, VolumeError};
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Load(#[from] VolumeLoaderError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("Remote transform failed: {0}")]
    Transform(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    SuperResolution,
    Segmentation,
}

/// A remote model that turns one volume file into another of the same
/// format. Transport and storage are up to the implementation.
pub trait TransformService: Send + Sync {
    fn transform(
        &self,
        kind: TransformKind,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<Vec<u8>, JobError>> + Send;
}

/// Hands the input back unchanged. Stands in for a model that is not
/// deployed yet.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassthroughTransform;

impl TransformService for PassthroughTransform {
    async fn transform(&self, kind: TransformKind, bytes: Vec<u8>) -> Result<Vec<u8>, JobError> {
        log::info!("Passthrough {kind:?} on {} bytes", bytes.len());
        Ok(bytes)
    }
}

pub async fn decode(bytes: Vec<u8>) -> Result<Arc<Volume>, JobError> {
    let volume =
        tokio::task::spawn_blocking(move || VolumeLoader::load_from_bytes(&bytes)).await??;
    Ok(Arc::new(volume))
}

pub async fn slice(
    volume: Arc<Volume>,
    index: usize,
    orientation: Orientation,
    normalizer: IntensityNormalizer,
) -> Result<SliceImage, JobError> {
    let image = tokio::task::spawn_blocking(move || {
        volume.get_image_from_axis(index, orientation, &normalizer)
    })
    .await??;
    Ok(image)
}

pub async fn point_cloud(
    volume: Arc<Volume>,
    options: PointCloudOptions,
    token: CancelToken,
) -> Result<PointCloud, JobError> {
    let cloud = tokio::task::spawn_blocking(move || {
        PointCloudBuilder::build_cancellable(&volume, &options, &token)
    })
    .await??;
    Ok(cloud)
}

pub async fn comparison(
    reference: Arc<Volume>,
    output: Arc<Volume>,
    token: CancelToken,
) -> Result<ComparisonMetrics, JobError> {
    let metrics = tokio::task::spawn_blocking(move || {
        MetricsEngine::compute_comparison_cancellable(&reference, &output, &token)
    })
    .await??;
    Ok(metrics)
}

pub async fn dice(
    reference: Arc<Volume>,
    output: Arc<Volume>,
    foreground: Foreground,
    token: CancelToken,
) -> Result<f64, JobError> {
    let dice = tokio::task::spawn_blocking(move || {
        MetricsEngine::compute_dice_cancellable(&reference, &output, foreground, &token)
    })
    .await??;
    Ok(dice)
}

/// Send a volume file through `service` and decode what comes back.
pub async fn run_transform<S: TransformService>(
    service: &S,
    kind: TransformKind,
    bytes: Vec<u8>,
) -> Result<Arc<Volume>, JobError> {
    let result = service.transform(kind, bytes).await?;
    decode(result).await
}
