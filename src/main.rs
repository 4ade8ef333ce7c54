use std::{env, fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use nifti_volume::{
    CancelToken, Foreground, IntensityNormalizer, Orientation, PointCloudOptions, jobs,
    normalizer::DEFAULT_MAX_RANGE,
};

const MAX_RANGE_VAR: &str = "NIFTI_VOLUME_MAX_RANGE";

fn normalizer_from_env() -> Result<IntensityNormalizer> {
    match env::var(MAX_RANGE_VAR) {
        Ok(value) => {
            let max_range: f32 = value
                .parse()
                .with_context(|| format!("{MAX_RANGE_VAR} must be a number, got {value:?}"))?;
            Ok(IntensityNormalizer::new(max_range))
        }
        Err(_) => Ok(IntensityNormalizer::new(DEFAULT_MAX_RANGE)),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1).map(PathBuf::from);
    let Some(path) = args.next() else {
        bail!("usage: nifti-volume <volume.nii[.gz]> [reference.nii[.gz]]");
    };
    let reference_path = args.next();
    let normalizer = normalizer_from_env()?;

    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let volume = jobs::decode(bytes)
        .await
        .with_context(|| format!("decoding {}", path.display()))?;
    let (dim_x, dim_y, dim_z) = volume.dim();
    log::info!("Loaded {} ({dim_x} x {dim_y} x {dim_z})", path.display());

    for (orientation, index) in [
        (Orientation::Axial, dim_z / 2),
        (Orientation::Coronal, dim_y / 2),
        (Orientation::Sagittal, dim_x / 2),
    ] {
        let image = jobs::slice(volume.clone(), index, orientation, normalizer).await?;
        let file = format!("{orientation}.png");
        image.save(&file).with_context(|| format!("writing {file}"))?;
        log::info!("Wrote {file}");
    }

    let options = PointCloudOptions {
        normalizer,
        ..Default::default()
    };
    let cloud = jobs::point_cloud(volume.clone(), options, CancelToken::new()).await?;
    log::info!("Point cloud holds {} points, bounds {:?}", cloud.len(), cloud.bounds());

    if let Some(reference_path) = reference_path {
        let bytes = fs::read(&reference_path)
            .with_context(|| format!("reading {}", reference_path.display()))?;
        let reference = jobs::decode(bytes).await?;

        let token = CancelToken::new();
        let (metrics, dice) = futures::join!(
            jobs::comparison(reference.clone(), volume.clone(), token.clone()),
            jobs::dice(reference, volume, Foreground::NonZero, token),
        );
        let metrics = metrics?;
        println!("mse:  {:.6}", metrics.mse);
        println!("psnr: {:.4} dB", metrics.psnr);
        println!("ssim: {:.6}", metrics.ssim);
        println!("dice: {:.6}", dice?);
    }

    Ok(())
}
