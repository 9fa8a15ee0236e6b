use anyhow::{bail, Context, Result};
use bollard::models::CreateImageInfo;
use bollard::query_parameters::CreateImageOptions;
use bollard::Docker;
use futures_util::StreamExt;

/// Split an image reference into the `fromImage` and `tag` parameters of a
/// pull. A registry port is not a tag, and a digest reference is pulled
/// as-is with an empty tag.
pub fn parse_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    match image.rsplit_once(':') {
        Some((name, tag)) if !name.is_empty() && !tag.is_empty() && !tag.contains('/') => {
            (name, tag)
        }
        _ => (image, "latest"),
    }
}

/// Whether the daemon already holds `image`. Used after a failed pull to
/// decide whether a preview can still start from the local copy.
pub async fn check_image_exists(docker: &Docker, image: &str) -> bool {
    docker.inspect_image(image).await.is_ok()
}

/// Pull `image` and wait for the pull to finish.
///
/// Progress messages are discarded. Registry failures come back as errors
/// carrying the daemon's message; falling back to a cached image is up to
/// the caller.
pub async fn pull_image(docker: &Docker, image: &str) -> Result<()> {
    let (name, tag) = parse_image_ref(image);
    tracing::debug!(image = %image, "pulling image");

    let options = CreateImageOptions {
        from_image: Some(name.to_string()),
        tag: (!tag.is_empty()).then(|| tag.to_string()),
        ..Default::default()
    };

    let mut stream = docker.create_image(Some(options), None, None);
    while let Some(result) = stream.next().await {
        let info: CreateImageInfo = result.with_context(|| format!("pulling {}", image))?;
        if let Some(detail) = info.error_detail {
            bail!(
                "pulling {}: {}",
                image,
                detail.message.as_deref().unwrap_or("registry reported an error")
            );
        }
    }

    tracing::debug!(image = %image, "image pulled");
    Ok(())
}
