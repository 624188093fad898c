//! Post-upload image re-encode. Operates on the already-persisted file in
//! place; any failure is logged and swallowed, the upload stays valid.

use std::path::PathBuf;
use tokio::task;
use tracing::{debug, warn};

use crate::config::OptimisationConfig;
use crate::models::User;

/// Whether this user skips the re-encode pass. Only admins may bypass, and
/// only when config allows it; the header forces the choice, otherwise the
/// configured default applies.
#[must_use]
pub fn bypass_optimise(header_present: bool, user: &User, config: &OptimisationConfig) -> bool {
    if !config.admin_can_bypass || !user.is_admin {
        return false;
    }

    if !header_present {
        return config.admin_bypass_by_default;
    }

    true
}

/// Re-encode the image at `path` to shave bytes. Best-effort: decode or
/// encode errors leave the original file untouched.
pub async fn optimise_in_place(path: PathBuf, quality: u8) {
    let result = task::spawn_blocking(move || -> anyhow::Result<()> {
        let img = image::open(&path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("jpg" | "jpeg") => {
                let file = std::fs::File::create(&path)?;
                let mut encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
                encoder.encode_image(&img)?;
            }
            _ => {
                // Other formats get a plain re-encode, which still strips
                // metadata and normalizes the stream.
                img.save(&path)?;
            }
        }

        Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => debug!("Image optimised in place"),
        Ok(Err(e)) => warn!("Image optimisation skipped: {e}"),
        Err(e) => warn!("Image optimisation task panicked: {e}"),
    }
}
