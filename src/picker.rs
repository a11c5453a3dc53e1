//! Image selection from the local filesystem

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use dialoguer::Input;

use crate::{Error, Result};

/// Image file extensions the describer accepts
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Lets the user choose an image
#[async_trait]
pub trait FilePicker: Send + Sync {
    /// Returns `None` when the user cancels
    async fn pick_image(&self) -> Result<Option<PathBuf>>;
}

/// Native dialog through `zenity` when available, terminal prompt otherwise
#[derive(Debug, Default)]
pub struct DialogPicker;

#[async_trait]
impl FilePicker for DialogPicker {
    async fn pick_image(&self) -> Result<Option<PathBuf>> {
        tokio::task::spawn_blocking(|| match which::which("zenity") {
            Ok(zenity) => pick_with_zenity(&zenity),
            Err(_) => pick_in_terminal(),
        })
        .await
        .map_err(|e| Error::Picker(format!("picker task failed: {e}")))?
    }
}

fn pick_with_zenity(zenity: &Path) -> Result<Option<PathBuf>> {
    let filter = format!(
        "--file-filter=Image files | {}",
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| format!("*.{ext}"))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(zenity)
        .args(["--file-selection", "--title=Select an image", &filter])
        .output()
        .map_err(|e| Error::Picker(format!("failed to run zenity: {e}")))?;

    // zenity exits non-zero on cancel
    if !output.status.success() {
        return Ok(None);
    }

    let selected = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if selected.is_empty() {
        return Ok(None);
    }

    match validate_image_path(Path::new(&selected)) {
        Ok(path) => Ok(Some(path)),
        Err(e) => {
            tracing::warn!(path = %selected, error = %e, "rejected dialog selection");
            Ok(None)
        }
    }
}

fn pick_in_terminal() -> Result<Option<PathBuf>> {
    loop {
        let input: String = Input::new()
            .with_prompt("Image path (blank to cancel)")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| Error::Picker(e.to_string()))?;

        let input = input.trim();
        if input.is_empty() {
            return Ok(None);
        }

        match validate_image_path(Path::new(input)) {
            Ok(path) => return Ok(Some(path)),
            Err(e) => eprintln!("{e}"),
        }
    }
}

/// Check that `path` names an existing file with a supported image extension
///
/// # Errors
///
/// Returns `Error::Picker` describing why the path was rejected
pub fn validate_image_path(path: &Path) -> Result<PathBuf> {
    if !is_supported_image(path) {
        return Err(Error::Picker(format!(
            "{} is not a supported image ({})",
            path.display(),
            IMAGE_EXTENSIONS.join(", ")
        )));
    }
    if !path.is_file() {
        return Err(Error::Picker(format!("{} does not exist", path.display())));
    }
    Ok(path.to_path_buf())
}

/// Whether the extension is one of [`IMAGE_EXTENSIONS`], ignoring case
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
}
