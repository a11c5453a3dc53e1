//! Interactive first-run setup wizard (`visionpal setup`)

use std::path::Path;

use dialoguer::{Input, Select};

use crate::config::file::{self, ConfigPaths, CredentialsFile};
use crate::config::{API_KEY_ENV, DEFAULT_MODEL, bootstrap, is_usable_key};

/// Vision models offered by the wizard; the last entry asks for a custom id
const MODEL_CHOICES: [&str; 3] = [
    DEFAULT_MODEL,
    "meta-llama/Llama-3.2-90B-Vision-Instruct-Turbo",
    "(custom)",
];

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or the files cannot be written
pub fn run_setup(config_file: Option<&Path>) -> anyhow::Result<()> {
    println!("VisionPal Setup\n");

    let paths = config_file.map_or_else(ConfigPaths::default_location, ConfigPaths::for_config_file);
    if !bootstrap(&paths)? {
        println!("Existing config found at {}\n", paths.config_file.display());
    }

    let mut existing = file::load_config_file(&paths.config_file);
    let credentials = file::load_credentials_file(&paths.credentials_file);

    // 1. Vision model
    let current_model = existing
        .vision
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let default_choice = MODEL_CHOICES
        .iter()
        .position(|&m| m == current_model)
        .unwrap_or(MODEL_CHOICES.len() - 1);

    let choice = Select::new()
        .with_prompt("Select a vision model")
        .items(&MODEL_CHOICES)
        .default(default_choice)
        .interact()?;

    let model = if choice == MODEL_CHOICES.len() - 1 {
        Input::new()
            .with_prompt("Model id")
            .default(current_model)
            .interact_text()?
    } else {
        MODEL_CHOICES[choice].to_string()
    };
    existing.vision.model = Some(model);

    // 2. API key
    let existing_key = credentials
        .together_api_key
        .as_deref()
        .filter(|k| is_usable_key(k));

    let prompt = existing_key.map_or_else(
        || format!("Together AI API key ({API_KEY_ENV})"),
        |k| format!("Together AI API key (current: {}, leave blank to keep)", mask(k)),
    );

    let key_input: String = Input::new()
        .with_prompt(&prompt)
        .allow_empty(true)
        .interact_text()?;

    let api_key = if key_input.trim().is_empty() {
        existing_key.map(str::to_string)
    } else {
        Some(key_input.trim().to_string())
    };

    // 3. Camera
    let device_index: u32 = Input::new()
        .with_prompt("Camera device index")
        .default(existing.camera.device_index.unwrap_or(0))
        .interact_text()?;
    existing.camera.device_index = Some(device_index);

    file::write_toml(&paths.config_file, &existing)?;
    println!("\nConfig written to {}", paths.config_file.display());

    match api_key {
        Some(key) => {
            file::write_toml(&paths.credentials_file, &CredentialsFile {
                together_api_key: Some(key),
            })?;
            println!("Credentials written to {}", paths.credentials_file.display());
        }
        None => {
            println!(
                "No API key set. Add it to {} or export {API_KEY_ENV} before running.",
                paths.credentials_file.display()
            );
        }
    }

    println!("\nSetup complete! Run `visionpal -v` to start.");

    Ok(())
}

/// Show only the ends of a secret
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_long_and_short_keys() {
        assert_eq!(mask("abcd1234efgh5678"), "abcd...5678");
        assert_eq!(mask("short"), "****");
    }
}
