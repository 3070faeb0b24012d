use crate::config::generate::generate_starter_config;
use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_content = generate_starter_config();

    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    let home_dir = dirs::home_dir().ok_or("cannot determine home directory, use --stdout")?;
    let config_path = home_dir.join(".config/logsink/config.yml");
    write_config(&config_content, config_path)
}

fn write_config(
    config_content: &str,
    config_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    if config_path.exists() {
        return Err(format!(
            "config file already exists at {}, refusing to overwrite",
            config_path.display()
        )
        .into());
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create directory {}: {}", parent.display(), e))?;
    }

    fs::write(&config_path, config_content)
        .map_err(|e| format!("failed to write config file {}: {}", config_path.display(), e))?;

    println!("Config file created at: {}", config_path.display());
    Ok(())
}
