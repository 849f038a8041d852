//! `deepdive onboard`: First-time setup.

use deepdive_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🔎 deepdive: First-Time Setup");
    println!("=============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !config_path.exists() {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml");
    } else {
        println!("  config.toml already exists, leaving it untouched");
    }

    let config = AppConfig::load()?;
    let corpus_path = config.corpus_path();
    if !corpus_path.exists() {
        std::fs::write(&corpus_path, "")?;
        println!("✅ Created empty corpus: {}", corpus_path.display());
    }

    println!("\nNext steps:");
    if !config.has_api_key() {
        println!("  1. Set DEEPDIVE_API_KEY (or add api_key to {})", config_path.display());
    } else {
        println!("  1. API key found");
    }
    println!("  2. Add corpus entries (one JSON object per line) to {}", corpus_path.display());
    println!("  3. Run `deepdive doctor` to verify the setup");
    Ok(())
}
