//! `deepdive doctor`: Diagnose configuration, store, corpus and provider.

use deepdive_config::AppConfig;
use deepdive_core::provider::Provider;
use deepdive_providers::OpenAiCompatProvider;
use deepdive_store::InMemoryCorpus;

use crate::runtime;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 deepdive Doctor: System Diagnostics");
    println!("=====================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults. Run `deepdive onboard`");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before running further checks.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key: tool evaluation is off and summaries are offline digests");
        issues += 1;
    }

    match runtime::open_store(&config).await {
        Ok(store) => println!(
            "  ✅ Store ({}) at {}",
            store.name(),
            config.store.resolved_path().display()
        ),
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    match InMemoryCorpus::load(&config.corpus_path()).await {
        Ok(corpus) => match corpus.len().await {
            0 => {
                println!("  ⚠️  Corpus is empty: {}", config.corpus_path().display());
                issues += 1;
            }
            count => println!("  ✅ Corpus loaded ({count} entries)"),
        },
        Err(e) => {
            println!("  ❌ Corpus unreadable: {e}");
            issues += 1;
        }
    }

    if config.tools.sources.is_empty() {
        println!("  ℹ️  No remote sources configured, only corpus_window is available");
    } else {
        println!("  ✅ {} remote source(s) configured", config.tools.sources.len());
    }

    let provider = OpenAiCompatProvider::new(
        "openai",
        config.api_url.clone(),
        config.api_key.clone().unwrap_or_default(),
    )?;
    match provider.health_check().await {
        Ok(true) => println!("  ✅ Provider reachable at {}", config.api_url),
        Ok(false) => {
            println!("  ⚠️  Provider at {} answered but is not healthy", config.api_url);
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Provider unreachable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
