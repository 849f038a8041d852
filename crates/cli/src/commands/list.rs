//! `deepdive list`: List a user's uploads.

use deepdive_config::AppConfig;

use crate::runtime;

pub async fn run(user: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let store = runtime::open_store(&config).await?;

    let ids = store.list_uploads(&user).await?;
    if ids.is_empty() {
        println!("No uploads for {user}");
        return Ok(());
    }

    for id in ids {
        match store.get_upload(&id).await? {
            Some(upload) => println!(
                "  {id}  {}  {}  {} drill-downs",
                upload.uploaded_at.format("%Y-%m-%d %H:%M"),
                upload.status,
                upload.drill_downs.len()
            ),
            None => println!("  {id}  (missing)"),
        }
    }
    Ok(())
}
