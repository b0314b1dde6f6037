//! `tollgate init` — write a commented default config file.

use std::path::Path;
use tollgate_config::TollgateConfig;

pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or delete and re-run init.");
        return Ok(());
    }

    std::fs::write(path, TollgateConfig::default_toml())?;
    println!("✅ Wrote default config to: {}", path.display());
    println!();
    println!("📝 Next steps:");
    println!("   1. export TOLLGATE_AUTH_SECRET=<random 32+ byte secret>");
    println!("   2. export TOLLGATE_BACKEND_API_KEY=<your backend key>");
    println!("   3. tollgate serve --dev-account");

    Ok(())
}
