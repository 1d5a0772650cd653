use anyhow::Result;
use packsmith::Config;

pub enum Action {
    Show,
    Set { key: String, value: String },
}

pub fn run(action: Action) -> Result<()> {
    match action {
        Action::Show => show_config(),
        Action::Set { key, value } => set_config(&key, &value),
    }
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = Config::default_path()?;

    println!("Config file: {}", config_path.display());
    println!();
    println!("[sources]");
    println!("  modrinth_url       = {}", config.sources.modrinth_url);
    println!("  curseforge_url     = {}", config.sources.curseforge_url);
    println!("  github_url         = {}", config.sources.github_url);
    println!(
        "  curseforge_api_key = {}",
        secret(config.sources.curseforge_api_key.as_deref())
    );
    println!(
        "  github_token       = {}",
        secret(config.sources.github_token.as_deref())
    );
    println!("[index]");
    println!("  meta_folder        = {}", config.index.meta_folder);
    println!("  hash_format        = {}", config.index.hash_format);
    println!("[resolver]");
    println!("  max_cycles         = {}", config.resolver.max_cycles);
    Ok(())
}

fn secret(value: Option<&str>) -> &'static str {
    match value {
        Some(_) => "<set>",
        None => "<not set>",
    }
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load_file()?;
    config.set(key, value)?;
    config.save()?;

    if key.ends_with("api_key") || key.ends_with("token") {
        println!("✓ {} = {}", key, if value.is_empty() { "<cleared>" } else { "<set>" });
    } else {
        println!("✓ {} = \"{}\"", key, value);
    }
    println!("✓ Configuration saved");
    Ok(())
}
