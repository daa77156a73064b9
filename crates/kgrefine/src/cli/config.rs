use std::path::Path;

use anyhow::Result;

use super::load_config;

pub fn run(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;

    print!("{}", config.to_toml()?);

    let provider = config.llm.provider();
    match config.llm.redacted_api_key() {
        Some(key) => println!("# provider: {provider}, api key: {key}"),
        None => println!(
            "# provider: {provider}, api key: not set (export {})",
            provider.api_key_env()
        ),
    }
    Ok(())
}
