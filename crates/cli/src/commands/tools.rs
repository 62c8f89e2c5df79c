//! `loopwright tools` — list the registered tools and their schemas.

use std::path::PathBuf;

pub fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let registry = loopwright_tools::default_registry(&config.tools)?;

    let mut definitions = registry.definitions();
    definitions.sort_by(|a, b| a.name.cmp(&b.name));

    println!();
    for definition in definitions {
        println!("  {}", definition.name);
        println!("    {}", definition.description);
        println!(
            "    schema: {}",
            serde_json::to_string(&definition.parameters)?
        );
        println!();
    }
    Ok(())
}
