//! `johnathan tools` — List the built-in tools.

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = johnathan_tools::default_registry();

    println!();
    println!("  Available tools ({}):", registry.len());
    println!();
    for def in registry.definitions() {
        println!("  {:<18} {}", def.name, def.description);
    }
    println!();
    Ok(())
}
