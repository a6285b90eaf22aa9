//! `census types`: list the configured incident types.

use anyhow::Result;

use crate::config::{self, Config};

pub fn run_types(config: &Config) -> Result<()> {
    let types = config::load_incident_types(config)?;
    let width = types.iter().map(|t| t.label.len()).max().unwrap_or(0);
    for t in types.iter() {
        match t.weight {
            Some(w) => println!("{:<width$}  {}", t.label, w),
            None => println!("{:<width$}  -", t.label),
        }
    }
    println!();
    println!("{} incident types", types.len());
    Ok(())
}
