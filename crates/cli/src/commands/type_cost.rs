use anyhow::{Context, Result};
use boxcut_core::analysis::parse_type;
use serde::Serialize;

#[derive(Serialize)]
pub struct TypeCostReport {
    pub descriptor: String,
    pub parsed: String,
    pub pointer_unit_cost: u64,
    pub cost: u64,
}

/// Print the boundary-crossing cost of one type descriptor.
pub fn type_cost_command(descriptor: &str, pointer_unit_cost: u64, json: bool) -> Result<()> {
    let expr = parse_type(descriptor)
        .with_context(|| format!("Cannot cost type descriptor `{descriptor}`"))?;
    let report = TypeCostReport {
        descriptor: descriptor.to_string(),
        parsed: expr.to_string(),
        pointer_unit_cost,
        cost: expr.cost(pointer_unit_cost),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} => {} bytes", report.parsed, report.cost);
    }
    Ok(())
}
