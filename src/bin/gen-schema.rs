use schemars::schema_for;
use serde_json::{json, Value};
use varia::model::{
    Experiment, ExperimentPage, ExperimentResults, ExperimentSpec, ExperimentStats, ListQuery,
    Variant, VariantSpec,
};
use varia::service::{OperationResult, Snapshot};

fn main() -> anyhow::Result<()> {
    // Use: cargo run --bin gen-schema > schema.json
    let mut definitions = serde_json::Map::new();
    let schemas: [(&str, Value); 9] = [
        ("ExperimentSpec", serde_json::to_value(schema_for!(ExperimentSpec))?),
        ("VariantSpec", serde_json::to_value(schema_for!(VariantSpec))?),
        ("Experiment", serde_json::to_value(schema_for!(Experiment))?),
        ("Variant", serde_json::to_value(schema_for!(Variant))?),
        ("ListQuery", serde_json::to_value(schema_for!(ListQuery))?),
        ("ExperimentPage", serde_json::to_value(schema_for!(ExperimentPage))?),
        ("ExperimentStats", serde_json::to_value(schema_for!(ExperimentStats))?),
        (
            "ExperimentResultsEnvelope",
            serde_json::to_value(schema_for!(OperationResult<ExperimentResults>))?,
        ),
        ("Snapshot", serde_json::to_value(schema_for!(Snapshot))?),
    ];
    for (name, schema) in schemas {
        definitions.insert(name.to_string(), schema);
    }

    let document = json!({
        "title": "varia experiment records",
        "version": env!("CARGO_PKG_VERSION"),
        "schemas": definitions,
    });
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
