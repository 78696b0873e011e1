//! Seed script for development: writes a demo workspace to the data directory.
//!
//! Usage: `cargo run --bin seed`
//!
//! Reads `ICD_DATA_DIR` and the other `ICD_*` settings (including .env).
//! Any existing workspace under the same key is overwritten.

use chrono::Utc;
use icd_builder::config::AppConfig;
use icd_builder::models::catalog::ImportStrategy;
use icd_builder::models::mapping::Side;
use icd_builder::models::workspace::WorkspaceState;
use icd_builder::services::mapping::{self, Annotations, Placement, SideFlags};
use icd_builder::services::{hierarchy, import};
use icd_builder::store::StateStore;

const CENTRIC_CATALOG: &str = "\
system,object,field,type,required,key_type,description
Centric,Style,style_number,string,true,primary,Style identifier
Centric,Style,season,string,true,,Season code
Centric,Style,description,string,false,,Marketing description
Centric,Style,weight_grams,number,false,,Net weight
";

const FULFIL_CATALOG: &str = "\
system,object,field,type,required,key_type,description
Fulfil,Product,code,string,true,primary,Product code
Fulfil,Product,season,string,false,,Season
Fulfil,Product,name,string,true,,Display name
Fulfil,Product,weight,number,false,,Weight in grams
";

/// (source, target, human name, transform rule)
const PAIRS: [(&str, &str, &str, &str); 4] = [
    ("Centric.Style.style_number", "Fulfil.Product.code", "Style Number", "identity"),
    ("Centric.Style.season", "Fulfil.Product.season", "Season", "enum_lookup"),
    ("Centric.Style.description", "Fulfil.Product.name", "Product Name", "identity"),
    ("Centric.Style.weight_grams", "Fulfil.Product.weight", "Weight", "number_to_string"),
];

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    let store = StateStore::from_config(&config);

    println!("=== ICD Builder Seed Script ===");

    let mut state = WorkspaceState::new(Utc::now());
    seed_catalog(&mut state)?;
    seed_hierarchy(&mut state)?;
    seed_mappings(&mut state)?;

    let bytes = store.save(&state)?;
    println!("\n=== Seed complete! ===");
    println!("Workspace written to {} ({bytes} bytes)", config.data_dir.display());

    Ok(())
}

fn seed_catalog(state: &mut WorkspaceState) -> anyhow::Result<()> {
    let first = import::import_file(state, "centric.csv", CENTRIC_CATALOG.as_bytes(), None, ImportStrategy::Replace)?;
    let second = import::import_file(state, "fulfil.csv", FULFIL_CATALOG.as_bytes(), None, ImportStrategy::Merge)?;
    println!(
        "[done] Catalog: {} + {} fields ({} total)",
        first.record_count,
        second.record_count,
        state.fields_catalog.len()
    );
    Ok(())
}

fn seed_hierarchy(state: &mut WorkspaceState) -> anyhow::Result<()> {
    let now = Utc::now();
    hierarchy::rename_package(state, "pkg_01", "Product Master")?;
    hierarchy::rename_sequence(state, "seq_01", "Centric → Fulfil", now)?;
    hierarchy::rename_flow(state, "flow_01", "Styles to Products")?;
    hierarchy::configure_flow(
        state,
        "flow_01",
        hierarchy::FlowUpdate {
            source_system: Some("Centric".to_string()),
            target_system: Some("Fulfil".to_string()),
            package_id: None,
        },
        now,
    )?;
    hierarchy::add_map(state, "flow_01", now)?;
    println!("[done] Hierarchy: 1 package, 1 sequence, 1 flow, 2 maps");
    Ok(())
}

fn seed_mappings(state: &mut WorkspaceState) -> anyhow::Result<()> {
    let now = Utc::now();
    for (source, target, human_name, rule) in PAIRS {
        let row = mapping::place_field(state, "map_01", source, Side::Source, Placement::New, now)?;
        mapping::place_field(state, "map_01", target, Side::Target, Placement::Row(row.id.clone()), now)?;
        mapping::annotate(
            state,
            "map_01",
            &row.id,
            Annotations {
                human_name: Some(human_name.to_string()),
                transform_rule: Some(rule.to_string()),
                status: Some("draft".to_string()),
                ..Default::default()
            },
            now,
        )?;
    }

    let first = state.maps[0].mappings[0].id.clone();
    mapping::set_side_flags(
        state,
        "map_01",
        &first,
        Side::Target,
        SideFlags {
            required_by_system: Some(true),
            priority_level: Some("P0".to_string()),
            ..Default::default()
        },
        now,
    )?;

    let issues = mapping::validate_map(state, "map_01")?
        .iter()
        .filter(|v| !v.issues.is_empty())
        .count();
    println!("[done] Mappings: {} rows, {issues} with warnings", PAIRS.len());
    Ok(())
}
