/*!
 * Standalone TypeScript type generator for the portaria data model
 *
 * Only compiles portaria-types, so the admin frontend can regenerate its
 * bindings without building the whole workspace.
 *
 * Usage: cargo run (from ts-generator directory)
 */

use portaria_types::{ts_rs::TS, *};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // CARGO_MANIFEST_DIR points to the ts-generator directory, parent is workspace root
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR")?;
    let workspace_root = std::path::Path::new(&manifest_dir)
        .parent()
        .ok_or("ts-generator has no parent directory")?;
    let export_dir = workspace_root.join("frontend/src/generated");

    std::env::set_var("TS_RS_EXPORT_DIR", &export_dir);

    println!("🔧 Generating TypeScript bindings for the permission model...");

    // Identifiers
    IdentityId::export()?;
    ModuleId::export()?;
    PermissionId::export()?;

    // Catalogs and grants
    Identity::export()?;
    Module::export()?;
    Permission::export()?;
    Grant::export()?;
    ExpandedGrant::export()?;

    // Change feed and guard outcomes
    ChangeKind::export()?;
    ChangeEvent::export()?;
    GuardState::export()?;

    println!("✅ TypeScript bindings generated successfully!");
    println!("📁 Generated files location: {}", export_dir.display());

    if export_dir.exists() {
        println!("\n📋 Generated files:");
        let mut entries: Vec<_> = std::fs::read_dir(&export_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "ts")
            })
            .collect();

        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            println!("   - {}", entry.file_name().to_string_lossy());
        }
    }

    Ok(())
}
